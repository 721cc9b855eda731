use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::sync::Arc;

use qrshare::catalog::DownloadCatalog;
use qrshare::config::Config;
use qrshare::console::Console;
use qrshare::server::{print_startup_banner, TransferServer};
use qrshare::state::AppState;

// use mimalloc as the global allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    // load .env file if it exists (fails silently if not found)
    let _ = dotenvy::dotenv();

    // load configuration from environment variables
    let config = Config::from_env();

    // build tokio runtime with configured worker threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime");

    runtime.block_on(async {
        // logs go to stderr so they don't interleave with console replies
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();

        if !config.upload_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(&config.upload_dir) {
                tracing::error!("Failed to create upload directory {:?}: {}", config.upload_dir, e);
                return;
            }
            tracing::info!("Created upload directory at: {:?}", config.upload_dir);
        }

        // files named on the command line start out in the download list
        let catalog = Arc::new(DownloadCatalog::new());
        for path in std::env::args_os().skip(1) {
            if let Err(e) = catalog.add_path(&path) {
                tracing::warn!("Skipping {:?}: {}", path, e);
            }
        }

        let state = Arc::new(AppState::from_config(&config, Arc::clone(&catalog)));
        let server = Arc::new(TransferServer::new(state, &config));

        print_startup_banner(&config);

        let console = Console::new(Arc::clone(&server), catalog, config.port);
        console.run().await;

        if let Err(e) = server.stop().await {
            tracing::error!("Failed to stop server: {}", e);
        }
    });

    // a pending stdin read would otherwise keep the runtime alive
    runtime.shutdown_timeout(std::time::Duration::from_secs(1));
}
