use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::convert::Infallible;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::catalog::DownloadCatalog;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::handlers::{download_file, download_list_page, index_page, upload_file, upload_progress};
use crate::middleware::add_security_headers;
use crate::network::{
    advertised_host, session_url, LanAddressSource, RouteProbe, DOWNLOAD_PAGE_PATH,
    UPLOAD_PAGE_PATH,
};
use crate::state::AppState;

/// room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// build the router serving the pages and transfer endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(state.max_upload_size.saturating_add(MULTIPART_OVERHEAD))
        .unwrap_or(usize::MAX);
    tracing::debug!("Building router with max upload body of {} bytes", body_limit);

    Router::new()
        .route(UPLOAD_PAGE_PATH, get(index_page))
        .route(DOWNLOAD_PAGE_PATH, get(download_list_page))
        .route(
            "/upload",
            post(upload_file)
                .layer::<_, Infallible>(DefaultBodyLimit::disable())
                .layer::<_, Infallible>(RequestBodyLimitLayer::new(body_limit)),
        )
        .route("/progress", get(upload_progress))
        .route("/download", get(download_file))
        .layer(axum::middleware::from_fn(add_security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// where a freshly started server can be reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedServer {
    /// address the listener is bound to
    pub addr: SocketAddr,
    /// URL to put into the QR code
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running(StartedServer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NothingRunning,
}

struct RunningServer {
    info: StartedServer,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

#[derive(Default)]
struct Lifecycle {
    running: Option<RunningServer>,
    last_port: Option<u16>,
}

/// owns the listening socket of the transfer service
///
/// The router is built once in [`TransferServer::new`]; start and stop only
/// create and tear down listeners around it. Transitions are serialized, so two
/// concurrent starts never race for the same port. Dropping the server closes
/// any running listener.
pub struct TransferServer {
    router: Router,
    catalog: Arc<DownloadCatalog>,
    bind_host: IpAddr,
    default_port: u16,
    advertise_host: Option<String>,
    lan: Box<dyn LanAddressSource>,
    shutdown_timeout: Duration,
    lifecycle: Mutex<Lifecycle>,
    status: watch::Sender<ServerStatus>,
}

impl TransferServer {
    pub fn new(state: Arc<AppState>, config: &Config) -> Self {
        let catalog = Arc::clone(&state.catalog);
        let (status, _) = watch::channel(ServerStatus::Stopped);
        Self {
            router: build_router(state),
            catalog,
            bind_host: config.bind_host,
            default_port: config.port,
            advertise_host: config.advertise_host.clone(),
            lan: Box::new(RouteProbe::default()),
            shutdown_timeout: config.shutdown_timeout,
            lifecycle: Mutex::new(Lifecycle::default()),
            status,
        }
    }

    /// replace the LAN address discovery used for the session URL
    pub fn with_lan_source(mut self, source: impl LanAddressSource + 'static) -> Self {
        self.lan = Box::new(source);
        self
    }

    pub fn status(&self) -> ServerStatus {
        self.status.borrow().clone()
    }

    /// watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<ServerStatus> {
        self.status.subscribe()
    }

    pub fn session_url(&self) -> Option<String> {
        match &*self.status.borrow() {
            ServerStatus::Running(info) => Some(info.url.clone()),
            _ => None,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.status.borrow() {
            ServerStatus::Running(info) => Some(info.addr),
            _ => None,
        }
    }

    /// bind `port` and serve, closing a running listener first
    ///
    /// Port 0 picks a free port. The session URL reflects the catalog as it is
    /// right now and is not updated if files are added later.
    pub async fn start(&self, port: u16) -> Result<StartedServer> {
        let mut lifecycle = self.lifecycle.lock().await;
        self.start_locked(&mut lifecycle, port).await
    }

    async fn start_locked(&self, lifecycle: &mut Lifecycle, port: u16) -> Result<StartedServer> {
        if let Some(running) = lifecycle.running.take() {
            let addr = running.info.addr;
            tracing::info!("Closing server on {} before starting a new one", addr);
            if let Err(e) = self.close(running).await {
                tracing::warn!("Failed to close server on {}: {}", addr, e);
            }
        }

        self.status.send_replace(ServerStatus::Starting);
        let (listener, addr) = match self.bind(port).await {
            Ok(bound) => bound,
            Err(e) => {
                self.status.send_replace(ServerStatus::Stopped);
                return Err(e);
            }
        };

        let host = match &self.advertise_host {
            Some(host) => host.clone(),
            None => advertised_host(self.lan.as_ref()),
        };
        let url = session_url(&host, addr.port(), self.catalog.is_empty());

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let app = self.router.clone();
        let task = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                // an error means the sender was dropped, which also means stop
                let _ = shutdown_rx.await;
            })
            .tcp_nodelay(true)
            .await
        });

        let info = StartedServer { addr, url };
        tracing::info!("📡 Transfer server listening on {}", addr);
        tracing::info!("🔗 Session URL: {}", info.url);

        lifecycle.last_port = Some(addr.port());
        lifecycle.running = Some(RunningServer {
            info: info.clone(),
            shutdown,
            task,
        });
        self.status.send_replace(ServerStatus::Running(info.clone()));
        Ok(info)
    }

    /// close the listener; stopping an idle server reports `NothingRunning`
    pub async fn stop(&self) -> Result<StopOutcome> {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.running.take() else {
            tracing::debug!("Stop requested but no server is running");
            return Ok(StopOutcome::NothingRunning);
        };

        let addr = running.info.addr;
        let closed = self.close(running).await;
        self.status.send_replace(ServerStatus::Stopped);
        closed?;

        tracing::info!("🛑 Transfer server on {} stopped", addr);
        Ok(StopOutcome::Stopped)
    }

    /// stop, then start again on the last bound port
    pub async fn restart(&self) -> Result<StartedServer> {
        let mut lifecycle = self.lifecycle.lock().await;
        let port = lifecycle.last_port.unwrap_or(self.default_port);
        self.start_locked(&mut lifecycle, port).await
    }

    async fn bind(&self, port: u16) -> Result<(TcpListener, SocketAddr)> {
        let addr = SocketAddr::new(self.bind_host, port);
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            tracing::error!("Failed to bind {}: {}", addr, source);
            Error::Bind { addr, source }
        })?;
        let local = listener
            .local_addr()
            .map_err(|source| Error::Bind { addr, source })?;
        Ok((listener, local))
    }

    /// signal graceful shutdown and wait for in-flight requests, up to the
    /// configured timeout
    async fn close(&self, running: RunningServer) -> io::Result<()> {
        let RunningServer {
            info,
            shutdown,
            mut task,
        } = running;

        // the serve task may already have exited on its own
        let _ = shutdown.send(());

        match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(io::Error::other(join_error)),
            Err(_) => {
                tracing::warn!(
                    "Requests on {} still running after {:?}, aborting",
                    info.addr,
                    self.shutdown_timeout
                );
                task.abort();
                Ok(())
            }
        }
    }
}

/// log where the service will listen and write files
pub fn print_startup_banner(config: &Config) {
    tracing::info!("qrshare starting...");
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("📡 Listen address: {}:{}", config.bind_host, config.port);
    tracing::info!(
        "📁 Uploads saved to: {:?}",
        config
            .upload_dir
            .canonicalize()
            .unwrap_or(config.upload_dir.clone())
    );
    tracing::info!("📦 Max upload size: {} bytes", config.max_upload_size);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
