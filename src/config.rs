use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// address the transfer server listens on
    pub bind_host: IpAddr,
    /// default port used by `start` when none is given
    pub port: u16,
    /// directory uploaded files are written to
    pub upload_dir: PathBuf,
    /// maximum upload size in bytes
    pub max_upload_size: u64,
    /// number of tokio worker threads
    pub worker_threads: usize,
    /// host put into the QR url instead of the discovered LAN address
    pub advertise_host: Option<String>,
    /// how long stop waits for in-flight requests before aborting
    pub shutdown_timeout: Duration,
}

pub const DEFAULT_PORT: u16 = 1082;
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from("."),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            worker_threads: 4,
            advertise_host: None,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_host = std::env::var("BIND_HOST")
            .ok()
            .and_then(|h| match h.parse() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    tracing::warn!("Ignoring invalid BIND_HOST {:?}", h);
                    None
                }
            })
            .unwrap_or(defaults.bind_host);

        // an empty value means "discover"
        let advertise_host = std::env::var("ADVERTISE_HOST")
            .ok()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty());

        Self {
            bind_host,
            port: env_parse("PORT").unwrap_or(defaults.port),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            max_upload_size: env_parse("MAX_UPLOAD_SIZE").unwrap_or(defaults.max_upload_size),
            worker_threads: env_parse("WORKER_THREADS")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.worker_threads),
            advertise_host,
            shutdown_timeout: env_parse("SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
