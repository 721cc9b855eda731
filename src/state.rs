use std::path::PathBuf;
use std::sync::Arc;

use crate::catalog::DownloadCatalog;
use crate::config::Config;
use crate::progress::UploadSessionRegistry;

/// shared application state handed to every request handler
#[derive(Debug, Clone)]
pub struct AppState {
    /// where uploads are written
    pub upload_dir: PathBuf,
    /// largest accepted upload in bytes
    pub max_upload_size: u64,
    /// track in-flight uploads by upload id
    pub sessions: Arc<UploadSessionRegistry>,
    /// files offered for download, shared with the console
    pub catalog: Arc<DownloadCatalog>,
}

impl AppState {
    pub fn new(upload_dir: PathBuf, max_upload_size: u64, catalog: Arc<DownloadCatalog>) -> Self {
        Self {
            upload_dir,
            max_upload_size,
            sessions: Arc::new(UploadSessionRegistry::new()),
            catalog,
        }
    }

    pub fn from_config(config: &Config, catalog: Arc<DownloadCatalog>) -> Self {
        Self::new(config.upload_dir.clone(), config.max_upload_size, catalog)
    }
}
