//! Files the operator offers for download.
//!
//! The catalog is append-only: the console adds entries, request handlers only
//! read. Lookups are exact and case-sensitive.

use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Error, Result};

/// a file offered on the download page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFile {
    /// basename shown on the page and used in `/download?file=`
    pub name: String,
    /// absolute path resolved when the file was selected
    pub path: PathBuf,
    /// size in bytes
    pub size: u64,
    /// size in KiB, rounded up
    pub size_kb: u64,
    /// last modification time, or "Unknown"
    pub modified: String,
}

impl DownloadFile {
    /// stat `path` and describe it as a catalog entry
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = std::fs::canonicalize(path.as_ref())?;
        let metadata = std::fs::metadata(&path)?;
        if !metadata.is_file() {
            return Err(Error::NotAFile(path));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::NotAFile(path.clone()))?;

        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .and_then(|d| chrono::DateTime::from_timestamp(d.as_secs() as i64, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let size = metadata.len();
        Ok(Self {
            name,
            path,
            size,
            size_kb: size_in_kb(size),
            modified,
        })
    }
}

/// kibibytes, rounded up so that a 1 byte file shows as 1 KB
pub fn size_in_kb(bytes: u64) -> u64 {
    bytes.div_ceil(1024)
}

#[derive(Debug, Default)]
pub struct DownloadCatalog {
    files: RwLock<Vec<DownloadFile>>,
}

impl DownloadCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// append a file; display names must stay unique
    pub fn add(&self, file: DownloadFile) -> Result<()> {
        let mut files = self.write();
        if files.iter().any(|f| f.name == file.name) {
            return Err(Error::DuplicateName(file.name));
        }
        tracing::info!("Added {} ({} KB) to the download list", file.name, file.size_kb);
        files.push(file);
        Ok(())
    }

    /// stat `path` and append it
    pub fn add_path(&self, path: impl AsRef<Path>) -> Result<DownloadFile> {
        let file = DownloadFile::from_path(path)?;
        self.add(file.clone())?;
        Ok(file)
    }

    /// snapshot in insertion order
    pub fn list(&self) -> Vec<DownloadFile> {
        self.read().clone()
    }

    pub fn find(&self, name: &str) -> Option<DownloadFile> {
        self.read().iter().find(|f| f.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // the vec is never left half-modified, so a poisoned lock is still usable
    fn read(&self) -> RwLockReadGuard<'_, Vec<DownloadFile>> {
        self.files.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<DownloadFile>> {
        self.files.write().unwrap_or_else(|e| e.into_inner())
    }
}
