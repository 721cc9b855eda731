//! Upload progress tracking.
//!
//! [`UploadSessionRegistry`] maps client-generated upload ids to a pair of
//! counters. The upload handler registers a session, feeds the body through a
//! [`ProgressReader`] that advances the counter per read, and drops the
//! [`SessionGuard`] when it is done, which removes the entry. Progress polls read
//! the same counters concurrently.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::{Error, Result};
use crate::models::ProgressResponse;

/// counters for one in-flight upload
#[derive(Debug)]
pub struct UploadProgress {
    total: u64,
    uploaded: AtomicU64,
}

impl UploadProgress {
    fn new(total: u64) -> Self {
        Self {
            total,
            uploaded: AtomicU64::new(0),
        }
    }

    /// add `delta` bytes, saturating at the declared total
    pub fn advance(&self, delta: u64) {
        let total = self.total;
        // the closure always returns Some, so this cannot fail
        let _ = self
            .uploaded
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(delta).min(total))
            });
    }

    pub fn snapshot(&self) -> ProgressResponse {
        ProgressResponse {
            total: self.total,
            uploaded: self.uploaded.load(Ordering::Acquire),
        }
    }
}

/// in-flight uploads keyed by upload id
#[derive(Debug, Default)]
pub struct UploadSessionRegistry {
    sessions: DashMap<String, Arc<UploadProgress>>,
}

impl UploadSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// register a session; the returned guard ends it when dropped
    pub fn begin(self: &Arc<Self>, id: &str, total: u64) -> Result<SessionGuard> {
        match self.sessions.entry(id.to_string()) {
            Entry::Occupied(_) => Err(Error::SessionInUse(id.to_string())),
            Entry::Vacant(slot) => {
                let progress = Arc::new(UploadProgress::new(total));
                slot.insert(progress.clone());
                tracing::debug!("Upload session {} started ({} bytes declared)", id, total);
                Ok(SessionGuard {
                    registry: Arc::clone(self),
                    id: id.to_string(),
                    progress,
                })
            }
        }
    }

    /// unknown ids are ignored
    pub fn advance(&self, id: &str, delta: u64) {
        if let Some(progress) = self.sessions.get(id) {
            progress.advance(delta);
        }
    }

    pub fn snapshot(&self, id: &str) -> Option<ProgressResponse> {
        self.sessions.get(id).map(|p| p.snapshot())
    }

    /// remove a session; ending an unknown id is a no-op
    pub fn end(&self, id: &str) {
        if self.sessions.remove(id).is_some() {
            tracing::debug!("Upload session {} ended", id);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// ends its session on drop, whether the upload succeeded, failed or was
/// cancelled by the client going away
#[derive(Debug)]
pub struct SessionGuard {
    registry: Arc<UploadSessionRegistry>,
    id: String,
    progress: Arc<UploadProgress>,
}

impl SessionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // only remove the entry this guard created
        self.registry
            .sessions
            .remove_if(&self.id, |_, p| Arc::ptr_eq(p, &self.progress));
        tracing::debug!("Upload session {} ended", self.id);
    }
}

/// `AsyncRead` adapter that reports the size of every successful read
pub struct ProgressReader<R, F> {
    inner: R,
    on_read: F,
}

impl<R, F> ProgressReader<R, F>
where
    R: AsyncRead + Unpin,
    F: FnMut(u64),
{
    pub fn new(inner: R, on_read: F) -> Self {
        Self { inner, on_read }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R, F> AsyncRead for ProgressReader<R, F>
where
    R: AsyncRead + Unpin,
    F: FnMut(u64) + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let read = buf.filled().len() - before;
            if read > 0 {
                (this.on_read)(read as u64);
            }
        }
        poll
    }
}
