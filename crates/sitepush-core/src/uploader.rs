//! The capability set every upload transport provides.

use crate::error::UploadResult;
use crate::observer::{LogObserver, UploadObserver};
use crate::types::{UploadItem, UploadTimestamp};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Caller-side collaborators for one login/upload cycle.
#[derive(Clone)]
pub struct UploadContext {
    pub observer: Arc<dyn UploadObserver>,
    /// Checked between files; cancelling it from another thread aborts the
    /// batch and removes the pending locks.
    pub cancel: CancellationToken,
}

impl UploadContext {
    pub fn new(observer: Arc<dyn UploadObserver>) -> Self {
        Self {
            observer,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for UploadContext {
    fn default() -> Self {
        Self::new(Arc::new(LogObserver))
    }
}

/// A transport that can publish an upload batch.
///
/// `upload` takes `&mut self`: one uploader runs at most one batch at a time.
pub trait Uploader: Send {
    /// Establish or validate the session. Failures are reported through the
    /// observer and the log; the return value only says whether the
    /// uploader is usable.
    fn login(&mut self, context: &UploadContext) -> bool;

    /// Transfer `items` in order, then publish every lock in `locks`
    /// (`<lock>.lock` → `<lock>`). Returns normally only if everything,
    /// including the lock renames, succeeded.
    fn upload(
        &mut self,
        items: &[UploadItem],
        locks: &[String],
        context: &UploadContext,
    ) -> UploadResult<()>;

    /// Best-effort teardown; errors are logged, not returned.
    fn logout(&mut self);

    fn protocol(&self) -> &'static str;

    /// Server timestamp recorded by the last upload, if any.
    fn timestamp(&self) -> Option<UploadTimestamp>;
}
