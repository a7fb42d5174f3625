//! Progress and diagnostic sink for an upload batch.
//!
//! The UI layer implements [`UploadObserver`] to render progress; the
//! default methods forward everything to the `log` facade so a headless
//! caller can use [`LogObserver`] as is.

use crate::types::{TransferProgress, UploadItem};
use log::{debug, error, info};

pub trait UploadObserver: Send + Sync {
    /// Phase title, e.g. "Uploading".
    fn set_title(&self, title: &str) {
        info!("{}", title);
    }

    /// The remote side accepted the file header; the file now exists on the
    /// server but its content is not written yet.
    fn item_started(&self, item: &UploadItem) {
        debug!("uploading {} ({} bytes)", item.filename, item.filesize);
    }

    fn progress(&self, _progress: &TransferProgress) {}

    /// The remote side acknowledged the file content.
    fn item_done(&self, item: &UploadItem) {
        debug!("uploaded {}", item.filename);
    }

    /// Every item of the batch has been transferred.
    fn done(&self) {
        info!("all files transferred");
    }

    fn debug(&self, message: &str) {
        debug!("{}", message);
    }

    fn log(&self, message: &str) {
        info!("{}", message);
    }

    /// Reportable problem (remote ack text, stderr output). Never aborts by
    /// itself; the caller decides whether the batch fails.
    fn error(&self, message: &str) {
        error!("{}", message);
    }
}

/// Observer that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl UploadObserver for LogObserver {}
