//! # sitepush – core
//!
//! Shared building blocks for every upload transport:
//!   • `UploadItem` / `UploadSource` – one file of an upload batch
//!   • `TransferProgress` and the `UploadObserver` progress/diagnostic sink
//!   • `UploadError` – the error taxonomy shared by all transports
//!   • `Uploader` – the capability set a transport implements

pub mod error;
pub mod observer;
pub mod types;
pub mod uploader;

pub use error::{UploadError, UploadResult};
pub use observer::{LogObserver, UploadObserver};
pub use types::*;
pub use uploader::{UploadContext, Uploader};

pub use tokio_util::sync::CancellationToken;
