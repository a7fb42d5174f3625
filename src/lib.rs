//! # sitepush
//!
//! Publishes an update-site batch to a remote server:
//!   • Site configuration and upload-plan loading (JSON)
//!   • Uploader selection by protocol name
//!   • Logging initialisation for the command-line binary

pub mod config;
pub mod error;
pub mod logging;
pub mod plan;
pub mod registry;

pub use config::SiteConfig;
pub use error::ConfigError;
pub use plan::{PlanItem, UploadPlan};
pub use registry::uploader_for;
