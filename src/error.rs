use std::io;
use std::path::PathBuf;

/// Errors while loading the site configuration or the upload plan.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("plan item `{filename}`: {reason}")]
    Item { filename: String, reason: String },
}
