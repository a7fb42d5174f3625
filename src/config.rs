// ── Site configuration ────────────────────────────────────────────────────────

use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sitepush_scp::scp::ScpSiteConfig;
use std::path::Path;

fn default_protocol() -> String {
    "ssh".to_string()
}

/// One update site: which transport to use and its settings.
///
/// ```json
/// { "protocol": "ssh", "host": "update.example.org", "username": "deploy",
///   "uploadDir": "/srv/update", "knownHostsPolicy": "acceptNew" }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(flatten)]
    pub scp: ScpSiteConfig,
}

impl SiteConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
