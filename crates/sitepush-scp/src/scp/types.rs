// ── Types ─────────────────────────────────────────────────────────────────────

use crate::scp::channel::TeardownTimings;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use sitepush_core::{UploadError, UploadResult};
use std::path::PathBuf;
use std::time::Duration;

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_ssh_port() -> u16 {
    22
}
fn default_false() -> bool {
    false
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_keepalive_secs() -> u64 {
    60
}
fn default_drain_grace_ms() -> u64 {
    100
}
fn default_close_grace_ms() -> u64 {
    1000
}

// ── Site configuration ───────────────────────────────────────────────────────

/// Host-key handling when connecting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KnownHostsPolicy {
    /// Accept and remember keys of hosts not yet in known_hosts; reject
    /// changed keys.
    AcceptNew,
    #[default]
    Strict,
    Ignore,
}

/// Connection and layout settings of one SCP update site.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScpSiteConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub private_key_passphrase: Option<SecretString>,
    #[serde(default = "default_false")]
    pub use_agent: bool,
    #[serde(default)]
    pub known_hosts_policy: KnownHostsPolicy,
    #[serde(default)]
    pub known_hosts_path: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_false")]
    pub compress: bool,
    /// Remote root of the site. Expanded by the remote shell, so it must
    /// be an absolute path.
    pub upload_dir: String,
    /// Upper bound for a single acknowledgment read. `None` or 0 blocks
    /// indefinitely.
    #[serde(default)]
    pub ack_timeout_secs: Option<u64>,
    #[serde(default = "default_drain_grace_ms")]
    pub drain_grace_ms: u64,
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
}

impl ScpSiteConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        upload_dir: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_ssh_port(),
            username: username.into(),
            password: None,
            private_key_path: None,
            private_key_passphrase: None,
            use_agent: false,
            known_hosts_policy: KnownHostsPolicy::default(),
            known_hosts_path: None,
            timeout_secs: default_timeout_secs(),
            keepalive_interval_secs: default_keepalive_secs(),
            compress: false,
            upload_dir: upload_dir.into(),
            ack_timeout_secs: None,
            drain_grace_ms: default_drain_grace_ms(),
            close_grace_ms: default_close_grace_ms(),
        }
    }

    pub fn validate(&self) -> UploadResult<()> {
        if self.host.trim().is_empty() {
            return Err(UploadError::Config("host must not be empty".into()));
        }
        if self.username.trim().is_empty() {
            return Err(UploadError::Config("username must not be empty".into()));
        }
        if self.upload_dir.trim().is_empty() {
            return Err(UploadError::Config("uploadDir must not be empty".into()));
        }
        Ok(())
    }

    /// `upload_dir` with exactly one trailing slash, so that item and lock
    /// names can be appended directly.
    pub fn upload_root(&self) -> String {
        let trimmed = self.upload_dir.trim_end_matches('/');
        format!("{}/", trimmed)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn teardown_timings(&self) -> TeardownTimings {
        TeardownTimings {
            drain_grace: Duration::from_millis(self.drain_grace_ms),
            close_grace: Duration::from_millis(self.close_grace_ms),
        }
    }

    /// Session read timeout in milliseconds as libssh2 expects it; 0 means
    /// no timeout.
    pub fn ack_timeout_ms(&self) -> u32 {
        let secs = self.ack_timeout_secs.unwrap_or(0);
        secs.saturating_mul(1000).min(u32::MAX as u64) as u32
    }

    /// Explicit known_hosts path, or `~/.ssh/known_hosts`.
    pub fn known_hosts_file(&self) -> Option<PathBuf> {
        match &self.known_hosts_path {
            Some(path) => Some(PathBuf::from(path)),
            None => dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts")),
        }
    }
}

// ── Upload phases ────────────────────────────────────────────────────────────

/// Where a batch currently is. Every upload starts at `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Idle,
    /// `date -u` is running; its output becomes the batch timestamp.
    TimestampHandshake,
    /// `scp -t` is starting and must send its initial OK.
    AwaitingBatchChannel,
    Transferring,
    /// Cancelled: removing lock files.
    Aborting,
    /// Transfers done: renaming lock files into place.
    Unlocking,
    Closed,
}

impl UploadPhase {
    pub fn can_transition_to(self, next: UploadPhase) -> bool {
        use UploadPhase::*;
        matches!(
            (self, next),
            (Idle, TimestampHandshake)
                | (TimestampHandshake, AwaitingBatchChannel)
                | (AwaitingBatchChannel, Transferring)
                | (Transferring, Aborting)
                | (Transferring, Unlocking)
                | (Unlocking, Closed)
        )
    }
}

impl std::fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::TimestampHandshake => "timestamp handshake",
            Self::AwaitingBatchChannel => "awaiting batch channel",
            Self::Transferring => "transferring",
            Self::Aborting => "aborting",
            Self::Unlocking => "unlocking",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
