//! Upload error types.

use std::io;

/// Errors produced while logging in, uploading or tearing down a session.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Session or channel could not be opened.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The remote side answered a command with a non-OK acknowledgment.
    #[error("{message}{}", remote_suffix(.remote))]
    Protocol {
        message: String,
        /// Diagnostic text sent by the remote process, if any.
        remote: Option<String>,
    },

    /// The caller cancelled the batch. Pending locks have been removed.
    #[error("upload canceled")]
    Cancelled,

    #[error("command failed with status {0} (see log)")]
    ExitStatus(i32),

    #[error("login failed: {0}")]
    Login(String),

    #[error("host key verification failed: {0}")]
    HostKey(String),

    #[error("not logged in")]
    NotConnected,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown upload protocol '{0}'")]
    UnknownProtocol(String),
}

pub type UploadResult<T> = Result<T, UploadError>;

fn remote_suffix(remote: &Option<String>) -> String {
    match remote {
        Some(text) if !text.is_empty() => format!(" (remote: {})", text),
        _ => String::new(),
    }
}

impl UploadError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            remote: None,
        }
    }

    pub fn protocol_with_remote(message: impl Into<String>, remote: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            remote: Some(remote.into()),
        }
    }

    /// Cancellation is a control signal rather than a failure; callers
    /// usually report it differently.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
