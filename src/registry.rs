// ── Uploader registry ─────────────────────────────────────────────────────────

use crate::config::SiteConfig;
use sitepush_core::{UploadError, UploadResult, Uploader};
use sitepush_scp::scp::ScpUploader;

/// Protocol names with a built-in uploader.
pub const PROTOCOLS: &[&str] = &["ssh"];

/// The uploader for `config.protocol`.
pub fn uploader_for(config: &SiteConfig) -> UploadResult<Box<dyn Uploader>> {
    match config.protocol.as_str() {
        "ssh" => Ok(Box::new(ScpUploader::new(config.scp.clone()))),
        other => Err(UploadError::UnknownProtocol(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(protocol: &str) -> SiteConfig {
        let json = format!(
            r#"{{"protocol":"{}","host":"h","username":"u","uploadDir":"/srv/update"}}"#,
            protocol
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_ssh_protocol() {
        let uploader = uploader_for(&site("ssh")).unwrap();
        assert_eq!(uploader.protocol(), "ssh");
        assert!(uploader.timestamp().is_none());
    }

    #[test]
    fn test_unknown_protocol() {
        let err = uploader_for(&site("ftp")).err().unwrap();
        assert!(matches!(err, UploadError::UnknownProtocol(ref p) if p == "ftp"));
        assert_eq!(err.to_string(), "unknown upload protocol 'ftp'");
    }

    #[test]
    fn test_every_listed_protocol_resolves() {
        for protocol in PROTOCOLS {
            assert!(uploader_for(&site(protocol)).is_ok());
        }
    }
}
