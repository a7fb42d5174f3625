// ── Upload plan ───────────────────────────────────────────────────────────────

use crate::config::read_json;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use sitepush_core::UploadItem;
use std::path::{Path, PathBuf};

/// One file to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanItem {
    /// Slash-separated name relative to the upload root.
    pub filename: String,
    /// Local file; relative paths are resolved against the plan file.
    pub local_path: PathBuf,
    /// Octal mode such as `"0644"`, or an SCP token such as `"C0644"`.
    /// Defaults to the local file's mode.
    #[serde(default)]
    pub permissions: Option<String>,
}

/// Files in upload order plus the lock names to publish afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPlan {
    pub items: Vec<PlanItem>,
    #[serde(default)]
    pub locks: Vec<String>,
}

impl UploadPlan {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }

    /// Open every item. `base_dir` resolves relative local paths.
    pub fn into_items(self, base_dir: &Path) -> Result<Vec<UploadItem>, ConfigError> {
        self.items
            .into_iter()
            .map(|entry| entry.into_item(base_dir))
            .collect()
    }
}

impl PlanItem {
    fn into_item(self, base_dir: &Path) -> Result<UploadItem, ConfigError> {
        check_filename(&self.filename)?;
        let path = if self.local_path.is_absolute() {
            self.local_path
        } else {
            base_dir.join(self.local_path)
        };
        let mut item = UploadItem::from_file(self.filename.clone(), &path).map_err(|e| {
            ConfigError::Item {
                filename: self.filename.clone(),
                reason: format!("{}: {}", path.display(), e),
            }
        })?;
        if let Some(permissions) = self.permissions {
            item.permissions = scp_permissions(&self.filename, &permissions)?;
        }
        Ok(item)
    }
}

fn item_error(filename: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Item {
        filename: filename.to_string(),
        reason: reason.into(),
    }
}

/// Names must stay below the upload root and contain no empty segments,
/// since every segment becomes a directory record on the wire.
fn check_filename(filename: &str) -> Result<(), ConfigError> {
    if filename.is_empty() {
        return Err(item_error(filename, "empty file name"));
    }
    if filename.starts_with('/') {
        return Err(item_error(filename, "must be relative to the upload root"));
    }
    for segment in filename.split('/') {
        match segment {
            "" => return Err(item_error(filename, "empty path segment")),
            "." | ".." => return Err(item_error(filename, "must not contain `.` or `..`")),
            s if s.contains('\n') => return Err(item_error(filename, "contains a newline")),
            _ => {}
        }
    }
    Ok(())
}

fn scp_permissions(filename: &str, value: &str) -> Result<String, ConfigError> {
    let digits = value.strip_prefix('C').unwrap_or(value);
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|_| item_error(filename, format!("invalid permissions `{}`", value)))?;
    if mode > 0o7777 {
        return Err(item_error(filename, format!("invalid permissions `{}`", value)));
    }
    Ok(UploadItem::scp_mode(mode))
}
