// ── Types ─────────────────────────────────────────────────────────────────────

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

/// Mode used for files whose permissions cannot be read from disk.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

// ── Byte sources ─────────────────────────────────────────────────────────────

/// Lazily opened content of an upload item.
///
/// The source is opened right before its bytes are streamed and the reader
/// is dropped as soon as the item is finished, successfully or not.
pub trait UploadSource: Send + Sync {
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>>;
}

/// A file on the local disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UploadSource for FileSource {
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}

/// In-memory content, e.g. a freshly generated index file.
#[derive(Debug, Clone, Default)]
pub struct BytesSource {
    data: Vec<u8>,
}

impl BytesSource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl UploadSource for BytesSource {
    fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        Ok(Box::new(Cursor::new(self.data.as_slice())))
    }
}

// ── Upload item ──────────────────────────────────────────────────────────────

/// One file of an upload batch.
///
/// `filename` is slash-separated and relative to the upload root.
/// `permissions` is the SCP mode token sent in the file header, `C` prefix
/// included (see [`UploadItem::scp_mode`]).
pub struct UploadItem {
    pub filename: String,
    pub permissions: String,
    pub filesize: u64,
    source: Box<dyn UploadSource>,
}

impl UploadItem {
    pub fn new(
        filename: impl Into<String>,
        permissions: impl Into<String>,
        filesize: u64,
        source: impl UploadSource + 'static,
    ) -> Self {
        Self {
            filename: filename.into(),
            permissions: permissions.into(),
            filesize,
            source: Box::new(source),
        }
    }

    /// Item backed by a local file; size and mode come from its metadata.
    pub fn from_file(filename: impl Into<String>, path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let metadata = std::fs::metadata(&path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' is not a regular file", path.display()),
            ));
        }
        Ok(Self::new(
            filename,
            Self::scp_mode(file_mode(&metadata)),
            metadata.len(),
            FileSource::new(path),
        ))
    }

    /// Item backed by an in-memory buffer.
    pub fn from_bytes(filename: impl Into<String>, mode: u32, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let filesize = data.len() as u64;
        Self::new(filename, Self::scp_mode(mode), filesize, BytesSource::new(data))
    }

    /// SCP file-header mode token, e.g. `0o644` → `C0644`.
    pub fn scp_mode(mode: u32) -> String {
        format!("C{:04o}", mode & 0o7777)
    }

    /// Directory part of `filename`, trailing slash included; empty for
    /// top-level files.
    pub fn directory(&self) -> &str {
        match self.filename.rfind('/') {
            Some(slash) => &self.filename[..=slash],
            None => "",
        }
    }

    pub fn basename(&self) -> &str {
        match self.filename.rfind('/') {
            Some(slash) => &self.filename[slash + 1..],
            None => &self.filename,
        }
    }

    pub fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        self.source.open()
    }
}

impl fmt::Debug for UploadItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadItem")
            .field("filename", &self.filename)
            .field("permissions", &self.permissions)
            .field("filesize", &self.filesize)
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    DEFAULT_FILE_MODE
}

/// Sum of the declared sizes of a batch.
pub fn total_size(items: &[UploadItem]) -> u64 {
    items.iter().map(|item| item.filesize).sum()
}

// ── Progress ─────────────────────────────────────────────────────────────────

/// Byte counters reported after every chunk written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub item_bytes: u64,
    pub item_total: u64,
    pub batch_bytes: u64,
    pub batch_total: u64,
}

impl TransferProgress {
    pub fn item_percent(&self) -> f64 {
        percent(self.item_bytes, self.item_total)
    }

    pub fn batch_percent(&self) -> f64 {
        percent(self.batch_bytes, self.batch_total)
    }
}

fn percent(done: u64, total: u64) -> f64 {
    if total > 0 {
        (done as f64 / total as f64) * 100.0
    } else {
        100.0
    }
}

// ── Server timestamp ─────────────────────────────────────────────────────────

/// Server clock as printed by `date -u +%Y%m%d%H%M%S`, e.g. `20261018093015`.
///
/// The raw integer is what gets recorded as the version of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadTimestamp(pub u64);

impl UploadTimestamp {
    pub const FORMAT: &'static str = "%Y%m%d%H%M%S";

    pub fn value(self) -> u64 {
        self.0
    }

    /// Interpret the value as a UTC calendar time. `None` if the server
    /// printed something that is not a valid date.
    pub fn to_datetime(self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.0.to_string(), Self::FORMAT).ok()
    }
}

impl fmt::Display for UploadTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_directory_and_basename() {
        let item = UploadItem::from_bytes("plugins/Fiji/x.jar", 0o644, b"abc".to_vec());
        assert_eq!(item.directory(), "plugins/Fiji/");
        assert_eq!(item.basename(), "x.jar");

        let top = UploadItem::from_bytes("db.xml.gz", 0o644, Vec::new());
        assert_eq!(top.directory(), "");
        assert_eq!(top.basename(), "db.xml.gz");
    }

    #[test]
    fn test_scp_mode() {
        assert_eq!(UploadItem::scp_mode(0o644), "C0644");
        assert_eq!(UploadItem::scp_mode(0o755), "C0755");
        // file type bits from st_mode are stripped
        assert_eq!(UploadItem::scp_mode(0o100640), "C0640");
    }

    #[test]
    fn test_from_bytes_reads_back() {
        let item = UploadItem::from_bytes("a/b.txt", 0o600, b"hello".to_vec());
        assert_eq!(item.filesize, 5);
        assert_eq!(item.permissions, "C0600");
        let mut content = String::new();
        item.open().unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    fn test_from_file_uses_metadata() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        tmp.flush().unwrap();

        let item = UploadItem::from_file("jars/t.jar", tmp.path()).unwrap();
        assert_eq!(item.filesize, 10);
        assert!(item.permissions.starts_with('C'));
        assert_eq!(item.permissions.len(), 5);

        let mut content = Vec::new();
        item.open().unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, b"0123456789");
    }

    #[test]
    fn test_from_file_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = UploadItem::from_file("x", dir.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_total_size() {
        let items = vec![
            UploadItem::from_bytes("a", 0o644, vec![0u8; 3]),
            UploadItem::from_bytes("b/c", 0o644, vec![0u8; 7]),
        ];
        assert_eq!(total_size(&items), 10);
    }

    #[test]
    fn test_progress_percent() {
        let p = TransferProgress {
            item_bytes: 50,
            item_total: 200,
            batch_bytes: 0,
            batch_total: 0,
        };
        assert_eq!(p.item_percent(), 25.0);
        assert_eq!(p.batch_percent(), 100.0);
    }

    #[test]
    fn test_progress_serialization() {
        let p = TransferProgress {
            item_bytes: 1,
            item_total: 2,
            batch_bytes: 3,
            batch_total: 4,
        };
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(
            json,
            r#"{"itemBytes":1,"itemTotal":2,"batchBytes":3,"batchTotal":4}"#
        );
    }

    #[test]
    fn test_timestamp_to_datetime() {
        let ts = UploadTimestamp(20261018093015);
        let dt = ts.to_datetime().unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-10-18 09:30:15");
        assert!(UploadTimestamp(0).to_datetime().is_none());
    }
}
