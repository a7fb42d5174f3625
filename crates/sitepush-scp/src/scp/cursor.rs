// ── Remote directory cursor ───────────────────────────────────────────────────

use crate::scp::ack::ScpStream;
use log::debug;
use sitepush_core::{UploadError, UploadResult};
use std::io::{Read, Write};

/// Mode sent with every directory record.
pub const DIRECTORY_MODE: &str = "2775";

/// Record that leaves the current directory.
pub const END_DIRECTORY: &[u8] = b"E\n";

/// The directory the remote sink is currently in, relative to the upload
/// root: empty at the root, otherwise slash-separated with a trailing
/// slash.
///
/// The prefix is only updated after the remote side acknowledged a move,
/// so it always matches the sink's view of the directory stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteCursor {
    prefix: String,
}

impl RemoteCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &str {
        &self.prefix
    }

    pub fn is_root(&self) -> bool {
        self.prefix.is_empty()
    }

    /// Move to `target`, ascending only as far as the deepest common
    /// ancestor and then descending segment by segment.
    pub fn reconcile<C: Read + Write + ?Sized>(
        &mut self,
        stream: &mut ScpStream<'_, C>,
        target: &str,
    ) -> UploadResult<()> {
        while !target.starts_with(self.prefix.as_str()) {
            self.ascend(stream)?;
        }
        if target.len() > self.prefix.len() {
            let relative = target[self.prefix.len()..].to_string();
            self.descend(stream, &relative)?;
        }
        Ok(())
    }

    /// Leave the current directory.
    pub fn ascend<C: Read + Write + ?Sized>(
        &mut self,
        stream: &mut ScpStream<'_, C>,
    ) -> UploadResult<()> {
        if self.is_root() {
            return Err(UploadError::protocol("cannot leave the upload root"));
        }
        stream
            .command(END_DIRECTORY)?
            .into_result(|| format!("cannot leave directory `{}`", self.prefix))?;
        let parent = parent_len(&self.prefix);
        self.prefix.truncate(parent);
        debug!("left directory, now at `{}`", self.prefix);
        Ok(())
    }

    /// Enter every segment of `relative` in turn.
    pub fn descend<C: Read + Write + ?Sized>(
        &mut self,
        stream: &mut ScpStream<'_, C>,
        relative: &str,
    ) -> UploadResult<()> {
        for name in relative.split('/').filter(|segment| !segment.is_empty()) {
            let record = format!("D{} 0 {}\n", DIRECTORY_MODE, name);
            stream
                .command(record.as_bytes())?
                .into_result(|| format!("cannot enter directory `{}`", name))?;
            self.prefix.push_str(name);
            self.prefix.push('/');
            debug!("entered directory `{}`", self.prefix);
        }
        Ok(())
    }

    /// Ascend back to the upload root.
    pub fn unwind<C: Read + Write + ?Sized>(
        &mut self,
        stream: &mut ScpStream<'_, C>,
    ) -> UploadResult<()> {
        while !self.is_root() {
            self.ascend(stream)?;
        }
        Ok(())
    }
}

/// Length of the parent prefix: up to and including the last slash before
/// the final character, or 0.
fn parent_len(prefix: &str) -> usize {
    let without_last = &prefix[..prefix.len().saturating_sub(1)];
    match without_last.rfind('/') {
        Some(slash) => slash + 1,
        None => 0,
    }
}
