// ── File transfer ─────────────────────────────────────────────────────────────

use crate::scp::ack::ScpStream;
use crate::scp::cursor::RemoteCursor;
use sitepush_core::{
    total_size, CancellationToken, TransferProgress, UploadError, UploadItem, UploadResult,
};
use std::io::{self, Read, Write};

/// Content is streamed in chunks of this size; progress is reported after
/// each one.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Sent after the last content byte of a file.
pub const END_OF_FILE: &[u8] = &[0];

/// Running byte counters of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounters {
    pub sent: u64,
    pub total: u64,
}

impl BatchCounters {
    pub fn new(total: u64) -> Self {
        Self { sent: 0, total }
    }
}

/// Send all `items` in order on an already acknowledged sink, moving the
/// remote cursor as needed and ascending back to the root at the end.
///
/// `cancel` is checked before every item and once more after the last
/// one; a cancelled batch stops with [`UploadError::Cancelled`] without
/// sending anything further.
pub fn send_batch<C: Read + Write + ?Sized>(
    stream: &mut ScpStream<'_, C>,
    items: &[UploadItem],
    cancel: &CancellationToken,
) -> UploadResult<BatchCounters> {
    let mut counters = BatchCounters::new(total_size(items));
    let mut cursor = RemoteCursor::new();

    for item in items {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        cursor.reconcile(stream, item.directory())?;
        send_file(stream, item, &mut counters)?;
    }
    if cancel.is_cancelled() {
        return Err(UploadError::Cancelled);
    }

    cursor.unwind(stream)?;
    stream.observer().done();
    Ok(counters)
}

/// Send one file into the sink's current directory.
///
/// The header goes out first and must be acknowledged; only then does the
/// observer hear `item_started`. The content is streamed in
/// [`CHUNK_SIZE`] pieces followed by a single NUL, and the final
/// acknowledgment triggers `item_done`. A source that yields more or fewer
/// bytes than `item.filesize` aborts the item before the NUL is sent.
pub fn send_file<C: Read + Write + ?Sized>(
    stream: &mut ScpStream<'_, C>,
    item: &UploadItem,
    counters: &mut BatchCounters,
) -> UploadResult<u64> {
    let mut source = item.open()?;

    let header = format!("{} {} {}\n", item.permissions, item.filesize, item.basename());
    stream
        .command(header.as_bytes())?
        .into_result(|| failed(item))?;
    stream.observer().item_started(item);

    let sent = stream_content(stream, &mut *source, item, counters)?;
    drop(source);

    stream
        .command(END_OF_FILE)?
        .into_result(|| failed(item))?;
    stream.observer().item_done(item);
    Ok(sent)
}

fn stream_content<C: Read + Write + ?Sized>(
    stream: &mut ScpStream<'_, C>,
    source: &mut dyn Read,
    item: &UploadItem,
    counters: &mut BatchCounters,
) -> UploadResult<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent: u64 = 0;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if sent + n as u64 > item.filesize {
            return Err(UploadError::protocol(format!(
                "`{}` is larger than its declared size of {} bytes",
                item.filename, item.filesize
            )));
        }

        stream.write_chunk(&buf[..n])?;
        sent += n as u64;
        counters.sent += n as u64;
        stream.observer().progress(&TransferProgress {
            item_bytes: sent,
            item_total: item.filesize,
            batch_bytes: counters.sent,
            batch_total: counters.total,
        });
    }

    if sent != item.filesize {
        return Err(UploadError::protocol(format!(
            "`{}` ended after {} of {} bytes",
            item.filename, sent, item.filesize
        )));
    }
    Ok(sent)
}

fn failed(item: &UploadItem) -> String {
    format!("failed to upload `{}`", item.filename)
}
