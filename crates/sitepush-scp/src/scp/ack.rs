// ── Acknowledgments ───────────────────────────────────────────────────────────
//
// After every header, directory record and file terminator the remote sink
// answers with a single status byte: 0 for OK, 1 for an error and 2 for a
// fatal error. The last two are followed by a newline-terminated message.

use sitepush_core::{UploadError, UploadObserver, UploadResult};
use std::io::{self, Read, Write};

/// One acknowledgment from the remote sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Ok,
    Error(String),
    Fatal(String),
    /// The stream ended before a status byte arrived.
    Eof,
    /// Any other status byte.
    Unexpected(u8),
}

impl Ack {
    pub fn is_ok(&self) -> bool {
        matches!(self, Ack::Ok)
    }

    /// Diagnostic text sent along with the status, if any.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Ack::Error(text) | Ack::Fatal(text) => Some(text),
            _ => None,
        }
    }

    /// `Ok(())` for an OK ack; otherwise a protocol error described by
    /// `context` and carrying the remote text.
    pub fn into_result(self, context: impl FnOnce() -> String) -> UploadResult<()> {
        match self {
            Ack::Ok => Ok(()),
            Ack::Error(text) | Ack::Fatal(text) => {
                Err(UploadError::protocol_with_remote(context(), text))
            }
            Ack::Eof => Err(UploadError::protocol_with_remote(
                context(),
                "connection closed",
            )),
            Ack::Unexpected(byte) => Err(UploadError::protocol_with_remote(
                context(),
                format!("unexpected status byte {}", byte),
            )),
        }
    }
}

fn read_byte<R: Read + ?Sized>(input: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match input.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Read one acknowledgment.
///
/// For ERROR and FATAL the message is consumed up to and including its
/// newline, so the stream stays aligned for the next record. A message cut
/// off by the end of the stream is returned as far as it got. Every non-OK
/// status is reported to the observer.
pub fn read_ack<R: Read + ?Sized>(
    input: &mut R,
    observer: &dyn UploadObserver,
) -> io::Result<Ack> {
    let status = match read_byte(input)? {
        None => {
            observer.error("remote end closed the connection while waiting for an acknowledgment");
            return Ok(Ack::Eof);
        }
        Some(status) => status,
    };

    match status {
        0 => Ok(Ack::Ok),
        1 | 2 => {
            let mut message = Vec::new();
            while let Some(byte) = read_byte(input)? {
                if byte == b'\n' {
                    break;
                }
                message.push(byte);
            }
            let text = String::from_utf8_lossy(&message).into_owned();
            observer.error(&text);
            Ok(if status == 1 {
                Ack::Error(text)
            } else {
                Ack::Fatal(text)
            })
        }
        other => {
            observer.error(&format!("unexpected acknowledgment byte {}", other));
            Ok(Ack::Unexpected(other))
        }
    }
}

/// Read an unsigned decimal terminated by a newline, skipping any byte
/// that is not a digit.
///
/// Fails with `UnexpectedEof` if the stream ends before the newline.
pub fn read_decimal<R: Read + ?Sized>(input: &mut R) -> io::Result<u64> {
    let mut value: u64 = 0;
    loop {
        match read_byte(input)? {
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended before end of number",
                ))
            }
            Some(b'\n') => return Ok(value),
            Some(digit @ b'0'..=b'9') => {
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(u64::from(digit - b'0')))
                    .ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidData, "number out of range")
                    })?;
            }
            Some(_) => {}
        }
    }
}

// ── Command stream ───────────────────────────────────────────────────────────

/// The live sink channel together with the observer that receives its
/// diagnostics.
pub struct ScpStream<'a, C: Read + Write + ?Sized> {
    channel: &'a mut C,
    observer: &'a dyn UploadObserver,
}

impl<'a, C: Read + Write + ?Sized> ScpStream<'a, C> {
    pub fn new(channel: &'a mut C, observer: &'a dyn UploadObserver) -> Self {
        Self { channel, observer }
    }

    pub fn observer(&self) -> &'a dyn UploadObserver {
        self.observer
    }

    /// Write a complete record and flush it.
    pub fn send(&mut self, record: &[u8]) -> io::Result<()> {
        self.channel.write_all(record)?;
        self.channel.flush()
    }

    /// Write file content without flushing.
    pub fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.channel.write_all(chunk)
    }

    pub fn read_ack(&mut self) -> io::Result<Ack> {
        read_ack(&mut *self.channel, self.observer)
    }

    /// Send a record and wait for its acknowledgment.
    pub fn command(&mut self, record: &[u8]) -> io::Result<Ack> {
        self.send(record)?;
        self.read_ack()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scp::testing::{Duplex, RecordingObserver};
    use std::io::Cursor;

    #[test]
    fn test_read_ack_ok() {
        let observer = RecordingObserver::default();
        let mut input = Cursor::new(vec![0u8, 0u8]);
        assert_eq!(read_ack(&mut input, &observer).unwrap(), Ack::Ok);
        assert_eq!(input.position(), 1);
        assert!(observer.errors().is_empty());
    }

    #[test]
    fn test_read_ack_error_consumes_through_newline() {
        let observer = RecordingObserver::default();
        let mut input = Cursor::new(b"\x01scp: x.jar: Permission denied\n\x00".to_vec());
        let ack = read_ack(&mut input, &observer).unwrap();
        assert_eq!(ack, Ack::Error("scp: x.jar: Permission denied".into()));
        // the next record is untouched
        assert_eq!(read_ack(&mut input, &observer).unwrap(), Ack::Ok);
        assert_eq!(observer.errors(), vec!["scp: x.jar: Permission denied"]);
    }

    #[test]
    fn test_read_ack_fatal() {
        let observer = RecordingObserver::default();
        let mut input = Cursor::new(b"\x02protocol error\n".to_vec());
        let ack = read_ack(&mut input, &observer).unwrap();
        assert_eq!(ack, Ack::Fatal("protocol error".into()));
        assert_eq!(ack.remote_message(), Some("protocol error"));
    }

    #[test]
    fn test_read_ack_truncated_message() {
        let observer = RecordingObserver::default();
        let mut input = Cursor::new(b"\x01disk fu".to_vec());
        assert_eq!(
            read_ack(&mut input, &observer).unwrap(),
            Ack::Error("disk fu".into())
        );
    }

    #[test]
    fn test_read_ack_eof() {
        let observer = RecordingObserver::default();
        let mut input = Cursor::new(Vec::new());
        assert_eq!(read_ack(&mut input, &observer).unwrap(), Ack::Eof);
        assert_eq!(observer.errors().len(), 1);
    }

    #[test]
    fn test_read_ack_unexpected_byte() {
        let observer = RecordingObserver::default();
        let mut input = Cursor::new(vec![b'C']);
        assert_eq!(
            read_ack(&mut input, &observer).unwrap(),
            Ack::Unexpected(b'C')
        );
    }

    #[test]
    fn test_into_result_carries_remote_text() {
        let err = Ack::Error("No such file".into())
            .into_result(|| "cannot enter directory `jars`".into())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot enter directory `jars` (remote: No such file)"
        );
        assert!(Ack::Ok.into_result(|| unreachable!()).is_ok());
    }

    #[test]
    fn test_read_decimal() {
        let mut input = Cursor::new(b"20261018093015\n".to_vec());
        assert_eq!(read_decimal(&mut input).unwrap(), 20261018093015);
    }

    #[test]
    fn test_read_decimal_skips_non_digits() {
        let mut input = Cursor::new(b" 12a3\r\nrest".to_vec());
        assert_eq!(read_decimal(&mut input).unwrap(), 123);
        assert_eq!(input.position(), 7);
    }

    #[test]
    fn test_read_decimal_empty_line_is_zero() {
        let mut input = Cursor::new(b"\n".to_vec());
        assert_eq!(read_decimal(&mut input).unwrap(), 0);
    }

    #[test]
    fn test_read_decimal_premature_eof() {
        let mut input = Cursor::new(b"2026".to_vec());
        let err = read_decimal(&mut input).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_read_decimal_overflow() {
        let mut input = Cursor::new(b"99999999999999999999999\n".to_vec());
        let err = read_decimal(&mut input).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_stream_command_writes_and_reads_ack() {
        let observer = RecordingObserver::default();
        let mut channel = Duplex::with_input(vec![0]);
        let mut stream = ScpStream::new(&mut channel, &observer);
        assert!(stream.command(b"E\n").unwrap().is_ok());
        assert_eq!(channel.records(), vec![b"E\n".to_vec()]);
    }
}
