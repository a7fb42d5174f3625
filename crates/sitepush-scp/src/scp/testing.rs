// In-memory stand-ins for a sink channel and an observer.

use sitepush_core::{TransferProgress, UploadItem, UploadObserver};
use std::io::{self, Cursor, Read, Write};
use std::sync::Mutex;

/// Reads scripted remote output and records every write call separately.
pub(crate) struct Duplex {
    input: Cursor<Vec<u8>>,
    writes: Vec<Vec<u8>>,
}

impl Duplex {
    pub(crate) fn with_input(input: impl Into<Vec<u8>>) -> Self {
        Self {
            input: Cursor::new(input.into()),
            writes: Vec::new(),
        }
    }

    pub(crate) fn records(&self) -> Vec<Vec<u8>> {
        self.writes.clone()
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.writes.concat()
    }

    pub(crate) fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written()).into_owned()
    }
}

impl Read for Duplex {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for Duplex {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writes.push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    Started(String),
    Progress(TransferProgress),
    Done(String),
    BatchDone,
    Error(String),
    Log(String),
}

#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Error(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn logs(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Log(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn progress(&self) -> Vec<TransferProgress> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

impl UploadObserver for RecordingObserver {
    fn item_started(&self, item: &UploadItem) {
        self.push(Event::Started(item.filename.clone()));
    }

    fn progress(&self, progress: &TransferProgress) {
        self.push(Event::Progress(*progress));
    }

    fn item_done(&self, item: &UploadItem) {
        self.push(Event::Done(item.filename.clone()));
    }

    fn done(&self) {
        self.push(Event::BatchDone);
    }

    fn log(&self, message: &str) {
        self.push(Event::Log(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(Event::Error(message.to_string()));
    }
}
