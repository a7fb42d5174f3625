// ── Exec channel lifecycle ────────────────────────────────────────────────────
//
// Exactly one remote command runs at a time. Opening the next command
// releases the previous channel; the final teardown drains whatever the
// remote side still has to say, closes everything with bounded waits and
// turns a non-zero exit status into an error.

use log::{debug, warn};
use sitepush_core::{UploadError, UploadObserver, UploadResult};
use std::io::{self, Read, Write};
use std::time::Duration;

/// One remote command with its stdin (write side) and stdout (read side).
pub trait ExecChannel: Read + Write {
    /// Signal end of input to the remote command.
    fn close_output(&mut self) -> io::Result<()>;

    /// Copy remote output into `sink` until end of stream or until `within`
    /// has elapsed. Returns the number of bytes copied.
    fn drain(&mut self, sink: &mut dyn Write, within: Duration) -> io::Result<u64>;

    /// Close the channel, waiting at most `within` for the remote side.
    /// Returns the exit status if it became known in time.
    fn disconnect(&mut self, within: Duration) -> io::Result<Option<i32>>;

    /// Remote stderr, read for at most `within`.
    fn take_stderr(&mut self, within: Duration) -> io::Result<Vec<u8>>;
}

/// An authenticated session that can run remote commands.
pub trait ExecSession {
    type Channel: ExecChannel;

    fn open_exec(&mut self, command: &str) -> UploadResult<Self::Channel>;

    fn disconnect(&mut self) -> UploadResult<()>;
}

/// Grace periods of the final teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownTimings {
    /// Drain before closing our output.
    pub drain_grace: Duration,
    /// Drain after closing our output, and wait for the channel to close.
    pub close_grace: Duration,
}

impl Default for TeardownTimings {
    fn default() -> Self {
        Self {
            drain_grace: Duration::from_millis(100),
            close_grace: Duration::from_millis(1000),
        }
    }
}

/// Owns the session and at most one live command channel.
pub struct ChannelManager<S: ExecSession> {
    session: S,
    live: Option<S::Channel>,
    timings: TeardownTimings,
}

impl<S: ExecSession> ChannelManager<S> {
    pub fn new(session: S, timings: TeardownTimings) -> Self {
        Self {
            session,
            live: None,
            timings,
        }
    }

    pub fn has_live_channel(&self) -> bool {
        self.live.is_some()
    }

    /// Release the live channel, if any, and run `command` on a fresh one.
    pub fn issue_command(
        &mut self,
        command: &str,
        observer: &dyn UploadObserver,
    ) -> UploadResult<&mut S::Channel> {
        self.release()?;
        observer.debug(&format!("launching command {}", command));
        let channel = self.session.open_exec(command)?;
        Ok(self.live.insert(channel))
    }

    pub fn live(&mut self) -> UploadResult<&mut S::Channel> {
        self.live.as_mut().ok_or(UploadError::NotConnected)
    }

    /// Close the output of the live channel and disconnect it. The exit
    /// status, if it arrives within the close grace, is only logged.
    pub fn release(&mut self) -> UploadResult<()> {
        let Some(mut channel) = self.live.take() else {
            return Ok(());
        };
        channel.close_output()?;
        match channel.disconnect(self.timings.close_grace)? {
            Some(0) | None => {}
            Some(status) => warn!("released command exited with status {}", status),
        }
        Ok(())
    }

    /// Drain, close and disconnect everything.
    ///
    /// Every step runs even if an earlier one failed; the first failure is
    /// returned. Otherwise a non-zero exit status of the last command
    /// becomes [`UploadError::ExitStatus`].
    pub fn teardown(mut self, observer: &dyn UploadObserver) -> UploadResult<()> {
        let mut first_error: Option<UploadError> = None;
        let mut keep = |err: UploadError| {
            debug!("teardown step failed: {}", err);
            first_error.get_or_insert(err);
        };
        let mut exit_status = None;

        if let Some(mut channel) = self.live.take() {
            let mut output = Vec::new();
            if let Err(e) = channel.drain(&mut output, self.timings.drain_grace) {
                keep(e.into());
            }
            if let Err(e) = channel.close_output() {
                keep(e.into());
            }
            if let Err(e) = channel.drain(&mut output, self.timings.close_grace) {
                keep(e.into());
            }
            forward_lines(&output, |line| observer.log(line));

            match channel.disconnect(self.timings.close_grace) {
                Ok(status) => exit_status = status,
                Err(e) => keep(e.into()),
            }
            match channel.take_stderr(self.timings.close_grace) {
                Ok(stderr) => forward_lines(&stderr, |line| observer.log(line)),
                Err(e) => debug!("could not read remote stderr: {}", e),
            }
        }

        observer.debug(&format!(
            "disconnect session; exit status is {}",
            exit_status.map_or_else(|| "unknown".to_string(), |s| s.to_string())
        ));
        if let Err(e) = self.session.disconnect() {
            keep(e);
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        match exit_status {
            Some(0) | None => Ok(()),
            Some(status) => Err(UploadError::ExitStatus(status)),
        }
    }
}

fn forward_lines(bytes: &[u8], mut emit: impl FnMut(&str)) {
    if bytes.is_empty() {
        return;
    }
    let text = String::from_utf8_lossy(bytes);
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        emit(line);
    }
}
