// ── SCP uploader ──────────────────────────────────────────────────────────────
//
// One batch runs through these commands on a single session:
//
//   date -u +%Y%m%d%H%M%S      → server timestamp
//   scp -p -t -r <root>        → sink for every item
//   mv -f <root><lock>.lock <root><lock>   per lock, on success
//   rm <root><lock>.lock                   per lock, on cancellation

use crate::scp::ack::{read_ack, read_decimal, ScpStream};
use crate::scp::channel::{ChannelManager, ExecSession};
use crate::scp::session::{Connect, Ssh2Connector};
use crate::scp::transfer::send_batch;
use crate::scp::types::{ScpSiteConfig, UploadPhase};
use log::{debug, error, info, warn};
use sitepush_core::{
    LogObserver, UploadContext, UploadError, UploadItem, UploadObserver, UploadResult,
    UploadTimestamp, Uploader,
};
use std::borrow::Cow;

pub const TIMESTAMP_COMMAND: &str = "date -u +%Y%m%d%H%M%S";

fn quote(path: &str) -> String {
    shell_escape::unix::escape(Cow::from(path)).into_owned()
}

/// `scp` in sink mode, preserving times, recursive, rooted at `root`.
pub fn sink_command(root: &str) -> String {
    format!("scp -p -t -r {}", quote(root))
}

pub fn publish_lock_command(root: &str, lock: &str) -> String {
    let target = format!("{}{}", root, lock);
    format!("mv -f {} {}", quote(&format!("{}.lock", target)), quote(&target))
}

pub fn remove_lock_command(root: &str, lock: &str) -> String {
    format!("rm {}", quote(&format!("{}{}.lock", root, lock)))
}

/// [`Uploader`] for the `ssh` protocol.
pub struct ScpUploader<C: Connect = Ssh2Connector> {
    config: ScpSiteConfig,
    connector: C,
    channels: Option<ChannelManager<C::Session>>,
    phase: UploadPhase,
    timestamp: Option<UploadTimestamp>,
}

impl ScpUploader<Ssh2Connector> {
    pub fn new(config: ScpSiteConfig) -> Self {
        Self::with_connector(config, Ssh2Connector)
    }
}

impl<C: Connect> ScpUploader<C> {
    pub fn with_connector(config: ScpSiteConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            channels: None,
            phase: UploadPhase::Idle,
            timestamp: None,
        }
    }

    pub fn config(&self) -> &ScpSiteConfig {
        &self.config
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    pub fn is_logged_in(&self) -> bool {
        self.channels.is_some()
    }

    fn enter(&mut self, next: UploadPhase) -> UploadResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(UploadError::protocol(format!(
                "invalid upload phase change from {} to {}",
                self.phase, next
            )));
        }
        debug!("upload phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    fn run_batch(
        &mut self,
        channels: &mut ChannelManager<C::Session>,
        items: &[UploadItem],
        locks: &[String],
        context: &UploadContext,
    ) -> UploadResult<()> {
        let observer = context.observer.as_ref();
        let root = self.config.upload_root();

        self.enter(UploadPhase::TimestampHandshake)?;
        let channel = channels.issue_command(TIMESTAMP_COMMAND, observer)?;
        let timestamp = UploadTimestamp(read_decimal(channel)?);
        observer.debug(&format!("server timestamp is {}", timestamp));
        self.timestamp = Some(timestamp);
        observer.set_title("Uploading");

        self.enter(UploadPhase::AwaitingBatchChannel)?;
        let command = sink_command(&root);
        let channel = channels.issue_command(&command, observer)?;
        read_ack(channel, observer)?.into_result(|| format!("`{}` did not start", command))?;

        self.enter(UploadPhase::Transferring)?;
        let outcome = {
            let mut stream = ScpStream::new(channels.live()?, observer);
            send_batch(&mut stream, items, &context.cancel)
        };
        match outcome {
            Ok(counters) => {
                info!(
                    "transferred {} file(s), {} bytes to {}",
                    items.len(),
                    counters.sent,
                    self.config.address()
                );
            }
            Err(UploadError::Cancelled) => {
                self.enter(UploadPhase::Aborting)?;
                if let Err(e) = channels.release() {
                    warn!("closing the sink after cancel failed: {}", e);
                    observer.error(&format!("could not close the scp sink: {}", e));
                }
                self.remove_locks(channels, &root, locks, observer);
                if let Err(e) = channels.release() {
                    debug!("releasing channel after cancel failed: {}", e);
                }
                return Err(UploadError::Cancelled);
            }
            Err(e) => {
                if let Err(release) = channels.release() {
                    debug!("releasing channel after failure failed: {}", release);
                }
                return Err(e);
            }
        }

        self.enter(UploadPhase::Unlocking)?;
        for lock in locks {
            channels.issue_command(&publish_lock_command(&root, lock), observer)?;
        }
        Ok(())
    }

    fn remove_locks(
        &self,
        channels: &mut ChannelManager<C::Session>,
        root: &str,
        locks: &[String],
        observer: &dyn UploadObserver,
    ) {
        for lock in locks {
            let command = remove_lock_command(root, lock);
            if let Err(e) = channels.issue_command(&command, observer) {
                observer.error(&format!("could not remove lock `{}`: {}", lock, e));
            }
        }
    }
}

impl<C> Uploader for ScpUploader<C>
where
    C: Connect,
    C::Session: Send,
    <C::Session as ExecSession>::Channel: Send,
{
    fn login(&mut self, context: &UploadContext) -> bool {
        if self.channels.is_some() {
            return true;
        }
        let observer = context.observer.as_ref();
        let result = self
            .config
            .validate()
            .and_then(|()| self.connector.connect(&self.config, observer));
        match result {
            Ok(session) => {
                self.channels = Some(ChannelManager::new(session, self.config.teardown_timings()));
                self.phase = UploadPhase::Idle;
                true
            }
            Err(e) => {
                error!("login to {} failed: {}", self.config.address(), e);
                observer.error(&e.to_string());
                false
            }
        }
    }

    fn upload(
        &mut self,
        items: &[UploadItem],
        locks: &[String],
        context: &UploadContext,
    ) -> UploadResult<()> {
        let mut channels = self.channels.take().ok_or(UploadError::NotConnected)?;
        self.phase = UploadPhase::Idle;

        match self.run_batch(&mut channels, items, locks, context) {
            Ok(()) => {
                self.enter(UploadPhase::Closed)?;
                channels.teardown(context.observer.as_ref())
            }
            Err(e) => {
                // keep the session so that logout can close it
                self.channels = Some(channels);
                Err(e)
            }
        }
    }

    fn logout(&mut self) {
        if let Some(channels) = self.channels.take() {
            if let Err(e) = channels.teardown(&LogObserver) {
                error!("logout from {} failed: {}", self.config.address(), e);
            }
        }
        self.phase = UploadPhase::Idle;
    }

    fn protocol(&self) -> &'static str {
        "ssh"
    }

    fn timestamp(&self) -> Option<UploadTimestamp> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_command() {
        assert_eq!(sink_command("/srv/update/"), "scp -p -t -r /srv/update/");
        assert_eq!(
            sink_command("/srv/my site/"),
            "scp -p -t -r '/srv/my site/'"
        );
    }

    #[test]
    fn test_lock_commands() {
        assert_eq!(
            publish_lock_command("/srv/update/", "db.xml.gz"),
            "mv -f /srv/update/db.xml.gz.lock /srv/update/db.xml.gz"
        );
        assert_eq!(
            remove_lock_command("/srv/update/", "db.xml.gz"),
            "rm /srv/update/db.xml.gz.lock"
        );
    }

    #[test]
    fn test_lock_names_are_quoted() {
        assert_eq!(
            remove_lock_command("/srv/update/", "a b"),
            "rm '/srv/update/a b.lock'"
        );
    }

    #[test]
    fn test_new_uploader_is_idle_and_logged_out() {
        let uploader = ScpUploader::new(ScpSiteConfig::new("h", "u", "/srv/update"));
        assert_eq!(uploader.phase(), UploadPhase::Idle);
        assert!(!uploader.is_logged_in());
        assert_eq!(uploader.protocol(), "ssh");
        assert!(uploader.timestamp().is_none());
    }

    #[test]
    fn test_upload_without_login_fails() {
        let mut uploader = ScpUploader::new(ScpSiteConfig::new("h", "u", "/srv/update"));
        let err = uploader
            .upload(&[], &[], &UploadContext::default())
            .unwrap_err();
        assert!(matches!(err, UploadError::NotConnected));
    }

    #[test]
    fn test_login_rejects_invalid_config() {
        let mut uploader = ScpUploader::new(ScpSiteConfig::new("", "u", "/srv/update"));
        assert!(!uploader.login(&UploadContext::default()));
        assert!(!uploader.is_logged_in());
    }
}
