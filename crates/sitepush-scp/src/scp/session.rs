// ── libssh2 session ───────────────────────────────────────────────────────────

use crate::scp::channel::{ExecChannel, ExecSession};
use crate::scp::types::{KnownHostsPolicy, ScpSiteConfig};
use log::{info, warn};
use secrecy::ExposeSecret;
use sitepush_core::{UploadError, UploadObserver, UploadResult};
use ssh2::{CheckResult, KnownHostFileKind, Session};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Opens an authenticated session for a site.
pub trait Connect: Send {
    type Session: ExecSession;

    fn connect(
        &self,
        config: &ScpSiteConfig,
        observer: &dyn UploadObserver,
    ) -> UploadResult<Self::Session>;
}

/// Connector backed by libssh2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ssh2Connector;

impl Connect for Ssh2Connector {
    type Session = Ssh2Session;

    fn connect(
        &self,
        config: &ScpSiteConfig,
        observer: &dyn UploadObserver,
    ) -> UploadResult<Ssh2Session> {
        Ssh2Session::connect(config, observer)
    }
}

fn transport(context: &str, err: impl std::fmt::Display) -> UploadError {
    UploadError::Transport(format!("{}: {}", context, err))
}

// ── Session ──────────────────────────────────────────────────────────────────

pub struct Ssh2Session {
    session: Session,
    #[allow(dead_code)]
    tcp: TcpStream,
    /// Read timeout restored after every bounded wait; 0 blocks.
    ack_timeout_ms: u32,
}

impl Ssh2Session {
    /// Connect, verify the host key and authenticate.
    pub fn connect(config: &ScpSiteConfig, observer: &dyn UploadObserver) -> UploadResult<Self> {
        let addr = config.address();
        info!("SCP connecting to {}", addr);
        observer.debug(&format!("connecting to {}", addr));

        let tcp = open_tcp(config)?;
        tcp.set_nonblocking(false)
            .map_err(|e| transport("failed to set blocking mode", e))?;

        let mut session = Session::new().map_err(|e| transport("failed to create SSH session", e))?;
        if config.compress {
            session.set_compress(true);
        }
        session.set_tcp_stream(tcp.try_clone()?);
        session
            .handshake()
            .map_err(|e| transport("SSH handshake failed", e))?;

        let fingerprint = fingerprint(&session);
        observer.debug(&format!("server fingerprint is {}", fingerprint));
        verify_host_key(&session, config, &fingerprint)?;

        let method = authenticate(&session, config)?;
        if !session.authenticated() {
            return Err(UploadError::Login(
                "not authenticated after auth attempt".into(),
            ));
        }
        info!("SCP authenticated to {} via {}", addr, method);

        let keepalive_interval = config.keepalive_interval_secs;
        session.set_keepalive(keepalive_interval > 0, keepalive_interval as u32);

        let ack_timeout_ms = config.ack_timeout_ms();
        session.set_timeout(ack_timeout_ms);

        Ok(Self {
            session,
            tcp,
            ack_timeout_ms,
        })
    }
}

impl ExecSession for Ssh2Session {
    type Channel = Ssh2Channel;

    fn open_exec(&mut self, command: &str) -> UploadResult<Ssh2Channel> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| transport("failed to open channel", e))?;
        channel
            .exec(command)
            .map_err(|e| transport(&format!("failed to run `{}`", command), e))?;
        Ok(Ssh2Channel {
            channel,
            session: self.session.clone(),
            ack_timeout_ms: self.ack_timeout_ms,
        })
    }

    fn disconnect(&mut self) -> UploadResult<()> {
        self.session
            .disconnect(None, "upload finished", None)
            .map_err(|e| transport("failed to disconnect", e))
    }
}

fn open_tcp(config: &ScpSiteConfig) -> UploadResult<TcpStream> {
    let addr = config.address();
    let timeout = Duration::from_secs(config.timeout_secs);
    let candidates = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| transport(&format!("cannot resolve '{}'", config.host), e))?;

    let mut last_error = None;
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(tcp) => return Ok(tcp),
            Err(e) => last_error = Some(e),
        }
    }
    Err(match last_error {
        Some(e) => transport(&format!("TCP connection to {} failed", addr), e),
        None => UploadError::Transport(format!("'{}' resolved to no address", config.host)),
    })
}

fn fingerprint(session: &Session) -> String {
    match session.host_key_hash(ssh2::HashType::Sha256) {
        Some(bytes) => {
            let encoded =
                base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes);
            format!("SHA256:{}", encoded)
        }
        None => "unknown".to_string(),
    }
}

// ── Host key ─────────────────────────────────────────────────────────────────

/// Outcome of looking the server key up in known_hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyCheck {
    Verified,
    Unknown,
    Changed,
}

impl HostKeyCheck {
    /// Whether the connection may proceed, and whether the key should be
    /// remembered.
    pub fn apply(&self, policy: KnownHostsPolicy, host: &str, fingerprint: &str) -> UploadResult<bool> {
        match (self, policy) {
            (_, KnownHostsPolicy::Ignore) => Ok(false),
            (HostKeyCheck::Verified, _) => Ok(false),
            (HostKeyCheck::Changed, _) => Err(UploadError::HostKey(format!(
                "host key for {} has changed (now {}); refusing to connect",
                host, fingerprint
            ))),
            (HostKeyCheck::Unknown, KnownHostsPolicy::AcceptNew) => Ok(true),
            (HostKeyCheck::Unknown, KnownHostsPolicy::Strict) => Err(UploadError::HostKey(format!(
                "{} ({}) is not a known host",
                host, fingerprint
            ))),
        }
    }
}

/// known_hosts entry name: bare host on port 22, `[host]:port` otherwise.
pub fn known_hosts_name(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{}]:{}", host, port)
    }
}

fn verify_host_key(session: &Session, config: &ScpSiteConfig, fingerprint: &str) -> UploadResult<()> {
    let name = known_hosts_name(&config.host, config.port);
    if config.known_hosts_policy == KnownHostsPolicy::Ignore {
        warn!("host key of {} not verified ({})", name, fingerprint);
        return Ok(());
    }

    let (key, key_type) = session
        .host_key()
        .ok_or_else(|| UploadError::HostKey("server sent no host key".into()))?;
    let path = config
        .known_hosts_file()
        .ok_or_else(|| UploadError::HostKey("no known_hosts file location".into()))?;

    let mut known = session
        .known_hosts()
        .map_err(|e| transport("failed to initialise known hosts", e))?;
    if path.exists() {
        known
            .read_file(&path, KnownHostFileKind::OpenSSH)
            .map_err(|e| UploadError::HostKey(format!("cannot read {}: {}", path.display(), e)))?;
    }

    let check = match known.check_port(&config.host, config.port, key) {
        CheckResult::Match => HostKeyCheck::Verified,
        CheckResult::NotFound => HostKeyCheck::Unknown,
        CheckResult::Mismatch => HostKeyCheck::Changed,
        CheckResult::Failure => {
            return Err(UploadError::HostKey(format!(
                "could not check host key of {}",
                name
            )))
        }
    };

    if check.apply(config.known_hosts_policy, &name, fingerprint)? {
        known
            .add(&name, key, "added by sitepush", key_type.into())
            .map_err(|e| UploadError::HostKey(format!("cannot remember {}: {}", name, e)))?;
        remember(&mut known, &path)?;
        info!("added {} ({}) to {}", name, fingerprint, path.display());
    }
    Ok(())
}

fn remember(known: &mut ssh2::KnownHosts, path: &Path) -> UploadResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    known
        .write_file(path, KnownHostFileKind::OpenSSH)
        .map_err(|e| UploadError::HostKey(format!("cannot write {}: {}", path.display(), e)))
}

// ── Authentication ───────────────────────────────────────────────────────────

/// Identity files default `ssh` would offer.
const DEFAULT_IDENTITIES: [&str; 3] = ["id_ed25519", "id_rsa", "id_ecdsa"];

/// Key files to offer in order, labelled for the log: the configured key
/// first, then whichever default identities exist under `home/.ssh`.
fn key_candidates(config: &ScpSiteConfig, home: Option<&Path>) -> Vec<(String, PathBuf)> {
    let mut keys = Vec::new();
    if let Some(ref key_path) = config.private_key_path {
        let path = PathBuf::from(key_path);
        if path.exists() {
            keys.push(("publickey-file".to_string(), path));
        } else {
            warn!("private key {} does not exist", key_path);
        }
    }
    if let Some(home) = home {
        let ssh_dir = home.join(".ssh");
        keys.extend(
            DEFAULT_IDENTITIES
                .iter()
                .map(|name| (format!("publickey-default({})", name), ssh_dir.join(name)))
                .filter(|(_, path)| path.exists()),
        );
    }
    keys
}

/// Agent, then key files, then password. Returns the method that worked.
fn authenticate(session: &Session, config: &ScpSiteConfig) -> UploadResult<String> {
    let user = config.username.as_str();

    if config.use_agent {
        if session.userauth_agent(user).is_ok() && session.authenticated() {
            return Ok("agent".into());
        }
        warn!("SCP agent auth failed for {}, trying other methods", user);
    }

    let passphrase = config
        .private_key_passphrase
        .as_ref()
        .map(|secret| secret.expose_secret().as_str());
    let home = dirs::home_dir();
    for (method, key) in key_candidates(config, home.as_deref()) {
        match session.userauth_pubkey_file(user, None, &key, passphrase) {
            Ok(()) if session.authenticated() => return Ok(method),
            Ok(()) => warn!("{} for {} did not authenticate", method, user),
            Err(e) => warn!("{} for {} rejected: {}", method, user, e),
        }
    }

    if let Some(ref password) = config.password {
        match session.userauth_password(user, password.expose_secret()) {
            Ok(()) if session.authenticated() => return Ok("password".into()),
            _ => warn!("SCP password auth failed for {}", user),
        }
    }

    Err(UploadError::Login(format!(
        "all authentication methods exhausted for user '{}'",
        user
    )))
}

// ── Channel ──────────────────────────────────────────────────────────────────

pub struct Ssh2Channel {
    channel: ssh2::Channel,
    session: Session,
    ack_timeout_ms: u32,
}

impl Ssh2Channel {
    /// Run `f` with the session read timeout set to `within`.
    fn bounded<T>(
        &mut self,
        within: Duration,
        f: impl FnOnce(&mut ssh2::Channel) -> io::Result<T>,
    ) -> io::Result<T> {
        let ms = within.as_millis().clamp(1, u128::from(u32::MAX)) as u32;
        self.session.set_timeout(ms);
        let result = f(&mut self.channel);
        self.session.set_timeout(self.ack_timeout_ms);
        result
    }
}

fn timed_out(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

impl Read for Ssh2Channel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.channel.read(buf)
    }
}

impl Write for Ssh2Channel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.channel.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.channel.flush()
    }
}

impl ExecChannel for Ssh2Channel {
    fn close_output(&mut self) -> io::Result<()> {
        self.channel.send_eof().map_err(io::Error::from)
    }

    fn drain(&mut self, sink: &mut dyn Write, within: Duration) -> io::Result<u64> {
        let deadline = Instant::now() + within;
        let mut buf = [0u8; 8192];
        let mut total = 0u64;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.channel.eof() {
                break;
            }
            let n = match self.bounded(remaining, |channel| channel.read(&mut buf)) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if timed_out(&e) => break,
                Err(e) => return Err(e),
            };
            sink.write_all(&buf[..n])?;
            total += n as u64;
        }
        Ok(total)
    }

    fn disconnect(&mut self, within: Duration) -> io::Result<Option<i32>> {
        let closed = self.bounded(within, |channel| {
            channel.close()?;
            channel.wait_close()?;
            Ok(())
        });
        match closed {
            Ok(()) => Ok(Some(self.channel.exit_status().map_err(io::Error::from)?)),
            Err(e) if timed_out(&e) => {
                warn!("channel did not close within {:?}", within);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn take_stderr(&mut self, within: Duration) -> io::Result<Vec<u8>> {
        let mut collected = Vec::new();
        let result = self.bounded(within, |channel| {
            channel.stderr().read_to_end(&mut collected)
        });
        match result {
            Ok(_) => Ok(collected),
            Err(e) if timed_out(&e) => Ok(collected),
            Err(e) => Err(e),
        }
    }
}
