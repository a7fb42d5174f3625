// ── sitepush-scp / scp module ─────────────────────────────────────────────────
//
// Client side of the legacy SCP "sink" protocol:
//   • ack      – acknowledgment and decimal readers, command/ack stream
//   • cursor   – remote directory cursor
//   • transfer – file header, content and terminator for one item
//   • channel  – exec channel lifecycle and bounded teardown
//   • session  – libssh2 connection, host key check and authentication
//   • uploader – batch orchestration and lock publishing

pub mod types;
pub mod ack;
pub mod cursor;
pub mod transfer;
pub mod channel;
pub mod session;
pub mod uploader;

#[cfg(test)]
pub(crate) mod testing;

pub use types::*;
pub use ack::{read_ack, read_decimal, Ack, ScpStream};
pub use channel::{ChannelManager, ExecChannel, ExecSession, TeardownTimings};
pub use cursor::RemoteCursor;
pub use session::{Connect, HostKeyCheck, Ssh2Channel, Ssh2Connector, Ssh2Session};
pub use transfer::{send_batch, send_file, BatchCounters, CHUNK_SIZE};
pub use uploader::ScpUploader;
