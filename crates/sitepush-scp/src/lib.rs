//! # sitepush – SCP transport
//!
//! Uploads a batch of files to one remote directory tree with a single
//! `scp -t` sink process, then publishes the batch by renaming lock files:
//!   • Server timestamp handshake (`date -u`)
//!   • Directory-cursor framing (`D`/`E` records) with minimal moves
//!   • Chunked file streaming with per-chunk progress
//!   • Lock rename on success, lock removal on cancellation
//!   • Bounded channel teardown with exit-status reporting

pub mod scp;
