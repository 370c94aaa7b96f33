//! Upstream capture capability
//!
//! The driver does not talk to a capture library directly. A
//! [`LinkProvider`] enumerates interfaces and opens [`LinkSession`]s on them;
//! a session sends single frames, polls for captured frames and transmits a
//! whole [`TransmitBuffer`] in one bulk call.
//!
//! A session is shared between the read role (which only polls) and the
//! transmit role (which only transmits), so implementations must be
//! `Send + Sync`.

pub mod mock;

use crate::error::LinkError;
use crate::handoff::TransmitBuffer;
use crate::registry::NetworkInterface;
use protocol::MAX_LINK_FRAME;
use std::sync::Arc;
use std::time::Duration;

/// Parameters for opening a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Largest number of bytes captured per frame
    pub snapshot_len: usize,
    /// Upper bound the capture layer may block inside one read
    pub read_timeout: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            snapshot_len: MAX_LINK_FRAME,
            read_timeout: Duration::from_millis(1),
        }
    }
}

/// Enumerates interfaces and opens sessions on them
pub trait LinkProvider: Send + Sync {
    /// Interfaces currently present on the host
    fn interfaces(&self) -> Result<Vec<NetworkInterface>, LinkError>;

    /// Open a session on the interface with capture name `name`
    fn open(&self, name: &str, options: &OpenOptions) -> Result<Arc<dyn LinkSession>, LinkError>;
}

/// One open capture session
pub trait LinkSession: Send + Sync {
    /// Send one frame immediately
    fn send(&self, frame: &[u8]) -> Result<(), LinkError>;

    /// Wait up to `timeout` for the next captured frame
    ///
    /// `Ok(None)` means nothing arrived in time. An error is fatal for the
    /// session.
    fn poll(&self, timeout: Duration) -> Result<Option<Vec<u8>>, LinkError>;

    /// Send every frame in `buffer` with one bulk call
    fn transmit(&self, buffer: &TransmitBuffer) -> Result<(), LinkError>;

    fn close(&self);
}
