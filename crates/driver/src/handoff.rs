//! Double-buffered hand-off between the write and transmit roles
//!
//! Exactly two [`TransmitBuffer`]s exist per session. The write role fills
//! one while the other is either the idle spare or being transmitted. Buffer
//! ownership moves through two capacity-1 channels:
//!
//! ```text
//!   write role --(full)--> transmit role
//!   write role <-(empty)-- transmit role
//! ```
//!
//! The write role may only hand a buffer off after taking the spare from the
//! empty channel, so at most one buffer is ever outside the write role.

use common::DriverStats;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::trace;

/// Default capacity of one hand-off buffer
pub const DEFAULT_BUFFER_CAPACITY: usize = 128_000;

/// Link frames queued for one bulk transmit
#[derive(Debug)]
pub struct TransmitBuffer {
    data: Vec<u8>,
    frame_ends: Vec<usize>,
    capacity: usize,
}

impl TransmitBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            frame_ends: Vec::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes queued
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frame_ends.len()
    }

    /// Append one link frame; returns false when it does not fit
    pub fn push_frame(&mut self, frame: &[u8]) -> bool {
        if frame.len() > self.remaining() {
            return false;
        }
        self.data.extend_from_slice(frame);
        self.frame_ends.push(self.data.len());
        true
    }

    /// Queued frames in order
    pub fn frames(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let starts = std::iter::once(0).chain(self.frame_ends.iter().copied());
        starts
            .zip(self.frame_ends.iter().copied())
            .map(|(start, end)| &self.data[start..end])
    }

    /// All queued bytes back to back
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.frame_ends.clear();
    }
}

/// Write-role end of the hand-off
#[derive(Debug)]
pub struct HandoffSender {
    full_tx: Sender<TransmitBuffer>,
    empty_rx: Receiver<TransmitBuffer>,
    stats: Arc<DriverStats>,
}

/// Transmit-role end of the hand-off
#[derive(Debug)]
pub struct HandoffReceiver {
    full_rx: Receiver<TransmitBuffer>,
    empty_tx: Sender<TransmitBuffer>,
}

/// Create the hand-off channels and both buffers
///
/// Returns the buffer the write role starts filling; the other one starts
/// as the spare in the empty slot. Hand-offs are counted in `stats`; the
/// transmit role records their completion.
pub fn handoff_channel(
    capacity: usize,
    stats: Arc<DriverStats>,
) -> (HandoffSender, HandoffReceiver, TransmitBuffer) {
    let (full_tx, full_rx) = channel::bounded(1);
    let (empty_tx, empty_rx) = channel::bounded(1);

    // Cannot fail: the channel was just created with room for one
    let _ = empty_tx.try_send(TransmitBuffer::new(capacity));

    (
        HandoffSender {
            full_tx,
            empty_rx,
            stats,
        },
        HandoffReceiver { full_rx, empty_tx },
        TransmitBuffer::new(capacity),
    )
}

impl HandoffSender {
    /// Hand `active` off if the transmit role is idle
    ///
    /// On success `active` is replaced by the empty spare.
    pub fn try_swap(&self, active: &mut TransmitBuffer) -> bool {
        match self.empty_rx.try_recv() {
            Ok(spare) => self.send(active, spare),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => false,
        }
    }

    /// Hand `active` off, waiting for the transmit role to release the spare
    ///
    /// Gives up when `cancel` is raised or the transmit role is gone.
    pub fn swap_blocking(
        &self,
        active: &mut TransmitBuffer,
        cancel: &AtomicBool,
        poll: Duration,
    ) -> bool {
        while !cancel.load(Ordering::Acquire) {
            match self.empty_rx.recv_timeout(poll) {
                Ok(spare) => return self.send(active, spare),
                Err(RecvTimeoutError::Timeout) => {
                    trace!("Waiting for transmit slot");
                }
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
        false
    }

    fn send(&self, active: &mut TransmitBuffer, spare: TransmitBuffer) -> bool {
        let full = std::mem::replace(active, spare);
        // Counted before the transmit role can see the buffer
        self.stats.handoff_started();
        // The full slot is always free while we hold the spare
        self.full_tx.try_send(full).is_ok()
    }
}

impl HandoffReceiver {
    /// Wait for a handed-off buffer
    pub fn recv_timeout(&self, timeout: Duration) -> Result<TransmitBuffer, RecvTimeoutError> {
        self.full_rx.recv_timeout(timeout)
    }

    /// Return a transmitted buffer as the new spare
    pub fn release(&self, mut buffer: TransmitBuffer) {
        buffer.clear();
        let _ = self.empty_tx.try_send(buffer);
    }
}
