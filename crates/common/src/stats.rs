//! Driver statistics
//!
//! Lock-free counters shared by the read, write and transmit roles of an
//! open session. [`DriverStats::snapshot`] returns a consistent-enough copy
//! for display and for tests; individual counters are not synchronized with
//! each other.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one driver
#[derive(Debug, Default)]
pub struct DriverStats {
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    receive_overflows: AtomicU64,
    writes_enqueued: AtomicU64,
    writes_dropped: AtomicU64,
    frames_queued: AtomicU64,
    handoffs: AtomicU64,
    bytes_transmitted: AtomicU64,
    transmit_failures: AtomicU64,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
}

impl DriverStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A link frame from our device was accepted by the read role
    pub fn frame_received(&self, bytes: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn receive_overflow(&self) {
        self.receive_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_enqueued(&self) {
        self.writes_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// A write or a link frame was discarded before reaching the wire
    pub fn write_dropped(&self) {
        self.writes_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A link frame was appended to the active transmit buffer
    pub fn frame_queued(&self) {
        self.frames_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// A buffer left the write role
    pub fn handoff_started(&self) {
        self.handoffs.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::AcqRel);
    }

    /// The transmit role returned a buffer
    pub fn handoff_finished(&self, bytes: usize, success: bool) {
        if success {
            self.bytes_transmitted
                .fetch_add(bytes as u64, Ordering::Relaxed);
        } else {
            self.transmit_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            receive_overflows: self.receive_overflows.load(Ordering::Relaxed),
            writes_enqueued: self.writes_enqueued.load(Ordering::Relaxed),
            writes_dropped: self.writes_dropped.load(Ordering::Relaxed),
            frames_queued: self.frames_queued.load(Ordering::Relaxed),
            handoffs: self.handoffs.load(Ordering::Relaxed),
            bytes_transmitted: self.bytes_transmitted.load(Ordering::Relaxed),
            transmit_failures: self.transmit_failures.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Acquire),
            peak_in_flight: self.peak_in_flight.load(Ordering::Acquire),
        }
    }
}

/// Point-in-time copy of [`DriverStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub bytes_received: u64,
    pub receive_overflows: u64,
    pub writes_enqueued: u64,
    pub writes_dropped: u64,
    pub frames_queued: u64,
    pub handoffs: u64,
    pub bytes_transmitted: u64,
    pub transmit_failures: u64,
    /// Buffers currently owned by the transmit role
    pub in_flight: u64,
    /// Highest value `in_flight` ever reached
    pub peak_in_flight: u64,
}
