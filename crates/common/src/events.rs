//! Asynchronous event channel between driver threads and the device layer
//!
//! Driver roles never return errors to a caller; they report an
//! `(EventKind, Severity)` pair through an [`EventSink`]. The device layer
//! consumes them from the matching [`EventStream`], either from async code or
//! from a plain thread.

use async_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Default number of undelivered events kept before new ones are dropped
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Device handle does not name a known interface
    InvalidHandle,
    /// The link session could not be established, or the driver
    /// configuration is unusable
    DriverFailedToOpen,
    /// Open requested on an open driver
    AlreadyOpen,
    /// Close requested on a closed driver
    AlreadyClosed,
    /// Polling the link failed; the read role has stopped
    FailedToRead,
    /// A write could not be queued or transmitted
    FailedToWrite,
    /// Inbound bytes were dropped because the receive queue was full
    ReceiveQueueOverflow,
    /// A write was rejected because the write queue was full
    WriteQueueFull,
    /// The capture layer is not available on this host
    LinkUnavailable,
    /// Interface enumeration failed
    NoInterfacesFound,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EventKind::InvalidHandle => "invalid device handle",
            EventKind::DriverFailedToOpen => "driver failed to open",
            EventKind::AlreadyOpen => "device already open",
            EventKind::AlreadyClosed => "device already closed",
            EventKind::FailedToRead => "failed to read from link",
            EventKind::FailedToWrite => "failed to write to link",
            EventKind::ReceiveQueueOverflow => "receive queue overflow",
            EventKind::WriteQueueFull => "write queue full",
            EventKind::LinkUnavailable => "capture layer unavailable",
            EventKind::NoInterfacesFound => "could not enumerate interfaces",
        };
        f.write_str(text)
    }
}

/// How bad it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One reported event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverEvent {
    pub kind: EventKind,
    pub severity: Severity,
}

/// Reporting end, cloned into every driver role
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<DriverEvent>,
}

impl EventSink {
    /// Report an event without blocking
    ///
    /// The event is always logged. If the stream is full or has been dropped
    /// it is not delivered.
    pub fn report(&self, kind: EventKind, severity: Severity) {
        match severity {
            Severity::Info => info!("{}", kind),
            Severity::Warning => warn!("{}", kind),
            Severity::Error => error!("{}", kind),
        }

        match self.tx.try_send(DriverEvent { kind, severity }) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!("Event stream full, dropping {:?}", event);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// A sink whose events are only logged
    pub fn detached() -> Self {
        let (sink, _stream) = create_event_channel(1);
        sink
    }
}

/// Consuming end held by the device layer
#[derive(Debug, Clone)]
pub struct EventStream {
    rx: Receiver<DriverEvent>,
}

impl EventStream {
    /// Wait for the next event
    pub async fn recv(&self) -> crate::Result<DriverEvent> {
        self.rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Wait for the next event from a non-async thread
    pub fn recv_blocking(&self) -> crate::Result<DriverEvent> {
        self.rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Next event if one is waiting
    pub fn try_recv(&self) -> Option<DriverEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Every event currently waiting
    pub fn drain(&self) -> Vec<DriverEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create a bounded event channel
pub fn create_event_channel(capacity: usize) -> (EventSink, EventStream) {
    let (tx, rx) = bounded(capacity.max(1));
    (EventSink { tx }, EventStream { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_and_drain() {
        let (sink, stream) = create_event_channel(8);
        sink.report(EventKind::FailedToWrite, Severity::Warning);
        sink.report(EventKind::FailedToRead, Severity::Error);

        let events = stream.drain();
        assert_eq!(
            events,
            vec![
                DriverEvent {
                    kind: EventKind::FailedToWrite,
                    severity: Severity::Warning
                },
                DriverEvent {
                    kind: EventKind::FailedToRead,
                    severity: Severity::Error
                },
            ]
        );
        assert!(stream.is_empty());
    }

    #[test]
    fn test_full_stream_drops_without_blocking() {
        let (sink, stream) = create_event_channel(1);
        sink.report(EventKind::AlreadyOpen, Severity::Error);
        sink.report(EventKind::AlreadyClosed, Severity::Error);

        assert_eq!(stream.len(), 1);
        assert_eq!(stream.try_recv().unwrap().kind, EventKind::AlreadyOpen);
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn test_detached_sink_does_not_panic() {
        let sink = EventSink::detached();
        sink.report(EventKind::InvalidHandle, Severity::Error);
        sink.report(EventKind::InvalidHandle, Severity::Error);
    }

    #[tokio::test]
    async fn test_recv_from_thread() {
        let (sink, stream) = create_event_channel(8);

        let handle = std::thread::spawn(move || {
            sink.report(EventKind::ReceiveQueueOverflow, Severity::Warning);
        });

        let event = stream.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::ReceiveQueueOverflow);
        handle.join().unwrap();
    }
}
