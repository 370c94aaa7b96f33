//! Driver error types

use crate::registry::DeviceHandle;
use common::EventKind;
use thiserror::Error;

/// Failures reported by a link provider or session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The capture layer is not installed or could not start
    #[error("Capture layer unavailable: {0}")]
    Unavailable(String),

    /// Listing interfaces failed
    #[error("Interface enumeration failed: {0}")]
    Enumeration(String),

    /// An interface could not be opened
    #[error("Failed to open {name}: {reason}")]
    Open { name: String, reason: String },

    /// Sending, polling or transmitting failed
    #[error("Link I/O error: {0}")]
    Io(String),

    /// The session has been closed
    #[error("Link session closed")]
    Closed,
}

/// Errors returned to the device layer
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Invalid device handle: {0}")]
    InvalidHandle(DeviceHandle),

    #[error("Driver failed to open: {0}")]
    DriverFailedToOpen(#[source] LinkError),

    #[error("Invalid driver configuration: {0}")]
    InvalidConfig(String),

    #[error("Device already open")]
    AlreadyOpen,

    #[error("Device already closed")]
    AlreadyClosed,

    #[error("Device not open")]
    NotOpen,

    #[error("Write queue full")]
    WriteQueueFull,

    #[error(transparent)]
    Link(#[from] LinkError),
}

impl DriverError {
    /// Event reported alongside this error, if any
    pub fn event_kind(&self) -> Option<EventKind> {
        match self {
            DriverError::InvalidHandle(_) => Some(EventKind::InvalidHandle),
            DriverError::DriverFailedToOpen(_) | DriverError::InvalidConfig(_) => {
                Some(EventKind::DriverFailedToOpen)
            }
            DriverError::AlreadyOpen => Some(EventKind::AlreadyOpen),
            DriverError::AlreadyClosed => Some(EventKind::AlreadyClosed),
            DriverError::WriteQueueFull => Some(EventKind::WriteQueueFull),
            DriverError::NotOpen | DriverError::Link(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(
            DriverError::InvalidHandle(DeviceHandle(0x0501_0203)).event_kind(),
            Some(EventKind::InvalidHandle)
        );
        assert_eq!(
            DriverError::AlreadyOpen.event_kind(),
            Some(EventKind::AlreadyOpen)
        );
        assert_eq!(
            DriverError::InvalidConfig("batch_divisor must be non-zero".into()).event_kind(),
            Some(EventKind::DriverFailedToOpen)
        );
        assert_eq!(DriverError::NotOpen.event_kind(), None);
    }

    #[test]
    fn test_display() {
        let err = DriverError::InvalidHandle(DeviceHandle(0x0501_0203));
        assert_eq!(err.to_string(), "Invalid device handle: 0x05010203");

        let err = DriverError::DriverFailedToOpen(LinkError::Open {
            name: "eth0".into(),
            reason: "permission denied".into(),
        });
        assert_eq!(
            err.to_string(),
            "Driver failed to open: Failed to open eth0: permission denied"
        );
    }
}
