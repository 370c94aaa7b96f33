//! Common utilities for vnet-link
//!
//! Shared by the protocol consumers and the link driver: the cross-crate
//! error type, logging setup, the asynchronous event channel that driver
//! threads report through, and lock-free driver statistics.

pub mod error;
pub mod events;
pub mod logging;
pub mod stats;
pub mod test_utils;

pub use error::{Error, Result};
pub use events::{
    DEFAULT_EVENT_CAPACITY, DriverEvent, EventKind, EventSink, EventStream, Severity,
    create_event_channel,
};
pub use logging::setup_logging;
pub use stats::{DriverStats, StatsSnapshot};
