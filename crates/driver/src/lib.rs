//! Link driver for vehicle-network adapters attached over raw Ethernet
//!
//! - [`discovery`] finds adapters by broadcasting a serial-number request on
//!   every host interface
//! - [`transport::LinkDriver`] runs an open session with separate read,
//!   write and transmit threads
//! - [`link`] is the capture capability both depend on, with an in-memory
//!   [`link::mock`] implementation for tests
//!
//! # Example
//!
//! ```
//! use driver::link::mock::MockLinkProvider;
//! use driver::{Config, SessionManager};
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! config.install_logging().expect("first subscriber in this process");
//!
//! let provider = Arc::new(MockLinkProvider::new());
//! let manager = SessionManager::new(provider, config, common::EventSink::detached());
//! assert!(manager.find_all().is_empty());
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod handoff;
pub mod link;
pub mod manager;
pub mod registry;
pub mod transport;

pub use config::{Config, DiscoveryConfig, DriverConfig};
pub use discovery::{FoundDevice, discovery_request, find_all};
pub use error::{DriverError, LinkError, Result};
pub use handoff::{DEFAULT_BUFFER_CAPACITY, TransmitBuffer};
pub use link::{LinkProvider, LinkSession, OpenOptions};
pub use manager::SessionManager;
pub use registry::{DeviceHandle, InterfaceRegistry, NetworkInterface};
pub use transport::{DriverState, LinkDriver};
