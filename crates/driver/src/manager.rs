//! Entry point tying provider, registry and configuration together

use crate::config::Config;
use crate::discovery::{self, FoundDevice};
use crate::link::LinkProvider;
use crate::registry::{DeviceHandle, InterfaceRegistry, NetworkInterface};
use crate::transport::LinkDriver;
use common::EventSink;
use std::sync::Arc;

/// Owns the interface registry for one capture provider
///
/// Drivers created here share the manager's registry, so handles returned by
/// [`find_all`](Self::find_all) stay valid for them.
pub struct SessionManager {
    provider: Arc<dyn LinkProvider>,
    registry: Arc<InterfaceRegistry>,
    config: Config,
    events: EventSink,
}

impl SessionManager {
    /// `events` receives discovery failures
    pub fn new(provider: Arc<dyn LinkProvider>, config: Config, events: EventSink) -> Self {
        Self {
            provider,
            registry: Arc::new(InterfaceRegistry::new()),
            config,
            events,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> Arc<InterfaceRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn find_all(&self) -> Vec<FoundDevice> {
        discovery::find_all(
            self.provider.as_ref(),
            &self.registry,
            &self.config.discovery,
            &self.events,
        )
    }

    pub fn is_handle_valid(&self, handle: DeviceHandle) -> bool {
        self.registry.is_valid(handle)
    }

    pub fn interfaces(&self) -> Vec<NetworkInterface> {
        self.registry.snapshot()
    }

    /// A closed driver for `handle` reporting to `events`
    pub fn driver(&self, handle: DeviceHandle, events: EventSink) -> LinkDriver {
        LinkDriver::new(
            handle,
            Arc::clone(&self.provider),
            Arc::clone(&self.registry),
            self.config.driver,
            events,
        )
    }

    /// Forget every known interface
    ///
    /// Handles issued before the call become invalid.
    pub fn clear_registry(&self) {
        self.registry.clear();
    }
}
