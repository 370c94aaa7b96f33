//! Transport driver for adapters attached over raw Ethernet
//!
//! An open [`LinkDriver`] runs three threads against one link session:
//!
//! - **read** polls the link, keeps frames from our device and queues their
//!   payload for the device layer
//! - **write** drains the write queue, wraps writes into link frames and
//!   fills a [`TransmitBuffer`](crate::handoff::TransmitBuffer)
//! - **transmit** sends each handed-off buffer with one bulk call
//!
//! Closing raises a shared cancellation flag and joins all three, so a close
//! takes at most about one role timeout. Queued writes and unread inbound
//! data are discarded on close.

mod roles;

use crate::config::DriverConfig;
use crate::error::{DriverError, Result};
use crate::handoff::handoff_channel;
use crate::link::{LinkProvider, LinkSession};
use crate::registry::{DeviceHandle, InterfaceRegistry};
use common::{DriverStats, EventKind, EventSink, Severity, StatsSnapshot};
use crossbeam::channel::{self, TrySendError};
use parking_lot::Mutex;
use roles::RoleContext;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// Lifecycle of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Closed,
    Open,
    Closing,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverState::Closed => write!(f, "closed"),
            DriverState::Open => write!(f, "open"),
            DriverState::Closing => write!(f, "closing"),
        }
    }
}

/// Resources owned while open
struct Session {
    cancel: Arc<AtomicBool>,
    link: Arc<dyn LinkSession>,
    write_tx: channel::Sender<Vec<u8>>,
    receive_rx: async_channel::Receiver<Vec<u8>>,
    threads: Vec<JoinHandle<()>>,
}

struct Inner {
    state: DriverState,
    session: Option<Session>,
}

/// Driver for one device reachable through a host network interface
pub struct LinkDriver {
    handle: DeviceHandle,
    provider: Arc<dyn LinkProvider>,
    registry: Arc<InterfaceRegistry>,
    config: DriverConfig,
    events: EventSink,
    stats: Arc<DriverStats>,
    inner: Mutex<Inner>,
}

impl LinkDriver {
    pub fn new(
        handle: DeviceHandle,
        provider: Arc<dyn LinkProvider>,
        registry: Arc<InterfaceRegistry>,
        config: DriverConfig,
        events: EventSink,
    ) -> Self {
        Self {
            handle,
            provider,
            registry,
            config,
            events,
            stats: Arc::new(DriverStats::new()),
            inner: Mutex::new(Inner {
                state: DriverState::Closed,
                session: None,
            }),
        }
    }

    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    pub fn state(&self) -> DriverState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == DriverState::Open
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn fail(&self, err: DriverError) -> DriverError {
        if let Some(kind) = err.event_kind() {
            self.events.report(kind, Severity::Error);
        }
        err
    }

    /// Open a link session on the device's interface and start the roles
    ///
    /// Fails without side effects when the driver is not closed, the
    /// configuration is unusable, the handle is unknown or the session
    /// cannot be opened.
    pub fn open(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != DriverState::Closed {
            return Err(self.fail(DriverError::AlreadyOpen));
        }

        if let Err(e) = self.config.validate() {
            error!("Refusing to open {}: {:#}", self.handle, e);
            return Err(self.fail(DriverError::InvalidConfig(format!("{:#}", e))));
        }

        let Some(interface) = self.registry.get(self.handle.interface_index()) else {
            return Err(self.fail(DriverError::InvalidHandle(self.handle)));
        };

        let link = self
            .provider
            .open(&interface.name, &self.config.open_options())
            .map_err(|e| {
                error!("Failed to open {}: {}", interface.name, e);
                self.fail(DriverError::DriverFailedToOpen(e))
            })?;

        let cancel = Arc::new(AtomicBool::new(false));
        let (write_tx, write_rx) = channel::bounded(self.config.write_queue_capacity);
        let (receive_tx, receive_rx) = async_channel::bounded(self.config.receive_queue_capacity);
        let (handoff_tx, handoff_rx, active) =
            handoff_channel(self.config.buffer_capacity, Arc::clone(&self.stats));

        let ctx = RoleContext {
            link: Arc::clone(&link),
            cancel: Arc::clone(&cancel),
            events: self.events.clone(),
            stats: Arc::clone(&self.stats),
            config: self.config,
            host_mac: interface.mac,
            device_mac: self.handle.device_mac(),
        };

        let threads = vec![
            roles::spawn_read_role(ctx.clone(), receive_tx),
            roles::spawn_write_role(ctx.clone(), write_rx, handoff_tx, active),
            roles::spawn_transmit_role(ctx, handoff_rx),
        ];

        info!(
            "Opened {} on {} ({})",
            self.handle, interface.name, interface.mac
        );
        inner.session = Some(Session {
            cancel,
            link,
            write_tx,
            receive_rx,
            threads,
        });
        inner.state = DriverState::Open;
        Ok(())
    }

    /// Stop the roles and close the link session
    ///
    /// Pending writes and unread inbound data are discarded.
    pub fn close(&self) -> Result<()> {
        let session = {
            let mut inner = self.inner.lock();
            match (inner.state, inner.session.take()) {
                (DriverState::Open, Some(session)) => {
                    inner.state = DriverState::Closing;
                    session
                }
                (_, session) => {
                    inner.session = session;
                    return Err(self.fail(DriverError::AlreadyClosed));
                }
            }
        };

        debug!("Closing {}", self.handle);
        let Session {
            cancel,
            link,
            write_tx,
            receive_rx,
            threads,
        } = session;

        cancel.store(true, Ordering::Release);
        drop(write_tx);
        for thread in threads {
            let name = thread.thread().name().unwrap_or("link-role").to_string();
            if thread.join().is_err() {
                error!("{} panicked", name);
            }
        }
        link.close();
        drop(receive_rx);

        self.inner.lock().state = DriverState::Closed;
        info!("Closed {}", self.handle);
        Ok(())
    }

    /// Queue bytes for transmission
    ///
    /// Never blocks. Fails with [`DriverError::WriteQueueFull`] when the
    /// transmit path is not keeping up.
    pub fn write(&self, bytes: Vec<u8>) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        let inner = self.inner.lock();
        let Some(session) = inner.session.as_ref() else {
            return Err(DriverError::NotOpen);
        };

        match session.write_tx.try_send(bytes) {
            Ok(()) => {
                self.stats.write_enqueued();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.stats.write_dropped();
                self.events
                    .report(EventKind::WriteQueueFull, Severity::Warning);
                Err(DriverError::WriteQueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(DriverError::NotOpen),
        }
    }

    fn receiver(&self) -> Option<async_channel::Receiver<Vec<u8>>> {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|session| session.receive_rx.clone())
    }

    /// Next chunk of inbound bytes if one is waiting
    pub fn try_read(&self) -> Option<Vec<u8>> {
        self.receiver()?.try_recv().ok()
    }

    /// Wait for the next chunk of inbound bytes
    ///
    /// Returns `None` once the driver is closed.
    pub fn read_blocking(&self) -> Option<Vec<u8>> {
        self.receiver()?.recv_blocking().ok()
    }

    /// Wait for the next chunk of inbound bytes from async code
    ///
    /// Returns `None` once the driver is closed.
    pub async fn read(&self) -> Option<Vec<u8>> {
        let receiver = self.receiver()?;
        receiver.recv().await.ok()
    }
}

impl fmt::Debug for LinkDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkDriver")
            .field("handle", &self.handle)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for LinkDriver {
    fn drop(&mut self) {
        if self.is_open() {
            let _ = self.close();
        }
    }
}
