//! In-memory link for tests
//!
//! [`MockLinkProvider`] serves a fixed interface list and hands out
//! [`MockSession`]s that capture what the driver sends and replay whatever
//! frames a test injects. Failures can be scripted at every step.

use super::{LinkProvider, LinkSession, OpenOptions};
use crate::error::LinkError;
use crate::handoff::TransmitBuffer;
use crate::registry::NetworkInterface;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Decrement `counter` if it is above zero; returns whether it was
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}

/// Scriptable provider
#[derive(Debug, Default)]
pub struct MockLinkProvider {
    interfaces: Mutex<Vec<NetworkInterface>>,
    unavailable: AtomicBool,
    enumeration_failures: AtomicUsize,
    enumeration_calls: AtomicUsize,
    open_failures: Mutex<HashSet<String>>,
    scripted: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    sessions: Mutex<Vec<(String, Arc<MockSession>)>>,
}

impl MockLinkProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interfaces(interfaces: Vec<NetworkInterface>) -> Self {
        let provider = Self::new();
        *provider.interfaces.lock() = interfaces;
        provider
    }

    pub fn add_interface(&self, interface: NetworkInterface) {
        self.interfaces.lock().push(interface);
    }

    /// Report the capture layer as missing
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    /// Fail the next `times` enumeration calls
    pub fn fail_enumeration(&self, times: usize) {
        self.enumeration_failures.store(times, Ordering::Release);
    }

    pub fn enumeration_calls(&self) -> usize {
        self.enumeration_calls.load(Ordering::Acquire)
    }

    /// Refuse to open the named interface
    pub fn fail_open(&self, name: &str) {
        self.open_failures.lock().insert(name.to_string());
    }

    /// Frames the next session opened on `name` captures immediately
    pub fn script_inbound(&self, name: &str, frames: Vec<Vec<u8>>) {
        self.scripted
            .lock()
            .entry(name.to_string())
            .or_default()
            .extend(frames);
    }

    /// Most recent session opened on `name`
    pub fn session(&self, name: &str) -> Option<Arc<MockSession>> {
        self.sessions
            .lock()
            .iter()
            .rev()
            .find(|(opened_on, _)| opened_on == name)
            .map(|(_, session)| Arc::clone(session))
    }

    /// Number of sessions opened so far on any interface
    pub fn open_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

impl LinkProvider for MockLinkProvider {
    fn interfaces(&self) -> Result<Vec<NetworkInterface>, LinkError> {
        self.enumeration_calls.fetch_add(1, Ordering::AcqRel);
        if self.unavailable.load(Ordering::Acquire) {
            return Err(LinkError::Unavailable("mock capture layer disabled".into()));
        }
        if take_one(&self.enumeration_failures) {
            return Err(LinkError::Enumeration("scripted failure".into()));
        }
        Ok(self.interfaces.lock().clone())
    }

    fn open(&self, name: &str, _options: &OpenOptions) -> Result<Arc<dyn LinkSession>, LinkError> {
        if !self.interfaces.lock().iter().any(|i| i.name == name) {
            return Err(LinkError::Open {
                name: name.to_string(),
                reason: "no such interface".into(),
            });
        }
        if self.open_failures.lock().contains(name) {
            return Err(LinkError::Open {
                name: name.to_string(),
                reason: "scripted failure".into(),
            });
        }

        let session = Arc::new(MockSession::new());
        if let Some(frames) = self.scripted.lock().remove(name) {
            for frame in frames {
                session.inject(frame);
            }
        }
        self.sessions
            .lock()
            .push((name.to_string(), Arc::clone(&session)));
        Ok(session)
    }
}

/// Session backed by in-memory queues
#[derive(Debug)]
pub struct MockSession {
    inbound_tx: Sender<Vec<u8>>,
    inbound_rx: Receiver<Vec<u8>>,
    sent: Mutex<Vec<Vec<u8>>>,
    transmitted: Mutex<Vec<Vec<u8>>>,
    transmit_calls: AtomicUsize,
    poll_failure: AtomicBool,
    transmit_failures: AtomicUsize,
    transmit_delay: Mutex<Duration>,
    active_transmits: AtomicUsize,
    peak_transmits: AtomicUsize,
    closed: AtomicBool,
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSession {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = channel::unbounded();
        Self {
            inbound_tx,
            inbound_rx,
            sent: Mutex::new(Vec::new()),
            transmitted: Mutex::new(Vec::new()),
            transmit_calls: AtomicUsize::new(0),
            poll_failure: AtomicBool::new(false),
            transmit_failures: AtomicUsize::new(0),
            transmit_delay: Mutex::new(Duration::ZERO),
            active_transmits: AtomicUsize::new(0),
            peak_transmits: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Make a frame available to the next poll
    pub fn inject(&self, frame: Vec<u8>) {
        let _ = self.inbound_tx.send(frame);
    }

    /// Frames passed to `send`
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Frames from every successful bulk transmit, in order
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.transmitted.lock().clone()
    }

    pub fn transmit_calls(&self) -> usize {
        self.transmit_calls.load(Ordering::Acquire)
    }

    /// Make every later poll fail
    pub fn fail_polls(&self) {
        self.poll_failure.store(true, Ordering::Release);
    }

    /// Fail the next `times` bulk transmits
    pub fn fail_transmits(&self, times: usize) {
        self.transmit_failures.store(times, Ordering::Release);
    }

    /// Hold each bulk transmit for `delay`
    pub fn set_transmit_delay(&self, delay: Duration) {
        *self.transmit_delay.lock() = delay;
    }

    /// Most bulk transmits ever running at once
    pub fn peak_concurrent_transmits(&self) -> usize {
        self.peak_transmits.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl LinkSession for MockSession {
    fn send(&self, frame: &[u8]) -> Result<(), LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        self.sent.lock().push(frame.to_vec());
        Ok(())
    }

    fn poll(&self, timeout: Duration) -> Result<Option<Vec<u8>>, LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        if self.poll_failure.load(Ordering::Acquire) {
            return Err(LinkError::Io("scripted poll failure".into()));
        }
        match self.inbound_rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Closed),
        }
    }

    fn transmit(&self, buffer: &TransmitBuffer) -> Result<(), LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        self.transmit_calls.fetch_add(1, Ordering::AcqRel);
        let now = self.active_transmits.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_transmits.fetch_max(now, Ordering::AcqRel);

        let delay = *self.transmit_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let result = if take_one(&self.transmit_failures) {
            Err(LinkError::Io("scripted transmit failure".into()))
        } else {
            self.transmitted
                .lock()
                .extend(buffer.frames().map(<[u8]>::to_vec));
            Ok(())
        };

        self.active_transmits.fetch_sub(1, Ordering::AcqRel);
        result
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
