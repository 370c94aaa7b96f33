//! Known network interfaces and device handles
//!
//! Interfaces are added as discovery finds them and are never removed, so an
//! index taken from a [`DeviceHandle`] stays meaningful for the life of the
//! registry. [`InterfaceRegistry::clear`] exists for tests.

use parking_lot::RwLock;
use protocol::MacAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// A host network interface usable by the capture layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    /// Name passed to the capture layer when opening
    pub name: String,
    /// Name the operating system knows the interface by; empty when the OS
    /// did not report this interface
    pub os_name: String,
    pub description: String,
    pub mac: MacAddress,
}

/// Opaque 32-bit device identifier
///
/// The top byte is the index of the interface the device was found on, the
/// low three bytes are the device MAC suffix. The vendor prefix is implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceHandle(pub u32);

impl DeviceHandle {
    pub fn new(interface_index: u8, device_mac: MacAddress) -> Self {
        let [a, b, c] = device_mac.suffix();
        DeviceHandle(
            (u32::from(interface_index) << 24)
                | (u32::from(a) << 16)
                | (u32::from(b) << 8)
                | u32::from(c),
        )
    }

    pub fn interface_index(&self) -> usize {
        (self.0 >> 24) as usize
    }

    /// Full device MAC with the vendor prefix re-attached
    pub fn device_mac(&self) -> MacAddress {
        let [_, a, b, c] = self.0.to_be_bytes();
        MacAddress::from_vendor_suffix([a, b, c])
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Append-only list of interfaces, indexed by discovery order
#[derive(Debug, Default)]
pub struct InterfaceRegistry {
    interfaces: RwLock<Vec<NetworkInterface>>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.interfaces.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<NetworkInterface> {
        self.interfaces.read().get(index).cloned()
    }

    pub fn snapshot(&self) -> Vec<NetworkInterface> {
        self.interfaces.read().clone()
    }

    /// Add interfaces not yet known, matched by MAC address
    ///
    /// Known interfaces keep their index. Returns how many were added.
    pub fn merge(&self, found: impl IntoIterator<Item = NetworkInterface>) -> usize {
        let mut interfaces = self.interfaces.write();
        let mut added = 0;
        for candidate in found {
            match interfaces.iter_mut().find(|known| known.mac == candidate.mac) {
                Some(known) => {
                    // A later enumeration may see the OS side of an interface
                    // that an earlier one missed
                    if known.os_name.is_empty() && !candidate.os_name.is_empty() {
                        known.os_name = candidate.os_name;
                    }
                }
                None => {
                    debug!(
                        "Registered interface {} ({}) at index {}",
                        candidate.name,
                        candidate.mac,
                        interfaces.len()
                    );
                    interfaces.push(candidate);
                    added += 1;
                }
            }
        }
        added
    }

    /// Whether the handle's interface index names a known interface
    pub fn is_valid(&self, handle: DeviceHandle) -> bool {
        handle.interface_index() < self.len()
    }

    pub fn clear(&self) {
        self.interfaces.write().clear();
    }
}
