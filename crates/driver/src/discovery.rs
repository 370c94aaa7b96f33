//! Active discovery of devices on host network interfaces
//!
//! On every usable interface a serial-number request is broadcast in a
//! vendor link frame and responses are collected for a short window. The
//! responses are not decoded here: different device families parse them
//! differently, so the raw link payloads are returned for the device layer
//! to replay through its own packetizer and decoder.

use crate::config::DiscoveryConfig;
use crate::error::LinkError;
use crate::link::LinkProvider;
use crate::registry::{DeviceHandle, InterfaceRegistry, NetworkInterface};
use common::{EventKind, EventSink, Severity};
use protocol::{
    Command, Decoder, EthernetPacket, FramingConfig, MacAddress, Message, NetId, Packetizer,
    VENDOR_ETHERTYPE,
};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// A device that answered discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundDevice {
    pub handle: DeviceHandle,
    /// Link payloads received from the device, in arrival order
    pub discovery_packets: Vec<Vec<u8>>,
}

impl FoundDevice {
    /// Decode the discovery responses with a device family's framing
    ///
    /// Frames that fail to decode are skipped.
    pub fn replay(&self, framing: &FramingConfig, decoder: &Decoder) -> Vec<Message> {
        let mut packetizer = Packetizer::new(*framing);
        let mut messages = Vec::new();
        for packet in &self.discovery_packets {
            packetizer.input(packet);
            for frame in packetizer.output() {
                match decoder.decode(&frame) {
                    Ok(message) => messages.push(message),
                    Err(e) => trace!("Skipping discovery frame: {}", e),
                }
            }
        }
        messages
    }

    /// Serial number from the first serial-number report, if any
    pub fn serial_number(&self, framing: &FramingConfig, decoder: &Decoder) -> Option<String> {
        self.replay(framing, decoder)
            .into_iter()
            .find_map(|message| match message {
                Message::SerialNumber(report) => Some(report.serial()),
                _ => None,
            })
    }

    /// Whether the reported serial number starts with `prefix`
    ///
    /// Device families are told apart by their serial number prefix.
    pub fn matches_serial_prefix(
        &self,
        framing: &FramingConfig,
        decoder: &Decoder,
        prefix: &str,
    ) -> bool {
        self.serial_number(framing, decoder)
            .is_some_and(|serial| serial.starts_with(prefix))
    }
}

/// Link frame carrying a serial-number request
pub fn discovery_request(source: MacAddress) -> Vec<u8> {
    // A single-byte payload always fits the short format
    let payload = FramingConfig::default()
        .wrap_short(NetId::Main51, &[Command::RequestSerialNumber.code()])
        .unwrap_or_default();
    EthernetPacket::new(MacAddress::BROADCAST, source, payload).to_bytes()
}

fn enumerate(
    provider: &dyn LinkProvider,
    attempts: u32,
    events: &EventSink,
) -> Option<Vec<NetworkInterface>> {
    let mut last_error = None;
    for attempt in 1..=attempts {
        match provider.interfaces() {
            Ok(interfaces) => return Some(interfaces),
            Err(LinkError::Unavailable(reason)) => {
                warn!("Capture layer unavailable: {}", reason);
                events.report(EventKind::LinkUnavailable, Severity::Error);
                return None;
            }
            Err(e) => {
                debug!("Enumeration attempt {} failed: {}", attempt, e);
                last_error = Some(e);
            }
        }
    }

    if let Some(e) = last_error {
        warn!("Giving up on interface enumeration: {}", e);
    }
    events.report(EventKind::NoInterfacesFound, Severity::Error);
    None
}

/// Whether a captured frame is a vendor response addressed to `interface`
fn is_device_response(packet: &EthernetPacket, interface: MacAddress) -> bool {
    packet.ether_type == VENDOR_ETHERTYPE
        && packet.source.has_vendor_prefix()
        && (packet.destination == interface || packet.destination.is_broadcast())
}

/// Discover devices on every usable interface
///
/// Newly seen interfaces are added to `registry` first. Interfaces the OS
/// did not report, or that fail to open, are skipped.
pub fn find_all(
    provider: &dyn LinkProvider,
    registry: &InterfaceRegistry,
    config: &DiscoveryConfig,
    events: &EventSink,
) -> Vec<FoundDevice> {
    let Some(interfaces) = enumerate(provider, config.enumeration_attempts, events) else {
        return Vec::new();
    };
    registry.merge(interfaces);

    let mut found: Vec<FoundDevice> = Vec::new();
    for (index, interface) in registry.snapshot().into_iter().enumerate() {
        if interface.os_name.is_empty() {
            continue;
        }
        let Ok(index) = u8::try_from(index) else {
            warn!("Interface {} exceeds the handle index range", interface.name);
            break;
        };

        let session = match provider.open(&interface.name, &config.open_options()) {
            Ok(session) => session,
            Err(e) => {
                debug!("Skipping {}: {}", interface.name, e);
                continue;
            }
        };

        if let Err(e) = session.send(&discovery_request(interface.mac)) {
            debug!("Discovery request on {} failed: {}", interface.name, e);
        }

        let deadline = Instant::now() + config.response_window();
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let frame = match session.poll(deadline - now) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    debug!("Polling {} failed: {}", interface.name, e);
                    break;
                }
            };

            let Ok(packet) = EthernetPacket::parse(&frame) else {
                continue;
            };
            if !is_device_response(&packet, interface.mac) {
                continue;
            }

            let handle = DeviceHandle::new(index, packet.source);
            match found.iter_mut().find(|device| device.handle == handle) {
                Some(device) => device.discovery_packets.push(packet.payload),
                None => {
                    debug!("Found {} on {}", packet.source, interface.name);
                    found.push(FoundDevice {
                        handle,
                        discovery_packets: vec![packet.payload],
                    });
                }
            }
        }

        session.close();
    }

    info!("Discovery found {} devices", found.len());
    found
}
