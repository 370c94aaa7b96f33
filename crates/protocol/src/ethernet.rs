//! Link-layer framing for adapters attached over raw Ethernet
//!
//! Device frames travel inside Ethernet II frames with a vendor-reserved
//! EtherType and a small vendor header:
//!
//! ```text
//! [dst: 6][src: 6][ethertype: u16 BE][0xAAAA5555: u32 LE]
//! [payload_len: u16 LE][packet_number: u16 LE][info: u16 LE][payload]
//! ```
//!
//! `info` bit 0 marks the first piece of a split write, bit 1 the last piece
//! and bit 2 tells the host the device's receive buffer is half full.

use crate::error::{ProtocolError, Result};
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// EtherType reserved by the vendor for device traffic and discovery
pub const VENDOR_ETHERTYPE: u16 = 0xCAB2;

/// Magic value opening the vendor header
pub const VENDOR_HEADER_MAGIC: u32 = 0xAAAA_5555;

/// Ethernet header plus vendor header
pub const LINK_HEADER_LEN: usize = 24;

/// Largest Ethernet frame handed to the link, header included
pub const MAX_LINK_FRAME: usize = 1518;

/// Largest payload a single link frame carries
pub const MAX_LINK_PAYLOAD: usize = MAX_LINK_FRAME - LINK_HEADER_LEN;

const INFO_FIRST_PIECE: u16 = 1 << 0;
const INFO_LAST_PIECE: u16 = 1 << 1;
const INFO_BUFFER_HALF_FULL: u16 = 1 << 2;

/// 48-bit hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    /// Organizationally unique prefix assigned to the vendor's devices
    pub const VENDOR_PREFIX: [u8; 3] = [0x00, 0xFC, 0x70];

    /// Placeholder address of a device that has not been assigned one
    pub const VENDOR_UNSET: MacAddress = MacAddress([0x00, 0xFC, 0x70, 0xFF, 0xFF, 0xFF]);

    /// Device address built from the vendor prefix and a 3-byte suffix
    pub fn from_vendor_suffix(suffix: [u8; 3]) -> Self {
        let [p0, p1, p2] = Self::VENDOR_PREFIX;
        MacAddress([p0, p1, p2, suffix[0], suffix[1], suffix[2]])
    }

    pub fn has_vendor_prefix(&self) -> bool {
        self.0[..3] == Self::VENDOR_PREFIX
    }

    /// Low three bytes
    pub fn suffix(&self) -> [u8; 3] {
        [self.0[3], self.0[4], self.0[5]]
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let mut octets = [0u8; 6];
        let mut parts = s.split([':', '-']);
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or(ProtocolError::InvalidEthernetFrame("MAC address too short"))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| ProtocolError::InvalidEthernetFrame("invalid MAC octet"))?;
        }
        if parts.next().is_some() {
            return Err(ProtocolError::InvalidEthernetFrame("MAC address too long"));
        }
        Ok(MacAddress(octets))
    }
}

/// One vendor link frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetPacket {
    pub destination: MacAddress,
    pub source: MacAddress,
    pub ether_type: u16,
    pub packet_number: u16,
    pub first_piece: bool,
    pub last_piece: bool,
    pub buffer_half_full: bool,
    pub payload: Vec<u8>,
}

impl EthernetPacket {
    /// A complete single-piece frame
    pub fn new(destination: MacAddress, source: MacAddress, payload: Vec<u8>) -> Self {
        Self {
            destination,
            source,
            ether_type: VENDOR_ETHERTYPE,
            packet_number: 0,
            first_piece: true,
            last_piece: true,
            buffer_half_full: false,
            payload,
        }
    }

    /// Serialize for the wire
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LINK_HEADER_LEN + self.payload.len());
        out.put_slice(&self.destination.0);
        out.put_slice(&self.source.0);
        out.put_u16(self.ether_type);
        out.put_u32_le(VENDOR_HEADER_MAGIC);
        out.put_u16_le(self.payload.len() as u16);
        out.put_u16_le(self.packet_number);
        let mut info = 0u16;
        if self.first_piece {
            info |= INFO_FIRST_PIECE;
        }
        if self.last_piece {
            info |= INFO_LAST_PIECE;
        }
        if self.buffer_half_full {
            info |= INFO_BUFFER_HALF_FULL;
        }
        out.put_u16_le(info);
        out.put_slice(&self.payload);
        out
    }

    /// Parse a captured frame
    ///
    /// Frames with another EtherType or without the vendor header are
    /// rejected. Trailing Ethernet padding beyond `payload_len` is ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < LINK_HEADER_LEN {
            return Err(ProtocolError::InvalidEthernetFrame("shorter than header"));
        }

        let mut buf = bytes;
        let mut destination = [0u8; 6];
        buf.copy_to_slice(&mut destination);
        let mut source = [0u8; 6];
        buf.copy_to_slice(&mut source);
        let ether_type = buf.get_u16();
        if ether_type != VENDOR_ETHERTYPE {
            return Err(ProtocolError::InvalidEthernetFrame("foreign EtherType"));
        }
        if buf.get_u32_le() != VENDOR_HEADER_MAGIC {
            return Err(ProtocolError::InvalidEthernetFrame("bad vendor header"));
        }
        let payload_len = usize::from(buf.get_u16_le());
        let packet_number = buf.get_u16_le();
        let info = buf.get_u16_le();
        if buf.remaining() < payload_len {
            return Err(ProtocolError::InvalidEthernetFrame("truncated payload"));
        }

        Ok(Self {
            destination: MacAddress(destination),
            source: MacAddress(source),
            ether_type,
            packet_number,
            first_piece: info & INFO_FIRST_PIECE != 0,
            last_piece: info & INFO_LAST_PIECE != 0,
            buffer_half_full: info & INFO_BUFFER_HALF_FULL != 0,
            payload: buf[..payload_len].to_vec(),
        })
    }
}

/// Wraps outbound device bytes into link frames and filters inbound ones
///
/// Outbound writes are packed into as few link frames as possible; a write
/// that does not fit into the frame being filled starts a new one, and a
/// write larger than one frame is split into pieces.
#[derive(Debug)]
pub struct EthernetPacketizer {
    host_mac: MacAddress,
    device_mac: MacAddress,
    next_packet_number: u16,
    outbound: Vec<EthernetPacket>,
    inbound: Vec<u8>,
}

impl EthernetPacketizer {
    pub fn new(host_mac: MacAddress, device_mac: MacAddress) -> Self {
        Self {
            host_mac,
            device_mac,
            next_packet_number: 0,
            outbound: Vec::new(),
            inbound: Vec::new(),
        }
    }

    pub fn host_mac(&self) -> MacAddress {
        self.host_mac
    }

    pub fn device_mac(&self) -> MacAddress {
        self.device_mac
    }

    fn next_packet(&mut self) -> EthernetPacket {
        let mut packet = EthernetPacket::new(self.device_mac, self.host_mac, Vec::new());
        packet.packet_number = self.next_packet_number;
        self.next_packet_number = self.next_packet_number.wrapping_add(1);
        packet
    }

    /// Queue framed device bytes for transmission
    pub fn input_down(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        if let Some(current) = self.outbound.last_mut()
            && current.first_piece
            && current.last_piece
            && current.payload.len() + bytes.len() <= MAX_LINK_PAYLOAD
        {
            current.payload.extend_from_slice(bytes);
            return;
        }

        let mut remaining = bytes;
        let mut first = true;
        while !remaining.is_empty() {
            let take = remaining.len().min(MAX_LINK_PAYLOAD);
            let mut packet = self.next_packet();
            packet.first_piece = first;
            packet.last_piece = take == remaining.len();
            packet.payload.extend_from_slice(&remaining[..take]);
            self.outbound.push(packet);
            remaining = &remaining[take..];
            first = false;
        }
    }

    /// Serialized link frames built since the last call
    pub fn output_down(&mut self) -> Vec<Vec<u8>> {
        self.outbound
            .drain(..)
            .map(|packet| packet.to_bytes())
            .collect()
    }

    /// Offer a captured frame; returns whether it belonged to our device
    pub fn input_up(&mut self, frame: &[u8]) -> bool {
        let packet = match EthernetPacket::parse(frame) {
            Ok(packet) => packet,
            Err(e) => {
                trace!("Ignoring captured frame: {}", e);
                return false;
            }
        };

        if packet.source != self.device_mac {
            return false;
        }
        if packet.destination != self.host_mac && !packet.destination.is_broadcast() {
            return false;
        }

        self.inbound.extend_from_slice(&packet.payload);
        true
    }

    /// Device bytes accepted since the last call
    pub fn output_up(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.inbound)
    }
}
