//! Frame payload to typed message
//!
//! # Payload Layouts
//!
//! ```text
//! serial number (Main51): [0xA1][serial: u32 LE][mac: 6]?
//! command (Main51):       [code][arguments...]
//! CAN classic:            [0x00][arb_id: u32 LE][dlc: u8][ticks: u64 LE][data: dlc]
//! CAN FD:                 [0x01][arb_id: u32 LE][flags: u8][len: u8][ticks: u64 LE][data: len]
//! ```
//!
//! Bit 31 of `arb_id` marks an extended identifier and bit 30 a remote
//! frame. CAN FD `flags` bit 0 is FD, bit 1 bit-rate switch.

use crate::error::{ProtocolError, Result};
use crate::message::{
    CanMessage, Command, CommandMessage, Message, MessageKind, SerialNumberMessage, lookup,
};
use crate::network::NetId;
use crate::packetizer::{FrameFormat, FramingConfig, Packet, parse_frame};
use bytes::Buf;
use serde::{Deserialize, Serialize};

pub(crate) const ARB_ID_EXTENDED: u32 = 1 << 31;
pub(crate) const ARB_ID_REMOTE: u32 = 1 << 30;
pub(crate) const ARB_ID_MASK: u32 = 0x1FFF_FFFF;
const ARB_ID_RESERVED: u32 = !(ARB_ID_MASK | ARB_ID_EXTENDED | ARB_ID_REMOTE);
pub(crate) const FD_FLAG_FD: u8 = 1 << 0;
pub(crate) const FD_FLAG_BRS: u8 = 1 << 1;

/// Descriptor, id, dlc and timestamp
pub(crate) const CAN_CLASSIC_HEADER_LEN: usize = 14;
/// Descriptor, id, flags, length and timestamp
pub(crate) const CAN_FD_HEADER_LEN: usize = 15;
pub(crate) const MAX_CAN_CLASSIC_DATA: usize = 8;
pub(crate) const MAX_CAN_FD_DATA: usize = 64;

/// Serial report without the optional MAC address
const SERIAL_REPORT_LEN: usize = 5;
const SERIAL_REPORT_WITH_MAC_LEN: usize = 11;

/// Default tick length of hardware timestamps
pub const DEFAULT_TIMESTAMP_RESOLUTION_NS: u16 = 25;

/// Decoder options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Nanoseconds per hardware timestamp tick
    pub timestamp_resolution_ns: u16,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            timestamp_resolution_ns: DEFAULT_TIMESTAMP_RESOLUTION_NS,
        }
    }
}

/// Turns validated frames into messages
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    config: DecoderConfig,
}

impl Decoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode one frame
    ///
    /// Fails when the network is unknown, no message is registered for the
    /// (network, command) pair, or the payload does not match its layout
    /// exactly. Frames the [`Encoder`](crate::Encoder) would never produce,
    /// such as a long header around a payload that fits a short one, are
    /// rejected so that every accepted frame re-encodes to the same bytes.
    pub fn decode(&self, packet: &Packet) -> Result<Message> {
        let network =
            NetId::from_u16(packet.network).ok_or(ProtocolError::UnknownNetwork(packet.network))?;
        let command = *packet.data.first().ok_or(ProtocolError::Incomplete {
            expected: 1,
            actual: 0,
        })?;
        let kind = lookup(network, command).ok_or(ProtocolError::UnsupportedMessage {
            network: packet.network,
            command,
        })?;
        if packet.format != FrameFormat::canonical(network, packet.data.len()) {
            return Err(ProtocolError::NonCanonical("unexpected header format"));
        }

        match kind {
            MessageKind::SerialNumber => decode_serial_number(network, &packet.data),
            MessageKind::Command => decode_command(network, command, &packet.data),
            MessageKind::CanClassic => self.decode_can_classic(network, &packet.data),
            MessageKind::CanFd => self.decode_can_fd(network, &packet.data),
        }
    }

    /// Parse one complete wire frame and decode it
    ///
    /// This also fails on a checksum mismatch, which the streaming
    /// packetizer would have dropped silently.
    pub fn decode_bytes(&self, framing: &FramingConfig, bytes: &[u8]) -> Result<Message> {
        let packet = parse_frame(bytes, framing)?;
        self.decode(&packet)
    }

    fn ticks_to_ns(&self, ticks: u64) -> Result<u64> {
        ticks
            .checked_mul(u64::from(self.config.timestamp_resolution_ns))
            .ok_or(ProtocolError::NonCanonical("timestamp out of range"))
    }

    fn decode_can_classic(&self, network: NetId, data: &[u8]) -> Result<Message> {
        require(data, CAN_CLASSIC_HEADER_LEN)?;
        let mut buf = &data[1..];
        let raw_id = checked_id(buf.get_u32_le())?;
        let dlc = usize::from(buf.get_u8());
        let ticks = buf.get_u64_le();
        if dlc > MAX_CAN_CLASSIC_DATA {
            return Err(ProtocolError::InvalidLength { length: dlc });
        }
        exact(data, CAN_CLASSIC_HEADER_LEN + dlc)?;

        Ok(Message::Can(CanMessage {
            network,
            arbitration_id: raw_id & ARB_ID_MASK,
            extended: raw_id & ARB_ID_EXTENDED != 0,
            remote: raw_id & ARB_ID_REMOTE != 0,
            fd: false,
            bitrate_switch: false,
            data: buf[..dlc].to_vec(),
            timestamp_ns: self.ticks_to_ns(ticks)?,
        }))
    }

    fn decode_can_fd(&self, network: NetId, data: &[u8]) -> Result<Message> {
        require(data, CAN_FD_HEADER_LEN)?;
        let mut buf = &data[1..];
        let raw_id = checked_id(buf.get_u32_le())?;
        let flags = buf.get_u8();
        let len = usize::from(buf.get_u8());
        let ticks = buf.get_u64_le();
        if flags & FD_FLAG_FD == 0 {
            return Err(ProtocolError::NonCanonical("CAN FD layout without the FD flag"));
        }
        if flags & !(FD_FLAG_FD | FD_FLAG_BRS) != 0 {
            return Err(ProtocolError::NonCanonical("reserved CAN FD flag bits"));
        }
        if len > MAX_CAN_FD_DATA {
            return Err(ProtocolError::InvalidLength { length: len });
        }
        exact(data, CAN_FD_HEADER_LEN + len)?;

        Ok(Message::Can(CanMessage {
            network,
            arbitration_id: raw_id & ARB_ID_MASK,
            extended: raw_id & ARB_ID_EXTENDED != 0,
            remote: raw_id & ARB_ID_REMOTE != 0,
            fd: true,
            bitrate_switch: flags & FD_FLAG_BRS != 0,
            data: buf[..len].to_vec(),
            timestamp_ns: self.ticks_to_ns(ticks)?,
        }))
    }
}

fn require(data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(ProtocolError::Incomplete {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Payload must be exactly `expected` bytes long
fn exact(data: &[u8], expected: usize) -> Result<()> {
    require(data, expected)?;
    if data.len() != expected {
        return Err(ProtocolError::InvalidLength { length: data.len() });
    }
    Ok(())
}

fn checked_id(raw_id: u32) -> Result<u32> {
    if raw_id & ARB_ID_RESERVED != 0 {
        return Err(ProtocolError::NonCanonical("reserved arbitration id bit"));
    }
    Ok(raw_id)
}

fn decode_serial_number(network: NetId, data: &[u8]) -> Result<Message> {
    match data.len() {
        1 => {
            return Ok(Message::Command(CommandMessage {
                network,
                command: Command::RequestSerialNumber,
                arguments: Vec::new(),
            }));
        }
        SERIAL_REPORT_LEN | SERIAL_REPORT_WITH_MAC_LEN => {}
        len if len < SERIAL_REPORT_LEN => require(data, SERIAL_REPORT_LEN)?,
        len => return Err(ProtocolError::InvalidLength { length: len }),
    }

    let serial_number = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
    let mac_address = (data.len() >= SERIAL_REPORT_WITH_MAC_LEN).then(|| {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&data[SERIAL_REPORT_LEN..SERIAL_REPORT_WITH_MAC_LEN]);
        mac
    });

    Ok(Message::SerialNumber(SerialNumberMessage {
        network,
        serial_number,
        mac_address,
    }))
}

fn decode_command(network: NetId, code: u8, data: &[u8]) -> Result<Message> {
    let command = Command::from_u8(code).ok_or(ProtocolError::UnsupportedMessage {
        network: network.as_u16(),
        command: code,
    })?;
    Ok(Message::Command(CommandMessage {
        network,
        command,
        arguments: data[1..].to_vec(),
    }))
}
