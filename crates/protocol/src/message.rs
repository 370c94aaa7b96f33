//! Typed messages
//!
//! The set of messages is closed: every decodable frame maps to one
//! [`Message`] variant through [`lookup`], keyed by the class of the frame's
//! network and the first payload byte (its command or descriptor code).

use crate::network::{NetId, NetworkClass};
use serde::{Deserialize, Serialize};

/// Commands understood on the control networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Command {
    EnableNetworkCommunication = 0x07,
    RequestSerialNumber = 0xA1,
    RequestStatusUpdate = 0xBC,
}

impl Command {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x07 => Some(Command::EnableNetworkCommunication),
            0xA1 => Some(Command::RequestSerialNumber),
            0xBC => Some(Command::RequestStatusUpdate),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Descriptor byte opening a classic CAN payload
pub const CAN_CLASSIC_DESCRIPTOR: u8 = 0x00;

/// Descriptor byte opening a CAN FD payload
pub const CAN_FD_DESCRIPTOR: u8 = 0x01;

/// Kinds of message the decoder can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Serial number report, or a bare request when only the command byte
    /// is present
    SerialNumber,
    Command,
    CanClassic,
    CanFd,
}

/// Dispatch table from (network class, command code) to message kind
const DISPATCH: &[(NetworkClass, u8, MessageKind)] = &[
    (NetworkClass::Control, 0xA1, MessageKind::SerialNumber),
    (NetworkClass::Control, 0x07, MessageKind::Command),
    (NetworkClass::Control, 0xBC, MessageKind::Command),
    (NetworkClass::Can, CAN_CLASSIC_DESCRIPTOR, MessageKind::CanClassic),
    (NetworkClass::Can, CAN_FD_DESCRIPTOR, MessageKind::CanFd),
];

/// Message kind registered for a frame, if any
pub fn lookup(network: NetId, command: u8) -> Option<MessageKind> {
    let class = network.class();
    DISPATCH
        .iter()
        .find(|(c, code, _)| *c == class && *code == command)
        .map(|(_, _, kind)| *kind)
}

/// Serial number report from a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialNumberMessage {
    pub network: NetId,
    /// Numeric serial as reported on the wire
    pub serial_number: u32,
    /// Hardware address, reported by Ethernet-attached families
    pub mac_address: Option<[u8; 6]>,
}

impl SerialNumberMessage {
    /// Printable serial, six base-36 digits for every serial below 36^6
    pub fn serial(&self) -> String {
        serial_to_string(self.serial_number)
    }
}

/// Bare command addressed to a control network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub network: NetId,
    pub command: Command,
    #[serde(with = "serde_bytes")]
    pub arguments: Vec<u8>,
}

impl CommandMessage {
    pub fn new(command: Command) -> Self {
        Self {
            network: NetId::Main51,
            command,
            arguments: Vec::new(),
        }
    }

    pub fn with_arguments(command: Command, arguments: Vec<u8>) -> Self {
        Self {
            network: NetId::Main51,
            command,
            arguments,
        }
    }
}

/// A CAN or CAN FD frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanMessage {
    pub network: NetId,
    pub arbitration_id: u32,
    pub extended: bool,
    pub remote: bool,
    /// Sent or received as CAN FD
    pub fd: bool,
    /// CAN FD bit-rate switch
    pub bitrate_switch: bool,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    /// Hardware timestamp in nanoseconds
    pub timestamp_ns: u64,
}

impl CanMessage {
    /// Classic frame with a standard id
    pub fn new(network: NetId, arbitration_id: u32, data: Vec<u8>) -> Self {
        Self {
            network,
            arbitration_id,
            extended: false,
            remote: false,
            fd: false,
            bitrate_switch: false,
            data,
            timestamp_ns: 0,
        }
    }
}

/// Decoded frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    SerialNumber(SerialNumberMessage),
    Command(CommandMessage),
    Can(CanMessage),
}

impl Message {
    pub fn network(&self) -> NetId {
        match self {
            Message::SerialNumber(m) => m.network,
            Message::Command(m) => m.network,
            Message::Can(m) => m.network,
        }
    }
}

const SERIAL_DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Render a numeric serial in base 36, zero-padded to six digits
pub fn serial_to_string(serial: u32) -> String {
    let mut digits = Vec::with_capacity(7);
    let mut value = serial;
    while value > 0 {
        digits.push(SERIAL_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    while digits.len() < 6 {
        digits.push(b'0');
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Parse a base-36 serial back to its numeric form
pub fn serial_from_string(serial: &str) -> Option<u32> {
    if serial.is_empty() {
        return None;
    }
    serial.chars().try_fold(0u32, |acc, c| {
        let digit = c.to_ascii_uppercase().to_digit(36)?;
        acc.checked_mul(36)?.checked_add(digit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_table() {
        assert_eq!(
            lookup(NetId::Main51, 0xA1),
            Some(MessageKind::SerialNumber)
        );
        assert_eq!(lookup(NetId::Main51, 0x07), Some(MessageKind::Command));
        assert_eq!(lookup(NetId::HsCan, 0x00), Some(MessageKind::CanClassic));
        assert_eq!(lookup(NetId::HsCan4, 0x01), Some(MessageKind::CanFd));
        assert_eq!(lookup(NetId::HsCan, 0xA1), None);
        assert_eq!(lookup(NetId::Lin, 0x00), None);
    }

    #[test]
    fn test_every_table_command_is_known() {
        for (class, code, kind) in DISPATCH {
            if *class == NetworkClass::Control {
                assert!(Command::from_u8(*code).is_some(), "{:?}", kind);
            }
        }
    }

    #[test]
    fn test_serial_string_roundtrip() {
        assert_eq!(serial_to_string(0), "000000");
        assert_eq!(serial_to_string(35), "00000Z");
        let gs = serial_from_string("GS0001").unwrap();
        assert_eq!(serial_to_string(gs), "GS0001");
        assert_eq!(serial_from_string("gs0001"), Some(gs));
        assert_eq!(serial_from_string(""), None);
        assert_eq!(serial_from_string("GS-01"), None);
    }
}
