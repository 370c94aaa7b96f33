//! Typed message to wire frame
//!
//! The inverse of [`Decoder`](crate::Decoder). Control-network messages use
//! the short format whenever the payload and network id allow it; CAN
//! always uses the long format. Messages the wire layouts cannot carry
//! exactly are refused rather than altered.
//!
//! # Example
//!
//! ```
//! use protocol::{Command, CommandMessage, Encoder, Message};
//!
//! let encoder = Encoder::default();
//! let request = Message::Command(CommandMessage::new(Command::RequestSerialNumber));
//! assert_eq!(encoder.encode(&request).unwrap(), vec![0xAA, 0x1B, 0xA1, 0x44]);
//! ```

use crate::decoder::{
    ARB_ID_EXTENDED, ARB_ID_MASK, ARB_ID_REMOTE, CAN_CLASSIC_HEADER_LEN, CAN_FD_HEADER_LEN,
    DEFAULT_TIMESTAMP_RESOLUTION_NS, FD_FLAG_BRS, FD_FLAG_FD, MAX_CAN_CLASSIC_DATA,
    MAX_CAN_FD_DATA,
};
use crate::error::{ProtocolError, Result};
use crate::message::{
    CAN_CLASSIC_DESCRIPTOR, CAN_FD_DESCRIPTOR, CanMessage, Message, SerialNumberMessage,
};
use crate::network::NetId;
use crate::packetizer::{FrameFormat, FramingConfig};
use bytes::BufMut;
use serde::{Deserialize, Serialize};

/// Encoder options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Device accepts the CAN FD payload layout
    pub support_canfd: bool,
    /// Nanoseconds per hardware timestamp tick
    pub timestamp_resolution_ns: u16,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            support_canfd: false,
            timestamp_resolution_ns: DEFAULT_TIMESTAMP_RESOLUTION_NS,
        }
    }
}

/// Turns messages into framed bytes
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    framing: FramingConfig,
    config: EncoderConfig,
}

impl Encoder {
    pub fn new(framing: FramingConfig, config: EncoderConfig) -> Self {
        Self { framing, config }
    }

    pub fn framing(&self) -> &FramingConfig {
        &self.framing
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode a message into one wire frame
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        match message {
            Message::SerialNumber(sn) => {
                self.wrap(sn.network, &serial_number_payload(sn))
            }
            Message::Command(cmd) => {
                let mut payload = Vec::with_capacity(1 + cmd.arguments.len());
                payload.push(cmd.command.code());
                payload.extend_from_slice(&cmd.arguments);
                self.wrap(cmd.network, &payload)
            }
            Message::Can(can) => {
                let payload = self.can_payload(can)?;
                self.wrap(can.network, &payload)
            }
        }
    }

    fn wrap(&self, network: NetId, payload: &[u8]) -> Result<Vec<u8>> {
        match FrameFormat::canonical(network, payload.len()) {
            FrameFormat::Short => self.framing.wrap_short(network, payload),
            FrameFormat::Long => self.framing.wrap_long(network, payload),
        }
    }

    fn ns_to_ticks(&self, timestamp_ns: u64) -> u64 {
        timestamp_ns / u64::from(self.config.timestamp_resolution_ns.max(1))
    }

    fn can_payload(&self, can: &CanMessage) -> Result<Vec<u8>> {
        if can.arbitration_id & !ARB_ID_MASK != 0 {
            return Err(ProtocolError::NonCanonical("arbitration id wider than 29 bits"));
        }
        let mut raw_id = can.arbitration_id;
        if can.extended {
            raw_id |= ARB_ID_EXTENDED;
        }
        if can.remote {
            raw_id |= ARB_ID_REMOTE;
        }
        let ticks = self.ns_to_ticks(can.timestamp_ns);

        if !can.fd {
            if can.bitrate_switch {
                return Err(ProtocolError::NonCanonical("bit-rate switch without FD"));
            }
            if can.data.len() > MAX_CAN_CLASSIC_DATA {
                return Err(ProtocolError::PayloadTooLarge {
                    size: can.data.len(),
                    max: MAX_CAN_CLASSIC_DATA,
                });
            }
            let mut payload = Vec::with_capacity(CAN_CLASSIC_HEADER_LEN + can.data.len());
            payload.put_u8(CAN_CLASSIC_DESCRIPTOR);
            payload.put_u32_le(raw_id);
            payload.put_u8(can.data.len() as u8);
            payload.put_u64_le(ticks);
            payload.put_slice(&can.data);
            return Ok(payload);
        }

        if !self.config.support_canfd {
            return Err(ProtocolError::CanFdNotSupported);
        }
        if can.data.len() > MAX_CAN_FD_DATA {
            return Err(ProtocolError::PayloadTooLarge {
                size: can.data.len(),
                max: MAX_CAN_FD_DATA,
            });
        }

        let mut flags = FD_FLAG_FD;
        if can.bitrate_switch {
            flags |= FD_FLAG_BRS;
        }
        let mut payload = Vec::with_capacity(CAN_FD_HEADER_LEN + can.data.len());
        payload.put_u8(CAN_FD_DESCRIPTOR);
        payload.put_u32_le(raw_id);
        payload.put_u8(flags);
        payload.put_u8(can.data.len() as u8);
        payload.put_u64_le(ticks);
        payload.put_slice(&can.data);
        Ok(payload)
    }
}

fn serial_number_payload(sn: &SerialNumberMessage) -> Vec<u8> {
    let mut payload = Vec::with_capacity(11);
    payload.put_u8(crate::message::Command::RequestSerialNumber.code());
    payload.put_u32_le(sn.serial_number);
    if let Some(mac) = sn.mac_address {
        payload.put_slice(&mac);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Command, CommandMessage};

    #[test]
    fn test_encode_enable_network_communication() {
        let msg = Message::Command(CommandMessage::with_arguments(
            Command::EnableNetworkCommunication,
            vec![0x01],
        ));
        let bytes = Encoder::default().encode(&msg).unwrap();
        assert_eq!(&bytes[..4], &[0xAA, 0x2B, 0x07, 0x01]);
        assert_eq!(bytes.len(), 5);
    }

    #[test]
    fn test_encode_serial_without_checksum() {
        let framing = FramingConfig {
            disable_checksum: true,
            align_16bit: false,
        };
        let encoder = Encoder::new(framing, EncoderConfig::default());
        let msg = Message::SerialNumber(SerialNumberMessage {
            network: NetId::Main51,
            serial_number: 0x0403_0201,
            mac_address: None,
        });
        assert_eq!(
            encoder.encode(&msg).unwrap(),
            vec![0xAA, 0x5B, 0xA1, 0x01, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn test_classic_can_uses_long_format() {
        let msg = Message::Can(CanMessage::new(NetId::HsCan, 0x7DF, vec![0x02, 0x01, 0x0C]));
        let bytes = Encoder::default().encode(&msg).unwrap();
        assert_eq!(bytes[0], 0xAA);
        assert_eq!(bytes[1], 0x00);
        assert_eq!(
            usize::from(u16::from_le_bytes([bytes[2], bytes[3]])),
            6 + CAN_CLASSIC_HEADER_LEN + 3
        );
        assert_eq!(bytes[6], CAN_CLASSIC_DESCRIPTOR);
    }

    #[test]
    fn test_fd_requires_support() {
        let mut can = CanMessage::new(NetId::HsCan, 0x100, vec![0; 12]);
        can.fd = true;
        let msg = Message::Can(can);

        assert_eq!(
            Encoder::default().encode(&msg),
            Err(ProtocolError::CanFdNotSupported)
        );

        let fd = Encoder::new(
            FramingConfig::default(),
            EncoderConfig {
                support_canfd: true,
                ..EncoderConfig::default()
            },
        );
        let bytes = fd.encode(&msg).unwrap();
        assert_eq!(bytes[6], CAN_FD_DESCRIPTOR);
    }

    #[test]
    fn test_classic_limits() {
        let encoder = Encoder::default();

        let long = CanMessage::new(NetId::HsCan, 0x100, vec![0; 9]);
        assert_eq!(
            encoder.encode(&Message::Can(long)),
            Err(ProtocolError::PayloadTooLarge { size: 9, max: 8 })
        );

        let mut brs = CanMessage::new(NetId::HsCan, 0x100, vec![0; 2]);
        brs.bitrate_switch = true;
        assert_eq!(
            encoder.encode(&Message::Can(brs)),
            Err(ProtocolError::NonCanonical("bit-rate switch without FD"))
        );

        let wide = CanMessage::new(NetId::HsCan, 0x2000_0000, vec![]);
        assert!(matches!(
            encoder.encode(&Message::Can(wide)),
            Err(ProtocolError::NonCanonical(_))
        ));
    }

    #[test]
    fn test_fd_data_limit() {
        let mut can = CanMessage::new(NetId::HsCan, 0x100, vec![0; 65]);
        can.fd = true;
        let encoder = Encoder::new(
            FramingConfig::default(),
            EncoderConfig {
                support_canfd: true,
                ..EncoderConfig::default()
            },
        );
        assert!(matches!(
            encoder.encode(&Message::Can(can)),
            Err(ProtocolError::PayloadTooLarge { size: 65, max: 64 })
        ));
    }
}
