//! Wire protocol for vehicle-network adapters
//!
//! This crate turns the byte stream spoken by an adapter into typed messages
//! and back. It has no threads and performs no I/O:
//!
//! - [`Packetizer`] reassembles checksummed frames from arbitrary chunks
//! - [`Decoder`] and [`Encoder`] convert frame payloads to and from [`Message`]
//! - [`EthernetPacketizer`] wraps device frames into vendor link frames for
//!   adapters attached over raw Ethernet
//!
//! # Example
//!
//! ```
//! use protocol::{Decoder, Encoder, FramingConfig, Message, Packetizer};
//! use protocol::{NetId, SerialNumberMessage};
//!
//! let report = Message::SerialNumber(SerialNumberMessage {
//!     network: NetId::Main51,
//!     serial_number: 1234,
//!     mac_address: None,
//! });
//! let wire = Encoder::default().encode(&report).unwrap();
//!
//! let mut packetizer = Packetizer::new(FramingConfig::default());
//! for byte in &wire {
//!     packetizer.input(&[*byte]);
//! }
//! let packet = packetizer.output().next().unwrap();
//! assert_eq!(Decoder::default().decode(&packet).unwrap(), report);
//! ```

pub mod checksum;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod ethernet;
pub mod message;
pub mod network;
pub mod packetizer;

pub use decoder::{DEFAULT_TIMESTAMP_RESOLUTION_NS, Decoder, DecoderConfig};
pub use encoder::{Encoder, EncoderConfig};
pub use error::{ProtocolError, Result};
pub use ethernet::{
    EthernetPacket, EthernetPacketizer, LINK_HEADER_LEN, MAX_LINK_FRAME, MAX_LINK_PAYLOAD,
    MacAddress, VENDOR_ETHERTYPE,
};
pub use message::{
    CanMessage, Command, CommandMessage, Message, MessageKind, SerialNumberMessage, lookup,
    serial_from_string, serial_to_string,
};
pub use network::{NetId, NetworkClass};
pub use packetizer::{
    FrameFormat, FramingConfig, Packet, Packetizer, PacketizerStats, SYNC_BYTE, parse_frame,
};
