//! Protocol error types

use thiserror::Error;

/// Framing and decoding errors
///
/// Every variant is recoverable: a frame that fails to parse or decode is
/// skipped and the stream continues with the next one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Not enough bytes to complete the operation
    #[error("Incomplete frame: expected {expected} bytes, got {actual}")]
    Incomplete { expected: usize, actual: usize },

    /// The first byte of a wire frame was not the sync marker
    #[error("Missing sync byte")]
    MissingSyncByte,

    /// Trailing checksum byte does not match the frame contents
    #[error("Checksum mismatch: frame carries {expected:#04x}, computed {computed:#04x}")]
    ChecksumMismatch { expected: u8, computed: u8 },

    /// Long-format length field outside the accepted range
    #[error("Invalid frame length: {length}")]
    InvalidLength { length: usize },

    /// Network id not known to this library
    #[error("Unknown network id: {0}")]
    UnknownNetwork(u16),

    /// No message registered for this (network, command) pair
    #[error("Unsupported message: network {network}, command {command:#04x}")]
    UnsupportedMessage { network: u16, command: u8 },

    /// Payload does not fit in the selected frame format
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// CAN FD message given to an encoder without CAN FD support
    #[error("CAN FD frames are not supported by this encoder")]
    CanFdNotSupported,

    /// Fields that the canonical layout cannot carry, such as reserved
    /// bits, a header format other than the one the encoder picks, or a
    /// CAN FD layout without the FD flag
    #[error("Non-canonical frame: {0}")]
    NonCanonical(&'static str),

    /// Malformed link-layer frame
    #[error("Invalid Ethernet frame: {0}")]
    InvalidEthernetFrame(&'static str),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
