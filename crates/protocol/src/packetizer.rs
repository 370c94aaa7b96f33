//! Frame reassembly and serialization
//!
//! Devices speak a byte stream of frames that transports may split or
//! coalesce arbitrarily. The [`Packetizer`] buffers incoming bytes and yields
//! complete, checksum-validated frames regardless of chunk boundaries.
//!
//! # Frame Format
//!
//! ```text
//! short: [0xAA][len << 4 | netid][payload: len bytes][checksum]?[pad]?
//! long:  [0xAA][0x00][total_len: u16 LE][netid: u16 LE][payload][pad]?
//! ```
//!
//! Short frames carry 1-15 payload bytes on networks 0-15 and end with a
//! checksum unless the device family disables it. Long frames count their
//! length from the sync byte through the last payload byte and never carry a
//! checksum. With 16-bit alignment an odd-sized frame is followed by one pad
//! byte.
//!
//! # Example
//!
//! ```
//! use protocol::{FramingConfig, NetId, Packetizer};
//!
//! let framing = FramingConfig::default();
//! let wire = framing.wrap_short(NetId::Main51, &[0xA1]).unwrap();
//!
//! let mut packetizer = Packetizer::new(framing);
//! packetizer.input(&wire[..2]);
//! assert_eq!(packetizer.output().count(), 0);
//!
//! packetizer.input(&wire[2..]);
//! let frames: Vec<_> = packetizer.output().collect();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].data, vec![0xA1]);
//! ```

use crate::checksum::compute_frame_checksum;
use crate::error::{ProtocolError, Result};
use crate::network::NetId;
use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Marks the first byte of every frame
pub const SYNC_BYTE: u8 = 0xAA;

/// Sync byte plus header byte
pub const SHORT_HEADER_LEN: usize = 2;

/// Sync, format, length and network id
pub const LONG_HEADER_LEN: usize = 6;

/// Largest payload a short frame can describe with its length nibble
pub const MAX_SHORT_PAYLOAD: usize = 0x0F;

/// Largest accepted long frame, header included
pub const MAX_LONG_FRAME: usize = 4000;

/// Filler appended to odd-sized frames when 16-bit alignment is on
pub const PAD_BYTE: u8 = 0x00;

/// Per-family framing options
///
/// Both flags change the bytes on the wire, so they must match the device
/// family before any frame is parsed or produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramingConfig {
    /// The family omits the trailing checksum on short frames
    pub disable_checksum: bool,
    /// Frames are padded to an even byte count
    pub align_16bit: bool,
}

impl FramingConfig {
    fn padded(&self, frame_len: usize) -> usize {
        if self.align_16bit && frame_len % 2 == 1 {
            frame_len + 1
        } else {
            frame_len
        }
    }

    /// Serialize a short-format frame
    pub fn wrap_short(&self, network: NetId, payload: &[u8]) -> Result<Vec<u8>> {
        if !network.fits_short_header() {
            return Err(ProtocolError::UnknownNetwork(network.as_u16()));
        }
        if payload.is_empty() {
            return Err(ProtocolError::InvalidLength { length: 0 });
        }
        if payload.len() > MAX_SHORT_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_SHORT_PAYLOAD,
            });
        }

        let header = ((payload.len() as u8) << 4) | (network.as_u16() as u8 & 0x0F);
        let frame_len = SHORT_HEADER_LEN + payload.len() + usize::from(!self.disable_checksum);
        let mut frame = Vec::with_capacity(self.padded(frame_len));
        frame.push(SYNC_BYTE);
        frame.push(header);
        frame.extend_from_slice(payload);
        if !self.disable_checksum {
            frame.push(compute_frame_checksum(header, payload));
        }
        if frame.len() < self.padded(frame_len) {
            frame.push(PAD_BYTE);
        }
        Ok(frame)
    }

    /// Serialize a long-format frame
    pub fn wrap_long(&self, network: NetId, payload: &[u8]) -> Result<Vec<u8>> {
        let total = LONG_HEADER_LEN + payload.len();
        if total > MAX_LONG_FRAME {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_LONG_FRAME - LONG_HEADER_LEN,
            });
        }

        let mut frame = Vec::with_capacity(self.padded(total));
        frame.push(SYNC_BYTE);
        frame.push(0x00);
        frame.extend_from_slice(&(total as u16).to_le_bytes());
        frame.extend_from_slice(&network.as_u16().to_le_bytes());
        frame.extend_from_slice(payload);
        if frame.len() < self.padded(total) {
            frame.push(PAD_BYTE);
        }
        Ok(frame)
    }
}

/// Header style a frame arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    Short,
    Long,
}

impl FrameFormat {
    /// Format the encoder uses for a payload on `network`
    ///
    /// CAN always travels in long frames. Everything else is short when
    /// both the id and the payload fit.
    pub fn canonical(network: NetId, payload_len: usize) -> Self {
        if !network.is_can() && network.fits_short_header() && payload_len <= MAX_SHORT_PAYLOAD {
            FrameFormat::Short
        } else {
            FrameFormat::Long
        }
    }
}

/// A complete, validated frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Raw network id from the header
    pub network: u16,
    pub format: FrameFormat,
    /// Length field as found in the header (payload length for short
    /// frames, whole-frame length for long frames)
    pub declared_length: usize,
    /// Payload without header, checksum or padding
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl Packet {
    /// Known network for this frame, if any
    pub fn net_id(&self) -> Option<NetId> {
        NetId::from_u16(self.network)
    }
}

/// Counters for frames produced and bytes dropped during reassembly
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PacketizerStats {
    /// Frames yielded by `output()`
    pub frames: u64,
    /// Short frames rejected for a bad checksum
    pub checksum_failures: u64,
    /// Long frames rejected for an out-of-range length
    pub invalid_lengths: u64,
    /// Bytes skipped while searching for a sync byte
    pub discarded_bytes: u64,
}

enum Scan {
    Frame { packet: Packet, consumed: usize },
    NeedMore { needed: usize },
    BadChecksum { expected: u8, computed: u8 },
    BadLength { length: usize },
}

/// Inspect a buffer that starts with a sync byte
fn scan(buf: &[u8], framing: &FramingConfig) -> Scan {
    if buf.len() < SHORT_HEADER_LEN {
        return Scan::NeedMore {
            needed: SHORT_HEADER_LEN,
        };
    }

    let header = buf[1];
    let payload_len = usize::from(header >> 4);

    if payload_len != 0 {
        let has_checksum = !framing.disable_checksum;
        let frame_len = SHORT_HEADER_LEN + payload_len + usize::from(has_checksum);
        let total = framing.padded(frame_len);
        if buf.len() < total {
            return Scan::NeedMore { needed: total };
        }

        let payload = &buf[SHORT_HEADER_LEN..SHORT_HEADER_LEN + payload_len];
        if has_checksum {
            let expected = buf[SHORT_HEADER_LEN + payload_len];
            let computed = compute_frame_checksum(header, payload);
            if expected != computed {
                return Scan::BadChecksum { expected, computed };
            }
        }

        return Scan::Frame {
            packet: Packet {
                network: u16::from(header & 0x0F),
                format: FrameFormat::Short,
                declared_length: payload_len,
                data: payload.to_vec(),
            },
            consumed: total,
        };
    }

    if buf.len() < LONG_HEADER_LEN {
        return Scan::NeedMore {
            needed: LONG_HEADER_LEN,
        };
    }

    let length = usize::from(u16::from_le_bytes([buf[2], buf[3]]));
    let network = u16::from_le_bytes([buf[4], buf[5]]);
    if !(LONG_HEADER_LEN..=MAX_LONG_FRAME).contains(&length) {
        return Scan::BadLength { length };
    }

    let total = framing.padded(length);
    if buf.len() < total {
        return Scan::NeedMore { needed: total };
    }

    Scan::Frame {
        packet: Packet {
            network,
            format: FrameFormat::Long,
            declared_length: length,
            data: buf[LONG_HEADER_LEN..length].to_vec(),
        },
        consumed: total,
    }
}

/// Parse exactly one wire frame
///
/// Unlike the streaming [`Packetizer`], nothing is skipped: the bytes must
/// start with the sync byte and contain one whole frame and nothing else.
pub fn parse_frame(bytes: &[u8], framing: &FramingConfig) -> Result<Packet> {
    match bytes.first() {
        Some(&SYNC_BYTE) => {}
        Some(_) => return Err(ProtocolError::MissingSyncByte),
        None => {
            return Err(ProtocolError::Incomplete {
                expected: SHORT_HEADER_LEN,
                actual: 0,
            });
        }
    }

    match scan(bytes, framing) {
        Scan::Frame { packet, consumed } if consumed == bytes.len() => {
            if consumed > unpadded_len(&packet, framing) && bytes[consumed - 1] != PAD_BYTE {
                return Err(ProtocolError::NonCanonical("non-zero alignment padding"));
            }
            Ok(packet)
        }
        Scan::Frame { .. } => Err(ProtocolError::InvalidLength {
            length: bytes.len(),
        }),
        Scan::NeedMore { needed } => Err(ProtocolError::Incomplete {
            expected: needed,
            actual: bytes.len(),
        }),
        Scan::BadChecksum { expected, computed } => {
            Err(ProtocolError::ChecksumMismatch { expected, computed })
        }
        Scan::BadLength { length } => Err(ProtocolError::InvalidLength { length }),
    }
}

fn unpadded_len(packet: &Packet, framing: &FramingConfig) -> usize {
    match packet.format {
        FrameFormat::Short => {
            SHORT_HEADER_LEN + packet.data.len() + usize::from(!framing.disable_checksum)
        }
        FrameFormat::Long => packet.declared_length,
    }
}

/// Streaming frame reassembler
#[derive(Debug)]
pub struct Packetizer {
    framing: FramingConfig,
    buffer: BytesMut,
    stats: PacketizerStats,
    /// A stream joined mid-frame produces checksum noise until the first
    /// good frame, so failures before that are only traced
    synced: bool,
}

impl Packetizer {
    pub fn new(framing: FramingConfig) -> Self {
        Self {
            framing,
            buffer: BytesMut::new(),
            stats: PacketizerStats::default(),
            synced: false,
        }
    }

    pub fn framing(&self) -> &FramingConfig {
        &self.framing
    }

    /// Append raw bytes from the transport
    pub fn input(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Frames currently available
    ///
    /// The iterator parses lazily and stops at the first incomplete frame,
    /// which stays buffered for a later call.
    pub fn output(&mut self) -> Frames<'_> {
        Frames { packetizer: self }
    }

    /// Bytes waiting for the rest of their frame
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> PacketizerStats {
        self.stats
    }

    /// Drop buffered bytes, keeping statistics
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.synced = false;
    }

    /// Serialize a short-format frame with this packetizer's framing
    pub fn wrap_short(&self, network: NetId, payload: &[u8]) -> Result<Vec<u8>> {
        self.framing.wrap_short(network, payload)
    }

    /// Serialize a long-format frame with this packetizer's framing
    pub fn wrap_long(&self, network: NetId, payload: &[u8]) -> Result<Vec<u8>> {
        self.framing.wrap_long(network, payload)
    }

    fn next_frame(&mut self) -> Option<Packet> {
        loop {
            let skip = self
                .buffer
                .iter()
                .position(|b| *b == SYNC_BYTE)
                .unwrap_or(self.buffer.len());
            if skip > 0 {
                trace!("Discarding {} bytes before sync", skip);
                self.stats.discarded_bytes += skip as u64;
                self.buffer.advance(skip);
            }
            if self.buffer.is_empty() {
                return None;
            }

            match scan(&self.buffer, &self.framing) {
                Scan::Frame { packet, consumed } => {
                    self.buffer.advance(consumed);
                    self.stats.frames += 1;
                    self.synced = true;
                    return Some(packet);
                }
                Scan::NeedMore { .. } => return None,
                Scan::BadChecksum { expected, computed } => {
                    self.stats.checksum_failures += 1;
                    if self.synced {
                        warn!(
                            "Dropping frame with bad checksum ({:#04x} != {:#04x})",
                            expected, computed
                        );
                    } else {
                        debug!("Checksum mismatch before first good frame");
                    }
                    self.buffer.advance(1);
                }
                Scan::BadLength { length } => {
                    self.stats.invalid_lengths += 1;
                    warn!("Dropping long frame with invalid length {}", length);
                    self.buffer.advance(1);
                }
            }
        }
    }
}

/// Lazy iterator over complete frames, see [`Packetizer::output`]
pub struct Frames<'a> {
    packetizer: &'a mut Packetizer,
}

impl Iterator for Frames<'_> {
    type Item = Packet;

    fn next(&mut self) -> Option<Packet> {
        self.packetizer.next_frame()
    }
}
