//! Frame checksum
//!
//! Short-format frames end with a one-byte additive checksum: the two's
//! complement of the byte sum of the header byte and the payload, so that
//! header + payload + checksum sums to zero modulo 256.
//!
//! ```
//! use protocol::checksum::{compute_checksum, verify_checksum};
//!
//! // RequestSerialNumber on Main51: header 0x1B, command 0xA1
//! let checksum = compute_checksum(&[0x1B, 0xA1]);
//! assert_eq!(checksum, 0x44);
//! assert!(verify_checksum(&[0x1B, 0xA1], 0x44));
//! ```

/// Compute the checksum for the covered bytes
#[inline]
pub fn compute_checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    (!sum).wrapping_add(1)
}

/// Verify a trailing checksum byte against the covered bytes
#[inline]
pub fn verify_checksum(data: &[u8], expected: u8) -> bool {
    compute_checksum(data) == expected
}

/// Checksum over a header byte followed by a payload, without concatenating
#[inline]
pub fn compute_frame_checksum(header: u8, payload: &[u8]) -> u8 {
    let sum = payload.iter().fold(header, |acc, b| acc.wrapping_add(*b));
    (!sum).wrapping_add(1)
}
