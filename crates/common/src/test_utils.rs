//! Test utilities for vnet-link
//!
//! Frame builders and timing helpers shared by the crates' test suites.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{device_mac, serial_report_frame};
//! use protocol::FramingConfig;
//!
//! let mac = device_mac([0x01, 0x02, 0x03]);
//! assert!(mac.has_vendor_prefix());
//! let frame = serial_report_frame(1234, &FramingConfig::default());
//! assert_eq!(frame[0], 0xAA);
//! ```

use protocol::{
    CanMessage, Encoder, EthernetPacket, FramingConfig, MacAddress, Message, NetId,
    SerialNumberMessage,
};
use std::future::Future;
use std::time::{Duration, Instant};

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Host interface address used throughout the test suites
pub const TEST_HOST_MAC: MacAddress = MacAddress([0x02, 0x00, 0x5E, 0x10, 0x00, 0x01]);

/// Device address with the vendor prefix
pub fn device_mac(suffix: [u8; 3]) -> MacAddress {
    MacAddress::from_vendor_suffix(suffix)
}

/// Link frame carrying `payload` from a device to `destination`
pub fn link_frame(source: MacAddress, destination: MacAddress, payload: &[u8]) -> Vec<u8> {
    EthernetPacket::new(destination, source, payload.to_vec()).to_bytes()
}

/// Discovery response as a device would broadcast it
pub fn discovery_response(source: MacAddress, payload: &[u8]) -> Vec<u8> {
    link_frame(source, MacAddress::BROADCAST, payload)
}

/// Link frame with an unrelated EtherType
pub fn foreign_frame(source: MacAddress, destination: MacAddress) -> Vec<u8> {
    let mut frame = link_frame(source, destination, &[0x45, 0x00]);
    frame[12] = 0x08;
    frame[13] = 0x00;
    frame
}

/// Framed serial-number report
pub fn serial_report_frame(serial: u32, framing: &FramingConfig) -> Vec<u8> {
    let message = Message::SerialNumber(SerialNumberMessage {
        network: NetId::Main51,
        serial_number: serial,
        mac_address: None,
    });
    encode(message, framing)
}

/// Framed classic CAN message on HS CAN
pub fn can_frame(arbitration_id: u32, data: &[u8], framing: &FramingConfig) -> Vec<u8> {
    let message = Message::Can(CanMessage::new(NetId::HsCan, arbitration_id, data.to_vec()));
    encode(message, framing)
}

fn encode(message: Message, framing: &FramingConfig) -> Vec<u8> {
    Encoder::new(*framing, Default::default())
        .encode(&message)
        .expect("test message must encode")
}

/// Timeout wrapper for async tests
///
/// # Example
/// ```ignore
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let event = with_timeout(DEFAULT_TEST_TIMEOUT, stream.recv()).await.unwrap();
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Poll `condition` from a plain thread until it holds or `timeout` elapses
///
/// Returns whether the condition was met. Used to observe state changed by
/// driver threads without sleeping for a fixed time.
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{Decoder, VENDOR_ETHERTYPE};

    #[test]
    fn test_discovery_response_is_broadcast() {
        let src = device_mac([0x01, 0x02, 0x03]);
        let frame = discovery_response(src, &[0xAA, 0x1B, 0xA1, 0x44]);
        let packet = EthernetPacket::parse(&frame).unwrap();

        assert!(packet.destination.is_broadcast());
        assert_eq!(packet.source, src);
        assert_eq!(packet.ether_type, VENDOR_ETHERTYPE);
        assert_eq!(packet.payload, vec![0xAA, 0x1B, 0xA1, 0x44]);
    }

    #[test]
    fn test_foreign_frame_rejected_by_parser() {
        let frame = foreign_frame(device_mac([1, 2, 3]), TEST_HOST_MAC);
        assert!(EthernetPacket::parse(&frame).is_err());
    }

    #[test]
    fn test_serial_report_decodes() {
        let framing = FramingConfig::default();
        let frame = serial_report_frame(4242, &framing);
        let decoded = Decoder::default().decode_bytes(&framing, &frame).unwrap();

        match decoded {
            Message::SerialNumber(report) => assert_eq!(report.serial_number, 4242),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_wait_until() {
        assert!(wait_until(Duration::from_millis(50), || true));
        assert!(!wait_until(Duration::from_millis(5), || false));

        let start = Instant::now();
        assert!(wait_until(DEFAULT_TEST_TIMEOUT, || start.elapsed()
            >= Duration::from_millis(3)));
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_failure() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert!(result.is_err());
    }
}
