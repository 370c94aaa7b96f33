//! Discovery Integration Tests
//!
//! Runs discovery through a `SessionManager` against the mock link.
//!
//! # Test Scenarios
//! - Handle construction from interface index and device MAC
//! - Merging of several responses per device
//! - Response filtering
//! - Interfaces skipped for missing OS names or open failures
//! - Enumeration retries and capture-layer failures
//! - Registry growth and handle validity
//!
//! Run with: `cargo test -p driver --test discovery_tests`

use common::test_utils::{
    device_mac, discovery_response, foreign_frame, link_frame, serial_report_frame,
};
use common::{EventKind, EventStream, Severity, create_event_channel};
use driver::link::mock::MockLinkProvider;
use driver::{Config, DeviceHandle, DiscoveryConfig, NetworkInterface, SessionManager};
use protocol::{Decoder, EthernetPacket, FramingConfig, MacAddress};
use std::sync::Arc;

// ============================================================================
// Test Utilities
// ============================================================================

fn host_mac(index: u8) -> MacAddress {
    MacAddress([0x02, 0x00, 0x00, 0x00, 0x10, index])
}

fn iface(index: u8) -> NetworkInterface {
    NetworkInterface {
        name: format!("cap{}", index),
        os_name: format!("eth{}", index),
        description: String::new(),
        mac: host_mac(index),
    }
}

fn manager_with(
    interfaces: Vec<NetworkInterface>,
) -> (SessionManager, Arc<MockLinkProvider>, EventStream) {
    let provider = Arc::new(MockLinkProvider::with_interfaces(interfaces));
    let config = Config {
        discovery: DiscoveryConfig {
            response_window_ms: 20,
            ..DiscoveryConfig::default()
        },
        ..Config::default()
    };
    let (sink, events) = create_event_channel(64);
    let manager = SessionManager::new(provider.clone(), config, sink);
    (manager, provider, events)
}

// ============================================================================
// Handles and Merging
// ============================================================================

#[test]
fn test_response_on_third_interface() {
    let (manager, provider, _events) = manager_with((0..3).map(iface).collect());
    let device = MacAddress([0x00, 0xFC, 0x70, 0x01, 0x02, 0x03]);
    provider.script_inbound("cap2", vec![discovery_response(device, &[0xAA, 0x01])]);

    let found = manager.find_all();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].handle, DeviceHandle(0x0201_0203));
    assert_eq!(found[0].discovery_packets, vec![vec![0xAA, 0x01]]);
    assert!(manager.is_handle_valid(found[0].handle));
}

#[test]
fn test_responses_merged_per_device() {
    let (manager, provider, _events) = manager_with(vec![iface(0)]);
    let first = device_mac([0x0A, 0x0B, 0x0C]);
    let second = device_mac([0x0A, 0x0B, 0x0D]);
    provider.script_inbound(
        "cap0",
        vec![
            discovery_response(first, &[1]),
            discovery_response(second, &[2]),
            link_frame(first, host_mac(0), &[3]),
        ],
    );

    let found = manager.find_all();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].handle, DeviceHandle::new(0, first));
    assert_eq!(found[0].discovery_packets, vec![vec![1], vec![3]]);
    assert_eq!(found[1].handle, DeviceHandle::new(0, second));
    assert_eq!(found[1].discovery_packets, vec![vec![2]]);
}

#[test]
fn test_same_device_on_two_interfaces() {
    let (manager, provider, _events) = manager_with(vec![iface(0), iface(1)]);
    let device = device_mac([1, 2, 3]);
    provider.script_inbound("cap0", vec![discovery_response(device, &[1])]);
    provider.script_inbound("cap1", vec![discovery_response(device, &[1])]);

    let handles: Vec<_> = manager.find_all().into_iter().map(|d| d.handle).collect();
    assert_eq!(
        handles,
        vec![DeviceHandle(0x0001_0203), DeviceHandle(0x0101_0203)]
    );
}

#[test]
fn test_serial_number_from_discovery() {
    let (manager, provider, _events) = manager_with(vec![iface(0)]);
    let framing = FramingConfig::default();
    provider.script_inbound(
        "cap0",
        vec![discovery_response(
            device_mac([4, 5, 6]),
            &serial_report_frame(123_456, &framing),
        )],
    );

    let found = manager.find_all();
    assert_eq!(
        found[0].serial_number(&framing, &Decoder::default()),
        Some(protocol::serial_to_string(123_456))
    );
}

// ============================================================================
// Filtering
// ============================================================================

#[test]
fn test_non_device_traffic_ignored() {
    let (manager, provider, _events) = manager_with(vec![iface(0)]);
    let device = device_mac([1, 2, 3]);
    provider.script_inbound(
        "cap0",
        vec![
            foreign_frame(device, host_mac(0)),
            link_frame(MacAddress([0x00, 0x11, 0x22, 1, 2, 3]), host_mac(0), &[1]),
            link_frame(device, host_mac(9), &[1]),
            vec![0xFF; 10],
        ],
    );

    assert!(manager.find_all().is_empty());
}

#[test]
fn test_request_broadcast_on_each_interface() {
    let (manager, provider, _events) = manager_with(vec![iface(0), iface(1)]);
    manager.find_all();

    for index in 0..2u8 {
        let session = provider.session(&format!("cap{}", index)).unwrap();
        let sent = session.sent();
        assert_eq!(sent.len(), 1);

        let request = EthernetPacket::parse(&sent[0]).unwrap();
        assert!(request.destination.is_broadcast());
        assert_eq!(request.source, host_mac(index));
        assert_eq!(request.payload, vec![0xAA, 0x1B, 0xA1, 0x44]);
        assert!(session.is_closed());
    }
}

// ============================================================================
// Skipped Interfaces and Enumeration Failures
// ============================================================================

#[test]
fn test_interface_without_os_name_skipped() {
    let mut hidden = iface(0);
    hidden.os_name = String::new();
    let (manager, provider, _events) = manager_with(vec![hidden, iface(1)]);
    provider.script_inbound("cap1", vec![discovery_response(device_mac([7, 7, 7]), &[1])]);

    let found = manager.find_all();
    assert!(provider.session("cap0").is_none());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].handle.interface_index(), 1);
}

#[test]
fn test_open_failure_skips_interface() {
    let (manager, provider, _events) = manager_with(vec![iface(0), iface(1)]);
    provider.fail_open("cap0");
    provider.script_inbound("cap1", vec![discovery_response(device_mac([7, 7, 7]), &[1])]);

    let found = manager.find_all();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].handle.interface_index(), 1);
}

#[test]
fn test_enumeration_retried() {
    let (manager, provider, events) = manager_with(vec![iface(0)]);
    provider.fail_enumeration(9);

    manager.find_all();
    assert_eq!(provider.enumeration_calls(), 10);
    assert_eq!(manager.interfaces().len(), 1);
    assert!(events.is_empty());
}

#[test]
fn test_enumeration_gives_up() {
    let (manager, provider, events) = manager_with(vec![iface(0)]);
    provider.fail_enumeration(10);

    assert!(manager.find_all().is_empty());
    assert_eq!(provider.enumeration_calls(), 10);
    assert!(manager.interfaces().is_empty());

    let event = events.try_recv().unwrap();
    assert_eq!(event.kind, EventKind::NoInterfacesFound);
    assert_eq!(event.severity, Severity::Error);
}

#[test]
fn test_capture_layer_unavailable() {
    let (manager, provider, events) = manager_with(vec![iface(0)]);
    provider.set_unavailable(true);

    assert!(manager.find_all().is_empty());
    assert_eq!(provider.enumeration_calls(), 1);
    assert_eq!(events.try_recv().unwrap().kind, EventKind::LinkUnavailable);
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_registry_is_append_only() {
    let (manager, provider, _events) = manager_with(vec![iface(0), iface(1)]);
    manager.find_all();
    manager.find_all();
    assert_eq!(manager.interfaces().len(), 2);

    provider.add_interface(iface(2));
    manager.find_all();
    let names: Vec<_> = manager.interfaces().into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["cap0", "cap1", "cap2"]);
}

#[test]
fn test_clear_registry_invalidates_handles() {
    let (manager, provider, _events) = manager_with(vec![iface(0)]);
    provider.script_inbound("cap0", vec![discovery_response(device_mac([1, 2, 3]), &[1])]);

    let handle = manager.find_all()[0].handle;
    assert!(manager.is_handle_valid(handle));

    manager.clear_registry();
    assert!(!manager.is_handle_valid(handle));
}

#[test]
fn test_found_device_opens() {
    let (manager, provider, _events) = manager_with(vec![iface(0)]);
    let device = device_mac([1, 2, 3]);
    provider.script_inbound("cap0", vec![discovery_response(device, &[1])]);

    let handle = manager.find_all()[0].handle;
    let (sink, _driver_events) = create_event_channel(16);
    let driver = manager.driver(handle, sink);

    driver.open().unwrap();
    assert!(driver.is_open());
    assert_eq!(provider.open_count(), 2);
    driver.close().unwrap();
}
