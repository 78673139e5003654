//! Integration tests for the bridge worker.
//!
//! These run a real worker thread against the in-memory adapter and check
//! the behaviour clients see:
//! - Admission while offline fails immediately
//! - Inbound frames reach the matching reader
//! - Queued writes are sent with the station header
//! - Link loss fails queued requests exactly once
//! - Shutdown takes the adapter offline and drains subscriptions
//! - Subscriptions made after shutdown complete instead of hanging

use daynalink_core::{Error, Settings};
use daynalink_net::{
    Bridge, BridgeConfig, BridgeHandle, EventMask, IoError, IoRequest, MockTransport, Submission,
    Ticket, VecBuffer, WireError, link_frame,
};
use smoltcp::wire::EthernetAddress;
use std::time::Duration;

const PEER: EthernetAddress = EthernetAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x99]);
const WAIT: Duration = Duration::from_secs(5);

fn test_config() -> BridgeConfig {
    BridgeConfig {
        probe_interval: Duration::from_millis(20),
        ..BridgeConfig::default()
    }
}

/// Start a bridge on `mock`, found at device index 4.
fn start_bridge(mock: &MockTransport) -> Bridge {
    let settings = Settings {
        device_id: Some(4),
        ..Settings::default()
    };
    let mock = mock.clone();
    Bridge::open(&settings, test_config(), move |_: &str| Ok(mock.clone()))
        .expect("Failed to start bridge")
}

async fn wait_for_link(handle: &BridgeHandle, online: bool) {
    tokio::time::timeout(WAIT, async {
        while handle.is_online() != online {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Link did not reach expected state");
}

async fn finish(ticket: Ticket) -> IoRequest {
    tokio::time::timeout(WAIT, ticket.wait())
        .await
        .expect("Request did not complete")
        .expect("Worker exited before completing request")
}

fn expect_queued(submission: Submission) -> Ticket {
    match submission {
        Submission::Queued(ticket) => ticket,
        Submission::Completed(request) => panic!("Request completed early: {request:?}"),
    }
}

#[tokio::test]
async fn test_read_while_offline_is_refused() {
    let mock = MockTransport::new();
    mock.state().lose_signal();
    let bridge = start_bridge(&mock);
    let handle = bridge.handle();

    let submission = handle.begin_io(IoRequest::read(0x0800, VecBuffer::with_capacity(1500)));
    let Submission::Completed(request) = submission else {
        panic!("Offline read was queued");
    };
    assert_eq!(request.error, Some(IoError::OutOfService));
    assert_eq!(request.wire_error, Some(WireError::UnitOffline));

    bridge.shutdown().await.expect("Shutdown failed");
}

#[tokio::test]
async fn test_inbound_frame_reaches_reader() {
    let mock = MockTransport::new();
    let bridge = start_bridge(&mock);
    let handle = bridge.handle();
    wait_for_link(&handle, true).await;

    let first = expect_queued(handle.begin_io(IoRequest::read(0x0800, VecBuffer::with_capacity(1500))));
    let second = expect_queued(handle.begin_io(IoRequest::read(0x0800, VecBuffer::with_capacity(1500))));
    mock.push_inbound(link_frame(handle.station_address(), PEER, 0x0800, b"first"));

    let request = finish(first).await;
    assert!(request.is_ok());
    assert_eq!(request.payload(), Some(&b"first"[..]));
    assert_eq!(request.packet_type, 0x0800);
    assert_eq!(request.src_addr, PEER);

    mock.push_inbound(link_frame(handle.station_address(), PEER, 0x0800, b"second"));
    assert_eq!(finish(second).await.payload(), Some(&b"second"[..]));
    assert_eq!(handle.global_stats().packets_received, 2);

    bridge.shutdown().await.expect("Shutdown failed");
}

#[tokio::test]
async fn test_orphan_reader_takes_unclaimed_type() {
    let mock = MockTransport::new();
    let bridge = start_bridge(&mock);
    let handle = bridge.handle();
    wait_for_link(&handle, true).await;

    let typed = expect_queued(handle.begin_io(IoRequest::read(0x0800, VecBuffer::with_capacity(1500))));
    let orphan = expect_queued(handle.begin_io(IoRequest::read_orphan(VecBuffer::with_capacity(1500))));
    mock.push_inbound(link_frame(EthernetAddress::BROADCAST, PEER, 0x0806, &[7; 28]));

    let request = finish(orphan).await;
    assert_eq!(request.packet_type, 0x0806);
    assert_eq!(request.data_length, 28);
    assert_eq!(handle.global_stats().unknown_types_received, 1);

    assert!(handle.abort_io(typed.id()));
    assert_eq!(finish(typed).await.error, Some(IoError::Aborted));

    bridge.shutdown().await.expect("Shutdown failed");
}

#[tokio::test]
async fn test_writes_are_sent() {
    let mock = MockTransport::new();
    let bridge = start_bridge(&mock);
    let handle = bridge.handle();
    wait_for_link(&handle, true).await;

    let tickets: Vec<_> = (0..9u8)
        .map(|i| {
            expect_queued(handle.begin_io(IoRequest::write(
                PEER,
                0x0800,
                1,
                VecBuffer::from_payload(vec![i]),
            )))
        })
        .collect();
    for ticket in tickets {
        assert!(finish(ticket).await.is_ok());
    }

    let sent = mock.sent_frames();
    assert_eq!(sent.len(), 9);
    assert_eq!(sent[0], link_frame(PEER, handle.station_address(), 0x0800, &[0]));
    assert_eq!(sent[8], link_frame(PEER, handle.station_address(), 0x0800, &[8]));
    assert_eq!(handle.global_stats().packets_sent, 9);

    bridge.shutdown().await.expect("Shutdown failed");
}

#[tokio::test]
async fn test_signal_loss_fails_queued_requests_once() {
    let mock = MockTransport::new();
    let bridge = start_bridge(&mock);
    let handle = bridge.handle();
    wait_for_link(&handle, true).await;

    let read = expect_queued(handle.begin_io(IoRequest::read(0x0800, VecBuffer::with_capacity(1500))));
    let offline = expect_queued(handle.begin_io(IoRequest::on_event(EventMask::OFFLINE)));
    mock.state().lose_signal();

    let request = finish(read).await;
    assert_eq!(request.error, Some(IoError::OutOfService));
    assert_eq!(finish(offline).await.events, EventMask::OFFLINE);
    assert!(!handle.is_online());

    mock.state().restore_signal();
    wait_for_link(&handle, true).await;
    assert_eq!(mock.state().enable_calls, vec![true, false, true]);

    bridge.shutdown().await.expect("Shutdown failed");
}

#[tokio::test]
async fn test_offline_request_takes_link_down() {
    let mock = MockTransport::new();
    let bridge = start_bridge(&mock);
    let handle = bridge.handle();
    wait_for_link(&handle, true).await;

    handle.set_online(false);
    wait_for_link(&handle, false).await;
    assert!(!mock.state().enabled);

    handle.set_online(true);
    wait_for_link(&handle, true).await;

    bridge.shutdown().await.expect("Shutdown failed");
}

#[tokio::test]
async fn test_shutdown_drains_subscriptions() {
    let mock = MockTransport::new();
    let bridge = start_bridge(&mock);
    let handle = bridge.handle();
    wait_for_link(&handle, true).await;

    let offline = expect_queued(handle.begin_io(IoRequest::on_event(EventMask::OFFLINE)));
    let errors = expect_queued(handle.begin_io(IoRequest::on_event(EventMask::ERROR)));
    let read = expect_queued(handle.begin_io(IoRequest::read(0x86dd, VecBuffer::with_capacity(64))));

    bridge.shutdown().await.expect("Shutdown failed");

    assert!(finish(offline).await.is_ok());
    assert_eq!(finish(errors).await.error, Some(IoError::OutOfService));
    assert_eq!(finish(read).await.error, Some(IoError::OutOfService));
    assert!(!mock.state().enabled);
    assert!(!handle.is_online());
}

#[tokio::test]
async fn test_subscription_after_shutdown_completes() {
    let mock = MockTransport::new();
    let bridge = start_bridge(&mock);
    let handle = bridge.handle();
    wait_for_link(&handle, true).await;

    bridge.shutdown().await.expect("Shutdown failed");

    let submission = handle.begin_io(IoRequest::on_event(EventMask::ONLINE | EventMask::ERROR));
    let request = tokio::time::timeout(WAIT, submission.wait())
        .await
        .expect("Subscription after shutdown did not complete")
        .expect("Subscription after shutdown was dropped");
    assert_eq!(request.error, Some(IoError::OutOfService));
    assert_eq!(request.wire_error, Some(WireError::UnitOffline));
}

#[tokio::test]
async fn test_start_fails_for_foreign_device() {
    let mock = MockTransport::new();
    mock.state().set_identity("IOMEGA", "ZIP 100");
    let settings = Settings {
        device_id: Some(4),
        ..Settings::default()
    };
    let result = Bridge::open(&settings, test_config(), move |_: &str| Ok(mock.clone()));
    assert!(matches!(result, Err(Error::NotTargetDevice)));
}
