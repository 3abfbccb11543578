//! Tests for the device session lifecycle and its I/O ports.

use std::sync::Arc;
use std::time::Duration;

use smartnic_agent::device::{
    DeviceConfig, DeviceError, DeviceSession, LinkState, LoopbackDriver, PciAddress,
};
use smartnic_agent::dispatch::{DispatcherConfig, InferenceDispatcher, InferenceRequest};
use smartnic_agent::provider::{EchoProvider, InferenceProvider};
use smartnic_agent::ring::DescFlags;

const DEVICE: &str = "0000:00:00.0";

fn small_config() -> DeviceConfig {
    DeviceConfig { ring_capacity: 4, frame_size: 256 }
}

fn open(driver: &Arc<LoopbackDriver>) -> DeviceSession {
    DeviceSession::open(DEVICE, small_config(), driver.clone()).unwrap()
}

#[test]
fn test_open_brings_link_up() {
    let driver = Arc::new(LoopbackDriver::default());
    let session = open(&driver);
    assert_eq!(session.state(), LinkState::Up);
    assert_eq!(session.handle().address(), PciAddress::default());
    assert!(driver.is_open(PciAddress::default()));
    assert_eq!(session.stats().unwrap(), Default::default());
}

#[test]
fn test_open_unknown_function_is_not_found() {
    let driver = Arc::new(LoopbackDriver::default());
    let err = DeviceSession::open("0000:01:00.0", small_config(), driver).unwrap_err();
    assert!(matches!(err, DeviceError::NotFound(_)));
}

#[test]
fn test_open_malformed_id_is_config_invalid() {
    let driver = Arc::new(LoopbackDriver::default());
    let err = DeviceSession::open("eth0", small_config(), driver).unwrap_err();
    assert!(matches!(err, DeviceError::ConfigInvalid(_)));
}

#[test]
fn test_open_bad_geometry_is_config_invalid() {
    let driver = Arc::new(LoopbackDriver::default());
    for config in [
        DeviceConfig { ring_capacity: 6, frame_size: 256 },
        DeviceConfig { ring_capacity: 8, frame_size: 1 << 20 },
    ] {
        let err = DeviceSession::open(DEVICE, config, driver.clone()).unwrap_err();
        assert!(matches!(err, DeviceError::ConfigInvalid(_)));
    }
    assert!(!driver.is_open(PciAddress::default()));
}

#[test]
fn test_sessions_get_distinct_ids() {
    let addrs = [PciAddress::new(0, 0, 0, 0), PciAddress::new(0, 0, 0, 1)];
    let driver = Arc::new(LoopbackDriver::new(addrs));
    let a = DeviceSession::open("0000:00:00.0", small_config(), driver.clone()).unwrap();
    let b = DeviceSession::open("0000:00:00.1", small_config(), driver.clone()).unwrap();
    assert_ne!(a.handle().session_id(), b.handle().session_id());
    assert_ne!(a.handle().queues(), b.handle().queues());
}

#[test]
fn test_io_ports_are_taken_once() {
    let driver = Arc::new(LoopbackDriver::default());
    let session = open(&driver);
    assert!(session.take_io().is_ok());
    assert!(matches!(session.take_io(), Err(DeviceError::PortsTaken)));
}

#[test]
fn test_rx_and_tx_move_frames_and_count() {
    let addr = PciAddress::default();
    let driver = Arc::new(LoopbackDriver::default().with_tx_budget(2));
    let session = open(&driver);
    let mut io = session.take_io().unwrap();

    for i in 0..6u8 {
        driver.inject(addr, vec![i; 3], DescFlags::empty()).unwrap();
    }
    // Ring holds 4; the rest wait in the driver.
    assert_eq!(io.rx.poll().unwrap(), 4);
    let mut seen = Vec::new();
    while let Some(slot) = io.rx.next().unwrap() {
        seen.push(slot.payload()[0]);
    }
    assert_eq!(io.rx.poll().unwrap(), 2);
    while let Some(slot) = io.rx.next().unwrap() {
        seen.push(slot.payload()[0]);
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);

    for i in 0..4u8 {
        assert!(io.tx.try_send(&[i], DescFlags::RESPONSE).unwrap());
    }
    assert!(!io.tx.try_send(&[9], DescFlags::RESPONSE).unwrap(), "full ring reports false");
    assert_eq!(io.tx.flush().unwrap(), 2);
    assert_eq!(io.tx.backlog(), 2);
    assert_eq!(io.tx.flush().unwrap(), 2);
    assert_eq!(driver.take_transmitted(addr), vec![vec![0], vec![1], vec![2], vec![3]]);

    let stats = session.stats().unwrap();
    assert_eq!(stats.packets_received, 6);
    assert_eq!(stats.packets_sent, 4);
    assert_eq!(session.raw_stats().unwrap().tx_frames, 4);
}

#[test]
fn test_oversized_rx_frame_counts_as_dropped() {
    let addr = PciAddress::default();
    let driver = Arc::new(LoopbackDriver::default());
    let session = open(&driver);
    let mut io = session.take_io().unwrap();

    driver.inject(addr, vec![1u8; 300], DescFlags::NEEDS_INFERENCE).unwrap();
    driver.inject(addr, vec![2u8; 10], DescFlags::empty()).unwrap();
    assert_eq!(io.rx.poll().unwrap(), 1);
    assert_eq!(io.rx.next().unwrap().unwrap().payload(), &[2u8; 10][..]);

    let stats = session.stats().unwrap();
    assert_eq!(stats.packets_received, 1);
    assert_eq!(stats.packets_dropped, 1);
    assert_eq!(session.raw_stats().unwrap().rx_oversized, 1);

    // Already folded in; a quiet poll adds nothing.
    assert_eq!(io.rx.poll().unwrap(), 0);
    assert_eq!(session.stats().unwrap().packets_dropped, 1);
}

#[test]
fn test_oversized_send_is_an_error() {
    let driver = Arc::new(LoopbackDriver::default());
    let session = open(&driver);
    let mut io = session.take_io().unwrap();
    let err = io.tx.try_send(&[0u8; 300], DescFlags::empty()).unwrap_err();
    assert!(matches!(err, DeviceError::FrameTooLarge { len: 300, max: 256 }));
}

#[tokio::test]
async fn test_io_after_close_fails_with_session_closed() {
    let driver = Arc::new(LoopbackDriver::default());
    let session = open(&driver);
    let mut io = session.take_io().unwrap();

    session.close().await;
    assert_eq!(session.state(), LinkState::Closed);
    assert!(!driver.is_open(PciAddress::default()));

    assert!(matches!(io.rx.poll(), Err(DeviceError::SessionClosed)));
    assert!(matches!(io.rx.next(), Err(DeviceError::SessionClosed)));
    assert!(matches!(io.tx.try_send(b"x", DescFlags::empty()), Err(DeviceError::SessionClosed)));
    assert!(matches!(io.tx.flush(), Err(DeviceError::SessionClosed)));
    assert!(matches!(session.stats(), Err(DeviceError::SessionClosed)));
    assert!(matches!(session.take_io(), Err(DeviceError::SessionClosed)));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let driver = Arc::new(LoopbackDriver::default());
    let session = open(&driver);
    session.close().await;
    session.close().await;
    assert_eq!(session.state(), LinkState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_resolves_inflight_requests_before_returning() {
    let driver = Arc::new(LoopbackDriver::default());
    let session = open(&driver);

    let provider = Arc::new(EchoProvider::with_latency(Duration::from_secs(60)));
    provider.load("distilgpt2").await.unwrap();
    let dispatcher = Arc::new(InferenceDispatcher::start(
        DispatcherConfig { max_inflight: 16, concurrency: 2, default_deadline: Duration::from_secs(120) },
        provider,
        session.counters(),
    ));
    let mut results = dispatcher.take_results().unwrap();
    session.attach_dispatcher(dispatcher.clone()).unwrap();

    const N: u64 = 5;
    for i in 0..N {
        let req = InferenceRequest::with_timeout(format!("prompt {i}"), 8, Duration::from_secs(120));
        dispatcher.submit(req).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    let report = session.close().await;
    assert_eq!(report.resolved, N);
    assert_eq!(dispatcher.inflight(), 0);

    let mut resolved = 0;
    while let Ok(result) = results.try_recv() {
        assert!(result.outcome.state().is_terminal());
        resolved += 1;
    }
    assert_eq!(resolved, N);
}
