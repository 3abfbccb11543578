//! End-to-end tests of the agent over the loopback driver.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use parking_lot::Mutex;

use smartnic_agent::agent::codec::{self, Frame, ResponseStatus};
use smartnic_agent::device::{DeviceError, LoopbackDriver, PciAddress};
use smartnic_agent::dispatch::{DispatchError, DispatcherConfig, RequestError};
use smartnic_agent::provider::{EchoProvider, GenError, InferenceProvider, LoadError, ModelInfo};
use smartnic_agent::ring::DescFlags;
use smartnic_agent::{Agent, AgentConfig, AgentError};

const FRAME: usize = 2048;

fn config() -> AgentConfig {
    AgentConfig {
        poll_interval: Duration::from_micros(100),
        shutdown_timeout: Duration::from_secs(5),
        ..AgentConfig::default()
    }
}

fn request_frame(correlation_id: u64, max_tokens: u16, text: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    codec::encode_request(&mut buf, correlation_id, max_tokens, text, FRAME).unwrap();
    buf
}

/// Poll the driver until `count` frames were transmitted or 5s pass.
async fn collect_tx(driver: &LoopbackDriver, count: usize) -> Vec<Vec<u8>> {
    let addr = PciAddress::default();
    let started = Instant::now();
    let mut frames = Vec::new();
    while frames.len() < count && started.elapsed() < Duration::from_secs(5) {
        frames.extend(driver.take_transmitted(addr));
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    frames
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    let started = Instant::now();
    while !check() && started.elapsed() < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_requests_on_the_wire_get_responses() {
    let addr = PciAddress::default();
    let driver = Arc::new(LoopbackDriver::default());
    let agent = Agent::start(config(), driver.clone(), Arc::new(EchoProvider::new()))
        .await
        .unwrap();

    for id in 0..3u64 {
        driver
            .inject(addr, request_frame(id, 0, &format!("question {id}")), DescFlags::NEEDS_INFERENCE)
            .unwrap();
    }
    driver.inject(addr, b"ordinary traffic".to_vec(), DescFlags::empty()).unwrap();
    driver.inject(addr, b"garbage".to_vec(), DescFlags::NEEDS_INFERENCE).unwrap();

    let frames = collect_tx(&driver, 3).await;
    assert_eq!(frames.len(), 3);
    let mut ids = Vec::new();
    for frame in &frames {
        match codec::decode(frame).unwrap() {
            Frame::Response { correlation_id, status, text } => {
                assert_eq!(status, ResponseStatus::Completed);
                assert_eq!(text, format!("[Generated response for: question {correlation_id}]"));
                ids.push(correlation_id);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
    ids.sort();
    assert_eq!(ids, vec![0, 1, 2]);

    wait_for(|| agent.stats().packets_sent == 3).await;
    let stats = agent.stats();
    assert_eq!(stats.packets_received, 5);
    assert_eq!(stats.packets_errored, 1);
    assert_eq!(stats.packets_sent, 3);
    assert_eq!(stats.inference_requests_completed, 3);

    agent.shutdown().await;
}

#[tokio::test]
async fn test_wire_max_tokens_truncates_output() {
    let addr = PciAddress::default();
    let driver = Arc::new(LoopbackDriver::default());
    let agent = Agent::start(config(), driver.clone(), Arc::new(EchoProvider::new()))
        .await
        .unwrap();

    driver
        .inject(addr, request_frame(9, 2, "a b c d"), DescFlags::NEEDS_INFERENCE)
        .unwrap();
    let frames = collect_tx(&driver, 1).await;
    let Frame::Response { text, .. } = codec::decode(&frames[0]).unwrap() else {
        panic!("expected response");
    };
    assert_eq!(text, "[Generated response");
    agent.shutdown().await;
}

#[tokio::test]
async fn test_direct_infer() {
    let driver = Arc::new(LoopbackDriver::default());
    let agent = Agent::start(config(), driver, Arc::new(EchoProvider::new()))
        .await
        .unwrap();

    let out = agent.infer("Hello, this is a test", 0).await.unwrap();
    assert_eq!(out, "[Generated response for: Hello, this is a test]");
    let info = agent.model_info();
    assert!(info.loaded);
    assert_eq!(info.name.as_deref(), Some("distilgpt2"));

    agent.shutdown().await;
    assert!(matches!(
        agent.infer("late", 0).await,
        Err(AgentError::Dispatch(DispatchError::ShuttingDown))
    ));
}

#[tokio::test]
async fn test_direct_infer_times_out() {
    let driver = Arc::new(LoopbackDriver::default());
    let mut cfg = config();
    cfg.dispatcher.default_deadline = Duration::from_millis(30);
    let provider = Arc::new(EchoProvider::with_latency(Duration::from_secs(10)));
    let agent = Agent::start(cfg, driver, provider).await.unwrap();

    assert!(matches!(
        agent.infer("slow", 5).await,
        Err(AgentError::Request(RequestError::DeadlineExceeded))
    ));
    assert_eq!(agent.stats().inference_requests_timed_out, 1);
    agent.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overload_drops_are_counted() {
    let addr = PciAddress::default();
    let driver = Arc::new(LoopbackDriver::default());
    let mut cfg = config();
    cfg.dispatcher = DispatcherConfig {
        max_inflight: 1,
        concurrency: 1,
        default_deadline: Duration::from_secs(5),
    };
    let provider = Arc::new(EchoProvider::with_latency(Duration::from_millis(100)));
    let agent = Agent::start(cfg, driver.clone(), provider).await.unwrap();

    for id in 0..5u64 {
        driver.inject(addr, request_frame(id, 0, "burst"), DescFlags::NEEDS_INFERENCE).unwrap();
    }
    wait_for(|| {
        let s = agent.stats();
        s.packets_received == 5 && s.inference_requests_completed + s.packets_dropped == 5
    })
    .await;

    let stats = agent.stats();
    assert!(stats.packets_dropped >= 1, "a burst of 5 into 1 slot must drop");
    let frames = collect_tx(&driver, stats.inference_requests_completed as usize).await;
    assert_eq!(frames.len() as u64 + stats.packets_dropped, 5);
    agent.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_answers_inflight_wire_requests() {
    let addr = PciAddress::default();
    let driver = Arc::new(LoopbackDriver::default());
    let provider = Arc::new(EchoProvider::with_latency(Duration::from_secs(60)));
    let agent = Agent::start(config(), driver.clone(), provider).await.unwrap();

    for id in 0..3u64 {
        driver.inject(addr, request_frame(id, 0, "stuck"), DescFlags::NEEDS_INFERENCE).unwrap();
    }
    wait_for(|| agent.dispatcher().inflight() == 3).await;

    let report = agent.shutdown().await;
    assert_eq!(report.resolved, 3);
    assert_eq!(agent.stats().inference_requests_shut_down, 3);

    let frames = driver.take_transmitted(addr);
    assert_eq!(frames.len(), 3);
    for frame in &frames {
        let Frame::Response { status, .. } = codec::decode(frame).unwrap() else {
            panic!("expected response");
        };
        assert_eq!(status, ResponseStatus::ShuttingDown);
    }

    assert!(!driver.is_open(addr));
    assert_eq!(agent.shutdown().await.resolved, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_tx_ring_drops_after_retries() {
    let addr = PciAddress::default();
    // The link never drains, so the TX ring fills and stays full.
    let driver = Arc::new(LoopbackDriver::default().with_tx_budget(0));
    let mut cfg = config();
    cfg.device.ring_capacity = 2;
    cfg.tx_retry_limit = 3;
    let agent = Agent::start(cfg, driver.clone(), Arc::new(EchoProvider::new()))
        .await
        .unwrap();

    for id in 0..5u64 {
        driver.inject(addr, request_frame(id, 0, "fill"), DescFlags::NEEDS_INFERENCE).unwrap();
    }
    wait_for(|| agent.stats().packets_dropped == 3).await;

    let stats = agent.stats();
    assert_eq!(stats.packets_received, 5);
    assert_eq!(stats.inference_requests_completed, 5);
    assert_eq!(stats.packets_dropped, 3);
    assert_eq!(stats.packets_sent, 0);
    assert!(driver.take_transmitted(addr).is_empty());
    assert_eq!(agent.session().raw_stats().unwrap().tx_frames, 0);

    agent.shutdown().await;
}

#[tokio::test]
async fn test_start_fails_for_unknown_device() {
    let driver = Arc::new(LoopbackDriver::default());
    let mut cfg = config();
    cfg.device_id = "0000:05:00.0".into();
    let err = Agent::start(cfg, driver, Arc::new(EchoProvider::new())).await.err().unwrap();
    assert!(matches!(err, AgentError::Device(DeviceError::NotFound(_))));
}

struct MissingModel;

#[async_trait]
impl InferenceProvider for MissingModel {
    fn name(&self) -> &str {
        "missing"
    }

    async fn load(&self, model_name: &str) -> Result<(), LoadError> {
        Err(LoadError::NotFound(model_name.to_string()))
    }

    async fn generate(&self, _: &str, _: usize, _: Duration) -> Result<String, GenError> {
        Err(GenError::NotLoaded)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo { loaded: false, name: None, backend: "missing".into() }
    }
}

#[tokio::test]
async fn test_start_fails_when_model_cannot_load() {
    let driver = Arc::new(LoopbackDriver::default());
    let err = Agent::start(config(), driver.clone(), Arc::new(MissingModel)).await.err().unwrap();
    assert!(matches!(err, AgentError::Load(LoadError::NotFound(_))));
    assert!(!driver.is_open(PciAddress::default()));
}

/// Recorder that only remembers which metrics were described.
#[derive(Default)]
struct DescribedNames(Mutex<Vec<String>>);

impl Recorder for DescribedNames {
    fn describe_counter(&self, key: KeyName, _: Option<Unit>, _: SharedString) {
        self.0.lock().push(key.as_str().to_string());
    }

    fn describe_gauge(&self, key: KeyName, _: Option<Unit>, _: SharedString) {
        self.0.lock().push(key.as_str().to_string());
    }

    fn describe_histogram(&self, key: KeyName, _: Option<Unit>, _: SharedString) {
        self.0.lock().push(key.as_str().to_string());
    }

    fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
        Counter::noop()
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

#[test]
fn test_start_describes_metrics() {
    let recorder = DescribedNames::default();
    metrics::with_local_recorder(&recorder, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let driver = Arc::new(LoopbackDriver::default());
            let agent = Agent::start(config(), driver, Arc::new(EchoProvider::new()))
                .await
                .unwrap();
            agent.shutdown().await;
        });
    });

    let names = recorder.0.lock();
    assert!(names.iter().any(|n| n == "smartnic_packets_dropped_total"));
    assert!(names.iter().any(|n| n == "smartnic_dispatch_queue_depth"));
    assert!(names.iter().any(|n| n == "smartnic_inference_latency_ms"));
}
