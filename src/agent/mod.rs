//! Composition root: wires a device session, its rings and the inference
//! dispatcher into the packet data path.
//!
//! ```text
//! NIC -> RX ring -> decode -> dispatcher -> provider
//!                                 |
//! NIC <- TX ring <- encode <- results
//! ```

pub mod codec;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc::UnboundedReceiver, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::{DeviceDriver, DeviceError, DeviceSession, RxPort, TxPort};
use crate::dispatch::{
    DispatchError, DrainReport, InferenceDispatcher, InferenceRequest, InferenceResult,
    PacketOrigin, RequestError, RequestId,
};
use crate::provider::{InferenceProvider, LoadError, ModelInfo};
use crate::ring::{DescFlags, PacketDescriptor};
use crate::stats::{Stats, StatsCounter};
use crate::telemetry;
use crate::AgentConfig;
use codec::Frame;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model load failed: {0}")]
    Load(#[from] LoadError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("agent startup failed: {0}")]
    Startup(&'static str),
}

type Waiters = Mutex<HashMap<RequestId, oneshot::Sender<InferenceResult>>>;

struct Pollers {
    rx: JoinHandle<()>,
    tx: JoinHandle<()>,
}

/// A running SmartNIC inference agent.
pub struct Agent {
    config: AgentConfig,
    session: Arc<DeviceSession>,
    dispatcher: Arc<InferenceDispatcher>,
    provider: Arc<dyn InferenceProvider>,
    counters: Arc<StatsCounter>,
    waiters: Arc<Waiters>,
    shutdown: CancellationToken,
    pollers: tokio::sync::Mutex<Option<Pollers>>,
}

impl Agent {
    /// Load the model, open the device and start the data path.
    pub async fn start(
        config: AgentConfig,
        driver: Arc<dyn DeviceDriver>,
        provider: Arc<dyn InferenceProvider>,
    ) -> Result<Self, AgentError> {
        telemetry::describe_metrics();
        provider.load(&config.model_name).await?;
        tracing::info!(model = %config.model_name, provider = provider.name(), "model loaded");

        let session = Arc::new(DeviceSession::open(
            &config.device_id,
            config.device,
            driver,
        )?);
        let counters = session.counters();
        let dispatcher = Arc::new(InferenceDispatcher::start(
            config.dispatcher.clone(),
            Arc::clone(&provider),
            Arc::clone(&counters),
        ));
        session.attach_dispatcher(Arc::clone(&dispatcher))?;

        let io = session.take_io()?;
        let results = dispatcher
            .take_results()
            .ok_or(AgentError::Startup("result channel already taken"))?;
        let waiters: Arc<Waiters> = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let rx = tokio::spawn(rx_loop(
            io.rx,
            RxContext {
                dispatcher: Arc::clone(&dispatcher),
                counters: Arc::clone(&counters),
                default_max_tokens: config.default_max_tokens,
                default_deadline: config.dispatcher.default_deadline,
            },
            config.poll_interval,
            shutdown.clone(),
        ));
        let tx = tokio::spawn(tx_loop(
            io.tx,
            results,
            TxContext {
                waiters: Arc::clone(&waiters),
                counters: Arc::clone(&counters),
                retry_limit: config.tx_retry_limit.max(1),
            },
            config.poll_interval,
        ));

        tracing::info!(device = %session.handle().address(), "agent started");
        Ok(Self {
            config,
            session,
            dispatcher,
            provider,
            counters,
            waiters,
            shutdown,
            pollers: tokio::sync::Mutex::new(Some(Pollers { rx, tx })),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    pub fn dispatcher(&self) -> &InferenceDispatcher {
        &self.dispatcher
    }

    /// Generate text for a request submitted through the API rather than
    /// the wire. `max_tokens == 0` selects the configured default.
    pub async fn infer(&self, text: impl Into<String>, max_tokens: usize) -> Result<String, AgentError> {
        let max_tokens = if max_tokens == 0 {
            self.config.default_max_tokens
        } else {
            max_tokens
        };
        let request = self.dispatcher.request(text, max_tokens);
        let id = request.id;
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(id, tx);

        if let Err(e) = self.dispatcher.submit(request) {
            self.waiters.lock().remove(&id);
            return Err(e.into());
        }
        let result = rx.await.map_err(|_| RequestError::ShuttingDown)?;
        Ok(result.outcome.into_result()?)
    }

    pub fn stats(&self) -> Stats {
        self.counters.snapshot()
    }

    pub fn model_info(&self) -> ModelInfo {
        self.provider.model_info()
    }

    /// Stop receiving, resolve every in-flight request, transmit what can
    /// still be transmitted and close the device. Idempotent.
    pub async fn shutdown(&self) -> DrainReport {
        let mut pollers = self.pollers.lock().await;
        let Some(Pollers { rx, tx }) = pollers.take() else {
            return DrainReport { resolved: 0 };
        };
        tracing::info!("agent shutting down");

        self.shutdown.cancel();
        if let Err(e) = rx.await {
            tracing::warn!(error = %e, "rx poller ended abnormally");
        }

        let tx_abort = tx.abort_handle();
        let drain = async {
            let report = self.dispatcher.shutdown().await;
            if let Err(e) = tx.await {
                tracing::warn!(error = %e, "tx poller ended abnormally");
            }
            report
        };
        let report = match tokio::time::timeout(self.config.shutdown_timeout, drain).await {
            Ok(report) => report,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.config.shutdown_timeout.as_secs(),
                    "shutdown timed out; abandoning in-flight work"
                );
                tx_abort.abort();
                DrainReport { resolved: 0 }
            }
        };

        let closed = self.session.close().await;
        self.waiters.lock().clear();
        let resolved = report.resolved + closed.resolved;
        tracing::info!(resolved, "agent stopped");
        DrainReport { resolved }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct RxContext {
    dispatcher: Arc<InferenceDispatcher>,
    counters: Arc<StatsCounter>,
    default_max_tokens: usize,
    default_deadline: Duration,
}

impl RxContext {
    fn handle_packet(&self, desc: PacketDescriptor, payload: &[u8]) {
        if desc.is_errored() {
            self.counters.add_errored("device");
            return;
        }
        if !desc.needs_inference() {
            return;
        }
        let (correlation_id, max_tokens, text) = match codec::decode(payload) {
            Ok(Frame::Request { correlation_id, max_tokens, text }) => (correlation_id, max_tokens, text),
            Ok(Frame::Response { correlation_id, .. }) => {
                tracing::debug!(correlation_id, "response frame on rx path");
                self.counters.add_errored("unexpected_kind");
                return;
            }
            Err(e) => {
                tracing::debug!(sequence = desc.sequence, error = %e, "undecodable frame");
                self.counters.add_errored("decode");
                return;
            }
        };

        let max_tokens = match max_tokens {
            0 => self.default_max_tokens,
            n => usize::from(n),
        };
        let request = InferenceRequest::with_timeout(text, max_tokens, self.default_deadline)
            .with_origin(PacketOrigin {
                correlation_id,
                sequence: desc.sequence,
            });
        match self.dispatcher.submit(request) {
            Ok(()) => {}
            Err(DispatchError::QueueFull { max_inflight }) => {
                tracing::warn!(correlation_id, max_inflight, "dispatch queue full; packet dropped");
                self.counters.add_dropped("queue_full");
            }
            Err(DispatchError::ShuttingDown) => {
                self.counters.add_dropped("shutting_down");
            }
        }
    }
}

fn port_stopped(e: &DeviceError) -> bool {
    matches!(e, DeviceError::SessionClosed | DeviceError::SessionNotReady(_))
}

async fn rx_loop(
    mut rx: RxPort,
    ctx: RxContext,
    poll_interval: Duration,
    shutdown: CancellationToken,
) {
    'poll: loop {
        if shutdown.is_cancelled() {
            break;
        }
        if let Err(e) = rx.poll() {
            if port_stopped(&e) {
                break;
            }
            tracing::warn!(error = %e, "rx poll failed");
        }

        let mut handled = 0usize;
        loop {
            let slot = match rx.next() {
                Ok(Some(slot)) => slot,
                Ok(None) => break,
                Err(_) => break 'poll,
            };
            ctx.handle_packet(slot.descriptor(), slot.payload());
            handled += 1;
        }

        if handled == 0 {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(poll_interval) => {}
            }
        } else {
            tokio::task::yield_now().await;
        }
    }
    tracing::debug!("rx poller stopped");
}

struct TxContext {
    waiters: Arc<Waiters>,
    counters: Arc<StatsCounter>,
    retry_limit: usize,
}

impl TxContext {
    async fn handle_result(&self, tx: &mut TxPort, buf: &mut Vec<u8>, result: InferenceResult) {
        let waiter = self.waiters.lock().remove(&result.id);
        if let Some(waiter) = waiter {
            // The caller may have given up; nothing to do then.
            let _ = waiter.send(result);
            return;
        }
        let Some(origin) = result.origin else {
            tracing::debug!(request_id = %result.id, "result has no recipient");
            return;
        };
        if let Err(e) = codec::encode_outcome(buf, origin.correlation_id, &result.outcome, tx.frame_size()) {
            tracing::warn!(correlation_id = origin.correlation_id, error = %e, "response encode failed");
            self.counters.add_errored("encode");
            return;
        }

        let mut attempts = 0;
        loop {
            match tx.try_send(buf, DescFlags::RESPONSE) {
                Ok(true) => break,
                Ok(false) => {
                    attempts += 1;
                    if attempts >= self.retry_limit {
                        tracing::warn!(
                            correlation_id = origin.correlation_id,
                            attempts,
                            "tx ring full; response dropped"
                        );
                        self.counters.add_dropped("tx_ring_full");
                        return;
                    }
                    if let Err(e) = tx.flush() {
                        tracing::debug!(error = %e, "flush during retry failed");
                    }
                    tokio::task::yield_now().await;
                }
                Err(e) => {
                    tracing::warn!(correlation_id = origin.correlation_id, error = %e, "response not sent");
                    self.counters.add_dropped("link_down");
                    return;
                }
            }
        }
        if let Err(e) = tx.flush() {
            tracing::debug!(error = %e, "flush failed");
        }
    }
}

async fn tx_loop(
    mut tx: TxPort,
    mut results: UnboundedReceiver<InferenceResult>,
    ctx: TxContext,
    poll_interval: Duration,
) {
    let mut buf = Vec::with_capacity(tx.frame_size());
    let mut tick = tokio::time::interval(poll_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            result = results.recv() => match result {
                Some(result) => ctx.handle_result(&mut tx, &mut buf, result).await,
                None => break,
            },
            _ = tick.tick(), if tx.backlog() > 0 => {
                if let Err(e) = tx.flush() {
                    if port_stopped(&e) {
                        break;
                    }
                    tracing::warn!(error = %e, "tx flush failed");
                }
            }
        }
    }

    if tx.backlog() > 0 {
        if let Err(e) = tx.flush() {
            tracing::debug!(error = %e, "final flush failed");
        }
    }
    tracing::debug!("tx poller stopped");
}
