//! Bounded-concurrency inference dispatcher.
//!
//! Decouples bursty packet arrival from a slower, variable-latency
//! provider. Admission is bounded by `max_inflight` (queued + running);
//! `concurrency` workers execute requests; results are delivered on a
//! single channel in completion order.
//!
//! Per-request lifecycle: `Queued -> Running -> {Completed, TimedOut,
//! Failed}`, or `ShuttingDown` when drained. Each accepted request yields
//! exactly one [`InferenceResult`].

mod error;
mod queue;
mod request;
mod worker;

pub use error::{DispatchError, RequestError};
pub use request::{
    InferenceRequest, InferenceResult, PacketOrigin, RequestId, RequestOutcome, RequestState,
};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::provider::InferenceProvider;
use crate::stats::StatsCounter;
use crate::telemetry;
use queue::PendingQueue;
use worker::Shared;

/// Configuration for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Maximum requests queued or running at once.
    pub max_inflight: usize,
    /// Number of worker tasks.
    pub concurrency: usize,
    /// Deadline applied by [`InferenceDispatcher::request`].
    pub default_deadline: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_inflight: 64,
            concurrency: 4,
            default_deadline: Duration::from_millis(1000),
        }
    }
}

/// Summary of a shutdown drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Requests resolved as `ShuttingDown` by this drain.
    pub resolved: u64,
}

pub struct InferenceDispatcher {
    shared: Arc<Shared>,
    config: DispatcherConfig,
    workers: Mutex<Vec<JoinHandle<()>>>,
    results_rx: Mutex<Option<UnboundedReceiver<InferenceResult>>>,
}

impl InferenceDispatcher {
    /// Spawn the worker pool. Must be called within a tokio runtime.
    pub fn start(
        config: DispatcherConfig,
        provider: Arc<dyn InferenceProvider>,
        stats: Arc<StatsCounter>,
    ) -> Self {
        let max_inflight = config.max_inflight.max(1);
        let concurrency = config.concurrency.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            queue: PendingQueue::new(max_inflight),
            provider,
            stats,
            results: Mutex::new(Some(tx)),
            shutdown: CancellationToken::new(),
        });
        let workers = worker::spawn_workers(&shared, concurrency);
        tracing::info!(
            max_inflight,
            concurrency,
            provider = shared.provider.name(),
            "inference dispatcher started"
        );

        Self {
            shared,
            config,
            workers: Mutex::new(workers),
            results_rx: Mutex::new(Some(rx)),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Build a request with the configured default deadline.
    pub fn request(&self, input: impl Into<String>, max_tokens: usize) -> InferenceRequest {
        InferenceRequest::with_timeout(input, max_tokens, self.config.default_deadline)
    }

    /// Admit a request without blocking.
    pub fn submit(&self, request: InferenceRequest) -> Result<(), DispatchError> {
        let id = request.id;
        let inflight = self.shared.queue.push(request)?;
        telemetry::record_queue_depth(inflight);
        tracing::debug!(request_id = %id, inflight, state = ?RequestState::Queued, "request admitted");
        Ok(())
    }

    /// Submit several requests; each is admitted or rejected on its own.
    pub fn submit_batch(
        &self,
        requests: Vec<InferenceRequest>,
    ) -> Vec<Result<RequestId, DispatchError>> {
        tracing::info!(count = requests.len(), "submitting batch");
        requests
            .into_iter()
            .map(|request| {
                let id = request.id;
                self.submit(request).map(|()| id)
            })
            .collect()
    }

    /// Hand out the result receiver. Only the first call gets it.
    pub fn take_results(&self) -> Option<UnboundedReceiver<InferenceResult>> {
        self.results_rx.lock().take()
    }

    /// Requests waiting for a worker.
    pub fn queue_depth(&self) -> usize {
        self.shared.queue.depth()
    }

    /// Requests queued or running.
    pub fn inflight(&self) -> usize {
        self.shared.queue.inflight()
    }

    pub fn is_accepting(&self) -> bool {
        !self.shared.queue.is_closed()
    }

    pub fn provider(&self) -> &Arc<dyn InferenceProvider> {
        &self.shared.provider
    }

    /// Stop admitting, resolve every queued and running request as
    /// `ShuttingDown`, wait for the workers, then close the result channel.
    /// Idempotent.
    pub async fn shutdown(&self) -> DrainReport {
        let before = self.shared.stats.snapshot().inference_requests_shut_down;
        let queued = self.shared.queue.close();
        self.shared.shutdown.cancel();
        if !queued.is_empty() {
            tracing::info!(queued = queued.len(), "draining queued requests");
        }
        for request in queued {
            self.shared.deliver(request, RequestOutcome::ShuttingDown);
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        for joined in futures::future::join_all(workers).await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "dispatcher worker ended abnormally");
            }
        }
        self.shared.results.lock().take();

        let resolved = self.shared.stats.snapshot().inference_requests_shut_down - before;
        tracing::info!(resolved, "inference dispatcher stopped");
        DrainReport { resolved }
    }
}

impl Drop for InferenceDispatcher {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}
