//! Worker pool: pull the oldest request, enforce its deadline, call the
//! provider, deliver exactly one result.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::queue::PendingQueue;
use super::request::{InferenceRequest, InferenceResult, RequestOutcome, RequestState};
use crate::provider::InferenceProvider;
use crate::stats::StatsCounter;
use crate::telemetry::{self, RequestSpan, SpanExt};

/// State shared by the dispatcher handle and its workers.
pub(super) struct Shared {
    pub queue: PendingQueue,
    pub provider: Arc<dyn InferenceProvider>,
    pub stats: Arc<StatsCounter>,
    /// Taken on shutdown so the result channel closes once drained.
    pub results: Mutex<Option<UnboundedSender<InferenceResult>>>,
    pub shutdown: CancellationToken,
}

impl Shared {
    /// Publish the terminal outcome of `request` and free its slot.
    pub fn deliver(&self, request: InferenceRequest, outcome: RequestOutcome) {
        match &outcome {
            RequestOutcome::Completed(_) => self.stats.add_completed(),
            RequestOutcome::TimedOut => self.stats.add_timed_out(),
            RequestOutcome::Failed(_) => self.stats.add_failed(),
            RequestOutcome::ShuttingDown => self.stats.add_shut_down(),
        }
        let completed_at = Instant::now();
        let latency = completed_at.saturating_duration_since(request.created_at);
        telemetry::record_inference_outcome(outcome.label(), latency.as_secs_f64() * 1000.0);

        let result = InferenceResult {
            id: request.id,
            outcome,
            origin: request.origin,
            completed_at,
            latency,
        };
        if let Some(tx) = self.results.lock().as_ref() {
            if tx.send(result).is_err() {
                tracing::debug!(request_id = %request.id, "result receiver dropped");
            }
        }
        self.queue.finish();
        telemetry::record_queue_depth(self.queue.inflight());
    }
}

pub(super) fn spawn_workers(shared: &Arc<Shared>, count: usize) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker| {
            let shared = Arc::clone(shared);
            tokio::spawn(async move { worker_loop(worker, &shared).await })
        })
        .collect()
}

async fn worker_loop(worker: usize, shared: &Shared) {
    loop {
        let request = tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => {
                tracing::debug!(worker, "worker: shutdown signal received");
                break;
            }
            request = shared.queue.wait_pop() => request,
        };
        execute(shared, request).await;
    }
}

async fn execute(shared: &Shared, request: InferenceRequest) {
    let span = RequestSpan::new(request.id.0, request.origin.map(|o| o.correlation_id));
    let outcome = run(shared, &request).instrument(span.clone()).await;
    span.record_outcome(
        outcome.label(),
        request.created_at.elapsed().as_millis() as u64,
    );
    if matches!(outcome, RequestOutcome::TimedOut) {
        tracing::warn!(parent: &span, "inference request timed out");
    }
    shared.deliver(request, outcome);
}

async fn run(shared: &Shared, request: &InferenceRequest) -> RequestOutcome {
    let Some(budget) = request.remaining() else {
        tracing::debug!("deadline elapsed while queued; provider not invoked");
        return RequestOutcome::TimedOut;
    };
    tracing::debug!(state = ?RequestState::Running, budget_ms = budget.as_millis() as u64);

    let generation = shared
        .provider
        .generate(&request.input, request.max_tokens, budget);
    tokio::select! {
        biased;
        () = shared.shutdown.cancelled() => RequestOutcome::ShuttingDown,
        result = tokio::time::timeout(budget, generation) => match result {
            Ok(Ok(text)) => RequestOutcome::Completed(text),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "provider failed");
                RequestOutcome::Failed(e)
            }
            // Dropping the future abandons the call; any late output is discarded.
            Err(_) => RequestOutcome::TimedOut,
        },
    }
}
