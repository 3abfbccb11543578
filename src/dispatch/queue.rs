//! Bounded FIFO of pending inference requests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::error::DispatchError;
use super::request::InferenceRequest;

struct QueueState {
    items: VecDeque<InferenceRequest>,
    closed: bool,
}

/// Pending requests plus the in-flight count (queued + running).
///
/// Admission and close share one lock, so no request can slip in after
/// the drain.
pub struct PendingQueue {
    state: Mutex<QueueState>,
    /// Notifies idle workers when new items are enqueued.
    notify: Notify,
    inflight: AtomicUsize,
    max_inflight: usize,
}

impl PendingQueue {
    pub fn new(max_inflight: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(max_inflight),
                closed: false,
            }),
            notify: Notify::new(),
            inflight: AtomicUsize::new(0),
            max_inflight,
        }
    }

    /// Admit a request. Returns the in-flight count after admission.
    pub fn push(&self, request: InferenceRequest) -> Result<usize, DispatchError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(DispatchError::ShuttingDown);
        }
        let max = self.max_inflight;
        let prev = self
            .inflight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .map_err(|_| DispatchError::QueueFull { max_inflight: max })?;
        state.items.push_back(request);
        drop(state);

        self.notify.notify_one();
        Ok(prev + 1)
    }

    /// Oldest queued request, if any.
    pub fn pop(&self) -> Option<InferenceRequest> {
        self.state.lock().items.pop_front()
    }

    /// Wait until a request is available and take it.
    pub async fn wait_pop(&self) -> InferenceRequest {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push between the check and the
            // await still wakes this waiter.
            notified.as_mut().enable();
            if let Some(request) = self.pop() {
                return request;
            }
            notified.await;
        }
    }

    /// Stop admitting and hand back everything still queued.
    pub fn close(&self) -> Vec<InferenceRequest> {
        let mut state = self.state.lock();
        state.closed = true;
        state.items.drain(..).collect()
    }

    /// Release the in-flight slot of a request that reached a terminal state.
    pub fn finish(&self) {
        self.inflight.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    pub fn depth(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn max_inflight(&self) -> usize {
        self.max_inflight
    }
}
