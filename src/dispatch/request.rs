//! Inference request and result types.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::error::RequestError;
use crate::provider::GenError;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide monotonic request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a request came from on the wire, for response correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketOrigin {
    pub correlation_id: u64,
    /// RX descriptor sequence number.
    pub sequence: u64,
}

#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub id: RequestId,
    pub input: String,
    pub max_tokens: usize,
    pub deadline: Instant,
    pub origin: Option<PacketOrigin>,
    pub created_at: Instant,
}

impl InferenceRequest {
    pub fn new(input: impl Into<String>, max_tokens: usize, deadline: Instant) -> Self {
        Self {
            id: RequestId::next(),
            input: input.into(),
            max_tokens,
            deadline,
            origin: None,
            created_at: Instant::now(),
        }
    }

    /// Request whose deadline is `timeout` from now.
    pub fn with_timeout(input: impl Into<String>, max_tokens: usize, timeout: Duration) -> Self {
        Self::new(input, max_tokens, Instant::now() + timeout)
    }

    pub fn with_origin(mut self, origin: PacketOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Time left before the deadline, or None once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
    }
}

/// Lifecycle of a request inside the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Queued,
    Running,
    Completed,
    TimedOut,
    Failed,
    ShuttingDown,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }
}

/// Terminal outcome of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Completed(String),
    TimedOut,
    Failed(GenError),
    ShuttingDown,
}

impl RequestOutcome {
    pub fn state(&self) -> RequestState {
        match self {
            Self::Completed(_) => RequestState::Completed,
            Self::TimedOut => RequestState::TimedOut,
            Self::Failed(_) => RequestState::Failed,
            Self::ShuttingDown => RequestState::ShuttingDown,
        }
    }

    /// Stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::TimedOut => "timed_out",
            Self::Failed(_) => "failed",
            Self::ShuttingDown => "shutting_down",
        }
    }

    pub fn into_result(self) -> Result<String, RequestError> {
        match self {
            Self::Completed(text) => Ok(text),
            Self::TimedOut => Err(RequestError::DeadlineExceeded),
            Self::Failed(e) => Err(RequestError::ProviderError(e)),
            Self::ShuttingDown => Err(RequestError::ShuttingDown),
        }
    }
}

/// Delivered exactly once per accepted request.
#[derive(Debug, Clone)]
pub struct InferenceResult {
    pub id: RequestId,
    pub outcome: RequestOutcome,
    pub origin: Option<PacketOrigin>,
    pub completed_at: Instant,
    /// Creation-to-completion time.
    pub latency: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let a = RequestId::next();
        let b = RequestId::next();
        assert!(b > a);
    }

    #[test]
    fn past_deadline_has_no_remaining_budget() {
        let req = InferenceRequest::new("x", 1, Instant::now());
        assert!(req.is_expired());
        assert!(req.remaining().is_none());

        let req = InferenceRequest::with_timeout("x", 1, Duration::from_secs(60));
        assert!(!req.is_expired());
        assert!(req.remaining().unwrap() > Duration::from_secs(59));
    }

    #[test]
    fn outcome_maps_to_error_taxonomy() {
        assert_eq!(RequestOutcome::Completed("ok".into()).into_result(), Ok("ok".into()));
        assert_eq!(RequestOutcome::TimedOut.into_result(), Err(RequestError::DeadlineExceeded));
        assert_eq!(
            RequestOutcome::Failed(GenError::NotLoaded).into_result(),
            Err(RequestError::ProviderError(GenError::NotLoaded))
        );
        assert!(RequestOutcome::ShuttingDown.state().is_terminal());
        assert!(!RequestState::Running.is_terminal());
    }
}
