//! Dispatcher error types.

use thiserror::Error;

use crate::provider::GenError;

/// Admission failures returned by `submit`. Never blocks; the caller
/// decides whether to drop, retry or queue upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("dispatch queue full: {max_inflight} requests in flight")]
    QueueFull { max_inflight: usize },

    #[error("dispatcher is shutting down")]
    ShuttingDown,
}

/// Why an accepted request produced no output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("provider error: {0}")]
    ProviderError(#[from] GenError),

    #[error("dispatcher is shutting down")]
    ShuttingDown,
}
