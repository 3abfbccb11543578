//! Span utilities and extension traits for request tracing.

use tracing::{info_span, Span};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the outcome label of an operation into the span.
    fn record_outcome(&self, outcome: &str, latency_ms: u64);
}

impl SpanExt for Span {
    fn record_outcome(&self, outcome: &str, latency_ms: u64) {
        self.record("outcome", outcome);
        self.record("latency_ms", latency_ms);
    }
}

/// Factory for creating standardized request spans.
pub struct RequestSpan;

impl RequestSpan {
    /// Create a new inference request span.
    ///
    /// Fields included:
    /// - `request_id`: dispatcher-assigned id
    /// - `correlation_id`: wire correlation id, when the request came off the RX ring
    /// - `outcome`: filled in by `SpanExt::record_outcome`
    /// - `latency_ms`: filled in after completion
    pub fn new(request_id: u64, correlation_id: Option<u64>) -> Span {
        info_span!(
            "inference_request",
            request_id = request_id,
            correlation_id = correlation_id,
            outcome = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
