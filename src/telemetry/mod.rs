//! Telemetry for the agent.
//!
//! Structured logging via `tracing`, counters and histograms via the
//! `metrics` facade, and span helpers for per-request tracing.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    describe_metrics, record_inference_outcome, record_packet_dropped, record_packet_errored,
    record_packets_received, record_packets_sent, record_queue_depth,
};
pub use spans::{RequestSpan, SpanExt};
