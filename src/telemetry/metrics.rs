//! Metrics facade recording.
//!
//! Nothing is exported until the embedding process installs a recorder;
//! without one every call below is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Register descriptions for every metric the agent emits.
pub fn describe_metrics() {
    describe_counter!("smartnic_packets_sent_total", "Packets handed to the device for transmit");
    describe_counter!("smartnic_packets_received_total", "Packets taken from the RX ring");
    describe_counter!("smartnic_packets_dropped_total", "Packets dropped under backpressure");
    describe_counter!("smartnic_packets_errored_total", "Packets that failed decoding or were device-flagged");
    describe_counter!("smartnic_inference_requests_total", "Inference requests by terminal outcome");
    describe_gauge!("smartnic_dispatch_queue_depth", "Requests queued or running in the dispatcher");
    describe_histogram!("smartnic_inference_latency_ms", "Submit-to-result latency in milliseconds");
}

pub fn record_packets_sent(n: u64) {
    counter!("smartnic_packets_sent_total").increment(n);
}

pub fn record_packets_received(n: u64) {
    counter!("smartnic_packets_received_total").increment(n);
}

pub fn record_packet_dropped(reason: &'static str) {
    counter!("smartnic_packets_dropped_total", "reason" => reason).increment(1);
}

pub fn record_packet_errored(reason: &'static str) {
    counter!("smartnic_packets_errored_total", "reason" => reason).increment(1);
}

/// Record a terminal request outcome and its end-to-end latency.
pub fn record_inference_outcome(outcome: &'static str, latency_ms: f64) {
    counter!("smartnic_inference_requests_total", "outcome" => outcome).increment(1);
    histogram!("smartnic_inference_latency_ms", "outcome" => outcome).record(latency_ms);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("smartnic_dispatch_queue_depth").set(depth as f64);
}
