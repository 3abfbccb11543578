//! Packet and inference counters.
//!
//! Every counter is an independent `AtomicU64`, so any worker may bump
//! any counter and a snapshot never observes a torn value. Each bump is
//! mirrored to the `metrics` facade.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::telemetry;

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub packets_sent: u64,
    pub packets_received: u64,
    /// Packets discarded: dispatch queue or TX ring full, or an RX frame
    /// larger than a ring frame.
    pub packets_dropped: u64,
    /// Packets that could not be decoded or were flagged by the device.
    pub packets_errored: u64,
    pub inference_requests_completed: u64,
    pub inference_requests_timed_out: u64,
    /// Provider returned an error.
    pub inference_requests_failed: u64,
    /// Resolved by a drain during shutdown.
    pub inference_requests_shut_down: u64,
}

/// Shared, monotonically increasing counters.
#[derive(Debug, Default)]
pub struct StatsCounter {
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    packets_dropped: AtomicU64,
    packets_errored: AtomicU64,
    completed: AtomicU64,
    timed_out: AtomicU64,
    failed: AtomicU64,
    shut_down: AtomicU64,
}

impl StatsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sent(&self, n: u64) {
        self.packets_sent.fetch_add(n, Ordering::Relaxed);
        telemetry::record_packets_sent(n);
    }

    pub fn add_received(&self, n: u64) {
        self.packets_received.fetch_add(n, Ordering::Relaxed);
        telemetry::record_packets_received(n);
    }

    pub fn add_dropped(&self, reason: &'static str) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
        telemetry::record_packet_dropped(reason);
    }

    pub fn add_errored(&self, reason: &'static str) {
        self.packets_errored.fetch_add(1, Ordering::Relaxed);
        telemetry::record_packet_errored(reason);
    }

    pub fn add_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_shut_down(&self) {
        self.shut_down.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            packets_errored: self.packets_errored.load(Ordering::Relaxed),
            inference_requests_completed: self.completed.load(Ordering::Relaxed),
            inference_requests_timed_out: self.timed_out.load(Ordering::Relaxed),
            inference_requests_failed: self.failed.load(Ordering::Relaxed),
            inference_requests_shut_down: self.shut_down.load(Ordering::Relaxed),
        }
    }
}
