//! SmartNIC inference agent
//!
//! Offloads packet I/O to a NIC function and serves text-generation
//! requests that arrive on the wire under a per-request deadline.
//!
//! # Data path
//!
//! - `device`: session lifecycle, link state, driver boundary
//! - `ring`: lock-free SPSC descriptor rings over a pinned frame region
//! - `dispatch`: bounded queue and worker pool in front of the provider
//! - `provider`: the inference backend capability
//! - `agent`: RX and TX pollers tying the above together
//!
//! Packet I/O is only permitted while the link is up. Every accepted
//! inference request resolves exactly once: completed, timed out, failed
//! or drained at shutdown.

pub mod agent;
pub mod cli;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod provider;
pub mod ring;
pub mod stats;
pub mod telemetry;

use std::time::Duration;

use device::DeviceConfig;
use dispatch::DispatcherConfig;

pub use agent::{Agent, AgentError};
pub use stats::{Stats, StatsCounter};

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub device_id: String,
    pub device: DeviceConfig,
    pub dispatcher: DispatcherConfig,
    /// Tokens generated when a request asks for zero.
    pub default_max_tokens: usize,
    pub model_name: String,
    /// RX sleep when a poll finds nothing.
    pub poll_interval: Duration,
    /// Send attempts before a response frame is dropped.
    pub tx_retry_limit: usize,
    pub shutdown_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device_id: config::DEFAULT_DEVICE_ID.to_string(),
            device: DeviceConfig::default(),
            dispatcher: DispatcherConfig::default(),
            default_max_tokens: 50,
            model_name: config::DEFAULT_MODEL.to_string(),
            poll_interval: Duration::from_micros(50),
            tx_retry_limit: 8,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}
