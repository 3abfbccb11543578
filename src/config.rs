//! Agent configuration loading from environment variables and TOML files.
//!
//! Values come from `SMARTNIC_*` environment variables with sensible
//! defaults. Unparsable values fall back to defaults without crashing;
//! geometry that parses but is unusable (a ring capacity that is not a
//! power of two, say) is left as given and rejected when the device opens.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `SMARTNIC_DEVICE_ID` | 0000:00:00.0 | PCI address of the NIC function |
//! | `SMARTNIC_MAX_INFLIGHT` | 64 | Max requests queued or running |
//! | `SMARTNIC_CONCURRENCY` | 4 | Dispatcher worker tasks |
//! | `SMARTNIC_DEFAULT_DEADLINE_MS` | 1000 | Per-request deadline (ms) |
//! | `SMARTNIC_RING_CAPACITY` | 256 | Slots per RX/TX ring |
//! | `SMARTNIC_FRAME_SIZE` | 2048 | Bytes per ring frame |
//! | `SMARTNIC_DEFAULT_MAX_TOKENS` | 50 | Tokens when a request asks for 0 |
//! | `SMARTNIC_MODEL` | distilgpt2 | Model loaded at startup |
//! | `SMARTNIC_POLL_INTERVAL_US` | 50 | Idle RX poll interval (µs) |
//! | `SMARTNIC_TX_RETRY_LIMIT` | 8 | Send attempts before a response is dropped |
//! | `SMARTNIC_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs) |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::DeviceConfig;
use crate::dispatch::DispatcherConfig;
use crate::AgentConfig;

pub const DEFAULT_DEVICE_ID: &str = "0000:00:00.0";
pub const DEFAULT_MODEL: &str = "distilgpt2";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub device_id: String,
    pub max_inflight: usize,
    pub concurrency: usize,
    pub default_deadline_ms: u64,
    pub ring_capacity: usize,
    pub frame_size: usize,
    pub default_max_tokens: usize,
    pub model_name: String,
    pub poll_interval_us: u64,
    pub tx_retry_limit: usize,
    pub shutdown_timeout_secs: u64,
}

/// Optional overrides read from a TOML file. Keys match [`EffectiveConfig`].
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    device_id: Option<String>,
    max_inflight: Option<usize>,
    concurrency: Option<usize>,
    default_deadline_ms: Option<u64>,
    ring_capacity: Option<usize>,
    frame_size: Option<usize>,
    default_max_tokens: Option<usize>,
    model_name: Option<String>,
    poll_interval_us: Option<u64>,
    tx_retry_limit: Option<usize>,
    shutdown_timeout_secs: Option<u64>,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_string(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
        _ => default.to_string(),
    }
}

fn load_dispatcher_config() -> DispatcherConfig {
    let max_inflight = parse_usize("SMARTNIC_MAX_INFLIGHT", 64).max(1);
    let concurrency = parse_usize("SMARTNIC_CONCURRENCY", 4).max(1);
    let deadline_ms = parse_u64("SMARTNIC_DEFAULT_DEADLINE_MS", 1000).max(1);
    DispatcherConfig {
        max_inflight,
        concurrency,
        default_deadline: Duration::from_millis(deadline_ms),
    }
}

fn load_device_config() -> DeviceConfig {
    DeviceConfig {
        ring_capacity: parse_usize("SMARTNIC_RING_CAPACITY", 256),
        frame_size: parse_usize("SMARTNIC_FRAME_SIZE", 2048),
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to defaults without panicking.
pub fn load() -> AgentConfig {
    let default_max_tokens = parse_usize("SMARTNIC_DEFAULT_MAX_TOKENS", 50).max(1);
    let poll_us = parse_u64("SMARTNIC_POLL_INTERVAL_US", 50).max(1);
    let tx_retry_limit = parse_usize("SMARTNIC_TX_RETRY_LIMIT", 8).max(1);
    let shutdown_secs = parse_u64("SMARTNIC_SHUTDOWN_TIMEOUT", 30).max(1);

    AgentConfig {
        device_id: parse_string("SMARTNIC_DEVICE_ID", DEFAULT_DEVICE_ID),
        device: load_device_config(),
        dispatcher: load_dispatcher_config(),
        default_max_tokens,
        model_name: parse_string("SMARTNIC_MODEL", DEFAULT_MODEL),
        poll_interval: Duration::from_micros(poll_us),
        tx_retry_limit,
        shutdown_timeout: Duration::from_secs(shutdown_secs),
    }
}

/// Load from the environment, then apply the keys present in the TOML
/// file at `path`.
pub fn load_file(path: impl AsRef<Path>) -> Result<AgentConfig, ConfigError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let overrides: FileConfig = toml::from_str(&text)?;
    let mut config = load();
    apply_overrides(&mut config, overrides);
    Ok(config)
}

fn apply_overrides(config: &mut AgentConfig, file: FileConfig) {
    if let Some(v) = file.device_id {
        config.device_id = v;
    }
    if let Some(v) = file.max_inflight {
        config.dispatcher.max_inflight = v.max(1);
    }
    if let Some(v) = file.concurrency {
        config.dispatcher.concurrency = v.max(1);
    }
    if let Some(v) = file.default_deadline_ms {
        config.dispatcher.default_deadline = Duration::from_millis(v.max(1));
    }
    if let Some(v) = file.ring_capacity {
        config.device.ring_capacity = v;
    }
    if let Some(v) = file.frame_size {
        config.device.frame_size = v;
    }
    if let Some(v) = file.default_max_tokens {
        config.default_max_tokens = v.max(1);
    }
    if let Some(v) = file.model_name {
        config.model_name = v;
    }
    if let Some(v) = file.poll_interval_us {
        config.poll_interval = Duration::from_micros(v.max(1));
    }
    if let Some(v) = file.tx_retry_limit {
        config.tx_retry_limit = v.max(1);
    }
    if let Some(v) = file.shutdown_timeout_secs {
        config.shutdown_timeout = Duration::from_secs(v.max(1));
    }
}

impl AgentConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            device_id: self.device_id.clone(),
            max_inflight: self.dispatcher.max_inflight,
            concurrency: self.dispatcher.concurrency,
            default_deadline_ms: self.dispatcher.default_deadline.as_millis() as u64,
            ring_capacity: self.device.ring_capacity,
            frame_size: self.device.frame_size,
            default_max_tokens: self.default_max_tokens,
            model_name: self.model_name.clone(),
            poll_interval_us: self.poll_interval.as_micros() as u64,
            tx_retry_limit: self.tx_retry_limit,
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
        }
    }

    /// Problems found in the configuration; empty when it is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if let Err(e) = self.device_id.parse::<crate::device::PciAddress>() {
            problems.push(e.to_string());
        }
        if let Err(e) = self.device.validate() {
            problems.push(e.to_string());
        }
        if self.dispatcher.concurrency > self.dispatcher.max_inflight {
            problems.push(format!(
                "concurrency {} exceeds max_inflight {}; extra workers stay idle",
                self.dispatcher.concurrency, self.dispatcher.max_inflight
            ));
        }
        problems
    }
}
