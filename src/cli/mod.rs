// Copyright 2024-2026 SmartNIC Agent Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommands for the SmartNIC agent.
//!
//! Every command runs the agent in-process against the loopback driver,
//! so none of them needs NIC hardware.
//!
//! ## Usage
//!
//! ```bash
//! smartnic-agent run --packets 16        # Full data path demo
//! smartnic-agent infer --prompt "Hello"  # One direct inference
//! smartnic-agent bench --iterations 100  # Latency benchmark
//! smartnic-agent config show             # Effective configuration
//! ```

pub mod bench_cmd;
pub mod config_cmd;
pub mod infer_cmd;
pub mod run_cmd;

use std::sync::Arc;

use crate::agent::Agent;
use crate::device::{LoopbackDriver, PciAddress};
use crate::provider::EchoProvider;
use crate::AgentConfig;

pub use bench_cmd::{run_bench, LatencySummary};
pub use infer_cmd::run_infer;
pub use run_cmd::run_demo;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

/// Value following `flag` in `args`, if any.
///
/// `Err` carries the message to print when the flag is present without a
/// value.
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>, String> {
    match args.iter().position(|a| a == flag) {
        None => Ok(None),
        Some(i) => args
            .get(i + 1)
            .map(|v| Some(v.as_str()))
            .ok_or_else(|| format!("Missing value for {}", flag)),
    }
}

/// Parse the numeric value of `flag`, falling back to `default`.
pub fn flag_number(args: &[String], flag: &str, default: usize) -> Result<usize, String> {
    match flag_value(args, flag)? {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| format!("Invalid value for {}: {}", flag, v)),
    }
}

/// Start an agent on a loopback driver exposing the configured device.
///
/// Returns the driver too so callers can inject and collect frames.
pub(crate) async fn start_loopback_agent(
    config: AgentConfig,
    provider: Arc<EchoProvider>,
) -> Result<(Agent, Arc<LoopbackDriver>, PciAddress), i32> {
    let address: PciAddress = match config.device_id.parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Err(EXIT_CONFIG);
        }
    };
    let driver = Arc::new(LoopbackDriver::new([address]));
    match Agent::start(config, driver.clone(), provider).await {
        Ok(agent) => Ok((agent, driver, address)),
        Err(e) => {
            eprintln!("Failed to start agent: {}", e);
            Err(EXIT_FAILURE)
        }
    }
}

/// Format a byte count as a human-readable string (e.g. "1.50 MB").
pub fn format_bytes(num_bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = num_bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{:.2} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.2} PB", value)
}
