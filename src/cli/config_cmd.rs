// Copyright 2024-2026 SmartNIC Agent Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These read configuration from environment variables, plus an optional
//! TOML file passed with `--file`.

use std::path::Path;

use super::{EXIT_CONFIG, EXIT_OK};
use crate::config::{self, EffectiveConfig};
use crate::AgentConfig;

fn load(file: Option<&Path>) -> Result<AgentConfig, i32> {
    match file {
        None => Ok(config::load()),
        Some(path) => config::load_file(path).map_err(|e| {
            eprintln!("Configuration error: {}", e);
            EXIT_CONFIG
        }),
    }
}

/// Print effective config as key-value pairs to stdout.
pub fn run_show(file: Option<&Path>) -> i32 {
    match load(file) {
        Ok(cfg) => {
            print_config(&cfg.effective_config());
            EXIT_OK
        }
        Err(code) => code,
    }
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    print_config(&AgentConfig::default().effective_config());
}

/// Validate configuration.
///
/// Returns 0 if valid, 2 if any problem is found.
pub fn run_validate(file: Option<&Path>) -> i32 {
    let cfg = match load(file) {
        Ok(cfg) => cfg,
        Err(code) => return code,
    };
    let problems = cfg.validate();
    for problem in &problems {
        eprintln!("WARNING: {}", problem);
    }
    if problems.is_empty() {
        println!("Configuration is valid.");
        EXIT_OK
    } else {
        EXIT_CONFIG
    }
}

fn print_config(cfg: &EffectiveConfig) {
    println!("SMARTNIC_DEVICE_ID={}", cfg.device_id);
    println!("SMARTNIC_MAX_INFLIGHT={}", cfg.max_inflight);
    println!("SMARTNIC_CONCURRENCY={}", cfg.concurrency);
    println!("SMARTNIC_DEFAULT_DEADLINE_MS={}", cfg.default_deadline_ms);
    println!("SMARTNIC_RING_CAPACITY={}", cfg.ring_capacity);
    println!("SMARTNIC_FRAME_SIZE={}", cfg.frame_size);
    println!("SMARTNIC_DEFAULT_MAX_TOKENS={}", cfg.default_max_tokens);
    println!("SMARTNIC_MODEL={}", cfg.model_name);
    println!("SMARTNIC_POLL_INTERVAL_US={}", cfg.poll_interval_us);
    println!("SMARTNIC_TX_RETRY_LIMIT={}", cfg.tx_retry_limit);
    println!("SMARTNIC_SHUTDOWN_TIMEOUT={}", cfg.shutdown_timeout_secs);
}
