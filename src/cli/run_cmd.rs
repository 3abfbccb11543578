// Copyright 2024-2026 SmartNIC Agent Contributors
// SPDX-License-Identifier: Apache-2.0

//! `run`: drive the whole packet path over the loopback driver.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{format_bytes, start_loopback_agent, EXIT_FAILURE, EXIT_OK};
use crate::agent::codec::{self, Frame};
use crate::provider::EchoProvider;
use crate::ring::DescFlags;
use crate::AgentConfig;

/// Inject `packets` request frames plus one plain frame, print every
/// response and the final counters.
pub async fn run_demo(config: AgentConfig, packets: usize) -> i32 {
    let frame_size = config.device.frame_size;
    let ring_bytes = (config.device.ring_capacity * frame_size) as u64;
    let wait = config.dispatcher.default_deadline + Duration::from_secs(1);

    let (agent, driver, address) =
        match start_loopback_agent(config, Arc::new(EchoProvider::new())).await {
            Ok(started) => started,
            Err(code) => return code,
        };
    println!("Device {} up, {} per ring", address, format_bytes(ring_bytes));

    let mut buf = Vec::with_capacity(frame_size);
    for i in 0..packets {
        let prompt = format!("Hello, this is a test of the SmartNIC AI system #{}", i);
        if let Err(e) = codec::encode_request(&mut buf, i as u64, 0, &prompt, frame_size) {
            eprintln!("Cannot encode request {}: {}", i, e);
            continue;
        }
        if let Err(e) = driver.inject(address, buf.clone(), DescFlags::NEEDS_INFERENCE) {
            eprintln!("Inject failed: {}", e);
            agent.shutdown().await;
            return EXIT_FAILURE;
        }
    }
    if let Err(e) = driver.inject(address, b"plain traffic".to_vec(), DescFlags::empty()) {
        eprintln!("Inject failed: {}", e);
    }

    let started = Instant::now();
    let mut responses = Vec::new();
    while (responses.len() as u64 + agent.stats().packets_dropped) < packets as u64
        && started.elapsed() < wait
    {
        responses.extend(driver.take_transmitted(address));
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    responses.extend(driver.take_transmitted(address));

    for frame in &responses {
        match codec::decode(frame) {
            Ok(Frame::Response { correlation_id, status, text }) => {
                println!("[{}] {:?}: {}", correlation_id, status, text);
            }
            Ok(other) => eprintln!("Unexpected frame on TX: {:?}", other),
            Err(e) => eprintln!("Undecodable TX frame: {}", e),
        }
    }

    let model = agent.model_info();
    agent.shutdown().await;
    let stats = agent.stats();
    match serde_json::to_string_pretty(&model) {
        Ok(json) => println!("Model: {}", json),
        Err(e) => eprintln!("Cannot render model info: {}", e),
    }
    match serde_json::to_string_pretty(&stats) {
        Ok(json) => println!("Stats: {}", json),
        Err(e) => eprintln!("Cannot render stats: {}", e),
    }

    if responses.len() as u64 + stats.packets_dropped >= packets as u64 {
        EXIT_OK
    } else {
        eprintln!("Only {} of {} responses arrived", responses.len(), packets);
        EXIT_FAILURE
    }
}
