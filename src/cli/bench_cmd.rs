// Copyright 2024-2026 SmartNIC Agent Contributors
// SPDX-License-Identifier: Apache-2.0

//! `bench`: end-to-end inference latency and throughput.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::{start_loopback_agent, EXIT_FAILURE, EXIT_OK};
use crate::provider::EchoProvider;
use crate::AgentConfig;

const WARMUP_ITERATIONS: usize = 10;
const BENCH_PROMPT: &str = "What is the purpose of SmartNIC in network processing?";

/// Latency statistics over a set of samples, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    pub iterations: usize,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Sample standard deviation; zero for a single sample.
    pub stddev_ms: f64,
    pub throughput_rps: f64,
}

impl LatencySummary {
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len();
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };
        let stddev = if n > 1 {
            let var = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        } else {
            0.0
        };
        let throughput = if mean > 0.0 { 1000.0 / mean } else { f64::INFINITY };

        Some(Self {
            iterations: n,
            mean_ms: mean,
            median_ms: median,
            min_ms: sorted[0],
            max_ms: sorted[n - 1],
            stddev_ms: stddev,
            throughput_rps: throughput,
        })
    }
}

/// Run `iterations` timed inferences after a warmup. `latency` is the
/// simulated provider latency.
pub async fn run_bench(config: AgentConfig, iterations: usize, latency: Duration) -> i32 {
    let provider = Arc::new(EchoProvider::with_latency(latency));
    let (agent, _driver, _address) = match start_loopback_agent(config, provider).await {
        Ok(started) => started,
        Err(code) => return code,
    };

    tracing::info!(iterations = WARMUP_ITERATIONS, "running warmup iterations");
    for _ in 0..WARMUP_ITERATIONS {
        if let Err(e) = agent.infer(BENCH_PROMPT, 0).await {
            eprintln!("Warmup failed: {}", e);
            agent.shutdown().await;
            return EXIT_FAILURE;
        }
    }

    let mut samples = Vec::with_capacity(iterations);
    for i in 0..iterations {
        let start = Instant::now();
        if let Err(e) = agent.infer(BENCH_PROMPT, 0).await {
            eprintln!("Iteration {} failed: {}", i, e);
            agent.shutdown().await;
            return EXIT_FAILURE;
        }
        samples.push(start.elapsed().as_secs_f64() * 1000.0);
        if (i + 1) % 10 == 0 {
            tracing::info!(completed = i + 1, total = iterations, "benchmark progress");
        }
    }
    let model = agent.model_info();
    agent.shutdown().await;

    let Some(summary) = LatencySummary::from_samples(&samples) else {
        eprintln!("No iterations run");
        return EXIT_FAILURE;
    };
    println!("=== Benchmark Results ===");
    println!("Number of iterations: {}", summary.iterations);
    println!("Mean latency: {:.2} ms", summary.mean_ms);
    println!("Median latency: {:.2} ms", summary.median_ms);
    println!("Min latency: {:.2} ms", summary.min_ms);
    println!("Max latency: {:.2} ms", summary.max_ms);
    println!("Std deviation: {:.2} ms", summary.stddev_ms);
    println!("Throughput: {:.2} requests/second", summary.throughput_rps);
    println!("Model: {}", model.name.as_deref().unwrap_or("none"));
    println!("Backend: {}", model.backend);
    EXIT_OK
}
