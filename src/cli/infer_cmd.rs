// Copyright 2024-2026 SmartNIC Agent Contributors
// SPDX-License-Identifier: Apache-2.0

//! `infer`: one direct inference through a running agent.

use std::sync::Arc;

use super::{start_loopback_agent, EXIT_FAILURE, EXIT_OK};
use crate::provider::EchoProvider;
use crate::AgentConfig;

pub async fn run_infer(config: AgentConfig, prompt: &str, max_tokens: usize) -> i32 {
    let (agent, _driver, _address) =
        match start_loopback_agent(config, Arc::new(EchoProvider::new())).await {
            Ok(started) => started,
            Err(code) => return code,
        };

    let code = match agent.infer(prompt, max_tokens).await {
        Ok(output) => {
            println!("{}", output);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            EXIT_FAILURE
        }
    };
    agent.shutdown().await;
    code
}
