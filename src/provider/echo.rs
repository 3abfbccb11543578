//! Placeholder provider that echoes its input.
//!
//! Stands in for a real backend in the CLI demo, benches and tests.

use std::time::Duration;

use parking_lot::RwLock;

use super::{GenError, InferenceProvider, LoadError, ModelInfo};

pub struct EchoProvider {
    model: RwLock<Option<String>>,
    latency: Duration,
}

impl EchoProvider {
    pub fn new() -> Self {
        Self {
            model: RwLock::new(None),
            latency: Duration::ZERO,
        }
    }

    /// Sleep for `latency` on every generation to mimic model cost.
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency, ..Self::new() }
    }
}

impl Default for EchoProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep at most `max_tokens` whitespace-separated words.
fn truncate_words(text: &str, max_tokens: usize) -> String {
    text.split_whitespace()
        .take(max_tokens)
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait::async_trait]
impl InferenceProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn load(&self, model_name: &str) -> Result<(), LoadError> {
        if model_name.trim().is_empty() {
            return Err(LoadError::NotFound(model_name.to_string()));
        }
        tracing::info!(model = model_name, "echo provider loaded model");
        *self.model.write() = Some(model_name.to_string());
        Ok(())
    }

    async fn generate(
        &self,
        text: &str,
        max_tokens: usize,
        _budget: Duration,
    ) -> Result<String, GenError> {
        let loaded = self.model.read().is_some();
        if !loaded {
            return Err(GenError::NotLoaded);
        }
        if max_tokens == 0 {
            return Err(GenError::InvalidInput("max_tokens must be > 0".into()));
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let response = format!("[Generated response for: {text}]");
        Ok(truncate_words(&response, max_tokens))
    }

    fn model_info(&self) -> ModelInfo {
        let name = self.model.read().clone();
        ModelInfo {
            loaded: name.is_some(),
            name,
            backend: self.name().to_string(),
        }
    }
}
