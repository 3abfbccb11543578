//! Adapter for synchronous, CPU-bound backends.
//!
//! Generation runs on tokio's blocking pool. If the dispatcher abandons the
//! call at its deadline the blocking task still runs to completion; its
//! output is dropped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use super::{GenError, InferenceProvider, LoadError, ModelInfo};

/// Synchronous generation entry point: `(model, text, max_tokens, budget)`.
pub type GenerateFn =
    dyn Fn(&str, &str, usize, Duration) -> Result<String, GenError> + Send + Sync;

pub struct BlockingProvider {
    name: String,
    generate: Arc<GenerateFn>,
    model: RwLock<Option<String>>,
}

impl BlockingProvider {
    pub fn new<F>(name: impl Into<String>, generate: F) -> Self
    where
        F: Fn(&str, &str, usize, Duration) -> Result<String, GenError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            generate: Arc::new(generate),
            model: RwLock::new(None),
        }
    }
}

#[async_trait::async_trait]
impl InferenceProvider for BlockingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self, model_name: &str) -> Result<(), LoadError> {
        if model_name.trim().is_empty() {
            return Err(LoadError::NotFound(model_name.to_string()));
        }
        *self.model.write() = Some(model_name.to_string());
        Ok(())
    }

    async fn generate(
        &self,
        text: &str,
        max_tokens: usize,
        budget: Duration,
    ) -> Result<String, GenError> {
        let model = self.model.read().clone();
        let model = model.ok_or(GenError::NotLoaded)?;
        let generate = Arc::clone(&self.generate);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || generate(&model, &text, max_tokens, budget))
            .await
            .map_err(|e| GenError::Backend(format!("blocking task failed: {e}")))?
    }

    fn model_info(&self) -> ModelInfo {
        let name = self.model.read().clone();
        ModelInfo {
            loaded: name.is_some(),
            name,
            backend: self.name.clone(),
        }
    }
}
