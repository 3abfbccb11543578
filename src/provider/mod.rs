//! Inference provider capability.
//!
//! The dispatcher only sees [`InferenceProvider`]; any backend that can
//! load a model by name and turn text into text within a time budget is
//! pluggable.

mod blocking;
mod echo;
mod error;

pub use blocking::{BlockingProvider, GenerateFn};
pub use echo::EchoProvider;
pub use error::{GenError, LoadError};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Summary of a provider's loaded model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub loaded: bool,
    pub name: Option<String>,
    pub backend: String,
}

/// A text-generation backend.
#[async_trait::async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    /// Load (or replace) the active model.
    async fn load(&self, model_name: &str) -> Result<(), LoadError>;

    /// Generate up to `max_tokens` tokens of output for `text`.
    ///
    /// `budget` is the time left before the request's deadline. Providers
    /// may use it to size their work; the dispatcher enforces it regardless
    /// and discards late results.
    async fn generate(
        &self,
        text: &str,
        max_tokens: usize,
        budget: Duration,
    ) -> Result<String, GenError>;

    fn model_info(&self) -> ModelInfo;
}
