//! Provider error types.

use thiserror::Error;

/// Errors raised while loading a model into a provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("Model not found: {0}")]
    NotFound(String),

    #[error("Backend failed to load model: {0}")]
    Backend(String),
}

/// Errors raised by a single generation call.
///
/// These stay scoped to the request that produced them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenError {
    #[error("Model not loaded")]
    NotLoaded,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Backend error: {0}")]
    Backend(String),
}
