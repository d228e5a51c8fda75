//! Error types for skilltag.
//!
//! Taxonomy, by propagation policy:
//! - validation failures are aggregated into a `ValidationReport`, never
//!   thrown past the validation engine; `FileValidation` exists so individual
//!   checks can signal their message to the aggregator.
//! - preprocessing, storage and checkpoint failures are fatal to the current
//!   run step and surface verbatim with the originating bucket/file named.
//! - inference failures are retried per pair, then downgraded to an
//!   unresolved tag; they never fail a batch.

use thiserror::Error;

/// Top-level error type for skilltag.
#[derive(Debug, Error)]
pub enum SkilltagError {
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    /// Structural or content failure of an upload, raised inside one
    /// validation check and aggregated by the engine.
    #[error("{0}")]
    FileValidation(String),

    /// Post-preprocessing schema violation. Fatal, never retried.
    #[error("Data validation failed: {0}")]
    DataValidation(String),

    /// I/O failure against a named bucket/file.
    #[error("Storage error in bucket '{bucket}' for '{file}': {message}")]
    Storage {
        bucket: String,
        file: String,
        message: String,
    },

    /// Missing or corrupt checkpoint. The run cannot fabricate state.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Inference service error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Inference-service specific errors.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl SkilltagError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a storage error naming the bucket and file involved.
    pub fn storage(
        bucket: impl Into<String>,
        file: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Storage {
            bucket: bucket.into(),
            file: file.into(),
            message: message.into(),
        }
    }

    /// Whether another attempt could plausibly succeed. Auth failures,
    /// unknown models, and malformed replies will not heal with retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::RateLimited { .. }
                | Self::Network(_)
                | Self::Inference(InferenceError::ApiError {
                    status: 500..=599,
                    ..
                })
        )
    }

    /// Get retry delay hint in seconds, if applicable.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Result type alias for skilltag.
pub type Result<T> = std::result::Result<T, SkilltagError>;
