//! Configuration models for skilltag.
//!
//! Everything tunable at runtime lives here and is loaded once per process
//! from a TOML file; components never read ambient state after startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for skilltag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Inference service endpoint.
    pub inference: InferenceConfig,

    /// Storage backend and bucket root.
    pub storage: StorageConfig,

    /// Pipeline limits and sector scoping.
    pub pipeline: PipelineConfig,
}

/// Inference service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// API key (can also be set via the `api_key_env` variable).
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL for the chat-completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model ID to request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts per call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Maximum tokens per reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_api_key_env() -> String {
    "SKILLTAG_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_timeout() -> u64 {
    180
}

fn default_max_retries() -> u32 {
    3
}

fn default_temperature() -> f64 {
    0.1
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Which storage backend holds the logical buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Local directory tree under `root`.
    Local,
    /// S3 bucket named by `bucket`, prefixed by `root`.
    S3,
}

/// Storage configuration. The backend is selected here once; nothing
/// downstream branches on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Local directory, or key prefix inside the S3 bucket.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// S3 bucket name (required when backend = "s3").
    #[serde(default)]
    pub bucket: Option<String>,

    /// S3 region override.
    #[serde(default)]
    pub region: Option<String>,

    /// S3 endpoint override (for S3-compatible stores).
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Pause between deletions during a destructive reset, in milliseconds,
    /// to avoid hammering the backend.
    #[serde(default = "default_reset_pace_ms")]
    pub reset_pace_ms: u64,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Local
}

fn default_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_reset_pace_ms() -> u64 {
    25
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            root: default_root(),
            bucket: None,
            region: None,
            endpoint: None,
            reset_pace_ms: default_reset_pace_ms(),
        }
    }
}

/// Pipeline limits and sector scoping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Sector name as it appears in the SFW "Sector" column.
    pub sector: String,

    /// Short sector alias used in artifact names.
    pub sector_alias: String,

    /// Max concurrent inference calls per phase.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Upper bound on rows accepted per upload (size-bound check).
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

fn default_pool_size() -> usize {
    10
}

fn default_max_rows() -> usize {
    50_000
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints not expressible in serde.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.backend == StorageBackend::S3 && self.storage.bucket.is_none() {
            return Err(ConfigError::MissingField(
                "storage.bucket is required when storage.backend = \"s3\"".to_string(),
            ));
        }
        if self.pipeline.pool_size == 0 {
            return Err(ConfigError::MissingField(
                "pipeline.pool_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.inference.api_key {
            return Ok(key.clone());
        }

        std::env::var(&self.inference.api_key_env).map_err(|_| ConfigError::MissingApiKey {
            env_var: self.inference.api_key_env.clone(),
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing API key: set {env_var} env var or inference.api_key in config")]
    MissingApiKey { env_var: String },

    #[error("Invalid configuration: {0}")]
    MissingField(String),
}
