//! Configuration System
//!
//! Layered configuration for the client, its transport and its plugin chain. Sources are
//! merged in order: built-in defaults, the global file, the project (or explicit) file, then
//! `QUERYPIPE__SECTION__KEY` environment variables.

use crate::logging::LoggingConfig;
use crate::types::CachePolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::project_file::PROJECT_CONFIG_FILE;

pub const DEFAULT_URL: &str = "http://localhost:4000/graphql";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerypipeConfig {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Endpoint and execution defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default)]
    pub cache_policy: CachePolicy,

    /// Headers sent with every operation
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Include the dedup plugin in the chain
    #[serde(default = "default_true")]
    pub dedup: bool,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            cache_policy: CachePolicy::default(),
            headers: BTreeMap::new(),
            dedup: true,
        }
    }
}

/// HTTP transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Ignore system proxy settings
    #[serde(default)]
    pub no_proxy: bool,

    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            no_proxy: false,
            user_agent: None,
        }
    }
}

/// Batch plugin settings. When enabled the batch plugin replaces fetch as the terminal
/// plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_max_operation_count")]
    pub max_operation_count: usize,

    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_max_operation_count() -> usize {
    10
}

fn default_window_ms() -> u64 {
    10
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_operation_count: default_max_operation_count(),
            window_ms: default_window_ms(),
        }
    }
}

/// Cache plugin settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Unbounded when unset
    #[serde(default)]
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: None,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Client(String),
    Transport(String),
    Batch(String),
    Cache(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Client(msg) => write!(f, "Client: {}", msg),
            ValidationError::Transport(msg) => write!(f, "Transport: {}", msg),
            ValidationError::Batch(msg) => write!(f, "Batch: {}", msg),
            ValidationError::Cache(msg) => write!(f, "Cache: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl QuerypipeConfig {
    /// Validate the entire configuration, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let url = self.client.url.trim();
        if url.is_empty() {
            errors.push(ValidationError::Client("URL cannot be empty".to_string()));
        } else if !url.starts_with("http://") && !url.starts_with("https://") {
            errors.push(ValidationError::Client(format!(
                "URL must start with http:// or https:// (got '{}')",
                url
            )));
        }
        for name in self.client.headers.keys() {
            if name.trim().is_empty() {
                errors.push(ValidationError::Client("Header name cannot be empty".to_string()));
            }
        }

        if self.transport.connect_timeout_ms == 0 {
            errors.push(ValidationError::Transport(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.transport.request_timeout_ms == 0 {
            errors.push(ValidationError::Transport(
                "request_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.batch.max_operation_count == 0 {
            errors.push(ValidationError::Batch(
                "max_operation_count must be at least 1".to_string(),
            ));
        }

        if self.cache.max_entries == Some(0) {
            errors.push(ValidationError::Cache(
                "max_entries must be at least 1 when set".to_string(),
            ));
        }

        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
