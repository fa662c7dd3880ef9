//! Error types for the querypipe operation pipeline.
//!
//! Two families live here. [`CombinedError`] is data: it rides on an
//! [`OperationResult`](crate::types::OperationResult) and is never returned as `Err`.
//! [`ClientError`] is fatal: it means the pipeline itself is misconfigured.

use crate::transport::TransportResponse;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Transport-level failures (the request never produced a response)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Request aborted: {0}")]
    Aborted(String),

    #[error("HTTP error: {0}")]
    Request(String),

    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

/// Network side of a [`CombinedError`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// Non-success status with no protocol errors to report
    #[error("{status_text}")]
    Status { status: u16, status_text: String },

    #[error("Received empty response")]
    EmptyResponse,

    #[error("{0}")]
    Unsupported(String),

    /// Error emitted by a subscription source
    #[error("{0}")]
    Stream(String),
}

/// Source location attached to a protocol error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
    pub line: u32,
    pub column: u32,
}

/// A single protocol-level error as returned in the `errors` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<ErrorLocation>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: None,
            path: None,
            extensions: None,
        }
    }

    /// Read an `errors` array from a response body.
    ///
    /// Entries that don't match the expected shape are kept with their raw JSON as message,
    /// so a malformed server never hides the fact that it reported errors.
    pub fn list_from_value(value: &Value) -> Vec<GraphQLError> {
        let Some(entries) = value.as_array() else {
            return Vec::new();
        };

        entries
            .iter()
            .map(|entry| {
                serde_json::from_value::<GraphQLError>(entry.clone())
                    .unwrap_or_else(|_| GraphQLError::new(entry.to_string()))
            })
            .collect()
    }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Network, parse and protocol failures folded into one value
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CombinedError {
    pub network_error: Option<NetworkError>,
    pub parse_error: Option<String>,
    pub graphql_errors: Vec<GraphQLError>,
    pub response: Option<TransportResponse>,
}

impl CombinedError {
    pub fn network(error: impl Into<NetworkError>) -> Self {
        Self {
            network_error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            parse_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn graphql(errors: Vec<GraphQLError>) -> Self {
        Self {
            graphql_errors: errors,
            ..Self::default()
        }
    }

    pub fn with_response(mut self, response: TransportResponse) -> Self {
        self.response = Some(response);
        self
    }

    pub fn is_network_error(&self) -> bool {
        self.network_error.is_some()
    }

    pub fn is_parse_error(&self) -> bool {
        self.parse_error.is_some()
    }

    pub fn is_graphql_error(&self) -> bool {
        !self.graphql_errors.is_empty()
    }

    /// Human readable summary, network first, then parse, then protocol errors
    pub fn message(&self) -> String {
        if let Some(network) = &self.network_error {
            return format!("[Network] {}", network);
        }
        if let Some(parse) = &self.parse_error {
            return format!("[Parse] {}", parse);
        }
        if !self.graphql_errors.is_empty() {
            return self
                .graphql_errors
                .iter()
                .map(|e| format!("[GraphQL] {}", e.message))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string();
        }
        "Unknown error".to_string()
    }
}

impl fmt::Display for CombinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for CombinedError {}

/// Fatal pipeline errors. These indicate a setup mistake and are never retried.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Operation result was not set by any plugin, make sure the default plugins are configured")]
    NoResult,

    #[error("No subscription forwarder was set")]
    NoSubscriptionForwarder,

    #[error("A query must be provided")]
    MissingQuery,

    #[error("Expected a {expected} outcome but a plugin published a {actual} outcome")]
    UnexpectedOutcome {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Subscription stream was already taken")]
    SubscriptionTaken,

    #[error("Timed out waiting for background work to settle")]
    DrainTimeout,

    #[error("Plugin '{plugin}' failed: {message}")]
    Plugin { plugin: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ClientError {
    fn from(err: config::ConfigError) -> Self {
        ClientError::Config(err.to_string())
    }
}
