//! Transport collaborator
//!
//! The pipeline only needs "send this request, give me status, headers and a decoded
//! body". [`Transport`] is that seam; [`HttpTransport`] implements it with reqwest.

use crate::config::TransportConfig;
use crate::error::{ClientError, TransportError};
use crate::types::Operation;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// HTTP method used for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Post,
    Get,
}

/// Transport options carried on the per-call context. Plugins may edit these before the
/// terminal plugin runs.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    /// Replaces the default `{query, variables}` body when set
    pub body: Option<Value>,
}

impl FetchOptions {
    pub fn new(url: impl Into<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            headers,
            body: None,
        }
    }
}

/// Fully built request handed to a [`Transport`]
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl TransportRequest {
    /// Build the request for an operation from the current fetch options
    pub fn for_operation(
        operation: &Operation,
        options: &FetchOptions,
    ) -> Result<Self, ClientError> {
        let body = match &options.body {
            Some(body) => body.clone(),
            None => {
                let mut body = json!({ "query": operation.query_text()? });
                if let Some(variables) = &operation.variables {
                    body["variables"] = Value::Object(variables.clone());
                }
                body
            }
        };

        Ok(Self {
            url: options.url.clone(),
            method: options.method,
            headers: options.headers.clone(),
            body,
        })
    }
}

/// Response as seen by the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    /// Decoded body; `None` when empty, `null` or undecodable
    pub body: Option<Value>,
    /// Decoder message when the body could not be read as JSON
    pub parse_error: Option<String>,
}

impl TransportResponse {
    /// Decode a raw body. Never fails: decode problems land in `parse_error`.
    pub fn from_bytes(
        status: u16,
        status_text: impl Into<String>,
        headers: BTreeMap<String, String>,
        bytes: &[u8],
    ) -> Self {
        let (body, parse_error) = if bytes.iter().all(u8::is_ascii_whitespace) {
            (None, None)
        } else {
            match serde_json::from_slice::<Value>(bytes) {
                Ok(Value::Null) => (None, None),
                Ok(value) => (Some(value), None),
                Err(e) => (None, Some(e.to_string())),
            }
        };

        Self {
            status,
            status_text: status_text.into(),
            headers,
            body,
            parse_error,
        }
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends built requests
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError>;
}

// Helper function to map reqwest errors to TransportError
fn map_http_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else if error.is_builder() {
        TransportError::Build(error.to_string())
    } else {
        TransportError::Request(error.to_string())
    }
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms));
        if config.no_proxy {
            builder = builder.no_proxy();
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an already configured reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Post => {
                let body = serde_json::to_vec(&request.body)
                    .map_err(|e| TransportError::Build(e.to_string()))?;
                self.client.post(&request.url).body(body)
            }
            HttpMethod::Get => {
                let mut params: Vec<(&str, String)> = Vec::new();
                if let Some(query) = request.body.get("query").and_then(Value::as_str) {
                    params.push(("query", query.to_string()));
                }
                if let Some(variables) = request.body.get("variables") {
                    params.push(("variables", variables.to_string()));
                }
                self.client.get(&request.url).query(&params)
            }
        };

        for (name, value) in &request.headers {
            if request.method == HttpMethod::Get && name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        debug!(url = %request.url, method = ?request.method, "Sending transport request");
        let response = builder.send().await.map_err(map_http_error)?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or("").to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let bytes = response.bytes().await.map_err(map_http_error)?;

        debug!(
            status = status.as_u16(),
            bytes = bytes.len(),
            "Received transport response"
        );
        Ok(TransportResponse::from_bytes(
            status.as_u16(),
            status_text,
            headers,
            &bytes,
        ))
    }
}
