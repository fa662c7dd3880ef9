//! Terminal transport plugin.
//!
//! Every failure mode ends as a published [`OperationResult`]. Only a missing query (a
//! caller bug) is returned as a fatal error.

use crate::config::TransportConfig;
use crate::error::{ClientError, CombinedError, GraphQLError, NetworkError};
use crate::plugin::{Plugin, PluginContext};
use crate::transport::{HttpTransport, Transport, TransportRequest, TransportResponse};
use crate::types::OperationResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sends the operation through a [`Transport`] and normalizes the response
pub struct FetchPlugin {
    transport: Arc<dyn Transport>,
}

impl FetchPlugin {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Fetch plugin over a reqwest transport
    pub fn http(config: &TransportConfig) -> Result<Self, ClientError> {
        Ok(Self::new(Arc::new(HttpTransport::new(config)?)))
    }
}

/// Pull `data` and `errors` out of a `{data?, errors?}` payload
pub(crate) fn split_payload(payload: Option<&Value>) -> (Option<Value>, Vec<GraphQLError>) {
    let Some(payload) = payload else {
        return (None, Vec::new());
    };
    let data = payload.get("data").filter(|d| !d.is_null()).cloned();
    let errors = payload
        .get("errors")
        .map(GraphQLError::list_from_value)
        .unwrap_or_default();
    (data, errors)
}

/// Normalize a single-operation response.
///
/// A non-success status does not hide protocol errors: when the body carries `errors`
/// they are reported as such, otherwise the status (or the decode failure) becomes the
/// error.
pub(crate) fn normalize_response(response: &TransportResponse) -> OperationResult {
    let (data, errors) = split_payload(response.body.as_ref());

    if !response.ok() || response.body.is_none() {
        let error = if !errors.is_empty() {
            CombinedError::graphql(errors)
        } else if let Some(parse_error) = &response.parse_error {
            CombinedError::parse(parse_error.clone())
        } else {
            CombinedError::network(NetworkError::Status {
                status: response.status,
                status_text: response.status_text.clone(),
            })
        };
        return OperationResult {
            data,
            error: Some(error.with_response(response.clone())),
        };
    }

    let error = if errors.is_empty() {
        None
    } else {
        Some(CombinedError::graphql(errors).with_response(response.clone()))
    };
    OperationResult { data, error }
}

#[async_trait]
impl Plugin for FetchPlugin {
    fn name(&self) -> &str {
        "fetch"
    }

    async fn run(&self, ctx: &mut PluginContext) -> Result<(), ClientError> {
        let request = TransportRequest::for_operation(ctx.operation(), ctx.fetch_options())?;
        let key = ctx.operation().key;

        let response = match self.transport.send(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(key, url = %request.url, error = %e, "Transport request failed");
                ctx.use_result(
                    OperationResult::from_error(CombinedError::network(e)),
                    true,
                );
                return Ok(());
            }
        };

        debug!(key, status = response.status, "Fetched operation");
        let result = normalize_response(&response);
        ctx.set_response(response);
        ctx.use_result(result, true);
        Ok(())
    }
}
