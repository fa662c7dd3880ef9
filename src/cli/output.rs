//! CLI output formatting and error mapping.

use crate::error::ClientError;
use crate::types::OperationResult;

/// Map a client error to a user-facing message.
pub fn map_error(e: &ClientError) -> String {
    match e {
        ClientError::NoResult => {
            "No plugin produced a result; check the plugin chain in your configuration".to_string()
        }
        other => other.to_string(),
    }
}

/// Pretty JSON for an operation result.
pub fn format_result(result: &OperationResult) -> Result<String, ClientError> {
    serde_json::to_string_pretty(&result.to_json())
        .map_err(|e| ClientError::Config(format!("Failed to render result: {}", e)))
}
