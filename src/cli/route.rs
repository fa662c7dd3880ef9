//! CLI route: run context and the single command dispatch table.

use crate::cli::output::format_result;
use crate::cli::parse::{Commands, OperationKindArg};
use crate::client::{Client, QueryContext};
use crate::config::{ConfigLoader, QuerypipeConfig};
use crate::document::QuerySource;
use crate::error::ClientError;
use crate::key::query_key;
use crate::types::{CachePolicy, OperationRequest, Variables};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound on waiting for cache writes and background refreshes before exit
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime context for CLI execution: the effective configuration.
pub struct RunContext {
    config: QuerypipeConfig,
}

impl RunContext {
    /// Load configuration from the explicit file or the project root, then apply `--url`.
    pub fn new(
        root: PathBuf,
        config_path: Option<PathBuf>,
        url: Option<String>,
    ) -> Result<Self, ClientError> {
        let mut config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&root)?,
        };
        if let Some(url) = url {
            config.client.url = url;
        }
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: QuerypipeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QuerypipeConfig {
        &self.config
    }

    pub fn execute(&self, command: &Commands) -> Result<String, ClientError> {
        match command {
            Commands::Run {
                query,
                file,
                vars,
                policy,
                kind,
                headers,
            } => {
                let text = read_query(query.as_deref(), file.as_deref())?;
                let mut request = OperationRequest::new(text);
                if let Some(variables) = parse_vars(vars)? {
                    request = request.with_variables(variables);
                }
                if let Some(policy) = policy {
                    request = request.with_cache_policy(policy.parse::<CachePolicy>()?);
                }
                let mut query_context = QueryContext::new();
                for header in headers {
                    let (name, value) = parse_header(header)?;
                    query_context = query_context.header(name, value);
                }
                self.run_operation(request, *kind, query_context)
            }
            Commands::Key { query, file, vars } => {
                let text = read_query(query.as_deref(), file.as_deref())?;
                let variables = parse_vars(vars)?;
                let key = query_key(&QuerySource::from(text), variables.as_ref(), &[]);
                Ok(key.to_string())
            }
            Commands::Config => toml::to_string_pretty(&self.config)
                .map_err(|e| ClientError::Config(format!("Failed to render configuration: {}", e))),
        }
    }

    fn run_operation(
        &self,
        request: OperationRequest,
        kind: OperationKindArg,
        query_context: QueryContext,
    ) -> Result<String, ClientError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        runtime.block_on(async {
            let client = Client::from_config(&self.config)?;
            info!(url = client.url(), ?kind, "Running operation");
            let result = match kind {
                OperationKindArg::Query => {
                    client.execute_query(request, Some(query_context)).await?
                }
                OperationKindArg::Mutation => {
                    client.execute_mutation(request, Some(query_context)).await?
                }
            };
            if client.wait_for_idle(Some(DRAIN_TIMEOUT)).await.is_err() {
                debug!("Background work still running at exit");
            }
            format_result(&result)
        })
    }
}

fn read_query(query: Option<&str>, file: Option<&Path>) -> Result<String, ClientError> {
    match (query, file) {
        (Some(query), _) => Ok(query.to_string()),
        (None, Some(path)) => Ok(std::fs::read_to_string(path)?),
        (None, None) => Err(ClientError::MissingQuery),
    }
}

/// Parse `name=value` pairs. `None` when no variables were given.
pub(crate) fn parse_vars(vars: &[String]) -> Result<Option<Variables>, ClientError> {
    if vars.is_empty() {
        return Ok(None);
    }
    let mut variables = Variables::new();
    for var in vars {
        let (name, raw) = var.split_once('=').ok_or_else(|| {
            ClientError::Config(format!("Invalid variable '{}' (expected name=value)", var))
        })?;
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        variables.insert(name.trim().to_string(), value);
    }
    Ok(Some(variables))
}

pub(crate) fn parse_header(header: &str) -> Result<(String, String), ClientError> {
    match header.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(ClientError::Config(format!(
            "Invalid header '{}' (expected name:value)",
            header
        ))),
    }
}
