//! Core data model: operations, cache policies and normalized results.

use crate::document::QuerySource;
use crate::error::{ClientError, CombinedError, GraphQLError, NetworkError};
use crate::key::OperationKey;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Operation variables
pub type Variables = Map<String, Value>;

/// How the cache plugin treats a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Serve the cache when present, otherwise go to the network
    #[default]
    CacheFirst,
    /// Serve the cache or an empty result, never the network
    CacheOnly,
    /// Skip the cache entirely
    NetworkOnly,
    /// Serve the cache immediately and refresh from the network in the background
    CacheAndNetwork,
}

impl CachePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePolicy::CacheFirst => "cache-first",
            CachePolicy::CacheOnly => "cache-only",
            CachePolicy::NetworkOnly => "network-only",
            CachePolicy::CacheAndNetwork => "cache-and-network",
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CachePolicy {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cache-first" => Ok(CachePolicy::CacheFirst),
            "cache-only" => Ok(CachePolicy::CacheOnly),
            "network-only" => Ok(CachePolicy::NetworkOnly),
            "cache-and-network" => Ok(CachePolicy::CacheAndNetwork),
            other => Err(ClientError::Config(format!(
                "Invalid cache policy: {} (must be 'cache-first', 'cache-only', 'network-only' or 'cache-and-network')",
                other
            ))),
        }
    }
}

/// Operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        })
    }
}

/// Operation descriptor built by the caller
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub query: QuerySource,
    pub variables: Option<Variables>,
    pub cache_policy: Option<CachePolicy>,
}

impl OperationRequest {
    pub fn new(query: impl Into<QuerySource>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            cache_policy: None,
        }
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables
            .get_or_insert_with(Variables::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = Some(cache_policy);
        self
    }
}

/// Operation as seen by plugins. Fixed for the lifetime of one execution.
#[derive(Debug, Clone)]
pub struct Operation {
    pub key: OperationKey,
    pub kind: OperationKind,
    pub query: QuerySource,
    pub variables: Option<Variables>,
    pub cache_policy: CachePolicy,
}

impl Operation {
    /// Normalized query text
    pub fn query_text(&self) -> Result<String, ClientError> {
        self.query.normalize().ok_or(ClientError::MissingQuery)
    }
}

/// Normalized result of one execution
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OperationResult {
    pub data: Option<Value>,
    pub error: Option<CombinedError>,
}

impl OperationResult {
    /// `{ data: None, error: None }`
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn from_error(error: CombinedError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Decode `data` into a caller type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.data
            .as_ref()
            .map(|data| serde_json::from_value(data.clone()))
            .transpose()
    }

    /// JSON view used by the CLI
    pub fn to_json(&self) -> Value {
        let mut out = json!({ "data": self.data.clone().unwrap_or(Value::Null) });
        if let Some(error) = &self.error {
            out["error"] = json!({
                "message": error.message(),
                "graphqlErrors": error.graphql_errors,
            });
        }
        out
    }
}

/// Standard `{ data, errors }` payload produced by subscription sources
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StandardResult {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQLError>>,
}

impl StandardResult {
    pub fn into_operation_result(self) -> OperationResult {
        let data = self.data.filter(|d| !d.is_null());
        match self.errors {
            Some(errors) if !errors.is_empty() => OperationResult {
                data,
                error: Some(CombinedError::graphql(errors)),
            },
            _ => OperationResult { data, error: None },
        }
    }
}

/// Raw stream handed back by a subscription forwarder
pub type ForwardedStream = BoxStream<'static, Result<StandardResult, NetworkError>>;

/// Normalized subscription stream returned to the caller
pub type SubscriptionStream = BoxStream<'static, OperationResult>;

/// Shareable slot holding a forwarded stream until the caller takes it
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Arc<Mutex<Option<ForwardedStream>>>,
}

impl SubscriptionHandle {
    pub fn new(stream: ForwardedStream) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(stream))),
        }
    }

    /// Take the stream out of the handle. Only the first call gets it.
    pub fn take(&self) -> Option<ForwardedStream> {
        self.inner.lock().take()
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("taken", &self.inner.lock().is_none())
            .finish()
    }
}

/// What a plugin publishes through `use_result`
#[derive(Debug, Clone)]
pub enum Outcome {
    Result(OperationResult),
    Subscription(SubscriptionHandle),
}

impl Outcome {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Outcome::Result(_) => "result",
            Outcome::Subscription(_) => "subscription",
        }
    }

    pub fn as_result(&self) -> Option<&OperationResult> {
        match self {
            Outcome::Result(result) => Some(result),
            Outcome::Subscription(_) => None,
        }
    }

    pub fn into_result(self) -> Result<OperationResult, ClientError> {
        match self {
            Outcome::Result(result) => Ok(result),
            other => Err(ClientError::UnexpectedOutcome {
                expected: "result",
                actual: other.kind_name(),
            }),
        }
    }
}

impl From<OperationResult> for Outcome {
    fn from(result: OperationResult) -> Self {
        Outcome::Result(result)
    }
}

impl From<SubscriptionHandle> for Outcome {
    fn from(handle: SubscriptionHandle) -> Self {
        Outcome::Subscription(handle)
    }
}
