//! Execution engine
//!
//! Runs an operation through the ordered plugin chain:
//!
//! 1. `ChainRunning`: plugins are awaited one by one until one publishes.
//! 2. `Resolved`: the caller gets the published outcome right away.
//! 3. `BackgroundDraining`: unless the publisher terminated, the remaining plugins keep
//!    running, followed by every after-query callback.
//! 4. `Settled`: nothing else reaches the caller except through the result-changed
//!    callback.
//!
//! The whole run happens in one spawned task counted by the client, so it completes even
//! when the caller stops listening before or after resolution.

use crate::config::QuerypipeConfig;
use crate::error::{ClientError, CombinedError};
use crate::key::query_key;
use crate::plugin::{ExecutionState, Plugin, PluginContext, ResultChangedCallback};
use crate::plugins::{
    default_plugins, BatchOptions, BatchPlugin, CachePlugin, DedupPlugin, FetchPlugin,
};
use crate::transport::{FetchOptions, HttpTransport, Transport};
use crate::types::{
    CachePolicy, Operation, OperationKind, OperationRequest, OperationResult, Outcome,
    SubscriptionStream,
};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error, trace};

/// Client construction options
#[derive(Clone)]
pub struct ClientOptions {
    pub url: String,
    pub cache_policy: CachePolicy,
    /// Headers sent with every operation
    pub headers: BTreeMap<String, String>,
    /// Plugin chain; `None` selects `[cache, dedup, fetch]` over HTTP
    pub plugins: Option<Vec<Arc<dyn Plugin>>>,
}

impl ClientOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cache_policy: CachePolicy::default(),
            headers: BTreeMap::new(),
            plugins: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }

    pub fn plugins(mut self, plugins: Vec<Arc<dyn Plugin>>) -> Self {
        self.plugins = Some(plugins);
        self
    }
}

/// Per-call options
#[derive(Clone, Default)]
pub struct QueryContext {
    /// Extra headers merged over the defaults
    pub headers: BTreeMap<String, String>,
    pub on_result_changed: Option<ResultChangedCallback>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn on_result_changed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Outcome) + Send + Sync + 'static,
    {
        self.on_result_changed = Some(Arc::new(callback));
        self
    }
}

/// Counts spawned operation runs that have not settled yet
#[derive(Debug, Default)]
struct BackgroundTracker {
    active: AtomicUsize,
    idle: Notify,
}

impl BackgroundTracker {
    fn begin(self: &Arc<Self>) -> BackgroundGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        BackgroundGuard(Arc::clone(self))
    }
}

struct BackgroundGuard(Arc<BackgroundTracker>);

impl Drop for BackgroundGuard {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Operation client. Cheap to clone; clones share the plugin chain and its state.
#[derive(Clone)]
pub struct Client {
    url: String,
    default_cache_policy: CachePolicy,
    headers: BTreeMap<String, String>,
    plugins: Arc<[Arc<dyn Plugin>]>,
    background: Arc<BackgroundTracker>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.url)
            .field("default_cache_policy", &self.default_cache_policy)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Client {
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        let plugins = match options.plugins {
            Some(plugins) => plugins,
            None => {
                let transport: Arc<dyn Transport> =
                    Arc::new(HttpTransport::new(&Default::default())?);
                default_plugins(transport)
            }
        };

        Ok(Self {
            url: options.url,
            default_cache_policy: options.cache_policy,
            headers: options.headers,
            plugins: plugins.into(),
            background: Arc::new(BackgroundTracker::default()),
        })
    }

    /// Build a client from loaded configuration
    pub fn from_config(config: &QuerypipeConfig) -> Result<Self, ClientError> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.transport)?);
        Self::from_config_with_transport(config, transport)
    }

    /// Same as [`Client::from_config`] over a caller supplied transport
    pub fn from_config_with_transport(
        config: &QuerypipeConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        config.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ClientError::Config(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;

        let mut plugins: Vec<Arc<dyn Plugin>> = Vec::new();
        if config.cache.enabled {
            plugins.push(match config.cache.max_entries {
                Some(max) => Arc::new(CachePlugin::with_max_entries(max)),
                None => Arc::new(CachePlugin::new()),
            });
        }
        if config.client.dedup {
            plugins.push(Arc::new(DedupPlugin::new()));
        }
        if config.batch.enabled {
            plugins.push(Arc::new(BatchPlugin::new(
                transport,
                BatchOptions::from(&config.batch),
            )));
        } else {
            plugins.push(Arc::new(FetchPlugin::new(transport)));
        }

        Ok(Self {
            url: config.client.url.clone(),
            default_cache_policy: config.client.cache_policy,
            headers: config.client.headers.clone(),
            plugins: plugins.into(),
            background: Arc::new(BackgroundTracker::default()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn default_cache_policy(&self) -> CachePolicy {
        self.default_cache_policy
    }

    pub async fn execute_query(
        &self,
        request: OperationRequest,
        query_context: Option<QueryContext>,
    ) -> Result<OperationResult, ClientError> {
        self.execute(request, OperationKind::Query, query_context)
            .await?
            .into_result()
    }

    pub async fn execute_mutation(
        &self,
        request: OperationRequest,
        query_context: Option<QueryContext>,
    ) -> Result<OperationResult, ClientError> {
        self.execute(request, OperationKind::Mutation, query_context)
            .await?
            .into_result()
    }

    /// Execute a subscription and return its normalized result stream
    pub async fn execute_subscription(
        &self,
        request: OperationRequest,
        query_context: Option<QueryContext>,
    ) -> Result<SubscriptionStream, ClientError> {
        let handle = match self
            .execute(request, OperationKind::Subscription, query_context)
            .await?
        {
            Outcome::Subscription(handle) => handle,
            other => {
                return Err(ClientError::UnexpectedOutcome {
                    expected: "subscription",
                    actual: other.kind_name(),
                })
            }
        };

        let stream = handle.take().ok_or(ClientError::SubscriptionTaken)?;
        Ok(stream
            .map(|item| match item {
                Ok(payload) => payload.into_operation_result(),
                Err(e) => OperationResult::from_error(CombinedError::network(e)),
            })
            .boxed())
    }

    /// Wait until every background continuation has settled
    pub async fn wait_for_idle(&self, timeout: Option<Duration>) -> Result<(), ClientError> {
        let wait = async {
            loop {
                let notified = self.background.idle.notified();
                if self.background.active.load(Ordering::SeqCst) == 0 {
                    return;
                }
                notified.await;
            }
        };

        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait)
                .await
                .map_err(|_| ClientError::DrainTimeout),
            None => {
                wait.await;
                Ok(())
            }
        }
    }

    /// Run the chain in a tracked task and resolve with the first published outcome.
    ///
    /// The caller only holds the receiving end, so dropping this future never cancels
    /// the chain, its after-query callbacks or the waiters attached to it.
    async fn execute(
        &self,
        request: OperationRequest,
        kind: OperationKind,
        query_context: Option<QueryContext>,
    ) -> Result<Outcome, ClientError> {
        let query_context = query_context.unwrap_or_default();
        let operation = Operation {
            key: query_key(&request.query, request.variables.as_ref(), &[]),
            kind,
            query: request.query,
            variables: request.variables,
            cache_policy: request.cache_policy.unwrap_or(self.default_cache_policy),
        };

        let mut fetch_options = FetchOptions::new(self.url.clone());
        fetch_options.headers.extend(self.headers.clone());
        fetch_options.headers.extend(query_context.headers);

        let key = operation.key;
        let ctx = PluginContext::new(operation, fetch_options, query_context.on_result_changed);
        debug!(key, kind = %kind, policy = %ctx.operation().cache_policy, "Executing operation");

        let (resolve, resolved) = oneshot::channel();
        let plugins = Arc::clone(&self.plugins);
        let guard = self.background.begin();
        tokio::spawn(async move {
            let _guard = guard;
            run_chain(plugins, ctx, resolve).await;
        });

        match resolved.await {
            Ok(resolved) => resolved,
            Err(_) => {
                error!(key, kind = %kind, "Execution ended without resolving");
                Err(ClientError::NoResult)
            }
        }
    }
}

/// Drive one operation from `ChainRunning` to `Settled`. The first published outcome, or
/// the first fatal error, goes to `resolve`; whether anyone still listens makes no
/// difference to the rest of the run.
async fn run_chain(
    plugins: Arc<[Arc<dyn Plugin>]>,
    mut ctx: PluginContext,
    resolve: oneshot::Sender<Result<Outcome, ClientError>>,
) {
    let key = ctx.operation().key;
    ctx.set_state(ExecutionState::ChainRunning);

    let mut published_at = None;
    for (index, plugin) in plugins.iter().enumerate() {
        trace!(key, plugin = plugin.name(), "Running plugin");
        if let Err(e) = plugin.run(&mut ctx).await {
            debug!(key, plugin = plugin.name(), error = %e, "Plugin failed before resolution");
            let _ = resolve.send(Err(e));
            return;
        }
        if ctx.has_outcome() {
            published_at = Some(index);
            break;
        }
    }

    let (Some(index), Some(outcome)) = (published_at, ctx.outcome().cloned()) else {
        error!(key, "No plugin published a result");
        let _ = resolve.send(Err(ClientError::NoResult));
        return;
    };

    ctx.set_state(ExecutionState::Resolved);
    debug!(
        key,
        plugin = plugins[index].name(),
        terminated = ctx.is_terminated(),
        "Operation resolved"
    );
    if resolve.send(Ok(outcome)).is_err() {
        debug!(key, "Caller stopped listening, finishing in background");
    }

    if !ctx.is_terminated() {
        ctx.set_state(ExecutionState::BackgroundDraining);
        for plugin in plugins.iter().skip(index + 1) {
            trace!(key, plugin = plugin.name(), "Running plugin in background");
            if let Err(e) = plugin.run(&mut ctx).await {
                error!(key, plugin = plugin.name(), error = %e, "Background plugin failed");
                break;
            }
        }
    }

    ctx.run_after_query().await;
    ctx.set_state(ExecutionState::Settled);
    trace!(key, "Operation settled");
}
