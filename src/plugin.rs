//! Plugin contract and per-call execution context.
//!
//! A plugin receives the shared [`PluginContext`] and may:
//! - read the operation and edit the transport options,
//! - publish an [`Outcome`] with [`PluginContext::use_result`], optionally terminating,
//! - register after-query callbacks that see the final outcome and raw response.
//!
//! Publishing more than once is allowed; every publish after the first is reported through
//! the result-changed callback.

use crate::error::ClientError;
use crate::transport::{FetchOptions, TransportResponse};
use crate::types::{Operation, Outcome};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Receives republished outcomes
pub type ResultChangedCallback = Arc<dyn Fn(&Outcome) + Send + Sync>;

/// Runs once the chain has settled
pub type AfterQueryCallback =
    Box<dyn FnOnce(Arc<AfterQueryContext>) -> BoxFuture<'static, ()> + Send>;

/// What after-query callbacks see
#[derive(Debug)]
pub struct AfterQueryContext {
    pub outcome: Outcome,
    pub response: Option<TransportResponse>,
}

/// Lifecycle of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Pending,
    ChainRunning,
    Resolved,
    BackgroundDraining,
    Settled,
}

/// Per-call mutable state shared by every plugin in the chain
pub struct PluginContext {
    operation: Operation,
    fetch_options: FetchOptions,
    response: Option<TransportResponse>,
    outcome: Option<Outcome>,
    terminated: bool,
    after_query: Vec<AfterQueryCallback>,
    on_result_changed: Option<ResultChangedCallback>,
    state: ExecutionState,
}

impl PluginContext {
    pub fn new(
        operation: Operation,
        fetch_options: FetchOptions,
        on_result_changed: Option<ResultChangedCallback>,
    ) -> Self {
        Self {
            operation,
            fetch_options,
            response: None,
            outcome: None,
            terminated: false,
            after_query: Vec::new(),
            on_result_changed,
            state: ExecutionState::Pending,
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn fetch_options(&self) -> &FetchOptions {
        &self.fetch_options
    }

    pub fn fetch_options_mut(&mut self) -> &mut FetchOptions {
        &mut self.fetch_options
    }

    pub fn response(&self) -> Option<&TransportResponse> {
        self.response.as_ref()
    }

    /// Record the raw transport response
    pub fn set_response(&mut self, response: TransportResponse) {
        self.response = Some(response);
    }

    /// Publish an outcome. `terminate` stops any further plugin from running after the
    /// caller has been resolved.
    pub fn use_result(&mut self, outcome: impl Into<Outcome>, terminate: bool) {
        let outcome = outcome.into();
        if terminate {
            self.terminated = true;
        }

        if self.outcome.is_some() {
            if let Some(callback) = &self.on_result_changed {
                callback(&outcome);
            }
        }

        self.outcome = Some(outcome);
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn has_outcome(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ExecutionState) {
        self.state = state;
    }

    /// Register a synchronous after-query callback
    pub fn after_query<F>(&mut self, callback: F)
    where
        F: FnOnce(&Outcome, Option<&TransportResponse>) + Send + 'static,
    {
        self.after_query.push(Box::new(move |ctx: Arc<AfterQueryContext>| {
            callback(&ctx.outcome, ctx.response.as_ref());
            futures::future::ready(()).boxed()
        }));
    }

    /// Register an asynchronous after-query callback
    pub fn after_query_async<F, Fut>(&mut self, callback: F)
    where
        F: FnOnce(Arc<AfterQueryContext>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.after_query
            .push(Box::new(move |ctx: Arc<AfterQueryContext>| callback(ctx).boxed()));
    }

    /// Run every registered after-query callback in registration order
    pub(crate) async fn run_after_query(&mut self) {
        let callbacks = std::mem::take(&mut self.after_query);
        let Some(outcome) = self.outcome.clone() else {
            return;
        };

        let ctx = Arc::new(AfterQueryContext {
            outcome,
            response: self.response.clone(),
        });
        for callback in callbacks {
            callback(Arc::clone(&ctx)).await;
        }
    }
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("operation", &self.operation)
            .field("fetch_options", &self.fetch_options)
            .field("has_outcome", &self.outcome.is_some())
            .field("terminated", &self.terminated)
            .field("after_query", &self.after_query.len())
            .field("state", &self.state)
            .finish()
    }
}

/// A link in the execution chain
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name for logging
    fn name(&self) -> &str;

    /// Inspect or act on the context. Returning `Err` aborts the call as a setup error;
    /// runtime failures must be published as error results instead.
    async fn run(&self, ctx: &mut PluginContext) -> Result<(), ClientError>;
}

/// Plugin built from a synchronous closure
pub struct FnPlugin<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> Plugin for FnPlugin<F>
where
    F: Fn(&mut PluginContext) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut PluginContext) -> Result<(), ClientError> {
        (self.f)(ctx);
        Ok(())
    }
}

/// Define a plugin from a closure, e.g. to inject headers:
///
/// ```
/// use querypipe::plugin::plugin_fn;
///
/// let auth = plugin_fn("auth", |ctx| {
///     ctx.fetch_options_mut()
///         .headers
///         .insert("authorization".into(), "Bearer token".into());
/// });
/// assert_eq!(auth.name(), "auth");
/// ```
pub fn plugin_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn Plugin>
where
    F: Fn(&mut PluginContext) + Send + Sync + 'static,
{
    Arc::new(FnPlugin {
        name: name.into(),
        f,
    })
}
