//! Route subscriptions to a caller supplied stream source.

use crate::error::ClientError;
use crate::plugin::{Plugin, PluginContext};
use crate::transport::FetchOptions;
use crate::types::{ForwardedStream, Operation, OperationKind, SubscriptionHandle};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

/// Opens a long-lived result stream for a subscription operation. Receives the merged
/// per-call fetch options (endpoint and headers).
pub type SubscriptionForwarder =
    Arc<dyn Fn(&Operation, &FetchOptions) -> ForwardedStream + Send + Sync>;

/// Publishes the forwarded stream and terminates the chain. The stream itself stays open;
/// termination only stops later plugins from replacing it.
#[derive(Default)]
pub struct SubscriptionPlugin {
    forwarder: Option<SubscriptionForwarder>,
}

impl SubscriptionPlugin {
    pub fn new<F>(forwarder: F) -> Self
    where
        F: Fn(&Operation, &FetchOptions) -> ForwardedStream + Send + Sync + 'static,
    {
        Self {
            forwarder: Some(Arc::new(forwarder)),
        }
    }

    pub fn from_forwarder(forwarder: Option<SubscriptionForwarder>) -> Self {
        Self { forwarder }
    }
}

#[async_trait]
impl Plugin for SubscriptionPlugin {
    fn name(&self) -> &str {
        "subscription"
    }

    async fn run(&self, ctx: &mut PluginContext) -> Result<(), ClientError> {
        if ctx.operation().kind != OperationKind::Subscription {
            return Ok(());
        }

        let Some(forward) = &self.forwarder else {
            error!(key = ctx.operation().key, "Subscription executed without a forwarder");
            return Err(ClientError::NoSubscriptionForwarder);
        };

        debug!(key = ctx.operation().key, "Forwarding subscription");
        let stream = forward(ctx.operation(), ctx.fetch_options());
        ctx.use_result(SubscriptionHandle::new(stream), true);
        Ok(())
    }
}
