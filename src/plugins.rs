//! First-party plugins
//!
//! The default chain is `[cache, dedup, fetch]`: the cache decides whether the network is
//! needed at all, dedup decides whether this execution or an in-flight twin talks to it,
//! and fetch is the terminal plugin that actually does.

pub mod batch;
pub mod cache;
pub mod dedup;
pub mod fetch;
pub mod subscription;

pub use batch::{BatchOptions, BatchPlugin};
pub use cache::CachePlugin;
pub use dedup::DedupPlugin;
pub use fetch::FetchPlugin;
pub use subscription::{SubscriptionForwarder, SubscriptionPlugin};

use crate::plugin::Plugin;
use crate::transport::Transport;
use std::sync::Arc;

/// `[cache, dedup, fetch]` over the given transport
pub fn default_plugins(transport: Arc<dyn Transport>) -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(CachePlugin::new()),
        Arc::new(DedupPlugin::new()),
        Arc::new(FetchPlugin::new(transport)),
    ]
}
