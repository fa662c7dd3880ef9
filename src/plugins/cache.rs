//! In-memory result cache keyed by operation fingerprint.

use crate::error::ClientError;
use crate::key::OperationKey;
use crate::plugin::{Plugin, PluginContext};
use crate::types::{CachePolicy, OperationKind, OperationResult, Outcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Fingerprint → result store. Unbounded unless `max_entries` is set, in which case the
/// oldest inserted key is evicted first.
#[derive(Debug, Default)]
struct ResultStore {
    entries: HashMap<OperationKey, OperationResult>,
    insertion_order: VecDeque<OperationKey>,
    max_entries: Option<usize>,
}

impl ResultStore {
    fn get(&self, key: OperationKey) -> Option<OperationResult> {
        self.entries.get(&key).cloned()
    }

    fn insert(&mut self, key: OperationKey, result: OperationResult) {
        if self.entries.insert(key, result).is_none() {
            self.insertion_order.push_back(key);
        }

        if let Some(max) = self.max_entries {
            while self.entries.len() > max {
                let Some(oldest) = self.insertion_order.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
                debug!(key = oldest, "Evicted cached result");
            }
        }
    }

    fn remove(&mut self, key: OperationKey) -> Option<OperationResult> {
        let removed = self.entries.remove(&key);
        if removed.is_some() {
            self.insertion_order.retain(|k| *k != key);
        }
        removed
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }
}

/// Cache plugin. Only queries are cached.
#[derive(Debug, Default)]
pub struct CachePlugin {
    store: Arc<Mutex<ResultStore>>,
}

impl CachePlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the store; the oldest entry is evicted once `max_entries` is exceeded
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            store: Arc::new(Mutex::new(ResultStore {
                max_entries: Some(max_entries),
                ..ResultStore::default()
            })),
        }
    }

    pub fn get(&self, key: OperationKey) -> Option<OperationResult> {
        self.store.lock().get(key)
    }

    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn invalidate(&self, key: OperationKey) -> Option<OperationResult> {
        self.store.lock().remove(key)
    }

    pub fn clear(&self) {
        self.store.lock().clear();
    }
}

#[async_trait]
impl Plugin for CachePlugin {
    fn name(&self) -> &str {
        "cache"
    }

    async fn run(&self, ctx: &mut PluginContext) -> Result<(), ClientError> {
        let operation = ctx.operation();
        if operation.kind != OperationKind::Query
            || operation.cache_policy == CachePolicy::NetworkOnly
        {
            return Ok(());
        }
        let key = operation.key;
        let policy = operation.cache_policy;

        // Writes only ever happen once the final result is known
        let store = Arc::clone(&self.store);
        ctx.after_query(move |outcome, _| {
            if let Outcome::Result(result) = outcome {
                store.lock().insert(key, result.clone());
                debug!(key, "Stored query result in cache");
            }
        });

        let cached = self.store.lock().get(key);
        match (policy, cached) {
            (CachePolicy::CacheOnly, cached) => {
                debug!(key, hit = cached.is_some(), "Serving cache-only query");
                ctx.use_result(cached.unwrap_or_else(OperationResult::empty), true);
            }
            (_, Some(cached)) => {
                let terminate = policy == CachePolicy::CacheFirst;
                debug!(key, policy = %policy, terminate, "Cache hit");
                ctx.use_result(cached, terminate);
            }
            (_, None) => {
                debug!(key, policy = %policy, "Cache miss");
            }
        }

        Ok(())
    }
}
