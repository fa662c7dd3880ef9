//! Collapse concurrent identical queries into a single network execution.
//!
//! The first execution for a key becomes the leader: it registers a pending entry and,
//! once its chain settles, fans the final result out to every waiter that attached in the
//! meantime. Check-then-register is one critical section, so two executions can never
//! both become leader for the same key.

use crate::error::ClientError;
use crate::key::OperationKey;
use crate::plugin::{Plugin, PluginContext};
use crate::types::{OperationKind, OperationResult, Outcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

type PendingTable = Arc<Mutex<HashMap<OperationKey, PendingEntry>>>;

#[derive(Debug)]
struct PendingEntry {
    leader: u64,
    waiters: Vec<oneshot::Sender<OperationResult>>,
}

/// Owned by the leader's after-query callback. Clears the pending entry whether the leader
/// settles or its context is dropped without ever producing a result.
struct PendingGuard {
    table: PendingTable,
    key: OperationKey,
    leader: u64,
    settled: bool,
}

impl PendingGuard {
    fn take_waiters(&self) -> Vec<oneshot::Sender<OperationResult>> {
        let mut table = self.table.lock();
        match table.get(&self.key) {
            Some(entry) if entry.leader == self.leader => table
                .remove(&self.key)
                .map(|entry| entry.waiters)
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn settle(mut self, outcome: &Outcome) {
        self.settled = true;
        let waiters = self.take_waiters();
        let Outcome::Result(result) = outcome else {
            // Waiters see a closed channel and run the chain themselves
            return;
        };

        debug!(
            key = self.key,
            waiters = waiters.len(),
            "Resolving deduplicated queries"
        );
        for tx in waiters {
            let _ = tx.send(result.clone());
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if !self.settled {
            let abandoned = self.take_waiters();
            if !abandoned.is_empty() {
                warn!(
                    key = self.key,
                    waiters = abandoned.len(),
                    "Leading execution ended without a result, releasing waiters"
                );
            }
        }
    }
}

/// Dedup plugin. Only queries are deduplicated.
#[derive(Debug, Default)]
pub struct DedupPlugin {
    pending: PendingTable,
    next_leader: AtomicU64,
}

impl DedupPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with an execution in flight
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl Plugin for DedupPlugin {
    fn name(&self) -> &str {
        "dedup"
    }

    async fn run(&self, ctx: &mut PluginContext) -> Result<(), ClientError> {
        if ctx.operation().kind != OperationKind::Query {
            return Ok(());
        }
        let key = ctx.operation().key;

        let attached = {
            let mut pending = self.pending.lock();
            match pending.get_mut(&key) {
                Some(entry) => {
                    let (tx, rx) = oneshot::channel();
                    entry.waiters.push(tx);
                    Err(rx)
                }
                None => {
                    let leader = self.next_leader.fetch_add(1, Ordering::Relaxed);
                    pending.insert(
                        key,
                        PendingEntry {
                            leader,
                            waiters: Vec::new(),
                        },
                    );
                    Ok(leader)
                }
            }
        };

        match attached {
            Ok(leader) => {
                debug!(key, leader, "Registered in-flight query");
                let guard = PendingGuard {
                    table: Arc::clone(&self.pending),
                    key,
                    leader,
                    settled: false,
                };
                ctx.after_query(move |outcome, _| guard.settle(outcome));
            }
            Err(rx) => {
                debug!(key, "Attached to in-flight query");
                match rx.await {
                    Ok(result) => ctx.use_result(result, true),
                    Err(_) => {
                        debug!(key, "In-flight query vanished, continuing chain");
                    }
                }
            }
        }

        Ok(())
    }
}
