//! Coalesce operations issued within a short window into one transport call.
//!
//! The first operation to land in an empty queue opens a batch and schedules a flush after
//! `window`. Reaching `max_operation_count` flushes right away. A flush sends a JSON array
//! of `{query, variables}` bodies and expects an array of `{data, errors}` back, matched
//! by position.

use crate::config::BatchConfig;
use crate::error::{ClientError, CombinedError, NetworkError, TransportError};
use crate::plugin::{Plugin, PluginContext};
use crate::plugins::fetch::split_payload;
use crate::transport::{FetchOptions, Transport, TransportRequest, TransportResponse};
use crate::types::{OperationKind, OperationResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Batch plugin options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub max_operation_count: usize,
    pub window: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_operation_count: 10,
            window: Duration::from_millis(10),
        }
    }
}

impl From<&BatchConfig> for BatchOptions {
    fn from(config: &BatchConfig) -> Self {
        Self {
            max_operation_count: config.max_operation_count.max(1),
            window: Duration::from_millis(config.window_ms),
        }
    }
}

#[derive(Debug)]
struct BatchReply {
    result: OperationResult,
    response: Option<TransportResponse>,
}

#[derive(Debug)]
struct QueuedOperation {
    body: Value,
    tx: oneshot::Sender<BatchReply>,
}

/// Operations waiting for the next flush
#[derive(Debug, Default)]
struct BatchQueue {
    operations: Vec<QueuedOperation>,
    /// Transport options of the operation that opened the batch
    fetch_options: Option<FetchOptions>,
    /// Bumped every time a new batch opens so stale timers can tell they lost the race
    generation: u64,
}

impl BatchQueue {
    fn take(&mut self) -> Option<(FetchOptions, Vec<QueuedOperation>)> {
        if self.operations.is_empty() {
            return None;
        }
        let options = self.fetch_options.take()?;
        Some((options, std::mem::take(&mut self.operations)))
    }
}

/// Batch plugin. Terminal, like the fetch plugin.
pub struct BatchPlugin {
    transport: Arc<dyn Transport>,
    options: BatchOptions,
    queue: Arc<Mutex<BatchQueue>>,
}

impl BatchPlugin {
    pub fn new(transport: Arc<dyn Transport>, options: BatchOptions) -> Self {
        Self {
            transport,
            options,
            queue: Arc::new(Mutex::new(BatchQueue::default())),
        }
    }

    /// Queue one body and return the receiver for its reply, flushing when the batch is full
    fn enqueue(&self, body: Value, fetch_options: &FetchOptions) -> oneshot::Receiver<BatchReply> {
        let (tx, rx) = oneshot::channel();

        let (opened, full) = {
            let mut queue = self.queue.lock();
            let opened = if queue.operations.is_empty() {
                queue.generation += 1;
                queue.fetch_options = Some(fetch_options.clone());
                Some(queue.generation)
            } else {
                None
            };
            queue.operations.push(QueuedOperation { body, tx });

            let full = if queue.operations.len() >= self.options.max_operation_count {
                queue.take()
            } else {
                None
            };
            (opened, full)
        };

        if let Some((options, operations)) = full {
            debug!(count = operations.len(), "Batch full, flushing");
            tokio::spawn(dispatch(Arc::clone(&self.transport), options, operations));
        } else if let Some(generation) = opened {
            let queue = Arc::clone(&self.queue);
            let transport = Arc::clone(&self.transport);
            let window = self.options.window;
            tokio::spawn(async move {
                sleep(window).await;
                let batch = {
                    let mut queue = queue.lock();
                    if queue.generation == generation {
                        queue.take()
                    } else {
                        None
                    }
                };
                if let Some((options, operations)) = batch {
                    debug!(count = operations.len(), "Batch window elapsed, flushing");
                    dispatch(transport, options, operations).await;
                }
            });
        }

        rx
    }
}

/// Send one batch and hand every queued operation its slice of the response
async fn dispatch(
    transport: Arc<dyn Transport>,
    options: FetchOptions,
    operations: Vec<QueuedOperation>,
) {
    let (bodies, senders): (Vec<Value>, Vec<_>) =
        operations.into_iter().map(|op| (op.body, op.tx)).unzip();
    let request = TransportRequest {
        url: options.url,
        method: options.method,
        headers: options.headers,
        body: Value::Array(bodies),
    };

    match transport.send(&request).await {
        Err(e) => {
            warn!(url = %request.url, count = senders.len(), error = %e, "Batched request failed");
            for tx in senders {
                let _ = tx.send(BatchReply {
                    result: OperationResult::from_error(CombinedError::network(e.clone())),
                    response: None,
                });
            }
        }
        Ok(response) => {
            debug!(status = response.status, count = senders.len(), "Batched request completed");
            for (index, tx) in senders.into_iter().enumerate() {
                let _ = tx.send(BatchReply {
                    result: normalize_entry(&response, index),
                    response: Some(response.clone()),
                });
            }
        }
    }
}

/// Result for the operation at `index` of a batched response
fn normalize_entry(response: &TransportResponse, index: usize) -> OperationResult {
    let entry = response
        .body
        .as_ref()
        .and_then(Value::as_array)
        .and_then(|entries| entries.get(index))
        .filter(|entry| !entry.is_null());

    let Some(entry) = entry else {
        return OperationResult::from_error(
            CombinedError::network(NetworkError::EmptyResponse).with_response(response.clone()),
        );
    };

    let (data, errors) = split_payload(Some(entry));
    if !errors.is_empty() {
        return OperationResult {
            data,
            error: Some(CombinedError::graphql(errors).with_response(response.clone())),
        };
    }
    if !response.ok() {
        return OperationResult {
            data,
            error: Some(
                CombinedError::network(NetworkError::Status {
                    status: response.status,
                    status_text: response.status_text.clone(),
                })
                .with_response(response.clone()),
            ),
        };
    }
    OperationResult { data, error: None }
}

#[async_trait]
impl Plugin for BatchPlugin {
    fn name(&self) -> &str {
        "batch"
    }

    async fn run(&self, ctx: &mut PluginContext) -> Result<(), ClientError> {
        if ctx.operation().kind == OperationKind::Subscription {
            ctx.use_result(
                OperationResult::from_error(CombinedError::network(NetworkError::Unsupported(
                    "Cannot use batch plugin with subscriptions".to_string(),
                ))),
                true,
            );
            return Ok(());
        }

        let request = TransportRequest::for_operation(ctx.operation(), ctx.fetch_options())?;
        let rx = self.enqueue(request.body, ctx.fetch_options());

        match rx.await {
            Ok(reply) => {
                if let Some(response) = reply.response {
                    ctx.set_response(response);
                }
                ctx.use_result(reply.result, true);
            }
            Err(_) => {
                ctx.use_result(
                    OperationResult::from_error(CombinedError::network(TransportError::Aborted(
                        "Batch was dropped before it was sent".to_string(),
                    ))),
                    true,
                );
            }
        }
        Ok(())
    }
}
