//! Named priority request queue with rate limiting and retry.
//!
//! Pending requests sit in one ordered list: descending priority, arrival
//! order preserved among equal priorities. A single re-entrancy-guarded
//! drain loop dispatches up to `max_concurrent` operations, pacing dispatch
//! starts when a rate limit is set. A failed dispatch is retried with
//! linear backoff (`retry_delay × attempts`), re-entering at the front of
//! the list; after `retry_attempts` total attempts the caller's future
//! rejects with the last error.
//!
//! There is deliberately no bound on how long a request may wait in the
//! pending list; only dispatched operations carry a timeout. Sustained
//! high-priority load can therefore starve low-priority work.

mod manager;
mod request;

pub use manager::RequestQueueManager;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RequestQueueOptions;
use crate::error::{Error, Result};
use request::QueuedRequest;

/// Point-in-time snapshot of a queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub name: String,
    pub queue_length: usize,
    pub processing: bool,
    pub max_concurrent: usize,
    pub rate_limit: f64,
}

struct QueueInner {
    pending: VecDeque<QueuedRequest>,
    processing: bool,
    in_flight: usize,
    last_dispatch_at: Option<Instant>,
    closed: bool,
}

/// Named priority queue bounding and pacing outbound operations.
pub struct RequestQueue {
    name: String,
    options: RequestQueueOptions,
    inner: Mutex<QueueInner>,
}

impl RequestQueue {
    pub fn new(name: impl Into<String>, options: RequestQueueOptions) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            options,
            inner: Mutex::new(QueueInner {
                pending: VecDeque::new(),
                processing: false,
                in_flight: 0,
                last_dispatch_at: None,
                closed: false,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert an operation and return a future settled with its final
    /// outcome.
    ///
    /// Insertion is synchronous and position-stable: the request lands
    /// immediately before the first pending item of strictly lower
    /// priority, never ahead of an equal-priority item. The returned
    /// future resolves with the operation's result, or rejects once with
    /// the terminal error after retries are exhausted. On a closed queue
    /// the operation never runs.
    pub fn enqueue<T, F, Fut>(
        self: &Arc<Self>,
        operation: F,
        priority: i32,
        metadata: Option<serde_json::Value>,
    ) -> impl Future<Output = Result<T>> + Send
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (request, rx) = QueuedRequest::new(operation, priority, metadata);
        let name = self.name.clone();

        let submitted = {
            let mut inner = self.inner.lock();
            if inner.closed {
                Err(Error::QueueClosed { queue: name.clone() })
            } else {
                let position = inner
                    .pending
                    .iter()
                    .position(|r| r.priority < priority)
                    .unwrap_or(inner.pending.len());
                debug!(
                    queue = %self.name,
                    request = %request.id,
                    priority,
                    position,
                    depth = inner.pending.len() + 1,
                    "enqueued request"
                );
                inner.pending.insert(position, request);
                Ok(())
            }
        };
        if submitted.is_ok() {
            self.kick();
        }

        async move {
            submitted?;
            match rx.await {
                Ok(result) => result,
                // Settlement dropped without a send; only teardown does that.
                Err(_) => Err(Error::QueueClosed { queue: name }),
            }
        }
    }

    /// Start the drain loop unless one is already running or there is
    /// nothing it could do.
    fn kick(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock();
            if inner.processing
                || inner.closed
                || inner.pending.is_empty()
                || inner.in_flight >= self.options.max_concurrent
            {
                return;
            }
            inner.processing = true;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move { queue.drain().await });
    }

    /// The single drain loop: pace, pop the head, dispatch, repeat until
    /// the list is empty or the concurrency ceiling is reached.
    async fn drain(self: Arc<Self>) {
        loop {
            if self.options.rate_limit > 0.0 {
                self.pace().await;
            }

            let request = {
                let mut inner = self.inner.lock();
                if inner.closed || inner.in_flight >= self.options.max_concurrent {
                    None
                } else {
                    inner.pending.pop_front().map(|mut req| {
                        inner.in_flight += 1;
                        inner.last_dispatch_at = Some(Instant::now());
                        req.attempts += 1;
                        req
                    })
                }
            };
            let Some(request) = request else { break };

            let queue = Arc::clone(&self);
            tokio::spawn(async move { queue.dispatch(request).await });
        }

        self.inner.lock().processing = false;
        // Work may have arrived between the final pop attempt and clearing
        // the guard; re-enter if so.
        self.kick();
    }

    /// Wait until the configured gap since the previous dispatch start has
    /// passed. Pacing is per queue, not per caller.
    async fn pace(&self) {
        let min_gap = Duration::from_secs_f64(1.0 / self.options.rate_limit);
        loop {
            let wait = {
                let inner = self.inner.lock();
                if inner.closed
                    || inner.pending.is_empty()
                    || inner.in_flight >= self.options.max_concurrent
                {
                    return;
                }
                match inner.last_dispatch_at {
                    Some(at) => min_gap.saturating_sub(at.elapsed()),
                    None => Duration::ZERO,
                }
            };
            if wait.is_zero() {
                return;
            }
            tokio::time::sleep(wait).await;
        }
    }

    /// Run one dispatched request to its outcome and route the result.
    async fn dispatch(self: Arc<Self>, mut request: QueuedRequest) {
        let attempt = request.attempts;
        debug!(
            queue = %self.name,
            request = %request.id,
            attempt,
            priority = request.priority,
            waited = ?request.created_at.elapsed(),
            "dispatching request"
        );

        let outcome = match tokio::time::timeout(self.options.timeout, (request.operation)()).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(Error::Upstream(err)),
            Err(_) => Err(Error::OperationTimeout {
                timeout: self.options.timeout,
            }),
        };

        self.inner.lock().in_flight -= 1;

        if let Err(err) = outcome {
            if request.attempts < self.options.retry_attempts {
                let delay = self.options.retry_delay * request.attempts;
                warn!(
                    queue = %self.name,
                    request = %request.id,
                    attempt,
                    delay = ?delay,
                    metadata = ?request.metadata,
                    error = %err,
                    "request failed, retrying after backoff"
                );
                let queue = Arc::clone(&self);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    queue.requeue_front(request);
                });
            } else {
                warn!(
                    queue = %self.name,
                    request = %request.id,
                    attempts = request.attempts,
                    metadata = ?request.metadata,
                    error = %err,
                    "request failed permanently"
                );
                let source = match err {
                    Error::Upstream(inner) => inner,
                    other => anyhow::Error::new(other),
                };
                (request.reject)(Error::RetriesExhausted {
                    attempts: request.attempts,
                    source,
                });
            }
        }

        self.kick();
    }

    /// A retried request re-enters at the front of the list.
    fn requeue_front(self: &Arc<Self>, request: QueuedRequest) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                drop(inner);
                (request.reject)(Error::QueueClosed {
                    queue: self.name.clone(),
                });
                return;
            }
            debug!(
                queue = %self.name,
                request = %request.id,
                attempt = request.attempts,
                "re-queued for retry"
            );
            inner.pending.push_front(request);
        }
        self.kick();
    }

    /// Close the queue: reject every pending request. Requests already
    /// dispatched and in flight run to completion. Idempotent.
    pub fn close(&self) {
        let pending = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            std::mem::take(&mut inner.pending)
        };
        let rejected = pending.len();
        for request in pending {
            (request.reject)(Error::QueueClosed {
                queue: self.name.clone(),
            });
        }
        info!(queue = %self.name, rejected, "request queue closed");
    }

    /// Point-in-time snapshot; never blocks on queue activity.
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        QueueStats {
            name: self.name.clone(),
            queue_length: inner.pending.len(),
            processing: inner.processing,
            max_concurrent: self.options.max_concurrent,
            rate_limit: self.options.rate_limit,
        }
    }
}
