//! Type-erased queued request plumbing.
//!
//! `enqueue` is generic over the operation's return type, but the queue
//! itself stores a uniform boxed task. The typed result travels back to the
//! caller over a oneshot channel captured by the erased closures; the queue
//! only ever observes success or the error it needs for retry decisions.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::Error;

/// Boxed operation the queue can run repeatedly across retries.
pub(crate) type RetryableOp = Box<dyn FnMut() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Settles the caller's future with a terminal error. Consumes the request.
pub(crate) type RejectFn = Box<dyn FnOnce(Error) + Send>;

/// A pending operation inside exactly one queue's ordered list.
pub(crate) struct QueuedRequest {
    pub id: Uuid,
    pub operation: RetryableOp,
    pub priority: i32,
    pub metadata: Option<serde_json::Value>,
    pub attempts: u32,
    pub created_at: Instant,
    pub reject: RejectFn,
}

impl QueuedRequest {
    /// Erase a typed operation into a retryable task plus the settlement
    /// receiver handed back to the caller.
    pub(crate) fn new<T, F, Fut>(
        operation: F,
        priority: i32,
        metadata: Option<serde_json::Value>,
    ) -> (Self, oneshot::Receiver<Result<T, Error>>)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let settle = Arc::new(Mutex::new(Some(tx)));

        let op_settle = Arc::clone(&settle);
        let erased: RetryableOp = Box::new(move || -> BoxFuture<'static, anyhow::Result<()>> {
            let fut = operation();
            let op_settle = Arc::clone(&op_settle);
            Box::pin(async move {
                let value = fut.await?;
                if let Some(tx) = op_settle.lock().take() {
                    let _ = tx.send(Ok(value));
                }
                Ok(())
            })
        });

        let reject: RejectFn = Box::new(move |err| {
            if let Some(tx) = settle.lock().take() {
                let _ = tx.send(Err(err));
            }
        });

        (
            Self {
                id: Uuid::new_v4(),
                operation: erased,
                priority,
                metadata,
                attempts: 0,
                created_at: Instant::now(),
                reject,
            },
            rx,
        )
    }
}
