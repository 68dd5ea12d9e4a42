//! Error taxonomy for the resilience substrate.
//!
//! The primitives never swallow an operation's own failure; they only add
//! contextual errors around it (closed state, timeouts, breaker gating).
//! An operation's underlying error travels through [`Error::Upstream`]
//! unchanged.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the pool, queue, and breaker primitives.
#[derive(Debug, Error)]
pub enum Error {
    /// The connection pool was closed before or during the call.
    #[error("connection pool '{pool}' is closed")]
    PoolClosed { pool: String },

    /// No connection became available within the configured wait timeout.
    #[error("timed out acquiring connection from pool '{pool}' after {timeout:?}")]
    AcquireTimeout { pool: String, timeout: Duration },

    /// The request queue was closed before the request could run.
    #[error("request queue '{queue}' is closed")]
    QueueClosed { queue: String },

    /// A dispatched operation exceeded the per-dispatch timeout.
    #[error("operation timed out after {timeout:?}")]
    OperationTimeout { timeout: Duration },

    /// All configured retry attempts failed; carries the last error seen.
    #[error("operation failed after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The circuit breaker is open and rejected the call without running it.
    #[error("circuit breaker '{breaker}' is open")]
    CircuitOpen { breaker: String },

    /// A wrapped operation's own error, propagated unchanged.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
