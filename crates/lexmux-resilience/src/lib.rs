//! # LexMux Resilience Substrate
//!
//! Concurrency and resilience primitives that bound, schedule, and protect
//! every outbound call the LexMux gateway makes to the case-law API.
//!
//! ## Modules
//!
//! - `pool` - Host-keyed connection pools with bounded size, FIFO waiters,
//!   and idle eviction, plus the process-wide pool registry
//! - `queue` - Named priority request queues with rate limiting and
//!   retry-with-backoff, plus the queue registry
//! - `breaker` - Per-dependency circuit breakers (closed / open / half-open)
//! - `config` - Option structs for all three primitives
//! - `error` - Shared error taxonomy
//!
//! The three primitives are independent and composable: a caller may wrap
//! an outbound call in a [`CircuitBreaker`], hold a transport handle from a
//! [`pool::ConnectionPool`], and submit the call through a
//! [`queue::RequestQueue`] in any combination. None depends on the others.

pub mod breaker;
pub mod config;
pub mod error;
pub mod pool;
pub mod queue;

// Re-export commonly used types
pub use breaker::{BreakerStats, CircuitBreaker, CircuitState};
pub use config::{CircuitBreakerOptions, ConnectionPoolOptions, RequestQueueOptions};
pub use error::{Error, Result};
pub use pool::{ConnectionPool, ConnectionPoolManager, PoolStats, PooledConnection};
pub use queue::{QueueStats, RequestQueue, RequestQueueManager};
