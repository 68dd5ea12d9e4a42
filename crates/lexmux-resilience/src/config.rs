//! Configuration surface for the three primitives.
//!
//! Pool and queue options carry production defaults; breaker options are
//! always caller-supplied since sane thresholds depend on the dependency
//! being protected.

use std::time::Duration;

/// Options for a [`crate::pool::ConnectionPool`].
#[derive(Debug, Clone)]
pub struct ConnectionPoolOptions {
    /// Hard cap on connections the pool may hold at once.
    pub max_connections: usize,
    /// Idle connections unused longer than this are evicted.
    pub max_idle_time: Duration,
    /// How long an `acquire()` caller waits for a connection before failing.
    pub connection_timeout: Duration,
    /// Upstream port; part of the pool key.
    pub port: u16,
    /// Whether handed-out connections should use keep-alive.
    pub keep_alive: bool,
}

impl Default for ConnectionPoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            max_idle_time: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(5),
            port: 443,
            keep_alive: true,
        }
    }
}

/// Options for a [`crate::queue::RequestQueue`].
#[derive(Debug, Clone)]
pub struct RequestQueueOptions {
    /// Maximum operations in flight at once for the queue.
    pub max_concurrent: usize,
    /// Dispatch starts per second across the whole queue; `0.0` is unlimited.
    pub rate_limit: f64,
    /// Per-dispatch operation timeout.
    pub timeout: Duration,
    /// Total dispatch attempts for a request that keeps failing.
    pub retry_attempts: u32,
    /// Base retry delay; actual delay is `retry_delay * attempts` (linear backoff).
    pub retry_delay: Duration,
}

impl Default for RequestQueueOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            rate_limit: 0.0,
            timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Options for a [`crate::breaker::CircuitBreaker`]. No defaults on purpose.
#[derive(Debug, Clone)]
pub struct CircuitBreakerOptions {
    /// Consecutive failures that trip the breaker open.
    pub failure_threshold: u32,
    /// Recovery window; the breaker stays open this long before probing.
    pub timeout: Duration,
}
