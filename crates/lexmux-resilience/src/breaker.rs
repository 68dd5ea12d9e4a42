//! Circuit breaker - per-dependency failure gating.
//!
//! One breaker instance monitors one named upstream dependency. While
//! closed, calls pass through and consecutive failures are counted; at the
//! failure threshold the breaker opens and rejects calls outright for the
//! recovery window. The first call after the window elapses becomes the
//! half-open probe: its success closes the circuit, its failure re-opens it.
//!
//! The open check is synchronous; the breaker only suspends for the wrapped
//! operation itself and never cancels an operation once started.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerOptions;
use crate::error::{Error, Result};

/// Breaker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation; failures are counted.
    Closed,
    /// Rejecting all calls until the recovery window elapses.
    Open,
    /// Recovery window elapsed; a trial call is in progress.
    HalfOpen,
}

/// Point-in-time snapshot of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Time since the most recent failure, if any.
    pub last_failure_age: Option<Duration>,
    /// Time remaining until the next probe is allowed, while open.
    pub retry_in: Option<Duration>,
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    next_attempt_at: Option<Instant>,
}

/// Per-dependency circuit breaker.
pub struct CircuitBreaker {
    name: String,
    options: CircuitBreakerOptions,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, options: CircuitBreakerOptions) -> Self {
        Self {
            name: name.into(),
            options,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
                next_attempt_at: None,
            }),
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// While open and inside the recovery window this rejects immediately
    /// with [`Error::CircuitOpen`] without invoking the operation. The
    /// operation's own error is propagated unchanged on failure.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        {
            let mut inner = self.inner.lock();
            if inner.state == CircuitState::Open {
                match inner.next_attempt_at {
                    Some(at) if Instant::now() >= at => {
                        inner.state = CircuitState::HalfOpen;
                        info!(
                            breaker = %self.name,
                            "recovery window elapsed, allowing trial call"
                        );
                    }
                    _ => {
                        debug!(breaker = %self.name, "rejecting call while open");
                        return Err(Error::CircuitOpen {
                            breaker: self.name.clone(),
                        });
                    }
                }
            }
        }

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(Error::Upstream(err))
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            info!(breaker = %self.name, "trial call succeeded, closing circuit");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure_at = Some(Instant::now());

        let tripped = inner.state == CircuitState::HalfOpen
            || inner.failure_count >= self.options.failure_threshold;
        if tripped {
            inner.state = CircuitState::Open;
            inner.next_attempt_at = Some(Instant::now() + self.options.timeout);
            warn!(
                breaker = %self.name,
                failures = inner.failure_count,
                retry_in = ?self.options.timeout,
                "circuit opened"
            );
        } else {
            debug!(
                breaker = %self.name,
                failures = inner.failure_count,
                threshold = self.options.failure_threshold,
                "recorded failure"
            );
        }
    }

    /// Current state, without touching the recovery-window check.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Point-in-time snapshot for diagnostics.
    pub fn stats(&self) -> BreakerStats {
        let inner = self.inner.lock();
        let now = Instant::now();
        BreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_age: inner.last_failure_at.map(|at| now.duration_since(at)),
            retry_in: inner
                .next_attempt_at
                .filter(|_| inner.state == CircuitState::Open)
                .map(|at| at.saturating_duration_since(now)),
        }
    }
}
