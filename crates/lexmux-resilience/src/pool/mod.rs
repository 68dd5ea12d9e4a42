//! Host-keyed connection pool with bounded size and FIFO waiters.
//!
//! A pool owns a bounded set of logical connections for one (host, port)
//! pair. `acquire()` reuses an idle connection, creates one under the cap,
//! or parks the caller on a FIFO wait queue with a timeout. `release()`
//! hands the connection directly to the oldest waiter when one exists,
//! skipping the idle set entirely. A background sweep evicts idle expired
//! connections; active connections are never evicted.
//!
//! All mutable state sits behind one mutex per pool; no lock is held
//! across an await point.

mod connection;
mod manager;

pub use connection::PooledConnection;
pub use manager::ConnectionPoolManager;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ConnectionPoolOptions;
use crate::error::{Error, Result};

/// Longest the sweep task will sleep between eviction passes.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Point-in-time snapshot of a pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub hostname: String,
    pub total_connections: usize,
    pub active_connections: usize,
    pub idle_connections: usize,
    pub queue_length: usize,
    pub max_connections: usize,
}

/// A parked `acquire()` caller awaiting a released connection.
struct Waiter {
    id: Uuid,
    tx: oneshot::Sender<Result<PooledConnection>>,
}

struct PoolInner {
    connections: HashMap<Uuid, PooledConnection>,
    active: HashSet<Uuid>,
    waiters: VecDeque<Waiter>,
    closed: bool,
    sweeper: Option<JoinHandle<()>>,
}

/// Bounded pool of reusable logical connections for one upstream host.
pub struct ConnectionPool {
    key: String,
    hostname: String,
    options: ConnectionPoolOptions,
    inner: Arc<Mutex<PoolInner>>,
}

impl ConnectionPool {
    /// Create a pool and start its background sweep task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(hostname: &str, options: ConnectionPoolOptions) -> Arc<Self> {
        let key = format!("{}:{}", hostname, options.port);
        let inner = Arc::new(Mutex::new(PoolInner {
            connections: HashMap::new(),
            active: HashSet::new(),
            waiters: VecDeque::new(),
            closed: false,
            sweeper: None,
        }));

        let sweep_every = (options.max_idle_time / 2).min(MAX_SWEEP_INTERVAL);
        let handle = spawn_sweeper(
            key.clone(),
            Arc::clone(&inner),
            options.max_idle_time,
            sweep_every,
        );
        inner.lock().sweeper = Some(handle);

        debug!(
            pool = %key,
            max_connections = options.max_connections,
            sweep_every = ?sweep_every,
            "created connection pool"
        );
        Arc::new(Self {
            key,
            hostname: hostname.to_string(),
            options,
            inner,
        })
    }

    /// Pool key, `"<hostname>:<port>"`.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Acquire a connection, waiting up to `connection_timeout` under
    /// contention.
    ///
    /// Reuses any idle non-expired connection, creates a new one while
    /// under `max_connections`, and otherwise parks the caller FIFO behind
    /// earlier waiters.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let (waiter_id, mut rx) = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(Error::PoolClosed {
                    pool: self.key.clone(),
                });
            }

            // Any idle, non-expired connection will do.
            let max_idle = self.options.max_idle_time;
            let reusable = inner
                .connections
                .iter()
                .find(|(id, conn)| !inner.active.contains(*id) && !conn.is_expired(max_idle))
                .map(|(id, _)| *id);
            if let Some(id) = reusable {
                if let Some(conn) = inner.connections.get_mut(&id) {
                    conn.touch();
                    let handle = conn.clone();
                    inner.active.insert(id);
                    debug!(pool = %self.key, connection = %id, "reusing idle connection");
                    return Ok(handle);
                }
            }

            if inner.connections.len() < self.options.max_connections {
                let conn = PooledConnection::new(
                    &self.hostname,
                    self.options.port,
                    self.options.keep_alive,
                );
                let handle = conn.clone();
                inner.active.insert(conn.id);
                inner.connections.insert(conn.id, conn);
                debug!(
                    pool = %self.key,
                    connection = %handle.id,
                    total = inner.connections.len(),
                    "created connection"
                );
                return Ok(handle);
            }

            // Pool is saturated: park behind earlier waiters.
            let (tx, rx) = oneshot::channel();
            let waiter_id = Uuid::new_v4();
            inner.waiters.push_back(Waiter { id: waiter_id, tx });
            debug!(
                pool = %self.key,
                waiters = inner.waiters.len(),
                "pool saturated, waiting for a release"
            );
            (waiter_id, rx)
        };

        match tokio::time::timeout(self.options.connection_timeout, &mut rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without a grant; only close() does that path.
            Ok(Err(_)) => Err(Error::PoolClosed {
                pool: self.key.clone(),
            }),
            Err(_) => {
                let still_waiting = {
                    let mut inner = self.inner.lock();
                    match inner.waiters.iter().position(|w| w.id == waiter_id) {
                        Some(pos) => {
                            inner.waiters.remove(pos);
                            true
                        }
                        None => false,
                    }
                };
                if still_waiting {
                    warn!(
                        pool = %self.key,
                        timeout = ?self.options.connection_timeout,
                        "timed out waiting for a connection"
                    );
                    Err(Error::AcquireTimeout {
                        pool: self.key.clone(),
                        timeout: self.options.connection_timeout,
                    })
                } else {
                    // A release granted us the connection in the same instant
                    // the timeout fired; the grant wins.
                    match rx.try_recv() {
                        Ok(result) => result,
                        Err(_) => Err(Error::PoolClosed {
                            pool: self.key.clone(),
                        }),
                    }
                }
            }
        }
    }

    /// Return a connection to the pool.
    ///
    /// If callers are waiting, the connection is handed directly to the
    /// oldest live waiter and stays active; otherwise it goes back to the
    /// idle set with its `last_used_at` refreshed.
    pub fn release(&self, connection: &PooledConnection) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.active.remove(&connection.id);
        if let Some(conn) = inner.connections.get_mut(&connection.id) {
            conn.touch();
        }

        while let Some(waiter) = inner.waiters.pop_front() {
            let handle = match inner.connections.get_mut(&connection.id) {
                Some(conn) => {
                    conn.touch();
                    conn.clone()
                }
                None => break,
            };
            if waiter.tx.send(Ok(handle)).is_ok() {
                inner.active.insert(connection.id);
                debug!(
                    pool = %self.key,
                    connection = %connection.id,
                    "handed released connection to waiter"
                );
                break;
            }
            // Waiter already timed out; try the next one.
        }
    }

    /// Close the pool: drop all connections and reject every waiter.
    /// Idempotent.
    pub fn close(&self) {
        let (waiters, sweeper) = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.connections.clear();
            inner.active.clear();
            (std::mem::take(&mut inner.waiters), inner.sweeper.take())
        };
        if let Some(handle) = sweeper {
            handle.abort();
        }
        let rejected = waiters.len();
        for waiter in waiters {
            let _ = waiter.tx.send(Err(Error::PoolClosed {
                pool: self.key.clone(),
            }));
        }
        info!(pool = %self.key, rejected_waiters = rejected, "connection pool closed");
    }

    /// Point-in-time snapshot; never blocks on pool activity.
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            hostname: self.hostname.clone(),
            total_connections: inner.connections.len(),
            active_connections: inner.active.len(),
            idle_connections: inner.connections.len() - inner.active.len(),
            queue_length: inner.waiters.len(),
            max_connections: self.options.max_connections,
        }
    }
}

/// Periodically evict idle connections that have outlived `max_idle_time`.
/// Active connections are never touched, whatever their age.
fn spawn_sweeper(
    key: String,
    inner: Arc<Mutex<PoolInner>>,
    max_idle: Duration,
    sweep_every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        // The first tick completes immediately; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let mut inner = inner.lock();
            let before = inner.connections.len();
            let active = inner.active.clone();
            inner
                .connections
                .retain(|id, conn| active.contains(id) || !conn.is_expired(max_idle));
            let evicted = before - inner.connections.len();
            if evicted > 0 {
                debug!(
                    pool = %key,
                    evicted,
                    remaining = inner.connections.len(),
                    "evicted idle connections"
                );
            }
        }
    })
}
