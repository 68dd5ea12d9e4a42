//! Process-wide registry of connection pools, keyed by `"host:port"`.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use super::{ConnectionPool, PoolStats};
use crate::config::ConnectionPoolOptions;

/// Lazily creates and retains one [`ConnectionPool`] per (host, port).
///
/// Construct once at process start and share by reference; call
/// [`close_all`](Self::close_all) during graceful shutdown.
pub struct ConnectionPoolManager {
    pools: DashMap<String, Arc<ConnectionPool>>,
}

impl ConnectionPoolManager {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
        }
    }

    /// Get or create the pool for `hostname` and `options.port`.
    ///
    /// The first caller's options win; later calls with the same key return
    /// the existing pool regardless of the options they pass. The entry API
    /// makes concurrent creation for the same key produce a single pool.
    pub fn get_pool(&self, hostname: &str, options: ConnectionPoolOptions) -> Arc<ConnectionPool> {
        let key = format!("{}:{}", hostname, options.port);
        self.pools
            .entry(key)
            .or_insert_with(|| ConnectionPool::new(hostname, options))
            .clone()
    }

    /// Number of pools currently registered.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Close every pool and clear the registry. Idempotent.
    pub fn close_all(&self) {
        for entry in self.pools.iter() {
            entry.value().close();
        }
        self.pools.clear();
        info!("all connection pools closed");
    }

    /// Snapshot of every registered pool.
    pub fn stats(&self) -> Vec<PoolStats> {
        self.pools.iter().map(|entry| entry.value().stats()).collect()
    }
}

impl Default for ConnectionPoolManager {
    fn default() -> Self {
        Self::new()
    }
}
