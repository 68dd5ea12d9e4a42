//! Process-wide registry of request queues, keyed by name.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use super::{QueueStats, RequestQueue};
use crate::config::RequestQueueOptions;

/// Lazily creates and retains one [`RequestQueue`] per name.
///
/// Same registry pattern as the pool manager: construct once, share by
/// reference, call [`close_all`](Self::close_all) on graceful shutdown.
pub struct RequestQueueManager {
    queues: DashMap<String, Arc<RequestQueue>>,
}

impl RequestQueueManager {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    /// Get or create the queue named `name`.
    ///
    /// First-writer-wins on options: later calls return the existing queue
    /// no matter what options they pass.
    pub fn get_queue(&self, name: &str, options: RequestQueueOptions) -> Arc<RequestQueue> {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| RequestQueue::new(name, options))
            .clone()
    }

    /// Number of queues currently registered.
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Close every queue and clear the registry. Idempotent.
    pub fn close_all(&self) {
        for entry in self.queues.iter() {
            entry.value().close();
        }
        self.queues.clear();
        info!("all request queues closed");
    }

    /// Snapshot of every registered queue.
    pub fn stats(&self) -> Vec<QueueStats> {
        self.queues.iter().map(|entry| entry.value().stats()).collect()
    }
}

impl Default for RequestQueueManager {
    fn default() -> Self {
        Self::new()
    }
}
