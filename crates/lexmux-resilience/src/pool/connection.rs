//! Logical pooled connection record.

use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

/// A reusable logical connection owned by exactly one pool.
///
/// Handles given to callers are cheap clones of this record; identity is
/// the `id`. The pool keeps the authoritative copy and refreshes
/// `last_used_at` on release.
#[derive(Debug, Clone)]
pub struct PooledConnection {
    pub id: Uuid,
    pub hostname: String,
    pub port: u16,
    pub keep_alive: bool,
    pub created_at: Instant,
    pub last_used_at: Instant,
}

impl PooledConnection {
    pub(crate) fn new(hostname: &str, port: u16, keep_alive: bool) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            hostname: hostname.to_string(),
            port,
            keep_alive,
            created_at: now,
            last_used_at: now,
        }
    }

    /// Whether the connection has sat unused longer than `max_idle_time`.
    pub fn is_expired(&self, max_idle_time: Duration) -> bool {
        self.last_used_at.elapsed() > max_idle_time
    }

    pub(crate) fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }
}
