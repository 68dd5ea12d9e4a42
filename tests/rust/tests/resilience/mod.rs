//! Resilience substrate integration tests
//!
//! End-to-end coverage of the connection pool, request queue, and circuit
//! breaker through their public API, including the manager registries and
//! a combined gateway-style call path.

mod composition;
mod queue;
