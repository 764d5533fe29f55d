//! In-flight request accounting.

use crate::backend::{BackendPool, EndpointId, PoolError};
use std::sync::Arc;

/// Tracks live connections per endpoint.
///
/// Callers must pair exactly one [`increment`](Self::increment) at dispatch
/// with one [`decrement`](Self::decrement) at completion; the core never
/// infers completion on its own.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    pool: Arc<BackendPool>,
}

impl ConnectionTracker {
    pub fn new(pool: Arc<BackendPool>) -> Self {
        Self { pool }
    }

    /// Record a dispatched request. Returns the new count.
    pub fn increment(&self, id: EndpointId) -> Result<u32, PoolError> {
        self.pool.adjust_connections(id, 1)
    }

    /// Record a completed request. Never goes below zero.
    pub fn decrement(&self, id: EndpointId) -> Result<u32, PoolError> {
        self.pool.adjust_connections(id, -1)
    }

    pub fn count(&self, id: EndpointId) -> Result<u32, PoolError> {
        self.pool.get(id).map(|e| e.connections())
    }
}
