//! Least-connections load balancing algorithm.

use super::{SelectError, Selector};
use crate::backend::{EndpointId, PoolSnapshot, RequestContext};

/// Least-connections load balancer.
///
/// Sends requests to the eligible endpoint with the fewest live connections.
/// Ties go to the earliest endpoint in configured order. Counts come from the
/// snapshot, which the connection tracker keeps current.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl Selector for LeastConnections {
    fn choose(&self, snapshot: &PoolSnapshot, _ctx: &RequestContext) -> Result<EndpointId, SelectError> {
        // min_by_key keeps the first of equal minima
        snapshot
            .eligible()
            .min_by_key(|e| e.connections)
            .map(|e| e.id)
            .ok_or(SelectError::NoHealthyEndpoint)
    }
}
