//! Client-affinity load balancing algorithm.

use super::hash_ring::{HashRing, hash_key};
use super::{RoundRobin, SelectError, Selector};
use crate::backend::{EndpointId, PoolSnapshot, RequestContext};

/// Affinity load balancer.
///
/// Routes every request carrying the same client key to the same endpoint
/// for as long as that endpoint stays eligible. Requests without a client
/// key are spread round-robin.
#[derive(Debug)]
pub struct Affinity {
    ring: HashRing,
    fallback: RoundRobin,
}

impl Affinity {
    /// Build the ring over the full configured pool.
    pub fn new(ids: &[EndpointId], virtual_nodes: u32) -> Self {
        Self {
            ring: HashRing::new(ids, virtual_nodes),
            fallback: RoundRobin::new(),
        }
    }
}

impl Selector for Affinity {
    fn choose(&self, snapshot: &PoolSnapshot, ctx: &RequestContext) -> Result<EndpointId, SelectError> {
        let Some(key) = ctx.client_key() else {
            return self.fallback.choose(snapshot, ctx);
        };

        let mut eligible: Vec<Option<EndpointId>> = vec![None; self.ring.slots()];
        for endpoint in snapshot.eligible() {
            if let Some(entry) = eligible.get_mut(endpoint.slot) {
                *entry = Some(endpoint.id);
            }
        }

        self.ring
            .lookup(hash_key(key.as_bytes()), |slot| eligible[slot].is_some())
            .and_then(|slot| eligible[slot])
            .ok_or(SelectError::NoHealthyEndpoint)
    }
}
