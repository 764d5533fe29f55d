//! Immutable views of the pool handed to selectors.

use crate::backend::EndpointId;
use crate::health::HealthStatus;

/// Point-in-time copy of one endpoint's selection inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSnapshot {
    pub id: EndpointId,
    /// Position in configured order.
    pub slot: usize,
    pub weight: u32,
    pub health: HealthStatus,
    pub connections: u32,
}

impl EndpointSnapshot {
    pub fn is_eligible(&self) -> bool {
        self.health.is_eligible()
    }
}

/// Ordered snapshot of the pool, in configured order.
///
/// Each entry was read atomically from its endpoint; no lock was held across
/// the whole snapshot, so a selector never observes a mutation mid-decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    endpoints: Vec<EndpointSnapshot>,
}

impl PoolSnapshot {
    pub fn new(endpoints: Vec<EndpointSnapshot>) -> Self {
        Self { endpoints }
    }

    pub fn endpoints(&self) -> &[EndpointSnapshot] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Endpoints that are Healthy or Suspect, in configured order.
    pub fn eligible(&self) -> impl Iterator<Item = &EndpointSnapshot> {
        self.endpoints.iter().filter(|e| e.is_eligible())
    }

    pub fn eligible_count(&self) -> usize {
        self.eligible().count()
    }

    pub fn get(&self, id: EndpointId) -> Option<&EndpointSnapshot> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    /// A copy of this snapshot without the given endpoints.
    pub fn without(&self, excluded: &[EndpointId]) -> PoolSnapshot {
        PoolSnapshot {
            endpoints: self
                .endpoints
                .iter()
                .filter(|e| !excluded.contains(&e.id))
                .copied()
                .collect(),
        }
    }
}
