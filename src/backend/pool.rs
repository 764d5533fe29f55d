//! The backend pool: owner of every endpoint and the only place endpoint
//! state is mutated.

use crate::backend::status::{EndpointStatus, PoolStatus};
use crate::backend::{Endpoint, EndpointId, EndpointSnapshot, PoolSnapshot};
use crate::config::{EndpointConfig, MAX_WEIGHT};
use crate::health::{HealthPolicy, HealthStatus, Outcome, Transition};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised by pool construction and access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("pool must have at least one endpoint")]
    Empty,

    #[error("endpoint {0} has weight 0 (must be >= 1)")]
    ZeroWeight(EndpointId),

    #[error("endpoint {id} has weight {weight} (must be <= {max})", max = MAX_WEIGHT)]
    WeightTooLarge { id: EndpointId, weight: u32 },

    #[error("duplicate endpoint {0}")]
    DuplicateEndpoint(EndpointId),

    #[error("unknown endpoint {0}")]
    UnknownEndpoint(EndpointId),
}

/// Static set of endpoints in configured order.
///
/// Membership never changes after construction, so the index needs no
/// synchronization; every per-endpoint field is synchronized on its own.
#[derive(Debug)]
pub struct BackendPool {
    endpoints: Vec<Endpoint>,
    index: HashMap<EndpointId, usize>,
}

impl BackendPool {
    /// Build a pool from configuration.
    pub fn new(configs: &[EndpointConfig]) -> Result<Self, PoolError> {
        if configs.is_empty() {
            return Err(PoolError::Empty);
        }

        let mut endpoints = Vec::with_capacity(configs.len());
        let mut index = HashMap::with_capacity(configs.len());

        for (slot, config) in configs.iter().enumerate() {
            if config.weight == 0 {
                return Err(PoolError::ZeroWeight(config.address));
            }
            if config.weight > MAX_WEIGHT {
                return Err(PoolError::WeightTooLarge {
                    id: config.address,
                    weight: config.weight,
                });
            }
            if index.insert(config.address, slot).is_some() {
                return Err(PoolError::DuplicateEndpoint(config.address));
            }
            endpoints.push(Endpoint::new(config.address, config.weight, slot));
        }

        Ok(Self { endpoints, index })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always false: construction rejects empty pools.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn contains(&self, id: EndpointId) -> bool {
        self.index.contains_key(&id)
    }

    /// Endpoint identities in configured order.
    pub fn ids(&self) -> Vec<EndpointId> {
        self.endpoints.iter().map(Endpoint::id).collect()
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn get(&self, id: EndpointId) -> Result<&Endpoint, PoolError> {
        self.index
            .get(&id)
            .map(|&slot| &self.endpoints[slot])
            .ok_or(PoolError::UnknownEndpoint(id))
    }

    /// Take an immutable snapshot for a selection decision.
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot::new(
            self.endpoints
                .iter()
                .map(|e| EndpointSnapshot {
                    id: e.id(),
                    slot: e.slot(),
                    weight: e.weight(),
                    health: e.health(),
                    connections: e.connections(),
                })
                .collect(),
        )
    }

    /// Set an endpoint's health explicitly, resetting its counters.
    pub fn mark_health(&self, id: EndpointId, status: HealthStatus) -> Result<(), PoolError> {
        let endpoint = self.get(id)?;
        if let Some(transition) = endpoint.force_health(status) {
            info!(
                endpoint = %id,
                from = %transition.from,
                to = %transition.to,
                "endpoint health set explicitly"
            );
        }
        Ok(())
    }

    /// Apply one probe result to an endpoint's state machine.
    pub fn record_probe(
        &self,
        id: EndpointId,
        outcome: Outcome,
        policy: &HealthPolicy,
    ) -> Result<Option<Transition>, PoolError> {
        let transition = self.get(id)?.apply_probe(outcome, policy);

        if let Some(t) = transition {
            if t.to == HealthStatus::Healthy {
                info!(endpoint = %id, from = %t.from, "endpoint recovered");
            } else {
                warn!(endpoint = %id, from = %t.from, to = %t.to, "endpoint health degraded");
            }
        }

        Ok(transition)
    }

    /// Add `delta` to an endpoint's live connection count.
    ///
    /// A decrement past zero is a caller bug; it is clamped and logged, never
    /// propagated.
    pub fn adjust_connections(&self, id: EndpointId, delta: i64) -> Result<u32, PoolError> {
        let (count, clamped) = self.get(id)?.adjust_connections(delta);
        if clamped {
            warn!(endpoint = %id, delta, "connection count underflow, clamped to zero");
        }
        Ok(count)
    }

    pub(crate) fn record_selection(&self, id: EndpointId) -> Result<(), PoolError> {
        self.get(id)?.record_selection();
        Ok(())
    }

    pub(crate) fn record_outcome(&self, id: EndpointId, outcome: Outcome) -> Result<(), PoolError> {
        self.get(id)?.record_outcome(outcome);
        Ok(())
    }

    /// Read-only dump of every endpoint for observability.
    pub fn status(&self) -> PoolStatus {
        PoolStatus::new(
            self.endpoints
                .iter()
                .map(|e| {
                    let record = e.health_record();
                    EndpointStatus {
                        id: e.id(),
                        weight: e.weight(),
                        health: record.status,
                        connections: e.connections(),
                        consecutive_failures: record.consecutive_failures,
                        consecutive_successes: record.consecutive_successes,
                        selected: e.selected(),
                        succeeded: e.succeeded(),
                        failed: e.failed(),
                    }
                })
                .collect(),
        )
    }
}
