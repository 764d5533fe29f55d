//! Load balancing algorithms.

mod affinity;
pub mod hash_ring;
mod least_conn;
mod round_robin;
mod weighted;

pub use affinity::Affinity;
pub use hash_ring::HashRing;
pub use least_conn::LeastConnections;
pub use round_robin::RoundRobin;
pub use weighted::Weighted;

use crate::backend::{EndpointId, PoolSnapshot, RequestContext};
use crate::config::Algorithm;
use thiserror::Error;

/// The only failure a selector may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("no healthy endpoint available")]
    NoHealthyEndpoint,
}

/// Trait for load balancing algorithms.
pub trait Selector: Send + Sync {
    /// Choose an endpoint for the request.
    ///
    /// # Arguments
    ///
    /// * `snapshot` - The whole pool; implementations filter to eligible endpoints
    /// * `ctx` - The request (client key used by affinity)
    ///
    /// # Returns
    ///
    /// The chosen endpoint, or `NoHealthyEndpoint` when every endpoint is down.
    fn choose(&self, snapshot: &PoolSnapshot, ctx: &RequestContext) -> Result<EndpointId, SelectError>;

    /// Choose an endpoint other than those in `excluded`.
    ///
    /// Used on failover. The default narrows the snapshot; selectors that
    /// cache per eligible set override it to keep that cache intact.
    fn choose_excluding(
        &self,
        snapshot: &PoolSnapshot,
        ctx: &RequestContext,
        excluded: &[EndpointId],
    ) -> Result<EndpointId, SelectError> {
        self.choose(&snapshot.without(excluded), ctx)
    }
}

/// The configured algorithm, fixed at startup.
///
/// A closed enum rather than a trait object so the hot path dispatches
/// statically.
#[derive(Debug)]
pub enum Strategy {
    RoundRobin(RoundRobin),
    Weighted(Weighted),
    LeastConnections(LeastConnections),
    Affinity(Affinity),
}

impl Strategy {
    /// Build the strategy for `algorithm` over the configured endpoints.
    ///
    /// `ids` must be in configured order; only affinity uses it, to lay out
    /// its ring over the full pool.
    pub fn new(algorithm: Algorithm, ids: &[EndpointId], virtual_nodes: u32) -> Self {
        match algorithm {
            Algorithm::RoundRobin => Strategy::RoundRobin(RoundRobin::new()),
            Algorithm::Weighted => Strategy::Weighted(Weighted::new()),
            Algorithm::LeastConnections => Strategy::LeastConnections(LeastConnections::new()),
            Algorithm::Affinity => Strategy::Affinity(Affinity::new(ids, virtual_nodes)),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Strategy::RoundRobin(_) => Algorithm::RoundRobin,
            Strategy::Weighted(_) => Algorithm::Weighted,
            Strategy::LeastConnections(_) => Algorithm::LeastConnections,
            Strategy::Affinity(_) => Algorithm::Affinity,
        }
    }
}

impl Selector for Strategy {
    fn choose(&self, snapshot: &PoolSnapshot, ctx: &RequestContext) -> Result<EndpointId, SelectError> {
        match self {
            Strategy::RoundRobin(s) => s.choose(snapshot, ctx),
            Strategy::Weighted(s) => s.choose(snapshot, ctx),
            Strategy::LeastConnections(s) => s.choose(snapshot, ctx),
            Strategy::Affinity(s) => s.choose(snapshot, ctx),
        }
    }

    fn choose_excluding(
        &self,
        snapshot: &PoolSnapshot,
        ctx: &RequestContext,
        excluded: &[EndpointId],
    ) -> Result<EndpointId, SelectError> {
        match self {
            Strategy::RoundRobin(s) => s.choose_excluding(snapshot, ctx, excluded),
            Strategy::Weighted(s) => s.choose_excluding(snapshot, ctx, excluded),
            Strategy::LeastConnections(s) => s.choose_excluding(snapshot, ctx, excluded),
            Strategy::Affinity(s) => s.choose_excluding(snapshot, ctx, excluded),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::health::HealthStatus;

    #[test]
    fn test_all_down_for_every_strategy() {
        let snapshot = all_down(&snapshot(3));
        let ids: Vec<EndpointId> = snapshot.endpoints().iter().map(|e| e.id).collect();
        let ctx = RequestContext::with_client_key("10.0.0.1");

        for algorithm in [
            Algorithm::RoundRobin,
            Algorithm::Weighted,
            Algorithm::LeastConnections,
            Algorithm::Affinity,
        ] {
            let strategy = Strategy::new(algorithm, &ids, 16);
            assert_eq!(strategy.algorithm(), algorithm);
            assert_eq!(
                strategy.choose(&snapshot, &ctx),
                Err(SelectError::NoHealthyEndpoint),
                "{} routed to a down endpoint",
                algorithm
            );
        }
    }

    #[test]
    fn test_never_selects_down_endpoint() {
        let base = snapshot(4);
        let ids: Vec<EndpointId> = base.endpoints().iter().map(|e| e.id).collect();
        let snapshot = with_health(&with_health(&base, 1, HealthStatus::Down), 3, HealthStatus::Down);
        let down = [ids[1], ids[3]];

        for algorithm in [
            Algorithm::RoundRobin,
            Algorithm::Weighted,
            Algorithm::LeastConnections,
            Algorithm::Affinity,
        ] {
            let strategy = Strategy::new(algorithm, &ids, 16);
            for i in 0..200 {
                let ctx = RequestContext::with_client_key(format!("client-{}", i));
                let chosen = strategy.choose(&snapshot, &ctx).unwrap();
                assert!(!down.contains(&chosen), "{} chose down endpoint", algorithm);
            }
        }
    }

    #[test]
    fn test_suspect_remains_eligible() {
        let snapshot = with_health(&all_down(&snapshot(3)), 2, HealthStatus::Suspect);
        let strategy = Strategy::new(Algorithm::RoundRobin, &[], 1);
        let chosen = strategy.choose(&snapshot, &RequestContext::new()).unwrap();
        assert_eq!(chosen, addr(8003));
    }
}
