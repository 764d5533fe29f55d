//! Dispatcher: one selection per call, with bounded failover.

use crate::backend::algorithms::{Selector, Strategy};
use crate::backend::{
    BackendPool, ConnectionTracker, EndpointId, PoolError, PoolStatus, RequestContext,
};
use crate::config::{Algorithm, Config, FailoverConfig};
use crate::health::{Outcome, PassiveHealthTracker};
use crate::metrics::MetricsCollector;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Why a request could not be given an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("all endpoints are down")]
    AllEndpointsDown,

    #[error("retry budget exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("no healthy endpoint left after excluding {excluded} already tried")]
    NoAlternative { excluded: usize },

    #[error("unknown endpoint {0}")]
    UnknownEndpoint(EndpointId),

    #[error(transparent)]
    Pool(PoolError),
}

impl DispatchError {
    /// Stable name, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::AllEndpointsDown => "all_endpoints_down",
            DispatchError::RetriesExhausted { .. } => "retries_exhausted",
            DispatchError::NoAlternative { .. } => "no_alternative",
            DispatchError::UnknownEndpoint(_) => "unknown_endpoint",
            DispatchError::Pool(_) => "pool",
        }
    }
}

impl From<PoolError> for DispatchError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::UnknownEndpoint(id) => DispatchError::UnknownEndpoint(id),
            other => DispatchError::Pool(other),
        }
    }
}

/// Retry behaviour after a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Ask the health checker for an immediate probe on request failure.
    pub probe_on_failure: bool,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self::from(&FailoverConfig::default())
    }
}

impl From<&FailoverConfig> for FailoverPolicy {
    fn from(config: &FailoverConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            probe_on_failure: config.probe_on_failure,
        }
    }
}

/// Routes requests to endpoints of one pool.
///
/// Safe to share across any number of request-handling tasks. Nothing here
/// blocks or waits on a health probe.
pub struct Dispatcher {
    pool: Arc<BackendPool>,
    strategy: Strategy,
    tracker: ConnectionTracker,
    failover: FailoverPolicy,
    passive: Option<PassiveHealthTracker>,
    metrics: Option<MetricsCollector>,
}

impl Dispatcher {
    pub fn new(pool: Arc<BackendPool>, strategy: Strategy, failover: FailoverPolicy) -> Self {
        let tracker = ConnectionTracker::new(Arc::clone(&pool));
        Self {
            pool,
            strategy,
            tracker,
            failover,
            passive: None,
            metrics: None,
        }
    }

    /// Build the pool and the configured strategy.
    pub fn from_config(config: &Config) -> Result<Self, PoolError> {
        let pool = Arc::new(BackendPool::new(&config.pool.endpoints)?);
        let strategy = Strategy::new(
            config.pool.algorithm,
            &pool.ids(),
            config.affinity.virtual_nodes,
        );
        Ok(Self::new(pool, strategy, FailoverPolicy::from(&config.failover)))
    }

    /// Attach the health checker's trigger handle for fast failure detection.
    pub fn with_passive_health(mut self, passive: PassiveHealthTracker) -> Self {
        self.passive = Some(passive);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    pub fn algorithm(&self) -> Algorithm {
        self.strategy.algorithm()
    }

    pub fn failover(&self) -> FailoverPolicy {
        self.failover
    }

    /// Pick an endpoint for a new request and count it as in flight.
    pub fn select(&self, ctx: &RequestContext) -> Result<EndpointId, DispatchError> {
        let snapshot = self.pool.snapshot();
        let chosen = self
            .strategy
            .choose(&snapshot, ctx)
            .map_err(|_| DispatchError::AllEndpointsDown);
        self.commit(ctx, chosen)
    }

    /// Pick a different endpoint after earlier attempts failed.
    ///
    /// `excluding` lists every endpoint already tried for this request; the
    /// number of distinct ids in it is the attempt number. The caller must
    /// have reported the outcome of each earlier attempt.
    pub fn retry(
        &self,
        ctx: &RequestContext,
        excluding: &[EndpointId],
    ) -> Result<EndpointId, DispatchError> {
        let mut tried: Vec<EndpointId> = Vec::with_capacity(excluding.len());
        for &id in excluding {
            if !tried.contains(&id) {
                tried.push(id);
            }
        }

        let chosen = self.choose_alternative(ctx, &tried);
        if chosen.is_ok() && !tried.is_empty() {
            if let Some(metrics) = &self.metrics {
                metrics.record_retry();
            }
        }
        self.commit(ctx, chosen)
    }

    fn choose_alternative(
        &self,
        ctx: &RequestContext,
        tried: &[EndpointId],
    ) -> Result<EndpointId, DispatchError> {
        if let Some(&unknown) = tried.iter().find(|&&id| !self.pool.contains(id)) {
            return Err(DispatchError::UnknownEndpoint(unknown));
        }

        let attempts = u32::try_from(tried.len()).unwrap_or(u32::MAX);
        if attempts > self.failover.max_retries {
            return Err(DispatchError::RetriesExhausted { attempts });
        }

        let snapshot = self.pool.snapshot();
        if snapshot.eligible_count() == 0 {
            return Err(DispatchError::AllEndpointsDown);
        }

        self.strategy
            .choose_excluding(&snapshot, ctx, tried)
            .map_err(|_| DispatchError::NoAlternative {
                excluded: tried.len(),
            })
    }

    fn commit(
        &self,
        ctx: &RequestContext,
        chosen: Result<EndpointId, DispatchError>,
    ) -> Result<EndpointId, DispatchError> {
        let result = chosen.and_then(|id| {
            self.tracker.increment(id)?;
            self.pool.record_selection(id)?;
            Ok(id)
        });

        match &result {
            Ok(id) => {
                debug!(
                    request_id = %ctx.id(),
                    endpoint = %id,
                    algorithm = %self.strategy.algorithm(),
                    "selected endpoint"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_selection(*id, self.strategy.algorithm());
                }
            }
            Err(e) => {
                if matches!(e, DispatchError::UnknownEndpoint(_) | DispatchError::Pool(_)) {
                    error!(request_id = %ctx.id(), error = %e, "dispatch failed");
                } else {
                    warn!(request_id = %ctx.id(), error = %e, "dispatch failed");
                }
                if let Some(metrics) = &self.metrics {
                    metrics.record_dispatch_error(e);
                }
            }
        }

        result
    }

    /// Report that a request to `id` completed.
    ///
    /// Must be called exactly once per successful `select` or `retry`.
    pub fn report_outcome(&self, id: EndpointId, outcome: Outcome) -> Result<(), DispatchError> {
        if let Err(e) = self.tracker.decrement(id) {
            error!(endpoint = %id, error = %e, "outcome reported for unknown endpoint");
            return Err(e.into());
        }

        if let Err(e) = self.pool.record_outcome(id, outcome) {
            error!(endpoint = %id, error = %e, "failed to record outcome");
            return Err(e.into());
        }
        debug!(endpoint = %id, ?outcome, "request completed");
        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(id, outcome);
        }

        if outcome == Outcome::Failure && self.failover.probe_on_failure {
            if let Some(passive) = &self.passive {
                passive.trigger(id);
            }
        }

        Ok(())
    }

    /// Observability dump of every endpoint.
    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }
}
