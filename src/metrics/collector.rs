//! Metrics collector using prometheus-client.
//!
//! Provides metrics for selections, dispatch failures, retries, request
//! outcomes and endpoint health.

use crate::backend::{DispatchError, EndpointId, PoolStatus};
use crate::config::Algorithm;
use crate::health::{HealthStatus, Outcome, Transition};
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::Arc;

/// Labels for selection metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SelectionLabels {
    pub endpoint: String,
    pub algorithm: String,
}

/// Labels for dispatch error metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DispatchErrorLabels {
    pub kind: String,
}

/// Labels for per-endpoint gauges.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EndpointLabels {
    pub endpoint: String,
}

/// Labels for health check metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HealthCheckLabels {
    pub endpoint: String,
    pub result: HealthCheckResult,
}

/// Result of a health check.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum HealthCheckResult {
    Success,
    Failure,
}

/// Labels for reported request outcomes.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub endpoint: String,
    pub result: String,
}

/// Labels for health transition metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TransitionLabels {
    pub endpoint: String,
    pub to: String,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    selections_total: Family<SelectionLabels, Counter>,
    dispatch_errors_total: Family<DispatchErrorLabels, Counter>,
    retries_total: Counter,
    outcomes_total: Family<OutcomeLabels, Counter>,
    health_checks_total: Family<HealthCheckLabels, Counter>,
    health_transitions_total: Family<TransitionLabels, Counter>,
    /// 2 = healthy, 1 = suspect, 0 = down.
    endpoint_health: Family<EndpointLabels, Gauge>,
    active_connections: Family<EndpointLabels, Gauge>,
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let selections_total = Family::<SelectionLabels, Counter>::default();
        let dispatch_errors_total = Family::<DispatchErrorLabels, Counter>::default();
        let retries_total = Counter::default();
        let outcomes_total = Family::<OutcomeLabels, Counter>::default();
        let health_checks_total = Family::<HealthCheckLabels, Counter>::default();
        let health_transitions_total = Family::<TransitionLabels, Counter>::default();
        let endpoint_health = Family::<EndpointLabels, Gauge>::default();
        let active_connections = Family::<EndpointLabels, Gauge>::default();

        registry.register(
            "lbcore_selections",
            "Total number of endpoint selections",
            selections_total.clone(),
        );
        registry.register(
            "lbcore_dispatch_errors",
            "Total number of failed dispatches by kind",
            dispatch_errors_total.clone(),
        );
        registry.register(
            "lbcore_retries",
            "Total number of retry selections",
            retries_total.clone(),
        );
        registry.register(
            "lbcore_request_outcomes",
            "Total number of completed requests by endpoint and result",
            outcomes_total.clone(),
        );
        registry.register(
            "lbcore_health_checks",
            "Total number of health checks performed",
            health_checks_total.clone(),
        );
        registry.register(
            "lbcore_health_transitions",
            "Total number of endpoint health transitions",
            health_transitions_total.clone(),
        );
        registry.register(
            "lbcore_endpoint_health",
            "Endpoint health (2=healthy, 1=suspect, 0=down)",
            endpoint_health.clone(),
        );
        registry.register(
            "lbcore_active_connections",
            "Number of in-flight requests per endpoint",
            active_connections.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                selections_total,
                dispatch_errors_total,
                retries_total,
                outcomes_total,
                health_checks_total,
                health_transitions_total,
                endpoint_health,
                active_connections,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn record_selection(&self, endpoint: EndpointId, algorithm: Algorithm) {
        let labels = SelectionLabels {
            endpoint: endpoint.to_string(),
            algorithm: algorithm.as_str().to_string(),
        };
        self.inner.selections_total.get_or_create(&labels).inc();
    }

    pub fn record_dispatch_error(&self, error: &DispatchError) {
        let labels = DispatchErrorLabels {
            kind: error.kind().to_string(),
        };
        self.inner.dispatch_errors_total.get_or_create(&labels).inc();
    }

    pub fn record_retry(&self) {
        self.inner.retries_total.inc();
    }

    pub fn record_outcome(&self, endpoint: EndpointId, outcome: Outcome) {
        let labels = OutcomeLabels {
            endpoint: endpoint.to_string(),
            result: match outcome {
                Outcome::Success => "success",
                Outcome::Failure => "failure",
            }
            .to_string(),
        };
        self.inner.outcomes_total.get_or_create(&labels).inc();
    }

    /// Record a health check result.
    pub fn record_health_check(&self, endpoint: EndpointId, success: bool) {
        let labels = HealthCheckLabels {
            endpoint: endpoint.to_string(),
            result: if success {
                HealthCheckResult::Success
            } else {
                HealthCheckResult::Failure
            },
        };
        self.inner.health_checks_total.get_or_create(&labels).inc();
    }

    /// Count a transition and move the health gauge with it.
    pub fn record_transition(&self, endpoint: EndpointId, transition: &Transition) {
        let labels = TransitionLabels {
            endpoint: endpoint.to_string(),
            to: transition.to.as_str().to_string(),
        };
        self.inner.health_transitions_total.get_or_create(&labels).inc();
        self.set_endpoint_health(endpoint, transition.to);
    }

    /// Update endpoint health gauge.
    pub fn set_endpoint_health(&self, endpoint: EndpointId, health: HealthStatus) {
        let labels = EndpointLabels {
            endpoint: endpoint.to_string(),
        };
        self.inner
            .endpoint_health
            .get_or_create(&labels)
            .set(health_value(health));
    }

    /// Refresh the per-endpoint gauges from a pool dump.
    pub fn observe_pool(&self, status: &PoolStatus) {
        for endpoint in status.endpoints() {
            self.set_endpoint_health(endpoint.id, endpoint.health);
            let labels = EndpointLabels {
                endpoint: endpoint.id.to_string(),
            };
            self.inner
                .active_connections
                .get_or_create(&labels)
                .set(i64::from(endpoint.connections));
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn health_value(health: HealthStatus) -> i64 {
    match health {
        HealthStatus::Healthy => 2,
        HealthStatus::Suspect => 1,
        HealthStatus::Down => 0,
    }
}
