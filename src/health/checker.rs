//! Active health checker.
//!
//! Runs one probing task per endpoint, each on its own timer, fully
//! decoupled from request traffic. No lock is held while a probe is in
//! flight; only applying its result is serialized, per endpoint.

use crate::backend::{BackendPool, EndpointId, PoolError};
use crate::config::HealthCheckConfig;
use crate::health::{HealthPolicy, Outcome, PassiveHealthTracker, Probe, ProbeError, Transition};
use crate::metrics::MetricsCollector;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};

/// Timing and thresholds for active checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckSettings {
    /// Time between probes of one endpoint.
    pub interval: Duration,
    /// Budget for a single probe; must be shorter than `interval`.
    pub timeout: Duration,
    pub policy: HealthPolicy,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self::from(&HealthCheckConfig::default())
    }
}

impl From<&HealthCheckConfig> for HealthCheckSettings {
    fn from(config: &HealthCheckConfig) -> Self {
        Self {
            interval: config.interval,
            timeout: config.timeout,
            policy: HealthPolicy::from(config),
        }
    }
}

/// Active health checker that probes every endpoint of a pool.
pub struct HealthChecker<P: Probe> {
    pool: Arc<BackendPool>,
    probe: Arc<P>,
    settings: HealthCheckSettings,
    passive: PassiveHealthTracker,
    metrics: Option<MetricsCollector>,
}

impl<P: Probe> HealthChecker<P> {
    pub fn new(pool: Arc<BackendPool>, probe: P, settings: HealthCheckSettings) -> Self {
        let passive = PassiveHealthTracker::new(&pool);
        Self {
            pool,
            probe: Arc::new(probe),
            settings,
            passive,
            metrics: None,
        }
    }

    /// Record probe results and transitions.
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Handle for requesting immediate probes, to be given to the dispatcher.
    pub fn passive(&self) -> PassiveHealthTracker {
        self.passive.clone()
    }

    /// Probe one endpoint once and apply the result.
    pub async fn check_once(&self, id: EndpointId) -> Result<Option<Transition>, PoolError> {
        self.task(id).probe_and_apply().await
    }

    /// Run until shutdown is signalled.
    pub async fn run(self, shutdown: broadcast::Receiver<()>) {
        info!(
            endpoints = self.pool.len(),
            interval = %humantime::format_duration(self.settings.interval),
            timeout = %humantime::format_duration(self.settings.timeout),
            "health checker starting"
        );

        let tasks: Vec<_> = self
            .pool
            .ids()
            .into_iter()
            .map(|id| {
                let task = self.task(id);
                let shutdown = shutdown.resubscribe();
                tokio::spawn(task.run(shutdown))
            })
            .collect();

        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "health check task ended abnormally");
            }
        }

        info!("health checker stopped");
    }

    fn task(&self, id: EndpointId) -> EndpointTask<P> {
        EndpointTask {
            id,
            pool: Arc::clone(&self.pool),
            probe: Arc::clone(&self.probe),
            settings: self.settings,
            wake: self.passive.notifier(id).unwrap_or_default(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Probing loop for a single endpoint.
struct EndpointTask<P: Probe> {
    id: EndpointId,
    pool: Arc<BackendPool>,
    probe: Arc<P>,
    settings: HealthCheckSettings,
    wake: Arc<Notify>,
    metrics: Option<MetricsCollector>,
}

impl<P: Probe> EndpointTask<P> {
    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {
                    // Restart the period so the next scheduled probe is a full interval away
                    ticker.reset();
                }
                _ = shutdown.recv() => {
                    debug!(endpoint = %self.id, "health check task shutting down");
                    break;
                }
            }

            if let Err(e) = self.probe_and_apply().await {
                warn!(endpoint = %self.id, error = %e, "health check task stopping");
                break;
            }
        }
    }

    async fn probe_and_apply(&self) -> Result<Option<Transition>, PoolError> {
        let result = match timeout(self.settings.timeout, self.probe.probe(self.id)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout),
        };

        let outcome = match result {
            Ok(()) => {
                debug!(endpoint = %self.id, "health check passed");
                Outcome::Success
            }
            Err(e) => {
                debug!(endpoint = %self.id, error = %e, "health check failed");
                Outcome::Failure
            }
        };

        let transition = self
            .pool
            .record_probe(self.id, outcome, &self.settings.policy)?;

        if let Some(metrics) = &self.metrics {
            metrics.record_health_check(self.id, outcome == Outcome::Success);
            if let Some(t) = transition {
                metrics.record_transition(self.id, &t);
            }
        }

        Ok(transition)
    }
}
