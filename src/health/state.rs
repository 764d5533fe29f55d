//! Endpoint health state machine.
//!
//! ```text
//! Healthy --(suspect_after failures)--> Suspect --(down_after failures)--> Down
//! Suspect --(recover_after successes)--> Healthy
//! Down    --(recover_after successes)--> Healthy
//! ```
//!
//! Suspect endpoints stay eligible for selection; only Down endpoints are
//! removed from rotation. Counters reset on every transition.

use crate::config::HealthCheckConfig;
use std::fmt;

/// Health of a single endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HealthStatus {
    Healthy = 0,
    Suspect = 1,
    Down = 2,
}

impl HealthStatus {
    /// Whether selectors may route to an endpoint in this state.
    pub fn is_eligible(self) -> bool {
        !matches!(self, HealthStatus::Down)
    }

    /// Stable lowercase name, used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Suspect => "suspect",
            HealthStatus::Down => "down",
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => HealthStatus::Healthy,
            1 => HealthStatus::Suspect,
            _ => HealthStatus::Down,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a probe or of a proxied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Thresholds driving the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    /// Consecutive failures before Healthy becomes Suspect.
    pub suspect_after: u32,
    /// Further consecutive failures before Suspect becomes Down.
    pub down_after: u32,
    /// Consecutive successes before Suspect or Down becomes Healthy.
    pub recover_after: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            suspect_after: 1,
            down_after: 2,
            recover_after: 2,
        }
    }
}

impl From<&HealthCheckConfig> for HealthPolicy {
    fn from(config: &HealthCheckConfig) -> Self {
        Self {
            suspect_after: config.suspect_threshold,
            down_after: config.down_threshold,
            recover_after: config.healthy_threshold,
        }
    }
}

/// A state change produced by [`HealthRecord::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthStatus,
    pub to: HealthStatus,
}

/// Per-endpoint health bookkeeping.
///
/// Not synchronized on its own; the pool keeps one behind each endpoint's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthRecord {
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }
}

impl HealthRecord {
    /// Apply one probe result.
    pub fn apply(&mut self, outcome: Outcome, policy: &HealthPolicy) -> Option<Transition> {
        match outcome {
            Outcome::Success => {
                self.consecutive_failures = 0;
                self.consecutive_successes = self.consecutive_successes.saturating_add(1);

                if self.status != HealthStatus::Healthy
                    && self.consecutive_successes >= policy.recover_after
                {
                    return self.force(HealthStatus::Healthy);
                }
                None
            }
            Outcome::Failure => {
                self.consecutive_successes = 0;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);

                match self.status {
                    HealthStatus::Healthy if self.consecutive_failures >= policy.suspect_after => {
                        self.force(HealthStatus::Suspect)
                    }
                    HealthStatus::Suspect if self.consecutive_failures >= policy.down_after => {
                        self.force(HealthStatus::Down)
                    }
                    _ => None,
                }
            }
        }
    }

    /// Move to `status` unconditionally, resetting both counters.
    pub fn force(&mut self, status: HealthStatus) -> Option<Transition> {
        let from = self.status;
        self.status = status;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;

        (from != status).then_some(Transition { from, to: status })
    }
}
