//! Endpoint health: the state machine, probes, and the active checker.

mod checker;
mod passive;
mod probe;
mod state;

pub use checker::{HealthCheckSettings, HealthChecker};
pub use passive::PassiveHealthTracker;
pub use probe::{ConfiguredProbe, HttpProbe, Probe, ProbeError, TcpProbe};
pub use state::{HealthPolicy, HealthRecord, HealthStatus, Outcome, Transition};
