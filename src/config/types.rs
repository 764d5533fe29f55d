//! Configuration data types.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Largest weight accepted for a single endpoint.
///
/// The weighted selector materializes one period of its schedule, so the
/// period length is bounded by `MAX_WEIGHT * endpoints`.
pub const MAX_WEIGHT: u32 = 1000;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// The static backend pool
    pub pool: PoolConfig,

    /// Active health check settings
    #[serde(default)]
    pub health_check: HealthCheckConfig,

    /// Retry and fast-failure policy
    #[serde(default)]
    pub failover: FailoverConfig,

    /// Consistent hash ring settings (affinity algorithm)
    #[serde(default)]
    pub affinity: AffinityConfig,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
            metrics: MetricsConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Whether metrics endpoint is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind metrics server
    #[serde(default = "default_metrics_address")]
    pub address: SocketAddr,

    /// Path for metrics endpoint
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_metrics_address(),
            path: default_metrics_path(),
        }
    }
}

/// Backend pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Load balancing algorithm
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Endpoints in configured order
    pub endpoints: Vec<EndpointConfig>,
}

/// Individual endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Endpoint address and port
    pub address: SocketAddr,

    /// Weight for weighted load balancing (default: 1)
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl EndpointConfig {
    /// Endpoint with the default weight.
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            weight: default_weight(),
        }
    }

    /// Endpoint with an explicit weight.
    pub fn weighted(address: SocketAddr, weight: u32) -> Self {
        Self { address, weight }
    }
}

/// Load balancing algorithm.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    Weighted,
    LeastConnections,
    Affinity,
}

impl Algorithm {
    /// Stable lowercase name, used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "round_robin",
            Algorithm::Weighted => "weighted",
            Algorithm::LeastConnections => "least_connections",
            Algorithm::Affinity => "affinity",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    /// Type of health check: tcp or http
    #[serde(default, rename = "type")]
    pub check_type: HealthCheckType,

    /// HTTP path to check (for HTTP health checks)
    #[serde(default)]
    pub path: Option<String>,

    /// Expected HTTP status code (for HTTP health checks)
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,

    /// How often each endpoint is probed
    #[serde(default = "default_health_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Timeout for a single probe, must be shorter than the interval
    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Consecutive failures before a healthy endpoint becomes suspect
    #[serde(default = "default_suspect_threshold")]
    pub suspect_threshold: u32,

    /// Further consecutive failures before a suspect endpoint goes down
    #[serde(default = "default_down_threshold")]
    pub down_threshold: u32,

    /// Consecutive successes before an endpoint is healthy again
    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            check_type: HealthCheckType::Tcp,
            path: None,
            expected_status: default_expected_status(),
            interval: default_health_interval(),
            timeout: default_health_timeout(),
            suspect_threshold: default_suspect_threshold(),
            down_threshold: default_down_threshold(),
            healthy_threshold: default_healthy_threshold(),
        }
    }
}

/// Type of health check.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckType {
    #[default]
    Tcp,
    Http,
}

/// Failover configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FailoverConfig {
    /// Maximum retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Probe an endpoint immediately when a request to it fails
    #[serde(default = "default_true")]
    pub probe_on_failure: bool,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            probe_on_failure: true,
        }
    }
}

/// Consistent hash ring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AffinityConfig {
    /// Virtual nodes placed on the ring per endpoint
    #[serde(default = "default_virtual_nodes")]
    pub virtual_nodes: u32,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            virtual_nodes: default_virtual_nodes(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_true() -> bool {
    true
}

fn default_metrics_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_health_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_suspect_threshold() -> u32 {
    1
}

fn default_down_threshold() -> u32 {
    2
}

fn default_healthy_threshold() -> u32 {
    2
}

fn default_max_retries() -> u32 {
    1
}

fn default_virtual_nodes() -> u32 {
    160
}

fn default_weight() -> u32 {
    1
}

fn default_expected_status() -> u16 {
    200
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
