//! Configuration validation.

use crate::config::{Config, HealthCheckType, MAX_WEIGHT};
use std::collections::HashSet;

/// Validate the configuration.
///
/// Checks for:
/// - At least one endpoint, no duplicate addresses
/// - Endpoint weights within `1..=MAX_WEIGHT`
/// - Health thresholds of at least one, probe timeout shorter than the interval
/// - HTTP health checks have paths
/// - At least one virtual node per endpoint
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing every problem found.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    if config.pool.endpoints.is_empty() {
        errors.push("pool must have at least one endpoint".to_string());
    }

    let mut addresses = HashSet::new();
    for endpoint in &config.pool.endpoints {
        if !addresses.insert(endpoint.address) {
            errors.push(format!("duplicate endpoint address: {}", endpoint.address));
        }

        if endpoint.weight == 0 {
            errors.push(format!(
                "endpoint {} has weight 0 (must be >= 1)",
                endpoint.address
            ));
        } else if endpoint.weight > MAX_WEIGHT {
            errors.push(format!(
                "endpoint {} has weight {} (must be <= {})",
                endpoint.address, endpoint.weight, MAX_WEIGHT
            ));
        }
    }

    let hc = &config.health_check;
    if hc.interval.is_zero() {
        errors.push("health check interval must be greater than zero".to_string());
    }
    if hc.timeout >= hc.interval {
        errors.push(format!(
            "health check timeout ({}) must be shorter than the interval ({})",
            humantime::format_duration(hc.timeout),
            humantime::format_duration(hc.interval)
        ));
    }
    for (name, value) in [
        ("suspect_threshold", hc.suspect_threshold),
        ("down_threshold", hc.down_threshold),
        ("healthy_threshold", hc.healthy_threshold),
    ] {
        if value == 0 {
            errors.push(format!("health check {} must be >= 1", name));
        }
    }
    if hc.check_type == HealthCheckType::Http && hc.path.is_none() {
        errors.push("HTTP health check has no path specified".to_string());
    }

    if config.affinity.virtual_nodes == 0 {
        errors.push("affinity virtual_nodes must be >= 1".to_string());
    }

    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
