//! Observability snapshot of the pool.

use crate::backend::EndpointId;
use crate::health::HealthStatus;
use std::fmt;

/// State and counters of one endpoint, for export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointStatus {
    pub id: EndpointId,
    pub weight: u32,
    pub health: HealthStatus,
    pub connections: u32,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Total selections since startup.
    pub selected: u64,
    /// Reported request outcomes since startup.
    pub succeeded: u64,
    pub failed: u64,
}

/// Read-only dump of every endpoint, in configured order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStatus {
    endpoints: Vec<EndpointStatus>,
}

impl PoolStatus {
    pub fn new(endpoints: Vec<EndpointStatus>) -> Self {
        Self { endpoints }
    }

    pub fn endpoints(&self) -> &[EndpointStatus] {
        &self.endpoints
    }

    pub fn get(&self, id: EndpointId) -> Option<&EndpointStatus> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    pub fn total_selected(&self) -> u64 {
        self.endpoints.iter().map(|e| e.selected).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.endpoints.iter().map(|e| e.failed).sum()
    }

    pub fn active_connections(&self) -> u64 {
        self.endpoints.iter().map(|e| u64::from(e.connections)).sum()
    }

    /// Count of endpoints in the given state.
    pub fn count(&self, health: HealthStatus) -> usize {
        self.endpoints.iter().filter(|e| e.health == health).count()
    }

    /// Fraction of all selections that went to `id`.
    pub fn share(&self, id: EndpointId) -> f64 {
        let total = self.total_selected();
        match self.get(id) {
            Some(e) if total > 0 => e.selected as f64 / total as f64,
            _ => 0.0,
        }
    }
}

/// Renders the distribution summary table.
impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<24} {:>6} {:>8} {:>6} {:>10} {:>7} {:>8}",
            "endpoint", "weight", "health", "conns", "selected", "share", "failed"
        )?;
        for e in &self.endpoints {
            writeln!(
                f,
                "{:<24} {:>6} {:>8} {:>6} {:>10} {:>6.1}% {:>8}",
                e.id.to_string(),
                e.weight,
                e.health.as_str(),
                e.connections,
                e.selected,
                self.share(e.id) * 100.0,
                e.failed
            )?;
        }
        write!(
            f,
            "total: {} selections, {} failed, {} active connections, {}/{} eligible",
            self.total_selected(),
            self.total_failed(),
            self.active_connections(),
            self.endpoints.len() - self.count(HealthStatus::Down),
            self.endpoints.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(port: u16, health: HealthStatus, selected: u64) -> EndpointStatus {
        EndpointStatus {
            id: format!("127.0.0.1:{}", port).parse().unwrap(),
            weight: 1,
            health,
            connections: 1,
            consecutive_failures: 0,
            consecutive_successes: 0,
            selected,
            succeeded: selected,
            failed: 0,
        }
    }

    #[test]
    fn test_share_and_totals() {
        let pool = PoolStatus::new(vec![
            status(8001, HealthStatus::Healthy, 30),
            status(8002, HealthStatus::Down, 10),
        ]);

        assert_eq!(pool.total_selected(), 40);
        assert_eq!(pool.active_connections(), 2);
        assert!((pool.share("127.0.0.1:8001".parse().unwrap()) - 0.75).abs() < f64::EPSILON);
        assert_eq!(pool.count(HealthStatus::Down), 1);
    }

    #[test]
    fn test_share_without_selections() {
        let pool = PoolStatus::new(vec![status(8001, HealthStatus::Healthy, 0)]);
        assert_eq!(pool.share("127.0.0.1:8001".parse().unwrap()), 0.0);
    }

    #[test]
    fn test_summary_table() {
        let pool = PoolStatus::new(vec![
            status(8001, HealthStatus::Healthy, 3),
            status(8002, HealthStatus::Down, 1),
        ]);

        let rendered = pool.to_string();
        assert!(rendered.contains("127.0.0.1:8001"));
        assert!(rendered.contains("75.0%"));
        assert!(rendered.contains("down"));
        assert!(rendered.contains("0 failed"));
        assert!(rendered.ends_with("1/2 eligible"));
    }
}
