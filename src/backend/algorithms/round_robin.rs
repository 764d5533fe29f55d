//! Round-robin load balancing algorithm.

use super::{SelectError, Selector};
use crate::backend::{EndpointId, PoolSnapshot, RequestContext};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin load balancer.
///
/// Cycles through the eligible endpoints in configured order. The eligible
/// list is recomputed on every call, so fairness is approximate across
/// health changes and exact between them.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Selector for RoundRobin {
    fn choose(&self, snapshot: &PoolSnapshot, _ctx: &RequestContext) -> Result<EndpointId, SelectError> {
        let eligible = snapshot.eligible_count();
        if eligible == 0 {
            return Err(SelectError::NoHealthyEndpoint);
        }

        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % eligible;
        snapshot
            .eligible()
            .nth(idx)
            .map(|e| e.id)
            .ok_or(SelectError::NoHealthyEndpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::health::HealthStatus;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_round_robin_cycles() {
        let rr = RoundRobin::new();
        let snapshot = snapshot(3);
        let ctx = RequestContext::new();

        let picks: Vec<EndpointId> = (0..4).map(|_| rr.choose(&snapshot, &ctx).unwrap()).collect();

        assert_eq!(picks, vec![addr(8001), addr(8002), addr(8003), addr(8001)]);
    }

    #[test]
    fn test_round_robin_counts_differ_by_at_most_one() {
        let rr = RoundRobin::new();
        let snapshot = snapshot(3);
        let ctx = RequestContext::new();
        let mut counts: HashMap<EndpointId, usize> = HashMap::new();

        for _ in 0..100 {
            *counts.entry(rr.choose(&snapshot, &ctx).unwrap()).or_default() += 1;
        }

        let min = counts.values().min().copied().unwrap();
        let max = counts.values().max().copied().unwrap();
        assert_eq!(counts.len(), 3);
        assert!(max - min <= 1);
        assert_eq!((min, max), (33, 34));
    }

    #[test]
    fn test_round_robin_fair_under_concurrency() {
        let rr = Arc::new(RoundRobin::new());
        let snapshot = Arc::new(snapshot(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let rr = Arc::clone(&rr);
                let snapshot = Arc::clone(&snapshot);
                thread::spawn(move || {
                    let ctx = RequestContext::new();
                    (0..250)
                        .map(|_| rr.choose(&snapshot, &ctx).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<EndpointId, usize> = HashMap::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                *counts.entry(id).or_default() += 1;
            }
        }

        assert!(counts.values().all(|&c| c == 250));
    }

    #[test]
    fn test_round_robin_skips_down() {
        let rr = RoundRobin::new();
        let snapshot = with_health(&snapshot(3), 1, HealthStatus::Down);
        let ctx = RequestContext::new();

        for _ in 0..10 {
            assert_ne!(rr.choose(&snapshot, &ctx).unwrap(), addr(8002));
        }
    }

    #[test]
    fn test_round_robin_empty() {
        let rr = RoundRobin::new();
        assert_eq!(
            rr.choose(&PoolSnapshot::default(), &RequestContext::new()),
            Err(SelectError::NoHealthyEndpoint)
        );
    }
}
