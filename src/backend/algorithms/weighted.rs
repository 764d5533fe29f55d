//! Weighted round-robin load balancing algorithm.

use super::{SelectError, Selector};
use crate::backend::{EndpointId, PoolSnapshot, RequestContext};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Weighted load balancer.
///
/// Distributes requests proportionally to endpoint weights using the smooth
/// (highest-current-weight) schedule, so an endpoint's share is spread
/// through the sequence instead of arriving in bursts. One period of the
/// schedule is built whenever the eligible set changes and then indexed with
/// an atomic cursor, keeping the hot path lock-free. Failover picks walk the
/// same schedule past excluded entries, so retries never rebuild it.
#[derive(Debug, Default)]
pub struct Weighted {
    counter: AtomicUsize,
    schedule: ArcSwapOption<Schedule>,
}

/// One period of the smooth weighted sequence for a given eligible set.
#[derive(Debug)]
struct Schedule {
    members: Vec<(EndpointId, u32)>,
    sequence: Vec<EndpointId>,
}

impl Schedule {
    fn build(members: Vec<(EndpointId, u32)>) -> Self {
        let divisor = members.iter().fold(0, |acc, &(_, w)| gcd(acc, w)).max(1);
        let weights: Vec<i64> = members
            .iter()
            .map(|&(_, w)| i64::from(w / divisor))
            .collect();
        let total: i64 = weights.iter().sum();

        let mut current = vec![0i64; members.len()];
        let mut sequence = Vec::with_capacity(total as usize);

        for _ in 0..total {
            let mut best = 0;
            for (i, weight) in weights.iter().enumerate() {
                current[i] += weight;
                if current[i] > current[best] {
                    best = i;
                }
            }
            current[best] -= total;
            sequence.push(members[best].0);
        }

        Self { members, sequence }
    }

    fn matches(&self, snapshot: &PoolSnapshot) -> bool {
        self.members
            .iter()
            .copied()
            .eq(snapshot.eligible().map(|e| (e.id, e.weight)))
    }
}

impl Weighted {
    pub fn new() -> Self {
        Self::default()
    }

    fn schedule_for(&self, snapshot: &PoolSnapshot) -> Arc<Schedule> {
        if let Some(schedule) = self.schedule.load_full() {
            if schedule.matches(snapshot) {
                return schedule;
            }
        }

        let schedule = Arc::new(Schedule::build(
            snapshot.eligible().map(|e| (e.id, e.weight)).collect(),
        ));
        self.schedule.store(Some(Arc::clone(&schedule)));
        schedule
    }
}

impl Selector for Weighted {
    fn choose(&self, snapshot: &PoolSnapshot, _ctx: &RequestContext) -> Result<EndpointId, SelectError> {
        if snapshot.eligible_count() == 0 {
            return Err(SelectError::NoHealthyEndpoint);
        }

        let schedule = self.schedule_for(snapshot);
        if schedule.sequence.is_empty() {
            return Err(SelectError::NoHealthyEndpoint);
        }

        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % schedule.sequence.len();
        Ok(schedule.sequence[idx])
    }

    fn choose_excluding(
        &self,
        snapshot: &PoolSnapshot,
        _ctx: &RequestContext,
        excluded: &[EndpointId],
    ) -> Result<EndpointId, SelectError> {
        if snapshot.eligible_count() == 0 {
            return Err(SelectError::NoHealthyEndpoint);
        }

        let schedule = self.schedule_for(snapshot);
        let len = schedule.sequence.len();
        if len == 0 {
            return Err(SelectError::NoHealthyEndpoint);
        }

        // Every eligible member occurs at least once per period
        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        (0..len)
            .map(|offset| schedule.sequence[start.wrapping_add(offset) % len])
            .find(|id| !excluded.contains(id))
            .ok_or(SelectError::NoHealthyEndpoint)
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}
