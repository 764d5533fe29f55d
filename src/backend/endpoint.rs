//! A single backend endpoint.

use crate::health::{HealthPolicy, HealthRecord, HealthStatus, Outcome, Transition};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

/// Stable identity of an endpoint.
pub type EndpointId = SocketAddr;

/// One backend server in the pool.
///
/// The health record sits behind a per-endpoint lock so transitions are
/// serialized; the current status is mirrored into an atomic so readers never
/// take that lock.
#[derive(Debug)]
pub struct Endpoint {
    id: EndpointId,
    weight: u32,
    /// Position in configured order.
    slot: usize,
    status: AtomicU8,
    record: Mutex<HealthRecord>,
    connections: AtomicU32,
    selected: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl Endpoint {
    pub(crate) fn new(id: EndpointId, weight: u32, slot: usize) -> Self {
        Self {
            id,
            weight,
            slot,
            status: AtomicU8::new(HealthStatus::Healthy as u8),
            record: Mutex::new(HealthRecord::default()),
            connections: AtomicU32::new(0),
            selected: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Current health, without locking.
    pub fn health(&self) -> HealthStatus {
        HealthStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Live connection count.
    pub fn connections(&self) -> u32 {
        self.connections.load(Ordering::Acquire)
    }

    /// Total number of times this endpoint was selected.
    pub fn selected(&self) -> u64 {
        self.selected.load(Ordering::Relaxed)
    }

    /// Completed requests reported as successful.
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Copy of the health record, taken under the endpoint's lock.
    pub fn health_record(&self) -> HealthRecord {
        *self.record.lock()
    }

    pub(crate) fn apply_probe(&self, outcome: Outcome, policy: &HealthPolicy) -> Option<Transition> {
        let mut record = self.record.lock();
        let transition = record.apply(outcome, policy);
        self.status.store(record.status as u8, Ordering::Release);
        transition
    }

    pub(crate) fn force_health(&self, status: HealthStatus) -> Option<Transition> {
        let mut record = self.record.lock();
        let transition = record.force(status);
        self.status.store(record.status as u8, Ordering::Release);
        transition
    }

    /// Add `delta` to the connection count, clamping at zero.
    ///
    /// Returns the new count and whether the update had to be clamped.
    pub(crate) fn adjust_connections(&self, delta: i64) -> (u32, bool) {
        let previous = self
            .connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(apply_delta(current, delta))
            })
            .unwrap_or_else(|current| current);

        let clamped = i64::from(previous) + delta < 0;
        (apply_delta(previous, delta), clamped)
    }

    pub(crate) fn record_selection(&self) {
        self.selected.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a completed request. Request outcomes never touch health.
    pub(crate) fn record_outcome(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Success => &self.succeeded,
            Outcome::Failure => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn apply_delta(current: u32, delta: i64) -> u32 {
    (i64::from(current) + delta).clamp(0, i64::from(u32::MAX)) as u32
}
