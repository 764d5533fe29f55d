//! Fast failure detection driven by request outcomes.
//!
//! A failed request does not change endpoint health directly; it asks the
//! endpoint's probing task to probe right away instead of waiting for its
//! next tick. Probing remains the only driver of health transitions.

use crate::backend::{BackendPool, EndpointId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// Handle used by the dispatch path to request immediate probes.
#[derive(Clone, Debug)]
pub struct PassiveHealthTracker {
    triggers: Arc<HashMap<EndpointId, Arc<Notify>>>,
}

impl PassiveHealthTracker {
    pub fn new(pool: &BackendPool) -> Self {
        let triggers = pool
            .ids()
            .into_iter()
            .map(|id| (id, Arc::new(Notify::new())))
            .collect();
        Self {
            triggers: Arc::new(triggers),
        }
    }

    /// Request an immediate probe of `id`.
    ///
    /// Triggers coalesce: several failures before the probe runs cause a
    /// single extra probe. Returns false for an unknown endpoint.
    pub fn trigger(&self, id: EndpointId) -> bool {
        match self.triggers.get(&id) {
            Some(notify) => {
                debug!(endpoint = %id, "immediate probe requested after request failure");
                notify.notify_one();
                true
            }
            None => false,
        }
    }

    pub(crate) fn notifier(&self, id: EndpointId) -> Option<Arc<Notify>> {
        self.triggers.get(&id).cloned()
    }
}
