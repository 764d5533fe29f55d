//! Request ID generation for request tracing.
//!
//! Every [`RequestContext`](crate::backend::RequestContext) carries one so
//! selection and failover decisions can be correlated in logs.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for short request IDs.
static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a short request ID based on a counter.
///
/// Only unique within a single process.
/// Format: `req-{counter}` where counter is zero-padded to 16 hex digits.
pub fn generate_short_request_id() -> String {
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("req-{:016x}", count)
}

/// Request ID wrapper that can be included in tracing spans.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Create a new short request ID.
    pub fn short() -> Self {
        Self(generate_short_request_id())
    }

    /// Create a request ID from an existing string (e.g., from a header).
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Short ids by default: contexts are built on the dispatch path.
impl Default for RequestId {
    fn default() -> Self {
        Self::short()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
