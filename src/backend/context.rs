//! Per-request input to selection.

use crate::util::RequestId;
use std::net::SocketAddr;

/// What the request-handling layer knows about one request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    request_id: RequestId,
    client_key: Option<String>,
}

impl RequestContext {
    /// Context without a client identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context carrying a client identity key for affinity hashing.
    pub fn with_client_key(key: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::default(),
            client_key: Some(key.into()),
        }
    }

    /// Context keyed on the client's IP address. The port is ignored so a
    /// client keeps its affinity across connections.
    pub fn from_client_addr(addr: SocketAddr) -> Self {
        Self::with_client_key(addr.ip().to_string())
    }

    /// Replace the generated request id, e.g. with one taken from a header.
    pub fn request_id(mut self, id: RequestId) -> Self {
        self.request_id = id;
        self
    }

    pub fn id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn client_key(&self) -> Option<&str> {
        self.client_key.as_deref()
    }
}
