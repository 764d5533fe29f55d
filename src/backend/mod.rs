//! Backend pool, request routing and failover.

pub mod algorithms;
mod context;
mod dispatcher;
mod endpoint;
mod pool;
mod snapshot;
mod status;
mod tracker;

pub use context::RequestContext;
pub use dispatcher::{DispatchError, Dispatcher, FailoverPolicy};
pub use endpoint::{Endpoint, EndpointId};
pub use pool::{BackendPool, PoolError};
pub use snapshot::{EndpointSnapshot, PoolSnapshot};
pub use status::{EndpointStatus, PoolStatus};
pub use tracker::ConnectionTracker;
