//! Utility functions and helpers.

mod logging;
mod request_id;
mod shutdown;

pub use logging::init_logging;
pub use request_id::{RequestId, generate_short_request_id};
pub use shutdown::ShutdownSignal;
