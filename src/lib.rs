//! lbcore - the decision core of a Layer 7 traffic distributor
//!
//! This crate decides where each request goes and keeps that decision
//! honest:
//! - Four selection algorithms over a static endpoint pool
//! - Active health checking with a suspect/down/recover state machine
//! - Bounded failover that never retries an endpoint twice
//! - Live connection accounting and Prometheus metrics
//!
//! Proxying bytes, TLS and config reload belong to the layer around it.

pub mod backend;
pub mod config;
pub mod health;
pub mod metrics;
pub mod util;

pub use backend::{DispatchError, Dispatcher, RequestContext};
pub use config::Config;
