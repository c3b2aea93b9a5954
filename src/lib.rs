//! Resilient configuration-center client.
//!
//! Reads resolve through three tiers (operator failover record, live server,
//! last-known snapshot), so an unreachable server degrades to cached content
//! instead of failing. Watched keys are long-polled in batches and every
//! change reaches registered [`Listener`]s exactly once, in order.
//!
//! Start from [`ConfigClient::builder`] and the [`ConfigService`] trait.

pub mod cache;
mod config;
pub mod constants;
mod errors;
pub mod filter;
pub mod listener;
mod metrics;
mod model;
mod poller;
mod service;
pub mod transport;
pub mod utils;

pub use config::*;
pub use errors::*;
pub use listener::Listener;
pub use metrics::*;
pub use model::*;
pub use service::*;

//-----------------------------------------------------------
// Test utils
