//! Rated Sentinel: watches Ethereum validator keys on Rated Network.
//!
//! Configured keys are resolved once against a beacon node, then sampled
//! every window (hour or day) from the Rated Network API. Samples are
//! published as Prometheus gauges labeled `{label, pubkey}`.

pub mod beacon;
pub mod config;
pub mod keys;
pub mod metrics;
pub mod rated;
pub mod server;
pub mod watcher;

pub use config::{Config, Granularity};
pub use watcher::Watcher;
