//! Instance discovery and accessory indexing
//!
//! Instances are located through static configuration and, with the
//! `discovery` feature, mDNS. Each pass parses their accessory trees into
//! services and merges them into the index.

pub mod engine;
pub mod filters;

#[cfg(feature = "discovery")]
pub mod mdns;

pub use engine::{DiscoveryEngine, DiscoveryReport};
pub use filters::{FilterMatch, InstanceBlacklist, ServiceFilter};
