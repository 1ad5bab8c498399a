//! Normalized services and the canonical index
//!
//! This module holds the single source of truth the rest of the bridge reads:
//! the [`Service`] model, the stable identity scheme and the index keyed by it.

pub mod hap_types;
pub mod identity;
pub mod index;
pub mod model;

pub use identity::unique_id;
pub use index::{ServiceIndex, SweepReport, Upsert};
pub use model::{
    AccessoryInformation, Category, Characteristic, InputEntry, InstanceRef, Permissions, Service,
    TelevisionExtras,
};
