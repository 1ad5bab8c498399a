//! Bridge between HAP accessory instances and a cloud voice-assistant
//! intent protocol
//!
//! The bridge discovers accessories exposed by HAP instances running in
//! insecure mode, keeps an index of their services, answers SYNC, QUERY and
//! EXECUTE intents against that index and pushes state reports upstream when
//! accessories change.
//!
//! # Features
//!
//! - `websocket`: websocket link to the assistant cloud
//! - `discovery`: mDNS browsing for `_hap._tcp` instances

pub mod adapters;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod security;
pub mod server;
pub mod services;
pub mod storage;
pub mod transport;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use server::{BridgeCore, BridgeHandle};
