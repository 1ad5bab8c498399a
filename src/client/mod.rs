//! Local accessory protocol client
//!
//! The bridge talks to instances through the [`HapClient`] trait: listing,
//! control writes, status queries and event subscriptions. Push events are
//! delivered out of band on an `mpsc` channel of [`PushMessage`]s.

pub mod event_stream;
pub mod http_client;

pub use http_client::HttpHapClient;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A reachable instance endpoint, before its accessories are fetched
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Identity advertised in the `id` TXT record
    pub username: String,
}

impl From<&crate::config::StaticInstance> for Endpoint {
    fn from(instance: &crate::config::StaticInstance) -> Self {
        Self {
            host: instance.host.clone(),
            port: instance.port,
            username: instance.username.clone(),
        }
    }
}

/// An instance together with its raw accessory tree
#[derive(Debug, Clone)]
pub struct HapInstance {
    pub ip_address: String,
    pub port: u16,
    pub username: String,
    /// Body of `GET /accessories`; parsed by the discovery engine so that a
    /// malformed tree only affects this instance
    pub accessories: Value,
}

/// Raw `GET /accessories` document
#[derive(Debug, Clone, Deserialize)]
pub struct AccessoryList {
    pub accessories: Vec<RawAccessory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAccessory {
    pub aid: i64,
    #[serde(default)]
    pub services: Vec<RawService>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawService {
    pub iid: i64,
    #[serde(rename = "type")]
    pub type_id: String,
    #[serde(default)]
    pub characteristics: Vec<RawCharacteristic>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCharacteristic {
    pub iid: i64,
    #[serde(rename = "type")]
    pub type_id: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub perms: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One entry of a control or subscribe body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicWrite {
    pub aid: i64,
    pub iid: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ev: Option<bool>,
}

impl CharacteristicWrite {
    pub fn value(aid: i64, iid: i64, value: impl Into<Value>) -> Self {
        Self {
            aid,
            iid,
            value: Some(value.into()),
            ev: None,
        }
    }

    pub fn subscribe(aid: i64, iid: i64) -> Self {
        Self {
            aid,
            iid,
            value: None,
            ev: Some(true),
        }
    }
}

/// `{"characteristics": [...]}` body used by control and subscribe calls
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub characteristics: Vec<CharacteristicWrite>,
}

impl WriteRequest {
    pub fn new(characteristics: Vec<CharacteristicWrite>) -> Self {
        Self { characteristics }
    }

    /// Harmless write used to check that an instance accepts our pin
    pub fn ping() -> Self {
        Self::new(vec![CharacteristicWrite {
            aid: -1,
            iid: -1,
            value: None,
            ev: None,
        }])
    }

    pub fn is_empty(&self) -> bool {
        self.characteristics.is_empty()
    }
}

/// One characteristic value returned by a status query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicStatus {
    pub aid: i64,
    pub iid: i64,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StatusResponse {
    pub characteristics: Vec<CharacteristicStatus>,
}

/// A pushed characteristic change
#[derive(Debug, Clone, PartialEq)]
pub struct HapEvent {
    pub host: String,
    pub port: u16,
    pub aid: i64,
    pub iid: i64,
    pub value: Value,
}

/// Traffic on the push channel
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    Event(HapEvent),
    /// An event connection ended; whatever it registered no longer reports
    Closed { host: String, port: u16 },
}

impl From<HapEvent> for PushMessage {
    fn from(event: HapEvent) -> Self {
        PushMessage::Event(event)
    }
}

/// Build the `aid.iid,aid.iid` list of a status query
pub fn status_query(ids: &[(i64, i64)]) -> String {
    ids.iter()
        .map(|(aid, iid)| format!("{aid}.{iid}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Local protocol operations, addressed by host and port
#[async_trait]
pub trait HapClient: Send + Sync {
    /// Locate instances and fetch their accessory trees
    async fn list_instances(&self) -> Result<Vec<HapInstance>>;

    /// Write characteristic values
    async fn control(&self, host: &str, port: u16, request: &WriteRequest) -> Result<()>;

    /// Fetch current values for `(aid, iid)` pairs
    async fn status(
        &self,
        host: &str,
        port: u16,
        ids: &[(i64, i64)],
    ) -> Result<Vec<CharacteristicStatus>>;

    /// Register for push events; events arrive on the client's push channel
    async fn subscribe(&self, host: &str, port: u16, request: &WriteRequest) -> Result<()>;
}
