//! Common test utilities
//!
//! [`MockHapClient`] serves scripted accessory trees and records every write;
//! [`RecordingSink`] captures outbound messages.

#![allow(dead_code)]

use async_trait::async_trait;
use hap_assistant_bridge::client::{
    CharacteristicStatus, HapClient, HapEvent, HapInstance, WriteRequest,
};
use hap_assistant_bridge::config::BridgeConfig;
use hap_assistant_bridge::error::{BridgeError, Result};
use hap_assistant_bridge::services::hap_types::service as service_types;
use hap_assistant_bridge::services::unique_id;
use hap_assistant_bridge::transport::{OutboundMessage, ReportSink};
use rstest::fixture;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const PORT: u16 = 51826;
pub const LAMP_HOST: &str = "10.0.0.2";
pub const LAMP_USERNAME: &str = "AA:BB:CC:DD:EE:01";
pub const TV_HOST: &str = "10.0.0.4";
pub const TV_USERNAME: &str = "AA:BB:CC:DD:EE:04";
pub const LOCK_HOST: &str = "10.0.0.3";
pub const LOCK_USERNAME: &str = "AA:BB:CC:DD:EE:03";

/// A write sent to an instance
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub host: String,
    pub port: u16,
    pub request: WriteRequest,
}

/// Scripted [`HapClient`]
#[derive(Default)]
pub struct MockHapClient {
    pub instances: Mutex<Vec<HapInstance>>,
    pub unreachable: Mutex<Vec<String>>,
    pub reject_subscriptions: Mutex<Vec<String>>,
    pub controls: Mutex<Vec<RecordedWrite>>,
    pub subscriptions: Mutex<Vec<RecordedWrite>>,
    pub status_values: Mutex<HashMap<(i64, i64), Value>>,
    pub status_offline: Mutex<bool>,
}

impl MockHapClient {
    pub fn with_instances(instances: Vec<HapInstance>) -> Self {
        let client = Self::default();
        *client.instances.lock().unwrap() = instances;
        client
    }

    pub fn set_instances(&self, instances: Vec<HapInstance>) {
        *self.instances.lock().unwrap() = instances;
    }

    pub fn set_unreachable(&self, host: &str) {
        self.unreachable.lock().unwrap().push(host.to_string());
    }

    pub fn set_status(&self, aid: i64, iid: i64, value: Value) {
        self.status_values.lock().unwrap().insert((aid, iid), value);
    }

    /// Control writes excluding reachability pings
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.controls
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.request != WriteRequest::ping())
            .cloned()
            .collect()
    }

    /// Control payloads as JSON, excluding pings
    pub fn write_payloads(&self) -> Vec<Value> {
        self.writes()
            .into_iter()
            .map(|w| serde_json::to_value(&w.request).unwrap())
            .collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }
}

#[async_trait]
impl HapClient for MockHapClient {
    async fn list_instances(&self) -> Result<Vec<HapInstance>> {
        Ok(self.instances.lock().unwrap().clone())
    }

    async fn control(&self, host: &str, port: u16, request: &WriteRequest) -> Result<()> {
        if self.unreachable.lock().unwrap().iter().any(|h| h == host) {
            return Err(BridgeError::connectivity(format!("{host}:{port}: connection refused")));
        }
        self.controls.lock().unwrap().push(RecordedWrite {
            host: host.to_string(),
            port,
            request: request.clone(),
        });
        Ok(())
    }

    async fn status(&self, host: &str, port: u16, ids: &[(i64, i64)]) -> Result<Vec<CharacteristicStatus>> {
        if *self.status_offline.lock().unwrap() {
            return Err(BridgeError::transport(format!("{host}:{port}: timed out")));
        }
        let values = self.status_values.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|(aid, iid)| {
                values.get(&(*aid, *iid)).map(|value| CharacteristicStatus {
                    aid: *aid,
                    iid: *iid,
                    value: value.clone(),
                })
            })
            .collect())
    }

    async fn subscribe(&self, host: &str, port: u16, request: &WriteRequest) -> Result<()> {
        if self.reject_subscriptions.lock().unwrap().iter().any(|h| h == host) {
            return Err(BridgeError::subscription(format!("{host}:{port} answered 400")));
        }
        self.subscriptions.lock().unwrap().push(RecordedWrite {
            host: host.to_string(),
            port,
            request: request.clone(),
        });
        Ok(())
    }
}

/// [`ReportSink`] that keeps everything it is given
#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<OutboundMessage>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// Bodies of the state reports sent so far
    pub fn reports(&self) -> Vec<Map<String, Value>> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::ReportState { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn sync_requests(&self) -> usize {
        self.messages()
            .iter()
            .filter(|m| matches!(m, OutboundMessage::RequestSync))
            .count()
    }
}

#[async_trait]
impl ReportSink for RecordingSink {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

#[fixture]
pub fn sink() -> Arc<RecordingSink> {
    Arc::new(RecordingSink::default())
}

/// Client serving the lamp and the lock
#[fixture]
pub fn home_client() -> Arc<MockHapClient> {
    Arc::new(MockHapClient::with_instances(vec![lamp_instance(), lock_instance()]))
}

/// Configuration with the pin gate waived and default timings
pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        disable_pin_code_requirement: true,
        ..Default::default()
    }
}

pub fn info_service(name: &str, serial: &str) -> Value {
    json!({
        "iid": 1,
        "type": "3E",
        "characteristics": [
            {"iid": 2, "type": "23", "perms": ["pr"], "value": name},
            {"iid": 3, "type": "20", "perms": ["pr"], "value": "Acme"},
            {"iid": 4, "type": "21", "perms": ["pr"], "value": "Model X"},
            {"iid": 5, "type": "30", "perms": ["pr"], "value": serial},
        ]
    })
}

pub fn instance(host: &str, username: &str, accessories: Value) -> HapInstance {
    HapInstance {
        ip_address: host.to_string(),
        port: PORT,
        username: username.to_string(),
        accessories: json!({ "accessories": accessories }),
    }
}

/// Dimmable lamp: On at iid 9, Brightness at iid 10
pub fn lamp_instance() -> HapInstance {
    instance(
        LAMP_HOST,
        LAMP_USERNAME,
        json!([{
            "aid": 2,
            "services": [
                info_service("Desk Lamp", "SN-LAMP"),
                {"iid": 8, "type": "43", "characteristics": [
                    {"iid": 9, "type": "25", "perms": ["pr", "pw", "ev"], "value": false},
                    {"iid": 10, "type": "8", "perms": ["pr", "pw", "ev"], "value": 40}
                ]}
            ]
        }]),
    )
}

pub fn lamp_id() -> String {
    unique_id(LAMP_USERNAME, 2, 8, service_types::LIGHTBULB)
}

/// Lock: current state at iid 9, target at iid 10
pub fn lock_instance() -> HapInstance {
    instance(
        LOCK_HOST,
        LOCK_USERNAME,
        json!([{
            "aid": 5,
            "services": [
                info_service("Front Door", "SN-LOCK"),
                {"iid": 8, "type": "45", "characteristics": [
                    {"iid": 9, "type": "1D", "perms": ["pr", "ev"], "value": 1},
                    {"iid": 10, "type": "1E", "perms": ["pr", "pw", "ev"], "value": 1}
                ]}
            ]
        }]),
    )
}

pub fn lock_id() -> String {
    unique_id(LOCK_USERNAME, 5, 8, service_types::LOCK_MECHANISM)
}

/// Television with channels A, B, C (identifiers 0..2), one HDMI input
/// (identifier 3) and a speaker
pub fn tv_instance() -> HapInstance {
    let source = |iid: i64, name: &str, configured: &str, identifier: i64| {
        json!({"iid": iid, "type": "D9", "characteristics": [
            {"iid": iid + 1, "type": "23", "perms": ["pr"], "value": name},
            {"iid": iid + 2, "type": "E3", "perms": ["pr"], "value": configured},
            {"iid": iid + 3, "type": "E6", "perms": ["pr"], "value": identifier}
        ]})
    };
    instance(
        TV_HOST,
        TV_USERNAME,
        json!([{
            "aid": 3,
            "services": [
                info_service("Living Room TV", "SN-TV"),
                {"iid": 10, "type": "D8", "characteristics": [
                    {"iid": 11, "type": "B0", "perms": ["pr", "pw", "ev"], "value": 1},
                    {"iid": 12, "type": "E7", "perms": ["pr", "pw", "ev"], "value": 0},
                    {"iid": 13, "type": "E3", "perms": ["pr"], "value": "Living Room TV"},
                    {"iid": 14, "type": "E1", "perms": ["pw"], "value": null}
                ]},
                {"iid": 20, "type": "113", "characteristics": [
                    {"iid": 21, "type": "11A", "perms": ["pr", "pw", "ev"], "value": false},
                    {"iid": 22, "type": "EA", "perms": ["pw"], "value": null}
                ]},
                source(30, "a", "Station - A", 0),
                source(40, "b", "Station - B", 1),
                source(50, "c", "Station - C", 2),
                source(60, "hdmi1", "HDMI 1", 3)
            ]
        }]),
    )
}

pub fn tv_id() -> String {
    unique_id(TV_USERNAME, 3, 10, service_types::TELEVISION)
}

pub fn event(host: &str, aid: i64, iid: i64, value: Value) -> HapEvent {
    HapEvent {
        host: host.to_string(),
        port: PORT,
        aid,
        iid,
        value,
    }
}
