//! Per-category translation between services and assistant intents
//!
//! Each supported [`Category`] maps to one [`DeviceAdapter`] in a fixed
//! table. Adapters are stateless; the only mutable state they touch is the
//! service they are handed (television cycling anchors).

mod fan;
mod garage_door;
mod lightbulb;
mod lock_mechanism;
mod opening;
mod security_system;
mod sensors;
mod switch;
pub mod television;
mod thermostat;

use crate::client::{CharacteristicWrite, WriteRequest};
use crate::config::{BridgeConfig, ChannelAlias};
use crate::server::intents::{
    CustomData, DeviceDescriptor, DeviceInfo, DeviceName, DeviceState, Execution,
};
use crate::services::{Category, Service};
use serde_json::{Map, Value};

/// Settings adapters need from the bridge configuration
#[derive(Debug, Clone, Default)]
pub struct AdapterContext {
    pub force_fahrenheit: bool,
    pub channel_aliases: Vec<ChannelAlias>,
}

impl AdapterContext {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            force_fahrenheit: config.force_fahrenheit,
            channel_aliases: config.channel_aliases.clone(),
        }
    }

    pub fn temperature_unit(&self) -> &'static str {
        if self.force_fahrenheit {
            "F"
        } else {
            "C"
        }
    }
}

/// A translated command
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    /// Control write to send
    pub payload: WriteRequest,
    /// State the device is expected to reach, reported back on success
    pub states: Option<DeviceState>,
}

impl Translation {
    pub fn write(writes: Vec<CharacteristicWrite>) -> Self {
        Self {
            payload: WriteRequest::new(writes),
            states: None,
        }
    }

    pub fn with_states(mut self, states: DeviceState) -> Self {
        self.states = Some(states);
        self
    }
}

/// Capability negotiation, state mapping and command translation for one
/// category
pub trait DeviceAdapter: Send + Sync {
    /// Describe the service for SYNC
    fn sync(&self, service: &Service, ctx: &AdapterContext) -> DeviceDescriptor;

    /// Map cached characteristic values to a state snapshot
    fn query(&self, service: &Service, ctx: &AdapterContext) -> DeviceState;

    /// Translate a command; `None` when the service cannot express it
    fn execute(
        &self,
        service: &mut Service,
        execution: &Execution,
        ctx: &AdapterContext,
    ) -> Option<Translation>;
}

static DOOR: opening::Opening = opening::Opening::door();
static WINDOW: opening::Opening = opening::Opening::window();
static WINDOW_COVERING: opening::Opening = opening::Opening::window_covering();
static FAN: fan::Fan = fan::Fan;
static GARAGE_DOOR_OPENER: garage_door::GarageDoorOpener = garage_door::GarageDoorOpener;
static HEATER_COOLER: thermostat::HeaterCooler = thermostat::HeaterCooler;
static HUMIDITY_SENSOR: sensors::HumiditySensor = sensors::HumiditySensor;
static LIGHTBULB: lightbulb::Lightbulb = lightbulb::Lightbulb;
static LOCK_MECHANISM: lock_mechanism::LockMechanism = lock_mechanism::LockMechanism;
static OCCUPANCY_SENSOR: sensors::OccupancySensor = sensors::OccupancySensor;
static OUTLET: switch::Switch = switch::Switch::outlet();
static SECURITY_SYSTEM: security_system::SecuritySystem = security_system::SecuritySystem;
static SWITCH: switch::Switch = switch::Switch::switch();
static TELEVISION: television::Television = television::Television;
static TEMPERATURE_SENSOR: sensors::TemperatureSensor = sensors::TemperatureSensor;
static THERMOSTAT: thermostat::Thermostat = thermostat::Thermostat;

/// The adapter registered for a category
pub fn adapter_for(category: Category) -> &'static dyn DeviceAdapter {
    match category {
        Category::Door => &DOOR,
        Category::Fan | Category::Fanv2 => &FAN,
        Category::GarageDoorOpener => &GARAGE_DOOR_OPENER,
        Category::HeaterCooler => &HEATER_COOLER,
        Category::HumiditySensor => &HUMIDITY_SENSOR,
        Category::Lightbulb => &LIGHTBULB,
        Category::LockMechanism => &LOCK_MECHANISM,
        Category::OccupancySensor => &OCCUPANCY_SENSOR,
        Category::Outlet => &OUTLET,
        Category::SecuritySystem => &SECURITY_SYSTEM,
        Category::Switch => &SWITCH,
        Category::Television | Category::Speaker | Category::InputSource => &TELEVISION,
        Category::TemperatureSensor => &TEMPERATURE_SENSOR,
        Category::Thermostat => &THERMOSTAT,
        Category::Window => &WINDOW,
        Category::WindowCovering => &WINDOW_COVERING,
    }
}

/// SYNC descriptor fields shared by every adapter
pub(crate) fn descriptor(
    service: &Service,
    device_type: &str,
    traits: Vec<&str>,
    attributes: Map<String, Value>,
) -> DeviceDescriptor {
    let info = &service.accessory_information;
    let mut default_names = vec![service.service_name.clone()];
    if let Some(name) = info.name.as_ref().filter(|n| **n != service.service_name) {
        default_names.push(name.clone());
    }

    DeviceDescriptor {
        id: service.unique_id.clone(),
        device_type: device_type.to_string(),
        traits: traits.into_iter().map(str::to_string).collect(),
        name: DeviceName {
            default_names,
            name: service.service_name.clone(),
            nicknames: Vec::new(),
        },
        will_report_state: true,
        attributes,
        device_info: DeviceInfo {
            manufacturer: info.manufacturer.clone(),
            model: info.model.clone(),
            hw_version: info.hardware_revision.clone(),
            sw_version: info.software_revision.clone(),
        },
        custom_data: CustomData {
            aid: service.aid,
            iid: service.iid,
            instance_username: service.instance.username.clone(),
            instance_ip_address: service.instance.ip_address.clone(),
            instance_port: service.instance.port,
        },
    }
}

/// Build a write to the characteristic of `type_id`, if the service has one
pub(crate) fn write(service: &Service, type_id: &str, value: impl Into<Value>) -> Option<CharacteristicWrite> {
    service
        .characteristic(type_id)
        .map(|c| CharacteristicWrite::value(service.aid, c.iid, value))
}

/// State snapshot starting with `online: true`
pub(crate) fn online_state() -> DeviceState {
    let mut state = Map::new();
    state.insert("online".to_string(), Value::Bool(true));
    state
}

/// Turn a `json!({...})` literal into a map
pub(crate) fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::services::hap_types::service as service_types;
    use crate::services::{
        AccessoryInformation, Category, Characteristic, InstanceRef, Permissions, Service,
    };
    use chrono::Utc;
    use serde_json::Value;

    /// Build a service with `(iid, type, value)` characteristics
    pub fn service_with(category: Category, chars: &[(i64, &str, Value)]) -> Service {
        Service {
            aid: 2,
            iid: 8,
            type_id: service_types::SWITCH.to_string(),
            category,
            characteristics: chars
                .iter()
                .map(|(iid, type_id, value)| Characteristic {
                    iid: *iid,
                    type_id: type_id.to_string(),
                    value: value.clone(),
                    perms: Permissions::from_hap(&["pr", "pw", "ev"]),
                    description: None,
                })
                .collect(),
            accessory_information: AccessoryInformation {
                name: Some("Accessory".to_string()),
                manufacturer: Some("Acme".to_string()),
                model: Some("M1".to_string()),
                ..Default::default()
            },
            service_name: "Device".to_string(),
            instance: InstanceRef {
                ip_address: "10.0.0.2".to_string(),
                port: 51826,
                username: "AA:BB".to_string(),
            },
            unique_id: "device-1".to_string(),
            is_unavailable: 0,
            extras: None,
            last_seen: Utc::now(),
        }
    }
}
