//! Normalized service model
//!
//! A [`Service`] is the unit the bridge indexes, reports and controls. It is
//! built from one raw HAP service (or, for televisions, several) during a
//! discovery pass and persisted verbatim by the host between restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Device categories the bridge can translate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Door,
    Fan,
    Fanv2,
    GarageDoorOpener,
    HeaterCooler,
    HumiditySensor,
    InputSource,
    Lightbulb,
    LockMechanism,
    OccupancySensor,
    Outlet,
    SecuritySystem,
    Speaker,
    Switch,
    Television,
    TemperatureSensor,
    Thermostat,
    Window,
    WindowCovering,
}

impl Category {
    pub const ALL: [Category; 19] = [
        Category::Door,
        Category::Fan,
        Category::Fanv2,
        Category::GarageDoorOpener,
        Category::HeaterCooler,
        Category::HumiditySensor,
        Category::InputSource,
        Category::Lightbulb,
        Category::LockMechanism,
        Category::OccupancySensor,
        Category::Outlet,
        Category::SecuritySystem,
        Category::Speaker,
        Category::Switch,
        Category::Television,
        Category::TemperatureSensor,
        Category::Thermostat,
        Category::Window,
        Category::WindowCovering,
    ];

    /// Category name as reported in logs and persisted state
    pub fn name(&self) -> &'static str {
        match self {
            Category::Door => "Door",
            Category::Fan => "Fan",
            Category::Fanv2 => "Fanv2",
            Category::GarageDoorOpener => "GarageDoorOpener",
            Category::HeaterCooler => "HeaterCooler",
            Category::HumiditySensor => "HumiditySensor",
            Category::InputSource => "InputSource",
            Category::Lightbulb => "Lightbulb",
            Category::LockMechanism => "LockMechanism",
            Category::OccupancySensor => "OccupancySensor",
            Category::Outlet => "Outlet",
            Category::SecuritySystem => "SecuritySystem",
            Category::Speaker => "Speaker",
            Category::Switch => "Switch",
            Category::Television => "Television",
            Category::TemperatureSensor => "TemperatureSensor",
            Category::Thermostat => "Thermostat",
            Category::Window => "Window",
            Category::WindowCovering => "WindowCovering",
        }
    }

    /// Resolve a category name from the type table; `None` means no adapter
    pub fn from_name(name: &str) -> Option<Category> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Categories whose commands need a secondary authentication pin
    pub fn is_secure(&self) -> bool {
        matches!(
            self,
            Category::Door
                | Category::GarageDoorOpener
                | Category::LockMechanism
                | Category::SecuritySystem
                | Category::Window
        )
    }

    /// Raw services that only exist to be folded into a television
    pub fn is_television_part(&self) -> bool {
        matches!(
            self,
            Category::Television | Category::Speaker | Category::InputSource
        )
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Characteristic permission set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub readable: bool,
    pub writable: bool,
    pub events: bool,
}

impl Permissions {
    /// Build from HAP permission strings (`pr`, `pw`, `ev`, ...)
    pub fn from_hap<S: AsRef<str>>(perms: &[S]) -> Self {
        let mut permissions = Self::default();
        for perm in perms {
            match perm.as_ref() {
                "pr" => permissions.readable = true,
                "pw" => permissions.writable = true,
                "ev" => permissions.events = true,
                _ => {}
            }
        }
        permissions
    }
}

/// A typed, addressable property of a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Characteristic {
    pub iid: i64,
    /// Long-form type identifier
    #[serde(rename = "type")]
    pub type_id: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub perms: Permissions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Fields copied from the owning accessory's information service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessoryInformation {
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_revision: Option<String>,
    pub hardware_revision: Option<String>,
    pub software_revision: Option<String>,
}

/// Routing information for the instance that owns a service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRef {
    pub ip_address: String,
    pub port: u16,
    pub username: String,
}

/// One television input source, classified as channel or input at discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputEntry {
    /// Stable key reported to the assistant
    pub name: String,
    /// Display name with any station prefix removed
    pub configured_name: String,
    /// Ordinal written to `ActiveIdentifier`
    pub identifier: i64,
    pub input_source_type: Option<i64>,
}

/// Auxiliary television state owned by its service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelevisionExtras {
    pub channels: Vec<InputEntry>,
    pub inputs: Vec<InputEntry>,
    /// Identifier of the channel last selected through the bridge
    #[serde(default)]
    pub last_channel: Option<i64>,
    /// Identifier of the input last selected through the bridge
    #[serde(default)]
    pub last_input: Option<i64>,
}

impl TelevisionExtras {
    pub fn channel_index(&self, identifier: i64) -> Option<usize> {
        self.channels.iter().position(|c| c.identifier == identifier)
    }

    pub fn input_index(&self, identifier: i64) -> Option<usize> {
        self.inputs.iter().position(|c| c.identifier == identifier)
    }

    /// Copy cycling anchors from a previous sighting of the same television
    pub fn retain_anchors_from(&mut self, previous: &TelevisionExtras) {
        self.last_channel = previous
            .last_channel
            .filter(|id| self.channel_index(*id).is_some());
        self.last_input = previous
            .last_input
            .filter(|id| self.input_index(*id).is_some());
    }
}

/// The canonical normalized device-control unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub aid: i64,
    pub iid: i64,
    /// Long-form service type identifier
    #[serde(rename = "type")]
    pub type_id: String,
    #[serde(rename = "serviceType")]
    pub category: Category,
    pub characteristics: Vec<Characteristic>,
    pub accessory_information: AccessoryInformation,
    pub service_name: String,
    pub instance: InstanceRef,
    pub unique_id: String,
    /// Consecutive discovery passes this service was not seen
    #[serde(default)]
    pub is_unavailable: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<TelevisionExtras>,
    /// Last time a discovery pass saw this service
    pub last_seen: DateTime<Utc>,
}

impl Service {
    /// First characteristic of the given long-form type
    pub fn characteristic(&self, type_id: &str) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.type_id == type_id)
    }

    pub fn characteristic_mut(&mut self, type_id: &str) -> Option<&mut Characteristic> {
        self.characteristics.iter_mut().find(|c| c.type_id == type_id)
    }

    pub fn characteristic_by_iid_mut(&mut self, iid: i64) -> Option<&mut Characteristic> {
        self.characteristics.iter_mut().find(|c| c.iid == iid)
    }

    pub fn has(&self, type_id: &str) -> bool {
        self.characteristic(type_id).is_some()
    }

    pub fn owns_iid(&self, iid: i64) -> bool {
        self.characteristics.iter().any(|c| c.iid == iid)
    }

    /// Current cached value of a characteristic
    pub fn value(&self, type_id: &str) -> Option<&Value> {
        self.characteristic(type_id).map(|c| &c.value)
    }

    /// Whether this service is served by the given endpoint and accessory
    pub fn is_located_at(&self, host: &str, port: u16, aid: i64) -> bool {
        self.instance.ip_address == host && self.instance.port == port && self.aid == aid
    }
}

/// Interpret a HAP value as a boolean (`true`, `1`, `"1"`)
pub fn value_as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "0" && s != "false",
        _ => false,
    }
}

/// Interpret a HAP value as a number
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Interpret a HAP value as an integer
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|v| v.round() as i64)),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
