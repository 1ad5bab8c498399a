//! Assistant intent protocol types
//!
//! Only the fields the bridge reads or populates are modeled; everything else
//! in a request is ignored.

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// State snapshot of one device, as reported by QUERY and state reports
pub type DeviceState = Map<String, Value>;

/// Trait identifiers
pub mod traits {
    pub const APP_SELECTOR: &str = "action.devices.traits.AppSelector";
    pub const ARM_DISARM: &str = "action.devices.traits.ArmDisarm";
    pub const BRIGHTNESS: &str = "action.devices.traits.Brightness";
    pub const CHANNEL: &str = "action.devices.traits.Channel";
    pub const COLOR_SETTING: &str = "action.devices.traits.ColorSetting";
    pub const FAN_SPEED: &str = "action.devices.traits.FanSpeed";
    pub const HUMIDITY_SETTING: &str = "action.devices.traits.HumiditySetting";
    pub const INPUT_SELECTOR: &str = "action.devices.traits.InputSelector";
    pub const LOCK_UNLOCK: &str = "action.devices.traits.LockUnlock";
    pub const MEDIA_STATE: &str = "action.devices.traits.MediaState";
    pub const OCCUPANCY_SENSING: &str = "action.devices.traits.OccupancySensing";
    pub const ON_OFF: &str = "action.devices.traits.OnOff";
    pub const OPEN_CLOSE: &str = "action.devices.traits.OpenClose";
    pub const TEMPERATURE_CONTROL: &str = "action.devices.traits.TemperatureControl";
    pub const TEMPERATURE_SETTING: &str = "action.devices.traits.TemperatureSetting";
    pub const TRANSPORT_CONTROL: &str = "action.devices.traits.TransportControl";
    pub const VOLUME: &str = "action.devices.traits.Volume";
}

/// Command identifiers
pub mod commands {
    pub const ARM_DISARM: &str = "action.devices.commands.ArmDisarm";
    pub const BRIGHTNESS_ABSOLUTE: &str = "action.devices.commands.BrightnessAbsolute";
    pub const COLOR_ABSOLUTE: &str = "action.devices.commands.ColorAbsolute";
    pub const LOCK_UNLOCK: &str = "action.devices.commands.LockUnlock";
    pub const MEDIA_NEXT: &str = "action.devices.commands.mediaNext";
    pub const MEDIA_PAUSE: &str = "action.devices.commands.mediaPause";
    pub const MEDIA_PREVIOUS: &str = "action.devices.commands.mediaPrevious";
    pub const MEDIA_RESUME: &str = "action.devices.commands.mediaResume";
    pub const MEDIA_STOP: &str = "action.devices.commands.mediaStop";
    pub const MUTE: &str = "action.devices.commands.mute";
    pub const NEXT_INPUT: &str = "action.devices.commands.NextInput";
    pub const ON_OFF: &str = "action.devices.commands.OnOff";
    pub const OPEN_CLOSE: &str = "action.devices.commands.OpenClose";
    pub const PREVIOUS_INPUT: &str = "action.devices.commands.PreviousInput";
    pub const RELATIVE_CHANNEL: &str = "action.devices.commands.relativeChannel";
    pub const RETURN_CHANNEL: &str = "action.devices.commands.returnChannel";
    /// Spelling some clients send for `returnChannel`
    pub const RETURN_CHANNEL_SHORT: &str = "action.devices.returnChannel";
    pub const SELECT_CHANNEL: &str = "action.devices.commands.selectChannel";
    pub const SET_FAN_SPEED: &str = "action.devices.commands.SetFanSpeed";
    pub const SET_INPUT: &str = "action.devices.commands.SetInput";
    pub const SET_VOLUME: &str = "action.devices.commands.setVolume";
    pub const THERMOSTAT_SET_MODE: &str = "action.devices.commands.ThermostatSetMode";
    pub const THERMOSTAT_TEMPERATURE_SETPOINT: &str =
        "action.devices.commands.ThermostatTemperatureSetpoint";
    pub const THERMOSTAT_TEMPERATURE_SET_RANGE: &str =
        "action.devices.commands.ThermostatTemperatureSetRange";
    pub const VOLUME_RELATIVE: &str = "action.devices.commands.volumeRelative";
}

/// Device type identifiers
pub mod device_types {
    pub const AC_UNIT: &str = "action.devices.types.AC_UNIT";
    pub const BLINDS: &str = "action.devices.types.BLINDS";
    pub const DOOR: &str = "action.devices.types.DOOR";
    pub const FAN: &str = "action.devices.types.FAN";
    pub const GARAGE: &str = "action.devices.types.GARAGE";
    pub const LIGHT: &str = "action.devices.types.LIGHT";
    pub const LOCK: &str = "action.devices.types.LOCK";
    pub const OUTLET: &str = "action.devices.types.OUTLET";
    pub const SECURITY_SYSTEM: &str = "action.devices.types.SECURITYSYSTEM";
    pub const SENSOR: &str = "action.devices.types.SENSOR";
    pub const SWITCH: &str = "action.devices.types.SWITCH";
    pub const THERMOSTAT: &str = "action.devices.types.THERMOSTAT";
    pub const TV: &str = "action.devices.types.TV";
    pub const WINDOW: &str = "action.devices.types.WINDOW";
}

/// Execute error codes
pub mod error_codes {
    use crate::error::ErrorCode;

    pub const CHALLENGE_NEEDED: &str = "challengeNeeded";
    pub const DEVICE_NOT_FOUND: &str = "deviceNotFound";
    pub const DEVICE_OFFLINE: &str = "deviceOffline";
    pub const FUNCTION_NOT_SUPPORTED: &str = "functionNotSupported";

    /// Assistant error code for a bridge failure
    pub fn for_code(code: ErrorCode) -> &'static str {
        match code {
            ErrorCode::DeviceNotFound => DEVICE_NOT_FOUND,
            ErrorCode::DeviceTypeUnsupported | ErrorCode::InvalidInput => FUNCTION_NOT_SUPPORTED,
            _ => DEVICE_OFFLINE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceName {
    pub default_names: Vec<String>,
    pub name: String,
    pub nicknames: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hw_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
}

/// Routing data echoed back by the assistant with every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomData {
    pub aid: i64,
    pub iid: i64,
    pub instance_username: String,
    pub instance_ip_address: String,
    pub instance_port: u16,
}

/// One SYNC device entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub traits: Vec<String>,
    pub name: DeviceName,
    pub will_report_state: bool,
    pub attributes: Map<String, Value>,
    pub device_info: DeviceInfo,
    pub custom_data: CustomData,
}

impl DeviceDescriptor {
    pub fn has_trait(&self, name: &str) -> bool {
        self.traits.iter().any(|t| t == name)
    }
}

/// Device reference inside QUERY and EXECUTE payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRef {
    pub id: String,
}

/// Secondary authentication supplied with a command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<bool>,
}

/// One command with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub command: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<Challenge>,
}

impl Execution {
    pub fn new(command: &str, params: Value) -> Self {
        Self {
            command: command.to_string(),
            params: match params {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            challenge: None,
        }
    }

    pub fn with_pin(mut self, pin: &str) -> Self {
        self.challenge = Some(Challenge {
            pin: Some(pin.to_string()),
            ack: None,
        });
        self
    }

    pub fn pin(&self) -> Option<&str> {
        self.challenge.as_ref().and_then(|c| c.pin.as_deref())
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn bool_param(&self, key: &str) -> Option<bool> {
        self.param(key).and_then(Value::as_bool)
    }

    pub fn f64_param(&self, key: &str) -> Option<f64> {
        self.param(key).and_then(Value::as_f64)
    }

    pub fn i64_param(&self, key: &str) -> Option<i64> {
        self.param(key)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64)))
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(Value::as_str)
    }
}

/// One EXECUTE command group: the same executions applied to several devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteCommand {
    pub devices: Vec<DeviceRef>,
    pub execution: Vec<Execution>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeNeeded {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Per-device EXECUTE outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub ids: Vec<String>,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<DeviceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_needed: Option<ChallengeNeeded>,
}

impl ExecutionResult {
    pub fn success(id: &str, states: Option<DeviceState>) -> Self {
        Self {
            ids: vec![id.to_string()],
            status: ExecutionStatus::Success,
            states,
            error_code: None,
            challenge_needed: None,
        }
    }

    pub fn error(id: &str, error_code: &str) -> Self {
        Self {
            ids: vec![id.to_string()],
            status: ExecutionStatus::Error,
            states: None,
            error_code: Some(error_code.to_string()),
            challenge_needed: None,
        }
    }

    /// Error result carrying the assistant code of `error`
    pub fn failed(id: &str, error: &BridgeError) -> Self {
        Self::error(id, error_codes::for_code(error.to_error_code()))
    }

    pub fn challenge(id: &str, kind: &str) -> Self {
        Self {
            challenge_needed: Some(ChallengeNeeded {
                kind: kind.to_string(),
            }),
            ..Self::error(id, error_codes::CHALLENGE_NEEDED)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Intent carried by an inbound fulfillment request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", content = "payload")]
pub enum Intent {
    #[serde(rename = "action.devices.SYNC")]
    Sync,
    #[serde(rename = "action.devices.QUERY")]
    Query { devices: Vec<DeviceRef> },
    #[serde(rename = "action.devices.EXECUTE")]
    Execute { commands: Vec<ExecuteCommand> },
    #[serde(rename = "action.devices.DISCONNECT")]
    Disconnect,
}

/// SYNC response payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_user_id: Option<String>,
    pub devices: Vec<DeviceDescriptor>,
}

/// QUERY response payload; unknown ids map to an empty object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub devices: Map<String, Value>,
}

/// EXECUTE response payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub commands: Vec<ExecutionResult>,
}

/// Fulfillment request `{requestId, inputs: [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    pub request_id: String,
    pub inputs: Vec<Intent>,
}
