//! HAP type identifiers
//!
//! Instances may report type identifiers in short form (`"25"`) or long form
//! (`"00000025-0000-1000-8000-0026BB765291"`). Everything inside the bridge
//! compares long-form, upper-case identifiers.

/// Suffix shared by all Apple-defined HAP types
pub const BASE_UUID_SUFFIX: &str = "-0000-1000-8000-0026BB765291";

/// Normalize a type identifier to long form.
///
/// Short forms are hex strings of up to eight digits; anything already in
/// long form (or not hex at all, e.g. vendor UUIDs) is only upper-cased.
pub fn to_long_form(type_id: &str) -> String {
    let trimmed = type_id.trim();
    let is_short = !trimmed.is_empty()
        && trimmed.len() <= 8
        && trimmed.chars().all(|c| c.is_ascii_hexdigit());

    if is_short {
        format!("{:0>8}{}", trimmed.to_ascii_uppercase(), BASE_UUID_SUFFIX)
    } else {
        trimmed.to_ascii_uppercase()
    }
}

macro_rules! hap_types {
    ($(#[$meta:meta])* $module:ident { $($name:ident = $short:literal),* $(,)? }) => {
        $(#[$meta])*
        pub mod $module {
            $(
                pub const $name: &str = concat!(
                    $short,
                    "-0000-1000-8000-0026BB765291"
                );
            )*
        }
    };
}

hap_types!(
    /// Long-form service type identifiers
    service {
        ACCESSORY_INFORMATION = "0000003E",
        AIR_PURIFIER = "000000BB",
        BATTERY = "00000096",
        CONTACT_SENSOR = "00000080",
        DOOR = "00000081",
        FAN = "00000040",
        FAN_V2 = "000000B7",
        GARAGE_DOOR_OPENER = "00000041",
        HEATER_COOLER = "000000BC",
        HUMIDITY_SENSOR = "00000082",
        INPUT_SOURCE = "000000D9",
        LEAK_SENSOR = "00000083",
        LIGHT_SENSOR = "00000084",
        LIGHTBULB = "00000043",
        LOCK_MECHANISM = "00000045",
        MOTION_SENSOR = "00000085",
        OCCUPANCY_SENSOR = "00000086",
        OUTLET = "00000047",
        SECURITY_SYSTEM = "0000007E",
        SPEAKER = "00000113",
        STATELESS_PROGRAMMABLE_SWITCH = "00000089",
        SWITCH = "00000049",
        TELEVISION = "000000D8",
        TEMPERATURE_SENSOR = "0000008A",
        THERMOSTAT = "0000004A",
        VALVE = "000000D0",
        WINDOW = "0000008B",
        WINDOW_COVERING = "0000008C",
    }
);

hap_types!(
    /// Long-form characteristic type identifiers
    characteristic {
        ACTIVE = "000000B0",
        ACTIVE_IDENTIFIER = "000000E7",
        BRIGHTNESS = "00000008",
        CONFIGURED_NAME = "000000E3",
        COOLING_THRESHOLD_TEMPERATURE = "0000000D",
        CURRENT_DOOR_STATE = "0000000E",
        CURRENT_HEATER_COOLER_STATE = "000000B1",
        CURRENT_HEATING_COOLING_STATE = "0000000F",
        CURRENT_POSITION = "0000006D",
        CURRENT_RELATIVE_HUMIDITY = "00000010",
        CURRENT_TEMPERATURE = "00000011",
        FIRMWARE_REVISION = "00000052",
        HARDWARE_REVISION = "00000053",
        HEATING_THRESHOLD_TEMPERATURE = "00000012",
        HUE = "00000013",
        IDENTIFIER = "000000E6",
        INPUT_SOURCE_TYPE = "000000DB",
        LOCK_CURRENT_STATE = "0000001D",
        LOCK_TARGET_STATE = "0000001E",
        MANUFACTURER = "00000020",
        MODEL = "00000021",
        MUTE = "0000011A",
        NAME = "00000023",
        OCCUPANCY_DETECTED = "00000071",
        ON = "00000025",
        POSITION_STATE = "00000072",
        REMOTE_KEY = "000000E1",
        ROTATION_SPEED = "00000029",
        SATURATION = "0000002F",
        SECURITY_SYSTEM_CURRENT_STATE = "00000066",
        SECURITY_SYSTEM_TARGET_STATE = "00000067",
        SERIAL_NUMBER = "00000030",
        SOFTWARE_REVISION = "00000054",
        TARGET_DOOR_STATE = "00000032",
        TARGET_HEATER_COOLER_STATE = "000000B2",
        TARGET_HEATING_COOLING_STATE = "00000033",
        TARGET_POSITION = "0000007C",
        TARGET_TEMPERATURE = "00000035",
        TEMPERATURE_DISPLAY_UNITS = "00000036",
        VOLUME_SELECTOR = "000000EA",
    }
);

/// Map a long-form service type to its category name.
///
/// The table is wider than the set of categories the bridge can translate;
/// callers decide whether a name has an adapter.
pub fn service_type_name(type_id: &str) -> Option<&'static str> {
    let name = match type_id {
        service::AIR_PURIFIER => "AirPurifier",
        service::BATTERY => "Battery",
        service::CONTACT_SENSOR => "ContactSensor",
        service::DOOR => "Door",
        service::FAN => "Fan",
        service::FAN_V2 => "Fanv2",
        service::GARAGE_DOOR_OPENER => "GarageDoorOpener",
        service::HEATER_COOLER => "HeaterCooler",
        service::HUMIDITY_SENSOR => "HumiditySensor",
        service::INPUT_SOURCE => "InputSource",
        service::LEAK_SENSOR => "LeakSensor",
        service::LIGHT_SENSOR => "LightSensor",
        service::LIGHTBULB => "Lightbulb",
        service::LOCK_MECHANISM => "LockMechanism",
        service::MOTION_SENSOR => "MotionSensor",
        service::OCCUPANCY_SENSOR => "OccupancySensor",
        service::OUTLET => "Outlet",
        service::SECURITY_SYSTEM => "SecuritySystem",
        service::SPEAKER => "Speaker",
        service::STATELESS_PROGRAMMABLE_SWITCH => "StatelessProgrammableSwitch",
        service::SWITCH => "Switch",
        service::TELEVISION => "Television",
        service::TEMPERATURE_SENSOR => "TemperatureSensor",
        service::THERMOSTAT => "Thermostat",
        service::VALVE => "Valve",
        service::WINDOW => "Window",
        service::WINDOW_COVERING => "WindowCovering",
        _ => return None,
    };
    Some(name)
}

/// Characteristic kinds worth a live event subscription
pub const TRACKED_CHARACTERISTICS: &[&str] = &[
    characteristic::ACTIVE,
    characteristic::ON,
    characteristic::CURRENT_POSITION,
    characteristic::TARGET_POSITION,
    characteristic::CURRENT_DOOR_STATE,
    characteristic::TARGET_DOOR_STATE,
    characteristic::BRIGHTNESS,
    characteristic::HEATING_THRESHOLD_TEMPERATURE,
    characteristic::HUE,
    characteristic::SATURATION,
    characteristic::LOCK_CURRENT_STATE,
    characteristic::LOCK_TARGET_STATE,
    characteristic::TARGET_HEATING_COOLING_STATE,
    characteristic::TARGET_TEMPERATURE,
    characteristic::COOLING_THRESHOLD_TEMPERATURE,
    characteristic::CURRENT_TEMPERATURE,
    characteristic::CURRENT_RELATIVE_HUMIDITY,
    characteristic::SECURITY_SYSTEM_TARGET_STATE,
    characteristic::SECURITY_SYSTEM_CURRENT_STATE,
    characteristic::ACTIVE_IDENTIFIER,
    characteristic::MUTE,
    characteristic::OCCUPANCY_DETECTED,
];
