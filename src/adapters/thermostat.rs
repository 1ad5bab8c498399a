use super::{descriptor, object, online_state, write, AdapterContext, DeviceAdapter, Translation};
use crate::server::intents::{commands, device_types, traits, DeviceDescriptor, DeviceState, Execution};
use crate::services::hap_types::characteristic as ch;
use crate::services::model::{value_as_bool, value_as_f64, value_as_i64};
use crate::services::Service;
use serde_json::{json, Map, Value};

const MODES: [&str; 4] = ["off", "heat", "cool", "heatcool"];

fn temperature_attributes(ctx: &AdapterContext) -> Map<String, Value> {
    object(json!({
        "availableThermostatModes": MODES,
        "thermostatTemperatureUnit": ctx.temperature_unit(),
    }))
}

fn insert_number(state: &mut DeviceState, key: &str, service: &Service, type_id: &str) {
    if let Some(value) = service.value(type_id).and_then(value_as_f64) {
        state.insert(key.to_string(), json!(value));
    }
}

fn set_range(service: &Service, execution: &Execution) -> Option<Translation> {
    let high = execution.f64_param("thermostatTemperatureSetpointHigh")?;
    let low = execution.f64_param("thermostatTemperatureSetpointLow")?;
    Some(Translation::write(vec![
        write(service, ch::COOLING_THRESHOLD_TEMPERATURE, high)?,
        write(service, ch::HEATING_THRESHOLD_TEMPERATURE, low)?,
    ]))
}

/// Thermostats driven by `TargetHeatingCoolingState` and `TargetTemperature`
pub struct Thermostat;

impl Thermostat {
    // TargetHeatingCoolingState: 0 off, 1 heat, 2 cool, 3 auto
    fn mode_name(value: i64) -> &'static str {
        MODES.get(value as usize).copied().unwrap_or("off")
    }

    fn mode_value(name: &str) -> Option<i64> {
        MODES.iter().position(|m| *m == name).map(|i| i as i64)
    }
}

impl DeviceAdapter for Thermostat {
    fn sync(&self, service: &Service, ctx: &AdapterContext) -> DeviceDescriptor {
        descriptor(
            service,
            device_types::THERMOSTAT,
            vec![traits::TEMPERATURE_SETTING],
            temperature_attributes(ctx),
        )
    }

    fn query(&self, service: &Service, _ctx: &AdapterContext) -> DeviceState {
        let mut state = online_state();
        let mode = service
            .value(ch::TARGET_HEATING_COOLING_STATE)
            .and_then(value_as_i64)
            .unwrap_or(0);
        state.insert("thermostatMode".to_string(), json!(Self::mode_name(mode)));
        insert_number(&mut state, "thermostatTemperatureAmbient", service, ch::CURRENT_TEMPERATURE);
        insert_number(&mut state, "thermostatTemperatureSetpoint", service, ch::TARGET_TEMPERATURE);

        if mode == 3 {
            insert_number(
                &mut state,
                "thermostatTemperatureSetpointHigh",
                service,
                ch::COOLING_THRESHOLD_TEMPERATURE,
            );
            insert_number(
                &mut state,
                "thermostatTemperatureSetpointLow",
                service,
                ch::HEATING_THRESHOLD_TEMPERATURE,
            );
        }
        insert_number(&mut state, "thermostatHumidityAmbient", service, ch::CURRENT_RELATIVE_HUMIDITY);
        state
    }

    fn execute(
        &self,
        service: &mut Service,
        execution: &Execution,
        _ctx: &AdapterContext,
    ) -> Option<Translation> {
        match execution.command.as_str() {
            commands::THERMOSTAT_TEMPERATURE_SETPOINT => {
                let setpoint = execution.f64_param("thermostatTemperatureSetpoint")?;
                Some(
                    Translation::write(vec![write(service, ch::TARGET_TEMPERATURE, setpoint)?])
                        .with_states(object(json!({ "thermostatTemperatureSetpoint": setpoint }))),
                )
            }
            commands::THERMOSTAT_SET_MODE => {
                let name = execution.str_param("thermostatMode")?;
                let mode = Self::mode_value(name)?;
                Some(
                    Translation::write(vec![write(service, ch::TARGET_HEATING_COOLING_STATE, mode)?])
                        .with_states(object(json!({ "thermostatMode": name }))),
                )
            }
            commands::THERMOSTAT_TEMPERATURE_SET_RANGE => set_range(service, execution),
            _ => None,
        }
    }
}

/// Heater/coolers: power via `Active`, mode via `TargetHeaterCoolerState`
/// and setpoints via the mode's threshold
pub struct HeaterCooler;

// TargetHeaterCoolerState values
const AUTO: i64 = 0;
const HEAT: i64 = 1;
const COOL: i64 = 2;

impl HeaterCooler {
    fn target_state(service: &Service) -> i64 {
        service
            .value(ch::TARGET_HEATER_COOLER_STATE)
            .and_then(value_as_i64)
            .unwrap_or(AUTO)
    }

    fn mode_name(service: &Service) -> &'static str {
        let active = service.value(ch::ACTIVE).map(value_as_bool).unwrap_or(false);
        if !active {
            return "off";
        }
        match Self::target_state(service) {
            HEAT => "heat",
            COOL => "cool",
            _ => "heatcool",
        }
    }
}

impl DeviceAdapter for HeaterCooler {
    fn sync(&self, service: &Service, ctx: &AdapterContext) -> DeviceDescriptor {
        descriptor(
            service,
            device_types::AC_UNIT,
            vec![traits::ON_OFF, traits::TEMPERATURE_SETTING],
            temperature_attributes(ctx),
        )
    }

    fn query(&self, service: &Service, _ctx: &AdapterContext) -> DeviceState {
        let mut state = online_state();
        let active = service.value(ch::ACTIVE).map(value_as_bool).unwrap_or(false);
        state.insert("on".to_string(), Value::Bool(active));
        state.insert("thermostatMode".to_string(), json!(Self::mode_name(service)));
        insert_number(&mut state, "thermostatTemperatureAmbient", service, ch::CURRENT_TEMPERATURE);

        match Self::target_state(service) {
            HEAT => insert_number(
                &mut state,
                "thermostatTemperatureSetpoint",
                service,
                ch::HEATING_THRESHOLD_TEMPERATURE,
            ),
            COOL => insert_number(
                &mut state,
                "thermostatTemperatureSetpoint",
                service,
                ch::COOLING_THRESHOLD_TEMPERATURE,
            ),
            _ => {
                insert_number(
                    &mut state,
                    "thermostatTemperatureSetpointHigh",
                    service,
                    ch::COOLING_THRESHOLD_TEMPERATURE,
                );
                insert_number(
                    &mut state,
                    "thermostatTemperatureSetpointLow",
                    service,
                    ch::HEATING_THRESHOLD_TEMPERATURE,
                );
            }
        }
        state
    }

    fn execute(
        &self,
        service: &mut Service,
        execution: &Execution,
        _ctx: &AdapterContext,
    ) -> Option<Translation> {
        match execution.command.as_str() {
            commands::ON_OFF => {
                let on = execution.bool_param("on")?;
                Some(
                    Translation::write(vec![write(service, ch::ACTIVE, i64::from(on))?])
                        .with_states(object(json!({ "on": on }))),
                )
            }
            commands::THERMOSTAT_SET_MODE => {
                let name = execution.str_param("thermostatMode")?;
                let writes = match name {
                    "off" => vec![write(service, ch::ACTIVE, 0)?],
                    "heat" | "cool" | "heatcool" => {
                        let target = match name {
                            "heat" => HEAT,
                            "cool" => COOL,
                            _ => AUTO,
                        };
                        vec![
                            write(service, ch::ACTIVE, 1)?,
                            write(service, ch::TARGET_HEATER_COOLER_STATE, target)?,
                        ]
                    }
                    _ => return None,
                };
                Some(Translation::write(writes).with_states(object(json!({ "thermostatMode": name }))))
            }
            commands::THERMOSTAT_TEMPERATURE_SETPOINT => {
                let setpoint = execution.f64_param("thermostatTemperatureSetpoint")?;
                let threshold = match Self::target_state(service) {
                    HEAT => ch::HEATING_THRESHOLD_TEMPERATURE,
                    COOL => ch::COOLING_THRESHOLD_TEMPERATURE,
                    // Auto mode takes a range, not a single setpoint
                    _ => return None,
                };
                Some(
                    Translation::write(vec![write(service, threshold, setpoint)?])
                        .with_states(object(json!({ "thermostatTemperatureSetpoint": setpoint }))),
                )
            }
            commands::THERMOSTAT_TEMPERATURE_SET_RANGE => set_range(service, execution),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::service_with;
    use crate::client::CharacteristicWrite;
    use crate::services::Category;
    use pretty_assertions::assert_eq;

    fn thermostat(mode: i64) -> Service {
        service_with(
            Category::Thermostat,
            &[
                (9, ch::TARGET_HEATING_COOLING_STATE, json!(mode)),
                (10, ch::CURRENT_TEMPERATURE, json!(20.5)),
                (11, ch::TARGET_TEMPERATURE, json!(21)),
                (12, ch::COOLING_THRESHOLD_TEMPERATURE, json!(25)),
                (13, ch::HEATING_THRESHOLD_TEMPERATURE, json!(18)),
            ],
        )
    }

    #[test]
    fn test_thermostat_query_heatcool_range() {
        let ctx = AdapterContext::default();
        let state = Thermostat.query(&thermostat(3), &ctx);
        assert_eq!(state.get("thermostatMode"), Some(&json!("heatcool")));
        assert_eq!(state.get("thermostatTemperatureAmbient"), Some(&json!(20.5)));
        assert_eq!(state.get("thermostatTemperatureSetpointHigh"), Some(&json!(25.0)));
        assert_eq!(state.get("thermostatTemperatureSetpointLow"), Some(&json!(18.0)));
        assert!(state.get("thermostatHumidityAmbient").is_none());

        let heat = Thermostat.query(&thermostat(1), &ctx);
        assert!(heat.get("thermostatTemperatureSetpointHigh").is_none());
    }

    #[test]
    fn test_thermostat_set_mode() {
        let ctx = AdapterContext::default();
        let mut service = thermostat(0);
        let translation = Thermostat
            .execute(
                &mut service,
                &Execution::new(commands::THERMOSTAT_SET_MODE, json!({"thermostatMode": "cool"})),
                &ctx,
            )
            .unwrap();
        assert_eq!(translation.payload.characteristics, vec![CharacteristicWrite::value(2, 9, 2)]);

        let unknown = Execution::new(commands::THERMOSTAT_SET_MODE, json!({"thermostatMode": "eco"}));
        assert!(Thermostat.execute(&mut service, &unknown, &ctx).is_none());
    }

    #[test]
    fn test_unit_follows_config() {
        let ctx = AdapterContext {
            force_fahrenheit: true,
            ..Default::default()
        };
        let descriptor = Thermostat.sync(&thermostat(0), &ctx);
        assert_eq!(descriptor.attributes.get("thermostatTemperatureUnit"), Some(&json!("F")));
    }

    #[test]
    fn test_heater_cooler_setpoint_follows_mode() {
        let ctx = AdapterContext::default();
        let mut service = service_with(
            Category::HeaterCooler,
            &[
                (9, ch::ACTIVE, json!(1)),
                (10, ch::TARGET_HEATER_COOLER_STATE, json!(COOL)),
                (11, ch::COOLING_THRESHOLD_TEMPERATURE, json!(24)),
                (12, ch::HEATING_THRESHOLD_TEMPERATURE, json!(19)),
            ],
        );
        let state = HeaterCooler.query(&service, &ctx);
        assert_eq!(state.get("thermostatMode"), Some(&json!("cool")));
        assert_eq!(state.get("thermostatTemperatureSetpoint"), Some(&json!(24.0)));

        let execution = Execution::new(
            commands::THERMOSTAT_TEMPERATURE_SETPOINT,
            json!({"thermostatTemperatureSetpoint": 22.5}),
        );
        let translation = HeaterCooler.execute(&mut service, &execution, &ctx).unwrap();
        assert_eq!(translation.payload.characteristics, vec![CharacteristicWrite::value(2, 11, 22.5)]);
    }

    #[test]
    fn test_heater_cooler_off_mode() {
        let ctx = AdapterContext::default();
        let mut service = service_with(
            Category::HeaterCooler,
            &[(9, ch::ACTIVE, json!(1)), (10, ch::TARGET_HEATER_COOLER_STATE, json!(HEAT))],
        );
        let translation = HeaterCooler
            .execute(
                &mut service,
                &Execution::new(commands::THERMOSTAT_SET_MODE, json!({"thermostatMode": "off"})),
                &ctx,
            )
            .unwrap();
        assert_eq!(translation.payload.characteristics, vec![CharacteristicWrite::value(2, 9, 0)]);
    }
}
