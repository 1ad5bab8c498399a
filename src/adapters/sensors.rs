//! Read-only sensors. None of them accept commands.

use super::{descriptor, object, online_state, AdapterContext, DeviceAdapter, Translation};
use crate::server::intents::{device_types, traits, DeviceDescriptor, DeviceState, Execution};
use crate::services::hap_types::characteristic as ch;
use crate::services::model::{value_as_bool, value_as_f64};
use crate::services::Service;
use serde_json::{json, Map, Value};

fn humidity(service: &Service) -> Option<i64> {
    service
        .value(ch::CURRENT_RELATIVE_HUMIDITY)
        .and_then(value_as_f64)
        .map(|h| h.round() as i64)
}

pub struct TemperatureSensor;

impl DeviceAdapter for TemperatureSensor {
    fn sync(&self, service: &Service, ctx: &AdapterContext) -> DeviceDescriptor {
        let mut device_traits = vec![traits::TEMPERATURE_CONTROL];
        let mut attributes = object(json!({
            "queryOnlyTemperatureControl": true,
            "temperatureUnitForUX": ctx.temperature_unit(),
        }));

        if service.has(ch::CURRENT_RELATIVE_HUMIDITY) {
            device_traits.push(traits::HUMIDITY_SETTING);
            attributes.insert("queryOnlyHumiditySetting".to_string(), json!(true));
        }

        descriptor(service, device_types::SENSOR, device_traits, attributes)
    }

    fn query(&self, service: &Service, _ctx: &AdapterContext) -> DeviceState {
        let mut state = online_state();
        if let Some(temperature) = service.value(ch::CURRENT_TEMPERATURE).and_then(value_as_f64) {
            state.insert("temperatureSetpointCelsius".to_string(), json!(temperature));
            state.insert("temperatureAmbientCelsius".to_string(), json!(temperature));
        }
        if let Some(humidity) = humidity(service) {
            state.insert("humidityAmbientPercent".to_string(), json!(humidity));
        }
        state
    }

    fn execute(&self, _: &mut Service, _: &Execution, _: &AdapterContext) -> Option<Translation> {
        None
    }
}

pub struct HumiditySensor;

impl DeviceAdapter for HumiditySensor {
    fn sync(&self, service: &Service, _ctx: &AdapterContext) -> DeviceDescriptor {
        descriptor(
            service,
            device_types::SENSOR,
            vec![traits::HUMIDITY_SETTING],
            object(json!({ "queryOnlyHumiditySetting": true })),
        )
    }

    fn query(&self, service: &Service, _ctx: &AdapterContext) -> DeviceState {
        let mut state = online_state();
        if let Some(humidity) = humidity(service) {
            state.insert("humidityAmbientPercent".to_string(), json!(humidity));
        }
        state
    }

    fn execute(&self, _: &mut Service, _: &Execution, _: &AdapterContext) -> Option<Translation> {
        None
    }
}

pub struct OccupancySensor;

impl DeviceAdapter for OccupancySensor {
    fn sync(&self, service: &Service, _ctx: &AdapterContext) -> DeviceDescriptor {
        let mut attributes = Map::new();
        attributes.insert(
            "occupancySensorConfiguration".to_string(),
            json!([{ "occupancySensorType": "PIR" }]),
        );
        descriptor(service, device_types::SENSOR, vec![traits::OCCUPANCY_SENSING], attributes)
    }

    fn query(&self, service: &Service, _ctx: &AdapterContext) -> DeviceState {
        let mut state = online_state();
        let occupied = service
            .value(ch::OCCUPANCY_DETECTED)
            .map(value_as_bool)
            .unwrap_or(false);
        let occupancy = if occupied { "OCCUPIED" } else { "UNOCCUPIED" };
        state.insert("occupancy".to_string(), Value::String(occupancy.to_string()));
        state
    }

    fn execute(&self, _: &mut Service, _: &Execution, _: &AdapterContext) -> Option<Translation> {
        None
    }
}
