use super::{descriptor, object, online_state, write, AdapterContext, DeviceAdapter, Translation};
use crate::server::intents::{commands, device_types, traits, DeviceDescriptor, DeviceState, Execution};
use crate::services::hap_types::characteristic as ch;
use crate::services::model::{value_as_bool, value_as_f64};
use crate::services::Service;
use serde_json::{json, Map, Value};

pub struct Lightbulb;

impl Lightbulb {
    fn has_color(service: &Service) -> bool {
        service.has(ch::HUE) && service.has(ch::SATURATION)
    }
}

impl DeviceAdapter for Lightbulb {
    fn sync(&self, service: &Service, _ctx: &AdapterContext) -> DeviceDescriptor {
        let mut device_traits = vec![traits::ON_OFF];
        let mut attributes = Map::new();

        if service.has(ch::BRIGHTNESS) {
            device_traits.push(traits::BRIGHTNESS);
        }
        if Self::has_color(service) {
            device_traits.push(traits::COLOR_SETTING);
            attributes.insert("colorModel".to_string(), json!("hsv"));
        }

        descriptor(service, device_types::LIGHT, device_traits, attributes)
    }

    fn query(&self, service: &Service, _ctx: &AdapterContext) -> DeviceState {
        let mut state = online_state();
        let on = service.value(ch::ON).map(value_as_bool).unwrap_or(false);
        state.insert("on".to_string(), Value::Bool(on));

        if let Some(brightness) = service.value(ch::BRIGHTNESS).and_then(value_as_f64) {
            state.insert("brightness".to_string(), json!(brightness.round() as i64));
        }

        if Self::has_color(service) {
            let hue = service.value(ch::HUE).and_then(value_as_f64).unwrap_or(0.0);
            let saturation = service.value(ch::SATURATION).and_then(value_as_f64).unwrap_or(0.0);
            state.insert(
                "color".to_string(),
                json!({
                    "spectrumHsv": {
                        "hue": hue,
                        "saturation": saturation / 100.0,
                        "value": 1
                    }
                }),
            );
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
                    Translation::write(vec![write(service, ch::ON, on)?])
                        .with_states(object(json!({ "on": on }))),
                )
            }
            commands::BRIGHTNESS_ABSOLUTE => {
                let brightness = execution.i64_param("brightness")?;
                Some(
                    Translation::write(vec![write(service, ch::BRIGHTNESS, brightness)?])
                        .with_states(object(json!({ "brightness": brightness }))),
                )
            }
            commands::COLOR_ABSOLUTE => {
                let hsv = execution.param("color")?.get("spectrumHSV")?;
                let hue = hsv.get("hue")?.as_f64()?;
                let saturation = hsv.get("saturation")?.as_f64()? * 100.0;
                Some(Translation::write(vec![
                    write(service, ch::HUE, hue)?,
                    write(service, ch::SATURATION, saturation)?,
                ]))
            }
            _ => None,
        }
    }
}
