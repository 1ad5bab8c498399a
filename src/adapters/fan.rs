use super::{descriptor, object, online_state, write, AdapterContext, DeviceAdapter, Translation};
use crate::server::intents::{commands, device_types, traits, DeviceDescriptor, DeviceState, Execution};
use crate::services::hap_types::characteristic as ch;
use crate::services::model::{value_as_bool, value_as_f64};
use crate::services::Service;
use serde_json::{json, Map, Value};

/// Fans of both generations: `On` (v1) or `Active` (v2) plus optional
/// `RotationSpeed`
pub struct Fan;

impl Fan {
    fn power_type(service: &Service) -> Option<&'static str> {
        if service.has(ch::ACTIVE) {
            Some(ch::ACTIVE)
        } else if service.has(ch::ON) {
            Some(ch::ON)
        } else {
            None
        }
    }
}

impl DeviceAdapter for Fan {
    fn sync(&self, service: &Service, _ctx: &AdapterContext) -> DeviceDescriptor {
        let mut device_traits = vec![traits::ON_OFF];
        let mut attributes = Map::new();

        if service.has(ch::ROTATION_SPEED) {
            device_traits.push(traits::FAN_SPEED);
            attributes.insert("supportsFanSpeedPercent".to_string(), json!(true));
            attributes.insert("reversible".to_string(), json!(false));
        }

        descriptor(service, device_types::FAN, device_traits, attributes)
    }

    fn query(&self, service: &Service, _ctx: &AdapterContext) -> DeviceState {
        let mut state = online_state();
        let on = Self::power_type(service)
            .and_then(|t| service.value(t))
            .map(value_as_bool)
            .unwrap_or(false);
        state.insert("on".to_string(), Value::Bool(on));

        if let Some(speed) = service.value(ch::ROTATION_SPEED).and_then(value_as_f64) {
            state.insert("currentFanSpeedPercent".to_string(), json!(speed.round() as i64));
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
                let power = Self::power_type(service)?;
                let value: Value = if power == ch::ACTIVE {
                    json!(i64::from(on))
                } else {
                    json!(on)
                };
                Some(
                    Translation::write(vec![write(service, power, value)?])
                        .with_states(object(json!({ "on": on }))),
                )
            }
            commands::SET_FAN_SPEED => {
                let speed = execution.i64_param("fanSpeedPercent")?;
                Some(
                    Translation::write(vec![write(service, ch::ROTATION_SPEED, speed)?])
                        .with_states(object(json!({ "currentFanSpeedPercent": speed }))),
                )
            }
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

    #[test]
    fn test_fan_v2_uses_active() {
        let ctx = AdapterContext::default();
        let mut service = service_with(
            Category::Fanv2,
            &[(9, ch::ACTIVE, json!(0)), (10, ch::ROTATION_SPEED, json!(30))],
        );

        let translation = Fan
            .execute(&mut service, &Execution::new(commands::ON_OFF, json!({"on": true})), &ctx)
            .unwrap();
        assert_eq!(translation.payload.characteristics, vec![CharacteristicWrite::value(2, 9, 1)]);

        let state = Fan.query(&service, &ctx);
        assert_eq!(state.get("on"), Some(&json!(false)));
        assert_eq!(state.get("currentFanSpeedPercent"), Some(&json!(30)));
    }

    #[test]
    fn test_fan_speed_requires_rotation_speed() {
        let ctx = AdapterContext::default();
        let mut service = service_with(Category::Fan, &[(9, ch::ON, json!(true))]);
        assert!(!Fan.sync(&service, &ctx).has_trait(traits::FAN_SPEED));

        let execution = Execution::new(commands::SET_FAN_SPEED, json!({"fanSpeedPercent": 50}));
        assert!(Fan.execute(&mut service, &execution, &ctx).is_none());
    }
}
