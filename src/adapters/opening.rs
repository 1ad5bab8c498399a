use super::{descriptor, object, online_state, write, AdapterContext, DeviceAdapter, Translation};
use crate::server::intents::{commands, device_types, traits, DeviceDescriptor, DeviceState, Execution};
use crate::services::hap_types::characteristic as ch;
use crate::services::model::value_as_f64;
use crate::services::Service;
use serde_json::{json, Map};

/// Positional openings: doors, windows and window coverings
pub struct Opening {
    device_type: &'static str,
}

impl Opening {
    pub const fn door() -> Self {
        Self {
            device_type: device_types::DOOR,
        }
    }

    pub const fn window() -> Self {
        Self {
            device_type: device_types::WINDOW,
        }
    }

    pub const fn window_covering() -> Self {
        Self {
            device_type: device_types::BLINDS,
        }
    }
}

impl DeviceAdapter for Opening {
    fn sync(&self, service: &Service, _ctx: &AdapterContext) -> DeviceDescriptor {
        descriptor(service, self.device_type, vec![traits::OPEN_CLOSE], Map::new())
    }

    fn query(&self, service: &Service, _ctx: &AdapterContext) -> DeviceState {
        let mut state = online_state();
        let position = service
            .value(ch::CURRENT_POSITION)
            .and_then(value_as_f64)
            .unwrap_or(0.0);
        state.insert("openPercent".to_string(), json!(position.round() as i64));
        state
    }

    fn execute(
        &self,
        service: &mut Service,
        execution: &Execution,
        _ctx: &AdapterContext,
    ) -> Option<Translation> {
        match execution.command.as_str() {
            commands::OPEN_CLOSE => {
                let open_percent = execution.i64_param("openPercent")?.clamp(0, 100);
                Some(
                    Translation::write(vec![write(service, ch::TARGET_POSITION, open_percent)?])
                        .with_states(object(json!({ "openPercent": open_percent }))),
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
    fn test_position_mapping() {
        let ctx = AdapterContext::default();
        let adapter = Opening::window_covering();
        let mut service = service_with(
            Category::WindowCovering,
            &[(9, ch::CURRENT_POSITION, json!(35)), (10, ch::TARGET_POSITION, json!(35))],
        );
        assert_eq!(adapter.sync(&service, &ctx).device_type, device_types::BLINDS);
        assert_eq!(adapter.query(&service, &ctx).get("openPercent"), Some(&json!(35)));

        let translation = adapter
            .execute(
                &mut service,
                &Execution::new(commands::OPEN_CLOSE, json!({"openPercent": 80})),
                &ctx,
            )
            .unwrap();
        assert_eq!(translation.payload.characteristics, vec![CharacteristicWrite::value(2, 10, 80)]);
    }
}
