use super::{descriptor, online_state, write, AdapterContext, DeviceAdapter, Translation};
use crate::server::intents::{commands, device_types, traits, DeviceDescriptor, DeviceState, Execution};
use crate::services::hap_types::characteristic as ch;
use crate::services::model::value_as_bool;
use crate::services::Service;
use serde_json::{json, Map, Value};

/// Switches and outlets: a single `On` characteristic
pub struct Switch {
    device_type: &'static str,
}

impl Switch {
    pub const fn switch() -> Self {
        Self {
            device_type: device_types::SWITCH,
        }
    }

    pub const fn outlet() -> Self {
        Self {
            device_type: device_types::OUTLET,
        }
    }
}

impl DeviceAdapter for Switch {
    fn sync(&self, service: &Service, _ctx: &AdapterContext) -> DeviceDescriptor {
        descriptor(service, self.device_type, vec![traits::ON_OFF], Map::new())
    }

    fn query(&self, service: &Service, _ctx: &AdapterContext) -> DeviceState {
        let mut state = online_state();
        let on = service.value(ch::ON).map(value_as_bool).unwrap_or(false);
        state.insert("on".to_string(), Value::Bool(on));
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
                let write = write(service, ch::ON, on)?;
                Some(Translation::write(vec![write]).with_states(super::object(json!({ "on": on }))))
            }
            _ => None,
        }
    }
}
