use super::{descriptor, object, online_state, write, AdapterContext, DeviceAdapter, Translation};
use crate::server::intents::{commands, device_types, traits, DeviceDescriptor, DeviceState, Execution};
use crate::services::hap_types::characteristic as ch;
use crate::services::model::value_as_i64;
use crate::services::Service;
use serde_json::{json, Map, Value};

// LockCurrentState values
const UNSECURED: i64 = 0;
const SECURED: i64 = 1;
const JAMMED: i64 = 2;

pub struct LockMechanism;

impl DeviceAdapter for LockMechanism {
    fn sync(&self, service: &Service, _ctx: &AdapterContext) -> DeviceDescriptor {
        descriptor(service, device_types::LOCK, vec![traits::LOCK_UNLOCK], Map::new())
    }

    fn query(&self, service: &Service, _ctx: &AdapterContext) -> DeviceState {
        let mut state = online_state();
        let current = service
            .value(ch::LOCK_CURRENT_STATE)
            .and_then(value_as_i64)
            .unwrap_or(UNSECURED);
        state.insert("isLocked".to_string(), Value::Bool(current == SECURED));
        state.insert("isJammed".to_string(), Value::Bool(current == JAMMED));
        state
    }

    fn execute(
        &self,
        service: &mut Service,
        execution: &Execution,
        _ctx: &AdapterContext,
    ) -> Option<Translation> {
        match execution.command.as_str() {
            commands::LOCK_UNLOCK => {
                let lock = execution.bool_param("lock")?;
                let target = if lock { SECURED } else { UNSECURED };
                Some(
                    Translation::write(vec![write(service, ch::LOCK_TARGET_STATE, target)?])
                        .with_states(object(json!({ "isLocked": lock }))),
                )
            }
            _ => None,
        }
    }
}
