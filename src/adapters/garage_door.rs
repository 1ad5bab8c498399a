use super::{descriptor, object, online_state, write, AdapterContext, DeviceAdapter, Translation};
use crate::server::intents::{commands, device_types, traits, DeviceDescriptor, DeviceState, Execution};
use crate::services::hap_types::characteristic as ch;
use crate::services::model::value_as_i64;
use crate::services::Service;
use serde_json::json;

// CurrentDoorState / TargetDoorState values
const OPEN: i64 = 0;
const CLOSED: i64 = 1;
const CLOSING: i64 = 3;

pub struct GarageDoorOpener;

impl DeviceAdapter for GarageDoorOpener {
    fn sync(&self, service: &Service, _ctx: &AdapterContext) -> DeviceDescriptor {
        descriptor(
            service,
            device_types::GARAGE,
            vec![traits::OPEN_CLOSE],
            object(json!({
                "discreteOnlyOpenClose": true,
                "queryOnlyOpenClose": false
            })),
        )
    }

    fn query(&self, service: &Service, _ctx: &AdapterContext) -> DeviceState {
        let mut state = online_state();
        let current = service
            .value(ch::CURRENT_DOOR_STATE)
            .and_then(value_as_i64)
            .unwrap_or(CLOSED);
        // Opening (2) and stopped (4) count as open
        let open_percent = if current == CLOSED || current == CLOSING { 0 } else { 100 };
        state.insert("openPercent".to_string(), json!(open_percent));
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
                let open_percent = execution.i64_param("openPercent")?;
                let target = if open_percent > 0 { OPEN } else { CLOSED };
                let reported = if target == OPEN { 100 } else { 0 };
                Some(
                    Translation::write(vec![write(service, ch::TARGET_DOOR_STATE, target)?])
                        .with_states(object(json!({ "openPercent": reported }))),
                )
            }
            _ => None,
        }
    }
}
