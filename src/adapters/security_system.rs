use super::{descriptor, object, online_state, write, AdapterContext, DeviceAdapter, Translation};
use crate::server::intents::{commands, device_types, traits, DeviceDescriptor, DeviceState, Execution};
use crate::services::hap_types::characteristic as ch;
use crate::services::model::value_as_i64;
use crate::services::Service;
use serde_json::{json, Value};

// SecuritySystemCurrentState / SecuritySystemTargetState values
const STAY_ARM: i64 = 0;
const AWAY_ARM: i64 = 1;
const NIGHT_ARM: i64 = 2;
const DISARMED: i64 = 3;
const TRIGGERED: i64 = 4;

fn level_name(state: i64) -> Option<&'static str> {
    match state {
        STAY_ARM => Some("home"),
        AWAY_ARM => Some("away"),
        NIGHT_ARM => Some("night"),
        _ => None,
    }
}

fn level_value(name: &str) -> Option<i64> {
    match name {
        "home" => Some(STAY_ARM),
        "away" => Some(AWAY_ARM),
        "night" => Some(NIGHT_ARM),
        _ => None,
    }
}

fn level(key: &str, synonym: &str) -> Value {
    json!({
        "level_name": key,
        "level_values": [{ "level_synonym": [key, synonym], "lang": "en" }]
    })
}

pub struct SecuritySystem;

impl DeviceAdapter for SecuritySystem {
    fn sync(&self, service: &Service, _ctx: &AdapterContext) -> DeviceDescriptor {
        descriptor(
            service,
            device_types::SECURITY_SYSTEM,
            vec![traits::ARM_DISARM],
            object(json!({
                "availableArmLevels": {
                    "levels": [
                        level("home", "stay"),
                        level("away", "away mode"),
                        level("night", "night mode"),
                    ],
                    "ordered": true
                }
            })),
        )
    }

    fn query(&self, service: &Service, _ctx: &AdapterContext) -> DeviceState {
        let mut state = online_state();
        let current = service
            .value(ch::SECURITY_SYSTEM_CURRENT_STATE)
            .and_then(value_as_i64)
            .unwrap_or(DISARMED);
        state.insert("isArmed".to_string(), Value::Bool(current != DISARMED));
        if let Some(name) = level_name(current) {
            state.insert("currentArmLevel".to_string(), json!(name));
        }
        if current == TRIGGERED {
            state.insert("exitAllowance".to_string(), json!(0));
        }
        state
    }

    fn execute(
        &self,
        service: &mut Service,
        execution: &Execution,
        _ctx: &AdapterContext,
    ) -> Option<Translation> {
        if execution.command != commands::ARM_DISARM {
            return None;
        }

        let arm = execution.bool_param("arm")?;
        let target = if arm {
            match execution.str_param("armLevel") {
                Some(name) => level_value(name)?,
                None => AWAY_ARM,
            }
        } else {
            DISARMED
        };

        let mut states = object(json!({ "isArmed": arm }));
        if let Some(name) = level_name(target) {
            states.insert("currentArmLevel".to_string(), json!(name));
        }
        Some(
            Translation::write(vec![write(service, ch::SECURITY_SYSTEM_TARGET_STATE, target)?])
                .with_states(states),
        )
    }
}
