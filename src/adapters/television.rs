//! Televisions, merged from television, speaker and input source services
//!
//! Input sources are split at discovery into channels (configured name
//! starting with [`STATION_PREFIX`]) and inputs. Channel and input navigation
//! writes `ActiveIdentifier`; the anchors that make relative navigation
//! deterministic live in the service's [`TelevisionExtras`] and are updated by
//! every navigation command, whatever the device reports afterwards.

use super::{descriptor, object, online_state, write, AdapterContext, DeviceAdapter, Translation};
use crate::server::intents::{commands, device_types, traits, DeviceDescriptor, DeviceState, Execution};
use crate::services::hap_types::characteristic as ch;
use crate::services::model::{value_as_bool, value_as_i64};
use crate::services::{InputEntry, Service, TelevisionExtras};
use serde_json::{json, Value};

/// Configured-name prefix that marks an input source as a channel
pub const STATION_PREFIX: &str = "Station - ";

/// Pseudo input standing for "watching channels"
pub const TV_INPUT: &str = "_tv";

const VOLUME_MAX_LEVEL: i64 = 20;
// Reported volume; the volume selector is relative only
const NOMINAL_VOLUME: i64 = 10;

// RemoteKey values
const KEY_NEXT: i64 = 7;
const KEY_PREVIOUS: i64 = 6;
const KEY_SELECT: i64 = 8;
const KEY_BACK: i64 = 9;
const KEY_PLAY_PAUSE: i64 = 11;

// VolumeSelector values
const VOLUME_INCREMENT: i64 = 0;
const VOLUME_DECREMENT: i64 = 1;

/// Append the speaker's mute and volume characteristics to the television
pub fn absorb_speaker(television: &mut Service, speaker: &Service) {
    for type_id in [ch::MUTE, ch::VOLUME_SELECTOR] {
        if television.has(type_id) {
            continue;
        }
        if let Some(characteristic) = speaker.characteristic(type_id) {
            television.characteristics.push(characteristic.clone());
        }
    }
}

/// Partition input sources into channels and inputs.
///
/// Returns `None` without any input source; entries keep discovery order.
pub fn classify_inputs(entries: Vec<InputEntry>) -> Option<TelevisionExtras> {
    if entries.is_empty() {
        return None;
    }

    let mut extras = TelevisionExtras::default();
    for mut entry in entries {
        match entry.configured_name.strip_prefix(STATION_PREFIX) {
            Some(station) => {
                entry.configured_name = station.to_string();
                extras.channels.push(entry);
            }
            None => extras.inputs.push(entry),
        }
    }
    Some(extras)
}

/// Position reached by `steps` from `anchor` in a list of `len` entries.
///
/// Without an anchor, forward steps start just before the first entry and
/// backward steps just after the last.
fn step(anchor: Option<usize>, steps: i64, len: usize) -> usize {
    let len = len as i64;
    let start = match anchor {
        Some(index) => index as i64,
        None if steps >= 0 => -1,
        None => len,
    };
    (start + steps).rem_euclid(len) as usize
}

fn parse_number(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        other => value_as_i64(other),
    }
}

pub struct Television;

impl Television {
    fn channels_attribute(extras: &TelevisionExtras, ctx: &AdapterContext) -> Value {
        let channels: Vec<Value> = extras
            .channels
            .iter()
            .map(|channel| {
                let mut names = vec![channel.configured_name.clone()];
                if let Some(alias) = ctx
                    .channel_aliases
                    .iter()
                    .find(|a| a.channel == channel.configured_name)
                {
                    names.extend(alias.alias.iter().cloned());
                }
                json!({
                    "key": channel.name,
                    "names": names,
                    "number": (channel.identifier + 1).to_string(),
                })
            })
            .collect();
        Value::Array(channels)
    }

    fn inputs_attribute(extras: &TelevisionExtras) -> Value {
        let input = |key: &str, synonym: &str| {
            json!({
                "key": key,
                "names": [{ "lang": "en", "name_synonym": [synonym] }]
            })
        };
        let mut inputs = vec![input(TV_INPUT, TV_INPUT)];
        inputs.extend(
            extras
                .inputs
                .iter()
                .map(|entry| input(&entry.name, &entry.configured_name)),
        );
        Value::Array(inputs)
    }

    fn extras(service: &Service) -> Option<&TelevisionExtras> {
        service.extras.as_ref()
    }

    fn select_channel_write(service: &mut Service, identifier: i64) -> Option<Translation> {
        let payload = write(service, ch::ACTIVE_IDENTIFIER, identifier)?;
        service.extras.as_mut()?.last_channel = Some(identifier);
        Some(Translation::write(vec![payload]))
    }

    fn select_input_write(service: &mut Service, index: usize) -> Option<Translation> {
        let entry = Self::extras(service)?.inputs.get(index)?.clone();
        let payload = write(service, ch::ACTIVE_IDENTIFIER, entry.identifier)?;
        service.extras.as_mut()?.last_input = Some(entry.identifier);
        Some(
            Translation::write(vec![payload])
                .with_states(object(json!({ "currentInput": entry.name }))),
        )
    }

    fn find_channel(service: &Service, execution: &Execution, ctx: &AdapterContext) -> Option<i64> {
        let extras = Self::extras(service)?;

        if let Some(code) = execution.str_param("channelCode") {
            return extras
                .channels
                .iter()
                .find(|c| c.name == code)
                .map(|c| c.identifier);
        }

        if let Some(number) = execution.param("channelNumber").and_then(parse_number) {
            let identifier = number - 1;
            return extras.channel_index(identifier).map(|_| identifier);
        }

        let name = execution.str_param("channelName")?;
        extras
            .channels
            .iter()
            .find(|channel| {
                channel.configured_name.eq_ignore_ascii_case(name)
                    || ctx.channel_aliases.iter().any(|a| {
                        a.channel == channel.configured_name
                            && a.alias.iter().any(|alias| alias.eq_ignore_ascii_case(name))
                    })
            })
            .map(|c| c.identifier)
    }

    fn relative_channel(service: &mut Service, steps: i64) -> Option<Translation> {
        let extras = Self::extras(service)?;
        if extras.channels.is_empty() {
            return None;
        }
        let anchor = extras.last_channel.and_then(|id| extras.channel_index(id));
        let index = if steps == 0 {
            anchor.unwrap_or(0)
        } else {
            step(anchor, steps, extras.channels.len())
        };
        let identifier = extras.channels[index].identifier;
        Self::select_channel_write(service, identifier)
    }

    fn return_channel(service: &mut Service) -> Option<Translation> {
        let extras = Self::extras(service)?;
        let identifier = extras
            .last_channel
            .filter(|id| extras.channel_index(*id).is_some())
            .or_else(|| extras.channels.first().map(|c| c.identifier))?;
        Self::select_channel_write(service, identifier)
    }

    fn cycle_input(service: &mut Service, steps: i64) -> Option<Translation> {
        let extras = Self::extras(service)?;
        if extras.inputs.is_empty() {
            return None;
        }
        // The cached ActiveIdentifier is not updated by our own writes, so it
        // only seeds the first step
        let anchor = extras
            .last_input
            .and_then(|id| extras.input_index(id))
            .or_else(|| {
                service
                    .value(ch::ACTIVE_IDENTIFIER)
                    .and_then(value_as_i64)
                    .and_then(|id| extras.input_index(id))
            });
        let index = step(anchor, steps, extras.inputs.len());
        Self::select_input_write(service, index)
    }

    fn set_input(service: &mut Service, input: &str) -> Option<Translation> {
        if input == TV_INPUT {
            return Self::return_channel(service)
                .map(|t| t.with_states(object(json!({ "currentInput": TV_INPUT }))));
        }
        let index = Self::extras(service)?
            .inputs
            .iter()
            .position(|entry| entry.name == input)?;
        Self::select_input_write(service, index)
    }

    fn remote_key(service: &Service, key: i64) -> Option<Translation> {
        Some(Translation::write(vec![write(service, ch::REMOTE_KEY, key)?]))
    }
}

impl DeviceAdapter for Television {
    fn sync(&self, service: &Service, ctx: &AdapterContext) -> DeviceDescriptor {
        let mut device_traits = vec![
            traits::ON_OFF,
            traits::MEDIA_STATE,
            traits::APP_SELECTOR,
            traits::TRANSPORT_CONTROL,
        ];
        let mut attributes = object(json!({
            "commandOnlyOnOff": false,
            "queryOnlyOnOff": false,
            "supportActivityState": false,
            "supportPlaybackState": false,
            "availableApplications": [],
        }));

        let transport: Vec<&str> = if service.has(ch::REMOTE_KEY) {
            vec!["STOP", "RESUME", "PAUSE", "NEXT", "PREVIOUS"]
        } else {
            Vec::new()
        };
        attributes.insert("transportControlSupportedCommands".to_string(), json!(transport));

        if service.has(ch::VOLUME_SELECTOR) {
            device_traits.push(traits::VOLUME);
            attributes.insert("volumeCanMuteAndUnmute".to_string(), json!(service.has(ch::MUTE)));
            attributes.insert("volumeMaxLevel".to_string(), json!(VOLUME_MAX_LEVEL));
            attributes.insert("commandOnlyVolume".to_string(), json!(true));
        }

        if let Some(extras) = Self::extras(service) {
            if !extras.channels.is_empty() {
                device_traits.push(traits::CHANNEL);
                attributes.insert("commandOnlyChannels".to_string(), json!(true));
                attributes.insert(
                    "availableChannels".to_string(),
                    Self::channels_attribute(extras, ctx),
                );
            }
            if !extras.inputs.is_empty() {
                device_traits.push(traits::INPUT_SELECTOR);
                attributes.insert("commandOnlyInputSelector".to_string(), json!(false));
                attributes.insert("orderedInputs".to_string(), json!(true));
                attributes.insert("availableInputs".to_string(), Self::inputs_attribute(extras));
            }
        }

        descriptor(service, device_types::TV, device_traits, attributes)
    }

    fn query(&self, service: &Service, _ctx: &AdapterContext) -> DeviceState {
        let mut state = online_state();
        let on = service.value(ch::ACTIVE).map(value_as_bool).unwrap_or(false);
        state.insert("on".to_string(), Value::Bool(on));

        if service.has(ch::VOLUME_SELECTOR) {
            state.insert("currentVolume".to_string(), json!(NOMINAL_VOLUME));
        }
        if let Some(muted) = service.value(ch::MUTE) {
            state.insert("isMuted".to_string(), Value::Bool(value_as_bool(muted)));
        }
        if let Some(active) = service.value(ch::ACTIVE_IDENTIFIER) {
            let current = value_as_i64(active)
                .and_then(|id| {
                    let extras = Self::extras(service)?;
                    extras.input_index(id).map(|i| extras.inputs[i].name.clone())
                })
                .unwrap_or_else(|| TV_INPUT.to_string());
            state.insert("currentInput".to_string(), Value::String(current));
        }
        state
    }

    fn execute(
        &self,
        service: &mut Service,
        execution: &Execution,
        ctx: &AdapterContext,
    ) -> Option<Translation> {
        match execution.command.as_str() {
            commands::ON_OFF => {
                let on = execution.bool_param("on")?;
                Some(
                    Translation::write(vec![write(service, ch::ACTIVE, i64::from(on))?])
                        .with_states(object(json!({ "on": on }))),
                )
            }
            commands::MUTE => {
                let mute = execution.bool_param("mute")?;
                Some(
                    Translation::write(vec![write(service, ch::MUTE, i64::from(mute))?])
                        .with_states(object(json!({ "isMuted": mute }))),
                )
            }
            commands::VOLUME_RELATIVE => {
                let steps = execution.i64_param("relativeSteps")?;
                let direction = if steps < 0 { VOLUME_DECREMENT } else { VOLUME_INCREMENT };
                Some(Translation::write(vec![write(service, ch::VOLUME_SELECTOR, direction)?]))
            }
            // No absolute volume characteristic to write
            commands::SET_VOLUME => None,
            commands::SELECT_CHANNEL => {
                let identifier = Self::find_channel(service, execution, ctx)?;
                Self::select_channel_write(service, identifier)
            }
            commands::RELATIVE_CHANNEL => {
                let steps = execution.i64_param("relativeChannelChange")?;
                Self::relative_channel(service, steps)
            }
            commands::RETURN_CHANNEL | commands::RETURN_CHANNEL_SHORT => Self::return_channel(service),
            commands::SET_INPUT => {
                let input = execution.str_param("newInput")?.to_string();
                Self::set_input(service, &input)
            }
            commands::NEXT_INPUT => Self::cycle_input(service, 1),
            commands::PREVIOUS_INPUT => Self::cycle_input(service, -1),
            commands::MEDIA_STOP => Self::remote_key(service, KEY_BACK),
            commands::MEDIA_RESUME => Self::remote_key(service, KEY_SELECT),
            commands::MEDIA_PAUSE => Self::remote_key(service, KEY_PLAY_PAUSE),
            commands::MEDIA_NEXT => Self::remote_key(service, KEY_NEXT),
            commands::MEDIA_PREVIOUS => Self::remote_key(service, KEY_PREVIOUS),
            _ => None,
        }
    }
}

/// The `ActiveIdentifier` value a translation writes, if any
pub fn written_identifier(service: &Service, translation: &Translation) -> Option<i64> {
    let iid = service.characteristic(ch::ACTIVE_IDENTIFIER)?.iid;
    translation
        .payload
        .characteristics
        .iter()
        .find(|w| w.iid == iid)
        .and_then(|w| w.value.as_ref())
        .and_then(value_as_i64)
}
