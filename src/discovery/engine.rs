//! Discovery passes: locate instances, parse their accessory trees into
//! services and merge the result into the index.

use super::filters::{InstanceBlacklist, ServiceFilter};
use crate::adapters::television::{absorb_speaker, classify_inputs};
use crate::client::{
    AccessoryList, HapClient, HapInstance, RawAccessory, RawCharacteristic, RawService,
    WriteRequest,
};
use crate::error::{BridgeError, Result};
use crate::security::TwoFactorPolicy;
use crate::services::hap_types::{self, characteristic as ch, service as service_types};
use crate::services::model::value_as_i64;
use crate::services::{
    unique_id, AccessoryInformation, Category, Characteristic, InputEntry, InstanceRef,
    Permissions, Service, ServiceIndex, Upsert,
};
use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Outcome of one discovery pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryReport {
    /// Unique ids indexed for the first time
    pub found: Vec<String>,
    /// Services overwritten with a fresh sighting
    pub updated: usize,
    /// Unique ids missing from this pass but still indexed
    pub lost: Vec<String>,
    /// Unique ids evicted in this pass
    pub removed: Vec<String>,
    /// Instance identities blacklisted in this pass
    pub blacklisted: Vec<String>,
}

impl DiscoveryReport {
    pub fn changed(&self) -> bool {
        !self.found.is_empty() || !self.removed.is_empty()
    }
}

/// Television-family services of one accessory, merged after the accessory
/// is parsed
#[derive(Default)]
struct TelevisionParts {
    televisions: Vec<Service>,
    speakers: Vec<Service>,
    inputs: Vec<Service>,
}

impl TelevisionParts {
    fn push(&mut self, service: Service) {
        match service.category {
            Category::Television => self.televisions.push(service),
            Category::Speaker => self.speakers.push(service),
            _ => self.inputs.push(service),
        }
    }

    /// Fold speaker and input sources into the first television
    fn merge(self) -> Option<Service> {
        let mut television = self.televisions.into_iter().next()?;
        if let Some(speaker) = self.speakers.first() {
            absorb_speaker(&mut television, speaker);
        }
        let entries = self
            .inputs
            .iter()
            .enumerate()
            .map(|(ordinal, input)| input_entry(input, ordinal as i64))
            .collect();
        television.extras = classify_inputs(entries);
        Some(television)
    }
}

fn value_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn input_entry(input: &Service, ordinal: i64) -> InputEntry {
    let name = input
        .value(ch::NAME)
        .and_then(value_string)
        .unwrap_or_else(|| input.service_name.clone());
    let configured_name = input
        .value(ch::CONFIGURED_NAME)
        .and_then(value_string)
        .unwrap_or_else(|| name.clone());
    InputEntry {
        name,
        configured_name,
        identifier: input
            .value(ch::IDENTIFIER)
            .and_then(value_as_i64)
            .unwrap_or(ordinal),
        input_source_type: input.value(ch::INPUT_SOURCE_TYPE).and_then(value_as_i64),
    }
}

fn characteristic(raw: &RawCharacteristic) -> Characteristic {
    Characteristic {
        iid: raw.iid,
        type_id: hap_types::to_long_form(&raw.type_id),
        value: raw.value.clone(),
        perms: Permissions::from_hap(raw.perms.as_slice()),
        description: raw.description.clone(),
    }
}

fn accessory_information(accessory: &RawAccessory) -> AccessoryInformation {
    let mut info = AccessoryInformation::default();
    let Some(raw) = accessory
        .services
        .iter()
        .find(|s| hap_types::to_long_form(&s.type_id) == service_types::ACCESSORY_INFORMATION)
    else {
        return info;
    };

    for c in &raw.characteristics {
        let Some(value) = value_string(&c.value) else {
            continue;
        };
        let slot = match hap_types::to_long_form(&c.type_id).as_str() {
            ch::NAME => &mut info.name,
            ch::MANUFACTURER => &mut info.manufacturer,
            ch::MODEL => &mut info.model,
            ch::SERIAL_NUMBER => &mut info.serial_number,
            ch::FIRMWARE_REVISION => &mut info.firmware_revision,
            ch::HARDWARE_REVISION => &mut info.hardware_revision,
            ch::SOFTWARE_REVISION => &mut info.software_revision,
            _ => continue,
        };
        *slot = Some(value);
    }
    info
}

/// Runs discovery passes against a [`HapClient`]
pub struct DiscoveryEngine {
    client: Arc<dyn HapClient>,
    filter: ServiceFilter,
    policy: TwoFactorPolicy,
    retain_cycling_state: bool,
    lost_limit: u32,
}

impl DiscoveryEngine {
    pub fn new(
        client: Arc<dyn HapClient>,
        filter: ServiceFilter,
        policy: TwoFactorPolicy,
        retain_cycling_state: bool,
        lost_limit: u32,
    ) -> Self {
        Self {
            client,
            filter,
            policy,
            retain_cycling_state,
            lost_limit,
        }
    }

    /// One full pass: age, ping, parse, upsert, sweep
    pub async fn refresh(
        &self,
        index: &mut ServiceIndex,
        blacklist: &mut InstanceBlacklist,
    ) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        index.mark_all_unavailable();

        let instances = match self.client.list_instances().await {
            Ok(instances) => instances,
            Err(e) => {
                warn!("Instance listing failed, treating topology as empty: {e}");
                Vec::new()
            }
        };

        let reachable = self.check_reachable(instances, blacklist, &mut report).await;

        for instance in &reachable {
            let services = match self.parse_instance(instance) {
                Ok(services) => services,
                Err(e) => {
                    warn!(
                        "Skipping instance {} at {}:{}: {e}",
                        instance.username, instance.ip_address, instance.port
                    );
                    continue;
                }
            };

            for service in services {
                let unique_id = service.unique_id.clone();
                let description = format!(
                    "{}. type:{} address:{}:{} aid:{} iid:{}",
                    service.service_name,
                    service.category,
                    service.instance.ip_address,
                    service.instance.port,
                    service.aid,
                    service.iid
                );
                match index.upsert(service, self.retain_cycling_state) {
                    Upsert::Inserted => {
                        info!("Found service {description}");
                        report.found.push(unique_id);
                    }
                    Upsert::Updated => report.updated += 1,
                }
            }
        }

        let sweep = index.sweep(self.lost_limit);
        for service in sweep.lost {
            warn!(
                "Lost service {} ({}) for {} pass(es), last seen {}",
                service.service_name,
                service.unique_id,
                service.is_unavailable,
                service.last_seen.to_rfc3339()
            );
            report.lost.push(service.unique_id);
        }
        for service in sweep.removed {
            error!(
                "Removed service {} ({}) after {} missed passes, last seen {}",
                service.service_name,
                service.unique_id,
                service.is_unavailable,
                service.last_seen.to_rfc3339()
            );
            report.removed.push(service.unique_id);
        }

        if report.changed() {
            info!(
                "Device list changed: {} found, {} removed, {} service(s) indexed, {} instance(s) blacklisted",
                report.found.len(),
                report.removed.len(),
                index.len(),
                blacklist.len()
            );
        } else {
            debug!(
                "Discovery pass: {} updated, {} lost",
                report.updated,
                report.lost.len()
            );
        }
        report
    }

    /// Probe every non-blacklisted instance concurrently; failures are
    /// blacklisted
    async fn check_reachable(
        &self,
        instances: Vec<HapInstance>,
        blacklist: &mut InstanceBlacklist,
        report: &mut DiscoveryReport,
    ) -> Vec<HapInstance> {
        let (candidates, skipped): (Vec<_>, Vec<_>) = instances
            .into_iter()
            .partition(|instance| !blacklist.contains(&instance.username));
        for instance in &skipped {
            debug!("Instance {} is blacklisted, skipping", instance.username);
        }

        let ping = WriteRequest::ping();
        let results = join_all(candidates.iter().map(|instance| {
            self.client
                .control(&instance.ip_address, instance.port, &ping)
        }))
        .await;

        let mut reachable = Vec::with_capacity(candidates.len());
        for (instance, result) in candidates.into_iter().zip(results) {
            match result {
                Ok(()) => reachable.push(instance),
                Err(e) => {
                    warn!(
                        "Instance {} at {}:{} failed the connectivity check, blacklisting: {e}",
                        instance.username, instance.ip_address, instance.port
                    );
                    if blacklist.add(instance.username.clone()) {
                        report.blacklisted.push(instance.username);
                    }
                }
            }
        }
        reachable
    }

    /// Parse one instance's accessory tree into indexable services
    pub fn parse_instance(&self, instance: &HapInstance) -> Result<Vec<Service>> {
        let list: AccessoryList = serde_json::from_value(instance.accessories.clone())
            .map_err(|e| BridgeError::parse(format!("Malformed accessory list: {e}")))?;

        let instance_ref = InstanceRef {
            ip_address: instance.ip_address.clone(),
            port: instance.port,
            username: instance.username.clone(),
        };

        let mut services = Vec::new();
        for accessory in &list.accessories {
            let info = accessory_information(accessory);
            let mut television = TelevisionParts::default();

            for raw in &accessory.services {
                let Some(service) = self.parse_service(accessory.aid, raw, &info, &instance_ref)
                else {
                    continue;
                };
                if service.category.is_television_part() {
                    television.push(service);
                } else {
                    services.push(service);
                }
            }

            if let Some(merged) = television.merge() {
                services.push(merged);
            }
        }
        Ok(services)
    }

    fn parse_service(
        &self,
        aid: i64,
        raw: &RawService,
        info: &AccessoryInformation,
        instance: &InstanceRef,
    ) -> Option<Service> {
        let type_id = hap_types::to_long_form(&raw.type_id);
        if type_id == service_types::ACCESSORY_INFORMATION {
            return None;
        }

        let Some(category) = hap_types::service_type_name(&type_id).and_then(Category::from_name)
        else {
            trace!("No adapter for service type {type_id} (aid:{aid} iid:{})", raw.iid);
            return None;
        };

        let characteristics: Vec<Characteristic> =
            raw.characteristics.iter().map(characteristic).collect();

        let resolved = characteristics
            .iter()
            .filter(|c| c.type_id == ch::NAME || c.type_id == ch::CONFIGURED_NAME)
            .find_map(|c| value_string(&c.value))
            .or_else(|| info.name.clone())
            .unwrap_or_else(|| category.name().to_string());
        let service_name = self.filter.rename(resolved);

        if let Some(reason) = self
            .filter
            .excludes(&service_name, info.serial_number.as_deref())
        {
            debug!("Skipping {service_name}: {reason}");
            return None;
        }

        if self.policy.hides(category) {
            warn!(
                "Not registering {service_name}: a pin is required for {category} services \
                 but none is configured"
            );
            return None;
        }

        Some(Service {
            aid,
            iid: raw.iid,
            unique_id: unique_id(&instance.username, aid, raw.iid, &type_id),
            type_id,
            category,
            characteristics,
            accessory_information: info.clone(),
            service_name,
            instance: instance.clone(),
            is_unavailable: 0,
            extras: None,
            last_seen: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CharacteristicStatus;
    use crate::config::RenameRule;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StaticClient {
        instances: Mutex<Vec<HapInstance>>,
        unreachable: Vec<String>,
    }

    #[async_trait]
    impl HapClient for StaticClient {
        async fn list_instances(&self) -> Result<Vec<HapInstance>> {
            Ok(self.instances.lock().unwrap().clone())
        }

        async fn control(&self, host: &str, _port: u16, _request: &WriteRequest) -> Result<()> {
            if self.unreachable.iter().any(|h| h == host) {
                return Err(BridgeError::connectivity("refused"));
            }
            Ok(())
        }

        async fn status(&self, _: &str, _: u16, _: &[(i64, i64)]) -> Result<Vec<CharacteristicStatus>> {
            Ok(Vec::new())
        }

        async fn subscribe(&self, _: &str, _: u16, _: &WriteRequest) -> Result<()> {
            Ok(())
        }
    }

    fn info_service(name: &str, serial: &str) -> Value {
        json!({
            "iid": 1,
            "type": "3E",
            "characteristics": [
                {"iid": 2, "type": "23", "perms": ["pr"], "value": name},
                {"iid": 3, "type": "20", "perms": ["pr"], "value": "Acme"},
                {"iid": 4, "type": "30", "perms": ["pr"], "value": serial},
            ]
        })
    }

    fn instance(host: &str, username: &str, accessories: Value) -> HapInstance {
        HapInstance {
            ip_address: host.to_string(),
            port: 51826,
            username: username.to_string(),
            accessories: json!({ "accessories": accessories }),
        }
    }

    fn lamp_instance() -> HapInstance {
        instance(
            "10.0.0.2",
            "AA:BB",
            json!([{
                "aid": 2,
                "services": [
                    info_service("Desk Lamp", "SN-1"),
                    {"iid": 8, "type": "43", "characteristics": [
                        {"iid": 9, "type": "25", "perms": ["pr", "pw", "ev"], "value": false}
                    ]},
                    {"iid": 20, "type": "85", "characteristics": [
                        {"iid": 21, "type": "22", "perms": ["pr", "ev"], "value": false}
                    ]}
                ]
            }]),
        )
    }

    fn engine(client: Arc<StaticClient>) -> DiscoveryEngine {
        DiscoveryEngine::new(client, ServiceFilter::default(), TwoFactorPolicy::default(), false, 96)
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let client = Arc::new(StaticClient::default());
        client.instances.lock().unwrap().push(lamp_instance());
        let engine = engine(client);
        let mut index = ServiceIndex::new();
        let mut blacklist = InstanceBlacklist::default();

        let first = engine.refresh(&mut index, &mut blacklist).await;
        assert_eq!(first.found.len(), 1);
        assert!(first.changed());
        let ids: Vec<String> = index.unique_ids().cloned().collect();

        let second = engine.refresh(&mut index, &mut blacklist).await;
        assert!(second.found.is_empty());
        assert_eq!(second.updated, 1);
        assert!(!second.changed());
        assert_eq!(index.unique_ids().cloned().collect::<Vec<_>>(), ids);
        assert!(index.services().all(|s| s.is_unavailable == 0));
    }

    #[test]
    fn test_parse_resolves_name_and_info() {
        let engine = engine(Arc::new(StaticClient::default()));
        let services = engine.parse_instance(&lamp_instance()).unwrap();

        // The motion sensor has no adapter
        assert_eq!(services.len(), 1);
        let lamp = &services[0];
        assert_eq!(lamp.category, Category::Lightbulb);
        assert_eq!(lamp.service_name, "Desk Lamp");
        assert_eq!(lamp.accessory_information.serial_number.as_deref(), Some("SN-1"));
        assert_eq!(lamp.unique_id, unique_id("AA:BB", 2, 8, service_types::LIGHTBULB));
        assert_eq!(lamp.characteristics[0].type_id, ch::ON);
    }

    #[test]
    fn test_filters_and_renames() {
        let client = Arc::new(StaticClient::default());
        let renamed = DiscoveryEngine::new(
            client.clone(),
            ServiceFilter::new(
                Vec::new(),
                Vec::new(),
                vec![RenameRule {
                    replace: "Desk Lamp".to_string(),
                    with: "Reading Light".to_string(),
                }],
            ),
            TwoFactorPolicy::default(),
            false,
            96,
        );
        let services = renamed.parse_instance(&lamp_instance()).unwrap();
        assert_eq!(services[0].service_name, "Reading Light");

        let by_serial = DiscoveryEngine::new(
            client,
            ServiceFilter::new(Vec::new(), vec!["SN-1".to_string()], Vec::new()),
            TwoFactorPolicy::default(),
            false,
            96,
        );
        assert!(by_serial.parse_instance(&lamp_instance()).unwrap().is_empty());
    }

    #[test]
    fn test_secure_category_hidden_without_pin() {
        let lock = instance(
            "10.0.0.3",
            "CC:DD",
            json!([{
                "aid": 1,
                "services": [
                    info_service("Front Door", "L-1"),
                    {"iid": 10, "type": "45", "characteristics": [
                        {"iid": 11, "type": "1D", "perms": ["pr", "ev"], "value": 1},
                        {"iid": 12, "type": "1E", "perms": ["pr", "pw", "ev"], "value": 1}
                    ]}
                ]
            }]),
        );
        let client = Arc::new(StaticClient::default());
        assert!(engine(client.clone()).parse_instance(&lock).unwrap().is_empty());

        let waived = DiscoveryEngine::new(
            client,
            ServiceFilter::default(),
            TwoFactorPolicy::new(None, true),
            false,
            96,
        );
        assert_eq!(waived.parse_instance(&lock).unwrap().len(), 1);
    }

    #[test]
    fn test_television_triad_is_merged() {
        let tv = instance(
            "10.0.0.4",
            "EE:FF",
            json!([{
                "aid": 3,
                "services": [
                    info_service("Living Room TV", "TV-1"),
                    {"iid": 10, "type": "D8", "characteristics": [
                        {"iid": 11, "type": "B0", "perms": ["pr", "pw", "ev"], "value": 1},
                        {"iid": 12, "type": "E7", "perms": ["pr", "pw", "ev"], "value": 0},
                        {"iid": 13, "type": "E3", "perms": ["pr"], "value": "Living Room TV"}
                    ]},
                    {"iid": 20, "type": "113", "characteristics": [
                        {"iid": 21, "type": "11A", "perms": ["pr", "pw", "ev"], "value": false},
                        {"iid": 22, "type": "EA", "perms": ["pw"], "value": null}
                    ]},
                    {"iid": 30, "type": "D9", "characteristics": [
                        {"iid": 31, "type": "23", "perms": ["pr"], "value": "bbc"},
                        {"iid": 32, "type": "E3", "perms": ["pr"], "value": "Station - BBC One"},
                        {"iid": 33, "type": "E6", "perms": ["pr"], "value": 0},
                        {"iid": 34, "type": "DB", "perms": ["pr"], "value": 2}
                    ]},
                    {"iid": 40, "type": "D9", "characteristics": [
                        {"iid": 41, "type": "23", "perms": ["pr"], "value": "hdmi1"},
                        {"iid": 42, "type": "E3", "perms": ["pr"], "value": "HDMI 1"},
                        {"iid": 43, "type": "E6", "perms": ["pr"], "value": 1}
                    ]}
                ]
            }]),
        );
        let services = engine(Arc::new(StaticClient::default())).parse_instance(&tv).unwrap();
        assert_eq!(services.len(), 1);

        let television = &services[0];
        assert_eq!(television.category, Category::Television);
        assert!(television.has(ch::MUTE));
        assert!(television.has(ch::VOLUME_SELECTOR));

        let extras = television.extras.as_ref().unwrap();
        assert_eq!(extras.channels.len(), 1);
        assert_eq!(extras.channels[0].configured_name, "BBC One");
        assert_eq!(extras.channels[0].input_source_type, Some(2));
        assert_eq!(extras.inputs[0].name, "hdmi1");
        assert_eq!(extras.inputs[0].identifier, 1);
    }

    #[tokio::test]
    async fn test_unreachable_instance_is_blacklisted() {
        let client = Arc::new(StaticClient {
            instances: Mutex::new(vec![lamp_instance()]),
            unreachable: vec!["10.0.0.2".to_string()],
        });
        let engine = engine(client);
        let mut index = ServiceIndex::new();
        let mut blacklist = InstanceBlacklist::default();

        let report = engine.refresh(&mut index, &mut blacklist).await;
        assert_eq!(report.blacklisted, vec!["AA:BB".to_string()]);
        assert!(blacklist.contains("aa:bb"));
        assert!(index.is_empty());

        // Already blacklisted: no second report entry
        let report = engine.refresh(&mut index, &mut blacklist).await;
        assert!(report.blacklisted.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_instance_only_affects_itself() {
        let client = Arc::new(StaticClient::default());
        {
            let mut instances = client.instances.lock().unwrap();
            instances.push(lamp_instance());
            instances.push(HapInstance {
                ip_address: "10.0.0.9".to_string(),
                port: 51826,
                username: "99:99".to_string(),
                accessories: json!({"accessories": "nope"}),
            });
        }
        let mut index = ServiceIndex::new();
        let report = engine(client)
            .refresh(&mut index, &mut InstanceBlacklist::default())
            .await;
        assert_eq!(report.found.len(), 1);
    }

    #[tokio::test]
    async fn test_lost_service_keeps_last_sighting() {
        let client = Arc::new(StaticClient::default());
        client.instances.lock().unwrap().push(lamp_instance());
        let engine = engine(client.clone());
        let mut index = ServiceIndex::new();
        let mut blacklist = InstanceBlacklist::default();

        engine.refresh(&mut index, &mut blacklist).await;
        let id = index.unique_ids().next().cloned().unwrap();
        let seen = index.get(&id).unwrap().last_seen;

        client.instances.lock().unwrap().clear();
        let report = engine.refresh(&mut index, &mut blacklist).await;
        assert_eq!(report.lost, vec![id.clone()]);
        assert!(!report.changed());
        assert_eq!(index.get(&id).unwrap().last_seen, seen);

        client.instances.lock().unwrap().push(lamp_instance());
        engine.refresh(&mut index, &mut blacklist).await;
        assert!(index.get(&id).unwrap().last_seen >= seen);
    }
}
