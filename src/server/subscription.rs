//! Event subscription registry
//!
//! Tracks, per instance, which characteristics have been registered for push
//! events so repeated passes only subscribe to what is new.

use crate::client::{CharacteristicWrite, HapClient, WriteRequest};
use crate::discovery::InstanceBlacklist;
use crate::services::hap_types::TRACKED_CHARACTERISTICS;
use crate::services::ServiceIndex;
use futures::future::join_all;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEntry {
    pub aid: i64,
    pub iid: i64,
    pub registered: bool,
}

/// Subscription state for one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub host: String,
    pub port: u16,
    pub entries: Vec<SubscriptionEntry>,
}

impl InstanceRecord {
    fn add(&mut self, aid: i64, iid: i64) {
        if !self.entries.iter().any(|e| e.aid == aid && e.iid == iid) {
            self.entries.push(SubscriptionEntry {
                aid,
                iid,
                registered: false,
            });
        }
    }

    fn unregistered(&self) -> Vec<CharacteristicWrite> {
        self.entries
            .iter()
            .filter(|e| !e.registered)
            .map(|e| CharacteristicWrite::subscribe(e.aid, e.iid))
            .collect()
    }
}

/// One subscribe call to issue
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBatch {
    pub username: String,
    pub host: String,
    pub port: u16,
    pub request: WriteRequest,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionReport {
    /// Characteristics newly registered
    pub registered: usize,
    /// Instances blacklisted after a failed call
    pub failed: Vec<String>,
}

/// Per-instance subscription records keyed by instance username
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    records: BTreeMap<String, InstanceRecord>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, username: &str) -> Option<&InstanceRecord> {
        self.records.get(username)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add every trackable, event-capable characteristic of the index and
    /// return one batch per instance with unregistered pairs
    pub fn collect(&mut self, index: &ServiceIndex, blacklist: &InstanceBlacklist) -> Vec<PendingBatch> {
        for service in index.services() {
            let instance = &service.instance;
            if blacklist.contains(&instance.username) {
                continue;
            }

            let record = self
                .records
                .entry(instance.username.clone())
                .or_insert_with(|| InstanceRecord {
                    host: instance.ip_address.clone(),
                    port: instance.port,
                    entries: Vec::new(),
                });
            record.host.clone_from(&instance.ip_address);
            record.port = instance.port;

            for characteristic in &service.characteristics {
                if characteristic.perms.events
                    && TRACKED_CHARACTERISTICS.contains(&characteristic.type_id.as_str())
                {
                    record.add(service.aid, characteristic.iid);
                }
            }
        }

        self.records
            .iter()
            .filter(|(username, _)| !blacklist.contains(username))
            .filter_map(|(username, record)| {
                let writes = record.unregistered();
                (!writes.is_empty()).then(|| PendingBatch {
                    username: username.clone(),
                    host: record.host.clone(),
                    port: record.port,
                    request: WriteRequest::new(writes),
                })
            })
            .collect()
    }

    /// Mark every pair of an instance as registered
    pub fn confirm(&mut self, username: &str) {
        if let Some(record) = self.records.get_mut(username) {
            for entry in &mut record.entries {
                entry.registered = true;
            }
        }
    }

    /// Forget an instance entirely; it is rebuilt from scratch if it recovers
    pub fn drop_instance(&mut self, username: &str) -> Option<InstanceRecord> {
        self.records.remove(username)
    }

    /// Forget the instance served at `host:port`, returning its username.
    /// The next [`collect`](Self::collect) re-registers all of its pairs.
    pub fn drop_endpoint(&mut self, host: &str, port: u16) -> Option<String> {
        let username = self
            .records
            .iter()
            .find(|(_, record)| record.host == host && record.port == port)
            .map(|(username, _)| username.clone())?;
        self.records.remove(&username);
        Some(username)
    }
}

/// Register new characteristics with every instance, concurrently.
///
/// A failed call blacklists the instance and drops its record.
pub async fn sync_subscriptions(
    client: &dyn HapClient,
    registry: &mut SubscriptionRegistry,
    index: &ServiceIndex,
    blacklist: &mut InstanceBlacklist,
) -> SubscriptionReport {
    let batches = registry.collect(index, blacklist);
    let mut report = SubscriptionReport::default();
    if batches.is_empty() {
        return report;
    }

    let results = join_all(
        batches
            .iter()
            .map(|batch| client.subscribe(&batch.host, batch.port, &batch.request)),
    )
    .await;

    for (batch, result) in batches.into_iter().zip(results) {
        match result {
            Ok(()) => {
                debug!(
                    "Registered {} characteristic(s) with {}",
                    batch.request.characteristics.len(),
                    batch.username
                );
                report.registered += batch.request.characteristics.len();
                registry.confirm(&batch.username);
            }
            Err(e) => {
                warn!(
                    "Subscribing to {} at {}:{} failed, blacklisting: {e}",
                    batch.username, batch.host, batch.port
                );
                registry.drop_instance(&batch.username);
                blacklist.add(batch.username.clone());
                report.failed.push(batch.username);
            }
        }
    }

    if report.registered > 0 {
        info!("Registered {} characteristic(s) for events", report.registered);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::service_with;
    use crate::client::{CharacteristicStatus, HapInstance};
    use crate::error::{BridgeError, Result};
    use crate::services::hap_types::characteristic as ch;
    use crate::services::{Category, Permissions};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct SubscribeRecorder {
        calls: Mutex<Vec<WriteRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl HapClient for SubscribeRecorder {
        async fn list_instances(&self) -> Result<Vec<HapInstance>> {
            Ok(Vec::new())
        }

        async fn control(&self, _: &str, _: u16, _: &WriteRequest) -> Result<()> {
            Ok(())
        }

        async fn status(&self, _: &str, _: u16, _: &[(i64, i64)]) -> Result<Vec<CharacteristicStatus>> {
            Ok(Vec::new())
        }

        async fn subscribe(&self, _: &str, _: u16, request: &WriteRequest) -> Result<()> {
            self.calls.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(BridgeError::subscription("rejected"));
            }
            Ok(())
        }
    }

    fn index() -> ServiceIndex {
        let mut service = service_with(
            Category::Lightbulb,
            &[
                (9, ch::ON, json!(true)),
                (10, ch::BRIGHTNESS, json!(50)),
                (11, ch::NAME, json!("Lamp")),
            ],
        );
        // Brightness without event permission
        service.characteristics[1].perms = Permissions::from_hap(&["pr", "pw"]);
        let mut index = ServiceIndex::new();
        index.upsert(service, false);
        index
    }

    #[tokio::test]
    async fn test_repeat_pass_issues_no_calls() {
        let client = SubscribeRecorder::default();
        let mut registry = SubscriptionRegistry::new();
        let mut blacklist = InstanceBlacklist::default();
        let index = index();

        let report = sync_subscriptions(&client, &mut registry, &index, &mut blacklist).await;
        assert_eq!(report.registered, 1);
        assert_eq!(
            client.calls.lock().unwrap()[0].characteristics,
            vec![CharacteristicWrite::subscribe(2, 9)]
        );
        assert!(registry.record("AA:BB").unwrap().entries.iter().all(|e| e.registered));

        let report = sync_subscriptions(&client, &mut registry, &index, &mut blacklist).await;
        assert_eq!(report.registered, 0);
        assert_eq!(client.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_endpoint_is_registered_again() {
        let client = SubscribeRecorder::default();
        let mut registry = SubscriptionRegistry::new();
        let mut blacklist = InstanceBlacklist::default();
        let index = index();
        let instance = index.services().next().unwrap().instance.clone();

        sync_subscriptions(&client, &mut registry, &index, &mut blacklist).await;
        assert_eq!(registry.drop_endpoint("10.9.9.9", instance.port), None);
        assert_eq!(
            registry.drop_endpoint(&instance.ip_address, instance.port),
            Some("AA:BB".to_string())
        );
        assert!(registry.is_empty());

        let report = sync_subscriptions(&client, &mut registry, &index, &mut blacklist).await;
        assert_eq!(report.registered, 1);
        assert_eq!(client.calls.lock().unwrap().len(), 2);
        assert!(blacklist.is_empty());
    }

    #[tokio::test]
    async fn test_failure_blacklists_and_drops_record() {
        let client = SubscribeRecorder {
            fail: true,
            ..Default::default()
        };
        let mut registry = SubscriptionRegistry::new();
        let mut blacklist = InstanceBlacklist::default();
        let index = index();

        let report = sync_subscriptions(&client, &mut registry, &index, &mut blacklist).await;
        assert_eq!(report.failed, vec!["AA:BB".to_string()]);
        assert!(blacklist.contains("AA:BB"));
        assert!(registry.record("AA:BB").is_none());

        sync_subscriptions(&client, &mut registry, &index, &mut blacklist).await;
        assert_eq!(client.calls.lock().unwrap().len(), 1);
        assert!(registry.is_empty());
    }
}
