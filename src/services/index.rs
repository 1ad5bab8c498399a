//! Canonical service index
//!
//! Maps unique id to [`Service`]. The index is owned by the bridge actor and
//! never shared; other components reach it through request/response calls.

use super::model::Service;
use std::collections::BTreeMap;

/// Outcome of inserting a discovered service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// First sighting of this unique id
    Inserted,
    /// Existing entry overwritten
    Updated,
}

/// Services found stale after a discovery pass
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Still indexed, missed at least one pass
    pub lost: Vec<Service>,
    /// Evicted for exceeding the lost limit
    pub removed: Vec<Service>,
}

#[derive(Debug, Default, Clone)]
pub struct ServiceIndex {
    services: BTreeMap<String, Service>,
}

impl ServiceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from a persisted mapping
    pub fn restore(services: BTreeMap<String, Service>) -> Self {
        Self { services }
    }

    /// Copy of the mapping suitable for persistence
    pub fn snapshot(&self) -> BTreeMap<String, Service> {
        self.services.clone()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn contains(&self, unique_id: &str) -> bool {
        self.services.contains_key(unique_id)
    }

    pub fn get(&self, unique_id: &str) -> Option<&Service> {
        self.services.get(unique_id)
    }

    pub fn get_mut(&mut self, unique_id: &str) -> Option<&mut Service> {
        self.services.get_mut(unique_id)
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    pub fn unique_ids(&self) -> impl Iterator<Item = &String> {
        self.services.keys()
    }

    /// Optimistically age every service before a pass
    pub fn mark_all_unavailable(&mut self) {
        for service in self.services.values_mut() {
            service.is_unavailable = service.is_unavailable.saturating_add(1);
        }
    }

    /// Insert or overwrite a freshly parsed service.
    ///
    /// The fresh record always wins, which resets `is_unavailable`. With
    /// `retain_cycling` set, television anchors from the previous record are
    /// carried over when they still name a known entry.
    pub fn upsert(&mut self, mut service: Service, retain_cycling: bool) -> Upsert {
        let previous = self.services.get(&service.unique_id);

        if retain_cycling {
            if let (Some(fresh), Some(old)) = (
                service.extras.as_mut(),
                previous.and_then(|p| p.extras.as_ref()),
            ) {
                fresh.retain_anchors_from(old);
            }
        }

        let outcome = if previous.is_some() {
            Upsert::Updated
        } else {
            Upsert::Inserted
        };
        self.services.insert(service.unique_id.clone(), service);
        outcome
    }

    /// Collect lost services and evict those past `lost_limit`
    pub fn sweep(&mut self, lost_limit: u32) -> SweepReport {
        let mut report = SweepReport::default();

        let stale: Vec<String> = self
            .services
            .values()
            .filter(|s| s.is_unavailable > 0)
            .map(|s| s.unique_id.clone())
            .collect();

        for unique_id in stale {
            let evict = self
                .services
                .get(&unique_id)
                .is_some_and(|s| s.is_unavailable > lost_limit);
            if evict {
                if let Some(service) = self.services.remove(&unique_id) {
                    report.removed.push(service);
                }
            } else if let Some(service) = self.services.get(&unique_id) {
                report.lost.push(service.clone());
            }
        }

        report
    }

    /// Locate the service at (host, port, aid) that owns characteristic `iid`
    pub fn find_by_characteristic_mut(
        &mut self,
        host: &str,
        port: u16,
        aid: i64,
        iid: i64,
    ) -> Option<&mut Service> {
        self.services
            .values_mut()
            .filter(|s| s.is_located_at(host, port, aid))
            .find(|s| s.owns_iid(iid))
    }
}
