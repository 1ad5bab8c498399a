//! SYNC, QUERY and EXECUTE against the service index

use super::intents::{
    DeviceDescriptor, DeviceState, ExecuteCommand, ExecutionResult, QueryResponse,
};
use crate::adapters::{adapter_for, AdapterContext};
use crate::client::HapClient;
use crate::error::BridgeError;
use crate::security::{ChallengeOutcome, TwoFactorPolicy};
use crate::services::{Service, ServiceIndex};
use futures::future::join_all;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Routes intents through the adapters and the local protocol client
pub struct Dispatcher {
    client: Arc<dyn HapClient>,
    ctx: AdapterContext,
    policy: TwoFactorPolicy,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn HapClient>, ctx: AdapterContext, policy: TwoFactorPolicy) -> Self {
        Self {
            client,
            ctx,
            policy,
        }
    }

    /// Describe every indexed service
    pub fn sync(&self, index: &ServiceIndex) -> Vec<DeviceDescriptor> {
        index
            .services()
            .map(|service| adapter_for(service.category).sync(service, &self.ctx))
            .collect()
    }

    /// Cached state of one service
    pub fn state_of(&self, service: &Service) -> DeviceState {
        adapter_for(service.category).query(service, &self.ctx)
    }

    /// Cached state of the indexed ids among `ids`, skipping the rest
    pub fn states(&self, index: &ServiceIndex, ids: &[String]) -> Map<String, Value> {
        ids.iter()
            .filter_map(|id| {
                let service = index.get(id)?;
                Some((id.clone(), Value::Object(self.state_of(service))))
            })
            .collect()
    }

    /// Refresh the requested services from their instances, then map them.
    ///
    /// A failed refresh falls back to cached values.
    pub async fn query(&self, index: &mut ServiceIndex, ids: &[String]) -> QueryResponse {
        let targets: Vec<(String, String, u16, Vec<(i64, i64)>)> = ids
            .iter()
            .filter_map(|id| index.get(id))
            .map(|service| {
                let pairs = service
                    .characteristics
                    .iter()
                    .map(|c| (service.aid, c.iid))
                    .collect();
                (
                    service.unique_id.clone(),
                    service.instance.ip_address.clone(),
                    service.instance.port,
                    pairs,
                )
            })
            .collect();

        let results = join_all(
            targets
                .iter()
                .map(|(_, host, port, pairs)| self.client.status(host, *port, pairs)),
        )
        .await;

        for ((unique_id, host, port, _), result) in targets.iter().zip(results) {
            match result {
                Ok(statuses) => {
                    let Some(service) = index.get_mut(unique_id) else {
                        continue;
                    };
                    for status in statuses {
                        if status.aid != service.aid {
                            continue;
                        }
                        if let Some(c) = service.characteristic_by_iid_mut(status.iid) {
                            c.value = status.value;
                        }
                    }
                }
                Err(e) => warn!("Status refresh from {host}:{port} failed, using cached values: {e}"),
            }
        }

        let devices = ids
            .iter()
            .map(|id| {
                let state = index
                    .get(id)
                    .map(|service| Value::Object(self.state_of(service)))
                    .unwrap_or_else(|| Value::Object(Map::new()));
                (id.clone(), state)
            })
            .collect();
        QueryResponse { devices }
    }

    /// Apply every command to every addressed device, one result per device
    pub async fn execute(
        &self,
        index: &mut ServiceIndex,
        commands: &[ExecuteCommand],
    ) -> Vec<ExecutionResult> {
        let mut results = Vec::new();
        for command in commands {
            for device in &command.devices {
                let result = self.execute_device(index, &device.id, command).await;
                results.push(result);
            }
        }
        results
    }

    async fn execute_device(
        &self,
        index: &mut ServiceIndex,
        id: &str,
        command: &ExecuteCommand,
    ) -> ExecutionResult {
        let Some(service) = index.get_mut(id) else {
            let e = BridgeError::not_found(format!("Execute for unknown device {id}"));
            warn!("{e}");
            return ExecutionResult::failed(id, &e);
        };
        if command.execution.is_empty() {
            let e = BridgeError::invalid_input(format!(
                "Command for {} has no execution",
                service.service_name
            ));
            return ExecutionResult::failed(id, &e);
        }

        let adapter = adapter_for(service.category);
        let mut states: Option<DeviceState> = None;

        for execution in &command.execution {
            let outcome = self.policy.check(service.category, execution.pin());
            if let Some(kind) = outcome.challenge_type() {
                if outcome == ChallengeOutcome::PinNeeded {
                    info!("Requesting two-factor pin for {}", service.service_name);
                } else {
                    warn!("Wrong two-factor pin for {}", service.service_name);
                }
                return ExecutionResult::challenge(id, kind);
            }

            let Some(translation) = adapter.execute(service, execution, &self.ctx) else {
                let e = BridgeError::unsupported(format!(
                    "{} for {} ({})",
                    execution.command, service.service_name, service.category
                ));
                error!("{e}");
                return ExecutionResult::failed(id, &e);
            };

            debug!(
                "Control {} at {}:{}: {}",
                service.service_name,
                service.instance.ip_address,
                service.instance.port,
                serde_json::to_string(&translation.payload).unwrap_or_default()
            );
            if let Err(e) = self
                .client
                .control(&service.instance.ip_address, service.instance.port, &translation.payload)
                .await
            {
                let code = e.to_error_code();
                error!(
                    code = code.as_number(),
                    category = code.category(),
                    "Failed to control {}: {e}. Make sure all instances use the same pin",
                    service.service_name
                );
                return ExecutionResult::failed(id, &e);
            }

            if let Some(predicted) = translation.states {
                states.get_or_insert_with(Map::new).extend(predicted);
            }
        }

        ExecutionResult::success(id, states)
    }
}
