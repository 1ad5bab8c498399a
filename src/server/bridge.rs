//! The bridge actor
//!
//! A single task owns the index, the blacklist, the subscription records and
//! the pending report set. Everything else talks to it through a
//! [`BridgeHandle`]; push traffic arrives on its own channel and the report
//! debounce deadline is one more branch of the same `select!` loop.

use super::debouncer::ReportDebouncer;
use super::dispatcher::Dispatcher;
use super::intents::{
    ExecuteCommand, ExecuteResponse, Intent, IntentRequest, QueryResponse, SyncResponse,
};
use super::subscription::{sync_subscriptions, SubscriptionRegistry};
use crate::adapters::AdapterContext;
use crate::client::{HapClient, HapEvent, PushMessage};
use crate::config::BridgeConfig;
use crate::discovery::{DiscoveryEngine, DiscoveryReport, InstanceBlacklist, ServiceFilter};
use crate::error::{BridgeError, Result};
use crate::security::TwoFactorPolicy;
use crate::services::{Service, ServiceIndex};
use crate::transport::{OutboundMessage, ReportSink};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

const COMMAND_BUFFER: usize = 64;

/// Requests served by the actor
#[derive(Debug)]
pub enum BridgeCommand {
    Sync {
        reply: oneshot::Sender<SyncResponse>,
    },
    Query {
        ids: Vec<String>,
        reply: oneshot::Sender<QueryResponse>,
    },
    Execute {
        commands: Vec<ExecuteCommand>,
        reply: oneshot::Sender<ExecuteResponse>,
    },
    Refresh {
        reply: oneshot::Sender<DiscoveryReport>,
    },
    RequestSync {
        reply: oneshot::Sender<Result<()>>,
    },
    ReportFullState {
        reply: oneshot::Sender<Result<usize>>,
    },
    Snapshot {
        reply: oneshot::Sender<BTreeMap<String, Service>>,
    },
    Shutdown,
}

/// All mutable bridge state plus the collaborators that act on it
pub struct BridgeCore {
    index: ServiceIndex,
    blacklist: InstanceBlacklist,
    subscriptions: SubscriptionRegistry,
    debouncer: ReportDebouncer,
    engine: DiscoveryEngine,
    dispatcher: Dispatcher,
    client: Arc<dyn HapClient>,
    sink: Arc<dyn ReportSink>,
}

impl BridgeCore {
    pub fn new(config: &BridgeConfig, client: Arc<dyn HapClient>, sink: Arc<dyn ReportSink>) -> Self {
        let policy = TwoFactorPolicy::from_config(config);
        Self {
            index: ServiceIndex::new(),
            blacklist: InstanceBlacklist::new(config.instance_blacklist.iter().cloned()),
            subscriptions: SubscriptionRegistry::new(),
            debouncer: ReportDebouncer::new(config.timing.report_debounce),
            engine: DiscoveryEngine::new(
                client.clone(),
                ServiceFilter::from_config(config),
                policy.clone(),
                config.retain_cycling_state,
                config.lost_limit,
            ),
            dispatcher: Dispatcher::new(client.clone(), AdapterContext::from_config(config), policy),
            client,
            sink,
        }
    }

    /// Start from a previously persisted index
    pub fn with_index(mut self, index: ServiceIndex) -> Self {
        for service in index.services() {
            info!(
                "Restored service {}. type:{} address:{}:{} aid:{} iid:{}",
                service.service_name,
                service.category,
                service.instance.ip_address,
                service.instance.port,
                service.aid,
                service.iid
            );
        }
        self.index = index;
        self
    }

    pub fn index(&self) -> &ServiceIndex {
        &self.index
    }

    pub fn blacklist(&self) -> &InstanceBlacklist {
        &self.blacklist
    }

    /// Discovery pass followed by subscription of anything new
    pub async fn refresh(&mut self) -> DiscoveryReport {
        let report = self.engine.refresh(&mut self.index, &mut self.blacklist).await;
        sync_subscriptions(
            self.client.as_ref(),
            &mut self.subscriptions,
            &self.index,
            &mut self.blacklist,
        )
        .await;
        report
    }

    /// Apply a pushed value and queue the owning service for reporting
    pub fn on_event(&mut self, event: HapEvent) -> bool {
        let Some(service) =
            self.index
                .find_by_characteristic_mut(&event.host, event.port, event.aid, event.iid)
        else {
            trace!(
                "Event for unknown characteristic {}:{} aid:{} iid:{}",
                event.host,
                event.port,
                event.aid,
                event.iid
            );
            return false;
        };

        if let Some(characteristic) = service.characteristic_by_iid_mut(event.iid) {
            characteristic.value = event.value;
        }
        let unique_id = service.unique_id.clone();
        self.debouncer.enqueue(&unique_id);
        true
    }

    /// Route one message from the push channel
    pub fn on_push(&mut self, message: PushMessage) {
        match message {
            PushMessage::Event(event) => {
                self.on_event(event);
            }
            PushMessage::Closed { host, port } => {
                if let Some(username) = self.subscriptions.drop_endpoint(&host, port) {
                    warn!(
                        "Event connection to {username} at {host}:{port} closed, \
                         re-registering on the next pass"
                    );
                }
            }
        }
    }

    /// Send one report for everything queued
    pub async fn flush_reports(&mut self) {
        let ids = self.debouncer.drain();
        let states = self.dispatcher.states(&self.index, &ids);
        if states.is_empty() {
            return;
        }
        self.send_report(states).await;
    }

    async fn send_report(&self, states: serde_json::Map<String, Value>) {
        let message = OutboundMessage::report_state(states);
        debug!(
            "Sending state report: {}",
            serde_json::to_string(&message).unwrap_or_default()
        );
        if let Err(e) = self.sink.send(message).await {
            warn!("State report failed: {e}");
        }
    }

    pub async fn request_sync(&self) -> Result<()> {
        info!("Sending sync request");
        self.sink.send(OutboundMessage::RequestSync).await
    }

    /// Report every indexed service; returns how many were reported
    pub async fn report_full_state(&self) -> Result<usize> {
        if self.index.is_empty() {
            return Ok(0);
        }
        let ids: Vec<String> = self.index.unique_ids().cloned().collect();
        let states = self.dispatcher.states(&self.index, &ids);
        let count = states.len();
        self.sink.send(OutboundMessage::tracked_report(states)).await?;
        Ok(count)
    }

    pub fn sync(&self) -> SyncResponse {
        SyncResponse {
            agent_user_id: None,
            devices: self.dispatcher.sync(&self.index),
        }
    }

    pub async fn query(&mut self, ids: &[String]) -> QueryResponse {
        self.dispatcher.query(&mut self.index, ids).await
    }

    pub async fn execute(&mut self, commands: &[ExecuteCommand]) -> ExecuteResponse {
        ExecuteResponse {
            commands: self.dispatcher.execute(&mut self.index, commands).await,
        }
    }

    async fn handle(&mut self, command: BridgeCommand) {
        // A dropped reply receiver only means the caller gave up
        match command {
            BridgeCommand::Sync { reply } => {
                let _ = reply.send(self.sync());
            }
            BridgeCommand::Query { ids, reply } => {
                let _ = reply.send(self.query(&ids).await);
            }
            BridgeCommand::Execute { commands, reply } => {
                let _ = reply.send(self.execute(&commands).await);
            }
            BridgeCommand::Refresh { reply } => {
                let _ = reply.send(self.refresh().await);
            }
            BridgeCommand::RequestSync { reply } => {
                let _ = reply.send(self.request_sync().await);
            }
            BridgeCommand::ReportFullState { reply } => {
                let _ = reply.send(self.report_full_state().await);
            }
            BridgeCommand::Snapshot { reply } => {
                let _ = reply.send(self.index.snapshot());
            }
            BridgeCommand::Shutdown => {}
        }
    }
}

async fn run(
    mut core: BridgeCore,
    mut commands: mpsc::Receiver<BridgeCommand>,
    mut events: mpsc::Receiver<PushMessage>,
) {
    let mut events_open = true;
    loop {
        let deadline = core.debouncer.deadline();
        tokio::select! {
            command = commands.recv() => match command {
                None | Some(BridgeCommand::Shutdown) => break,
                Some(command) => core.handle(command).await,
            },
            message = events.recv(), if events_open => match message {
                Some(message) => core.on_push(message),
                None => {
                    debug!("Event channel closed");
                    events_open = false;
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                core.flush_reports().await;
            }
        }
    }

    if !core.debouncer.is_empty() {
        core.flush_reports().await;
    }
    debug!("Bridge actor stopped");
}

/// Start the actor; push events are read from `events`
pub fn spawn(core: BridgeCore, events: mpsc::Receiver<PushMessage>) -> (BridgeHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let task = tokio::spawn(run(core, rx, events));
    (BridgeHandle { tx }, task)
}

/// Cloneable front door to the bridge actor
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    tx: mpsc::Sender<BridgeCommand>,
}

impl BridgeHandle {
    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> BridgeCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| BridgeError::unavailable("Bridge actor stopped"))?;
        rx.await
            .map_err(|_| BridgeError::unavailable("Bridge actor dropped the request"))
    }

    pub async fn sync(&self) -> Result<SyncResponse> {
        self.call(|reply| BridgeCommand::Sync { reply }).await
    }

    pub async fn query(&self, ids: Vec<String>) -> Result<QueryResponse> {
        self.call(|reply| BridgeCommand::Query { ids, reply }).await
    }

    pub async fn execute(&self, commands: Vec<ExecuteCommand>) -> Result<ExecuteResponse> {
        self.call(|reply| BridgeCommand::Execute { commands, reply }).await
    }

    pub async fn refresh(&self) -> Result<DiscoveryReport> {
        self.call(|reply| BridgeCommand::Refresh { reply }).await
    }

    pub async fn request_sync(&self) -> Result<()> {
        self.call(|reply| BridgeCommand::RequestSync { reply }).await?
    }

    pub async fn report_full_state(&self) -> Result<usize> {
        self.call(|reply| BridgeCommand::ReportFullState { reply }).await?
    }

    pub async fn snapshot(&self) -> Result<BTreeMap<String, Service>> {
        self.call(|reply| BridgeCommand::Snapshot { reply }).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(BridgeCommand::Shutdown)
            .await
            .map_err(|_| BridgeError::unavailable("Bridge actor stopped"))
    }

    /// Answer a fulfillment request with its `{requestId, payload}` body.
    ///
    /// Only the first input is served, as the assistant never sends more.
    pub async fn handle_intent(&self, request: IntentRequest) -> Result<Value> {
        let payload = match request.inputs.into_iter().next() {
            Some(Intent::Sync) => serde_json::to_value(self.sync().await?)?,
            Some(Intent::Query { devices }) => {
                let ids = devices.into_iter().map(|d| d.id).collect();
                serde_json::to_value(self.query(ids).await?)?
            }
            Some(Intent::Execute { commands }) => serde_json::to_value(self.execute(commands).await?)?,
            Some(Intent::Disconnect) => {
                info!("Assistant account disconnected");
                json!({})
            }
            None => return Err(BridgeError::invalid_input("Intent request without inputs")),
        };
        Ok(json!({ "requestId": request.request_id, "payload": payload }))
    }
}
