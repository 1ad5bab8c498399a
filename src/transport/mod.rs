//! Outbound messages to the assistant cloud
//!
//! The bridge only needs a [`ReportSink`]; the websocket client (feature
//! `websocket`) is one implementation, [`ChannelSink`] and [`LogSink`] are
//! the others.

#[cfg(feature = "websocket")]
pub mod websocket;

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::debug;

/// Messages the bridge sends upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundMessage {
    /// Ask the assistant to issue a fresh SYNC
    RequestSync,
    /// State report keyed by unique id
    ReportState {
        #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        body: Map<String, Value>,
    },
    /// Reply to an inbound intent request
    Response {
        #[serde(rename = "requestId")]
        request_id: String,
        body: Value,
    },
}

impl OutboundMessage {
    pub fn report_state(body: Map<String, Value>) -> Self {
        OutboundMessage::ReportState {
            request_id: None,
            body,
        }
    }

    /// Report tagged with a fresh request id, used for full-state snapshots
    pub fn tracked_report(body: Map<String, Value>) -> Self {
        OutboundMessage::ReportState {
            request_id: Some(uuid::Uuid::new_v4().to_string()),
            body,
        }
    }
}

/// Destination for outbound messages
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<()>;
}

/// Forwards messages to a channel, typically drained by the websocket task
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<OutboundMessage>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<OutboundMessage>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ReportSink for ChannelSink {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| BridgeError::transport("Outbound channel closed"))
    }
}

/// Sink used without a cloud endpoint: messages are only logged
#[derive(Debug, Clone, Default)]
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        debug!(
            "No cloud endpoint configured, dropping {}",
            serde_json::to_string(&message)?
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        assert_eq!(
            serde_json::to_value(OutboundMessage::RequestSync).unwrap(),
            json!({"type": "request-sync"})
        );

        let mut body = Map::new();
        body.insert("abc".to_string(), json!({"on": true}));
        assert_eq!(
            serde_json::to_value(OutboundMessage::report_state(body.clone())).unwrap(),
            json!({"type": "report-state", "body": {"abc": {"on": true}}})
        );

        let with_id = OutboundMessage::ReportState {
            request_id: Some("r1".to_string()),
            body,
        };
        assert_eq!(serde_json::to_value(with_id).unwrap()["requestId"], json!("r1"));

        let tracked = serde_json::to_value(OutboundMessage::tracked_report(Map::new())).unwrap();
        assert_eq!(tracked["requestId"].as_str().map(str::len), Some(36));
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (tx, mut rx) = mpsc::channel(4);
        ChannelSink::new(tx).send(OutboundMessage::RequestSync).await.unwrap();
        assert_eq!(rx.recv().await, Some(OutboundMessage::RequestSync));
    }
}
