//! Websocket link to the assistant cloud
//!
//! One long-lived connection carries both directions: fulfillment requests
//! come in as text frames, replies and state reports go out. A dropped
//! connection is retried after a fixed delay; reports produced while offline
//! are discarded since the next full report supersedes them.

use super::OutboundMessage;
use crate::config::CloudConfig;
use crate::error::{BridgeError, Result};
use crate::server::{BridgeHandle, Intent, IntentRequest};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Cloud connection driven by the outbound message channel
pub struct CloudLink {
    config: CloudConfig,
    handle: BridgeHandle,
    tx: mpsc::Sender<OutboundMessage>,
    rx: mpsc::Receiver<OutboundMessage>,
}

impl CloudLink {
    /// `tx` must feed `rx`; intent replies are queued on it like reports
    pub fn new(
        config: CloudConfig,
        handle: BridgeHandle,
        tx: mpsc::Sender<OutboundMessage>,
        rx: mpsc::Receiver<OutboundMessage>,
    ) -> Self {
        Self {
            config,
            handle,
            tx,
            rx,
        }
    }

    /// Keep the link up until the outbound channel closes
    pub async fn run(mut self) {
        loop {
            match connect(&self.config).await {
                Ok(stream) => {
                    info!("Connected to assistant cloud at {}", self.config.url);
                    match self.serve(stream).await {
                        Ok(()) => {
                            debug!("Outbound channel closed, stopping cloud link");
                            return;
                        }
                        Err(e) => warn!("Cloud connection lost: {e}"),
                    }
                }
                Err(e) if !e.is_retryable() => {
                    error!("Giving up on assistant cloud: {e}");
                    return;
                }
                Err(e) => error!("Failed to connect to assistant cloud: {e}"),
            }

            if !self.wait_reconnect().await {
                return;
            }
        }
    }

    /// Sleep out the reconnect delay, dropping anything queued meanwhile.
    /// Returns false once the outbound channel has closed.
    async fn wait_reconnect(&mut self) -> bool {
        let delay = sleep(self.config.reconnect_delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                _ = &mut delay => return true,
                message = self.rx.recv() => match message {
                    Some(message) => debug!("Offline, dropping {}", kind(&message)),
                    None => return false,
                },
            }
        }
    }

    /// Pump frames until the connection fails (Err) or the bridge stops (Ok)
    async fn serve(&mut self, stream: WsStream) -> Result<()> {
        let (mut sink, mut stream) = stream.split();
        loop {
            tokio::select! {
                outbound = self.rx.recv() => {
                    let Some(message) = outbound else {
                        let _ = sink.close().await;
                        return Ok(());
                    };
                    let text = serde_json::to_string(&message)?;
                    sink.send(Message::Text(text))
                        .await
                        .map_err(|e| BridgeError::websocket(format!("Send failed: {e}")))?;
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Text(text))) => self.on_request(&text),
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                        return Err(BridgeError::websocket(format!("Closed by server: {reason}")));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(BridgeError::websocket(e.to_string())),
                    None => return Err(BridgeError::websocket("Stream ended")),
                },
            }
        }
    }

    /// Answer one request off the frame loop so reports keep flowing
    fn on_request(&self, text: &str) {
        let request: IntentRequest = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(e) => {
                warn!("Ignoring malformed request: {e}");
                return;
            }
        };
        debug!("Received request {}", request.request_id);

        let handle = self.handle.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let request_id = request.request_id.clone();
            let is_sync = matches!(request.inputs.first(), Some(Intent::Sync));

            let body = match handle.handle_intent(request).await {
                Ok(body) => body,
                Err(e) => {
                    error!("Request {request_id} failed: {e}");
                    return;
                }
            };
            let response = OutboundMessage::Response { request_id, body };
            if tx.send(response).await.is_err() {
                return;
            }

            // The assistant expects current state right after a SYNC
            if is_sync {
                match handle.report_full_state().await {
                    Ok(count) => debug!("Reported state of {count} device(s) after sync"),
                    Err(e) => warn!("Full state report failed: {e}"),
                }
            }
        });
    }
}

async fn connect(config: &CloudConfig) -> Result<WsStream> {
    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| BridgeError::websocket(format!("Invalid cloud URL: {e}")))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", config.token))
        .map_err(|_| BridgeError::config("cloud.token contains invalid header characters"))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    let (stream, response) = connect_async(request)
        .await
        .map_err(|e| BridgeError::websocket(format!("Connection failed: {e}")))?;
    debug!("Cloud handshake response: {:?}", response.status());
    Ok(stream)
}

fn kind(message: &OutboundMessage) -> &'static str {
    match message {
        OutboundMessage::RequestSync => "sync request",
        OutboundMessage::ReportState { .. } => "state report",
        OutboundMessage::Response { .. } => "response",
    }
}
