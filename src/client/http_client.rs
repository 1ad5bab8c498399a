//! HTTP client for HAP instances running in insecure mode
//!
//! Instances are addressed by host and port and authenticated with the
//! configured pin in the `Authorization` header.

use super::{
    event_stream, status_query, CharacteristicStatus, Endpoint, HapClient, HapInstance, PushMessage,
    StatusResponse, WriteRequest,
};
use crate::config::HapConfig;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Per-characteristic result inside a `207 Multi-Status` control response
#[derive(Debug, Deserialize)]
struct WriteStatus {
    aid: i64,
    iid: i64,
    #[serde(default)]
    status: i64,
}

#[derive(Debug, Deserialize)]
struct MultiStatus {
    #[serde(default)]
    characteristics: Vec<WriteStatus>,
}

/// reqwest-backed [`HapClient`]
pub struct HttpHapClient {
    client: Client,
    pin: String,
    static_instances: Vec<Endpoint>,
    mdns: bool,
    browse_timeout: Duration,
    request_timeout: Duration,
    events: mpsc::Sender<PushMessage>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpHapClient {
    /// Create a client; push events are forwarded to `events`
    pub fn new(config: &HapConfig, events: mpsc::Sender<PushMessage>) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let pin = reqwest::header::HeaderValue::from_str(&config.pin)
            .map_err(|e| BridgeError::config(format!("Invalid pin header value: {e}")))?;
        headers.insert(reqwest::header::AUTHORIZATION, pin);

        let client = ClientBuilder::new()
            .timeout(config.request_timeout)
            .user_agent(format!("hap-assistant-bridge/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| BridgeError::connectivity(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            pin: config.pin.clone(),
            static_instances: config.instances.iter().map(Endpoint::from).collect(),
            mdns: config.mdns,
            browse_timeout: config.browse_timeout,
            request_timeout: config.request_timeout,
            events,
            listeners: Mutex::new(Vec::new()),
        })
    }

    fn url(host: &str, port: u16, path: &str) -> Result<Url> {
        let url = if host.contains(':') {
            format!("http://[{host}]:{port}{path}")
        } else {
            format!("http://{host}:{port}{path}")
        };
        Url::parse(&url)
            .map_err(|e| BridgeError::invalid_input(format!("Invalid instance address {host}:{port}: {e}")))
    }

    fn map_send_error(host: &str, port: u16, e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::timeout(format!("{host}:{port}: {e}"))
        } else if e.is_connect() {
            BridgeError::connectivity(format!("{host}:{port}: {e}"))
        } else {
            BridgeError::Http(e)
        }
    }

    fn map_status(host: &str, port: u16, status: StatusCode) -> BridgeError {
        match status.as_u16() {
            470 => BridgeError::transport(format!(
                "{host}:{port} rejected the pin; all instances must share the same pin"
            )),
            _ => BridgeError::transport(format!("{host}:{port} answered {status}")),
        }
    }

    /// Endpoints from static config plus mDNS, deduplicated by username
    async fn locate(&self) -> Vec<Endpoint> {
        let mut endpoints = self.static_instances.clone();
        if self.mdns {
            for endpoint in self.browse().await {
                let known = endpoints
                    .iter()
                    .any(|e| e.username.eq_ignore_ascii_case(&endpoint.username));
                if !known {
                    endpoints.push(endpoint);
                }
            }
        }
        endpoints
    }

    #[cfg(feature = "discovery")]
    async fn browse(&self) -> Vec<Endpoint> {
        crate::discovery::mdns::browse(self.browse_timeout)
            .await
            .unwrap_or_else(|e| {
                warn!("mDNS browse failed: {e}");
                Vec::new()
            })
    }

    #[cfg(not(feature = "discovery"))]
    async fn browse(&self) -> Vec<Endpoint> {
        debug!(
            "mDNS requested but the discovery feature is disabled (browse window {:?})",
            self.browse_timeout
        );
        Vec::new()
    }

    async fn fetch_accessories(&self, endpoint: &Endpoint) -> Result<Value> {
        let url = Self::url(&endpoint.host, endpoint.port, "/accessories")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::map_send_error(&endpoint.host, endpoint.port, e))?;

        if !response.status().is_success() {
            return Err(Self::map_status(&endpoint.host, endpoint.port, response.status()));
        }
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl HapClient for HttpHapClient {
    async fn list_instances(&self) -> Result<Vec<HapInstance>> {
        let endpoints = self.locate().await;
        debug!("Fetching accessories from {} instance(s)", endpoints.len());

        let fetched = join_all(endpoints.iter().map(|e| self.fetch_accessories(e))).await;

        let mut instances = Vec::new();
        for (endpoint, result) in endpoints.into_iter().zip(fetched) {
            match result {
                Ok(accessories) => instances.push(HapInstance {
                    ip_address: endpoint.host,
                    port: endpoint.port,
                    username: endpoint.username,
                    accessories,
                }),
                Err(e) => warn!(
                    "Skipping instance [{}] at {}:{}: {e}",
                    endpoint.username, endpoint.host, endpoint.port
                ),
            }
        }
        Ok(instances)
    }

    async fn control(&self, host: &str, port: u16, request: &WriteRequest) -> Result<()> {
        let url = Self::url(host, port, "/characteristics")?;
        let response = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "application/hap+json")
            .json(request)
            .send()
            .await
            .map_err(|e| Self::map_send_error(host, port, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::map_status(host, port, status));
        }

        if status == StatusCode::MULTI_STATUS {
            let body: MultiStatus = response.json().await.unwrap_or(MultiStatus {
                characteristics: Vec::new(),
            });
            // Probe entries (aid -1) are expected to fail
            if let Some(failed) = body
                .characteristics
                .iter()
                .find(|c| c.aid >= 0 && c.status != 0)
            {
                return Err(BridgeError::transport(format!(
                    "{host}:{port} refused write to {}.{} with status {}",
                    failed.aid, failed.iid, failed.status
                )));
            }
        }
        Ok(())
    }

    async fn status(
        &self,
        host: &str,
        port: u16,
        ids: &[(i64, i64)],
    ) -> Result<Vec<CharacteristicStatus>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut url = Self::url(host, port, "/characteristics")?;
        url.query_pairs_mut().append_pair("id", &status_query(ids));

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::map_send_error(host, port, e))?;

        // 207 carries values for the readable subset
        if !response.status().is_success() {
            return Err(Self::map_status(host, port, response.status()));
        }
        let body: StatusResponse = response.json().await?;
        Ok(body.characteristics)
    }

    async fn subscribe(&self, host: &str, port: u16, request: &WriteRequest) -> Result<()> {
        let handle = event_stream::open(
            host,
            port,
            &self.pin,
            request,
            self.request_timeout,
            self.events.clone(),
        )
        .await?;

        let mut listeners = self.listeners.lock().await;
        listeners.retain(|h| !h.is_finished());
        listeners.push(handle);
        info!(
            "Listening for {} characteristic event(s) on {host}:{port}",
            request.characteristics.len()
        );
        Ok(())
    }
}

impl Drop for HttpHapClient {
    fn drop(&mut self) {
        if let Ok(listeners) = self.listeners.try_lock() {
            for handle in listeners.iter() {
                handle.abort();
            }
        }
    }
}
