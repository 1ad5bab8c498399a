//! mDNS browsing for `_hap._tcp` instances

#![cfg(feature = "discovery")]

use crate::client::Endpoint;
use crate::error::{BridgeError, Result};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// HAP service type advertised by accessory servers
pub const HAP_SERVICE_TYPE: &str = "_hap._tcp.local.";

/// Browse for instances for `window`, returning one endpoint per identity
pub async fn browse(window: Duration) -> Result<Vec<Endpoint>> {
    let daemon = ServiceDaemon::new()
        .map_err(|e| BridgeError::discovery(format!("Failed to start mDNS daemon: {e}")))?;
    let receiver = daemon
        .browse(HAP_SERVICE_TYPE)
        .map_err(|e| BridgeError::discovery(format!("Failed to browse {HAP_SERVICE_TYPE}: {e}")))?;

    let deadline = Instant::now() + window;
    let mut found: HashMap<String, Endpoint> = HashMap::new();

    loop {
        match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
            Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                if let Some(endpoint) = endpoint_from(&info) {
                    trace!("Resolved {} at {}:{}", endpoint.username, endpoint.host, endpoint.port);
                    found.entry(endpoint.username.to_lowercase()).or_insert(endpoint);
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                debug!("mDNS receiver closed: {e}");
                break;
            }
            Err(_) => break,
        }
    }

    let _ = daemon.stop_browse(HAP_SERVICE_TYPE);
    let _ = daemon.shutdown();

    debug!("mDNS browse found {} instance(s)", found.len());
    Ok(found.into_values().collect())
}

fn endpoint_from(info: &ServiceInfo) -> Option<Endpoint> {
    let username = info.get_property_val_str("id")?.to_string();
    // Prefer IPv4; instances commonly advertise link-local IPv6 too
    let mut addresses: Vec<_> = info.get_addresses().iter().copied().collect();
    addresses.sort_by_key(|a| !a.is_ipv4());
    let address = addresses.first()?;

    Some(Endpoint {
        host: address.to_string(),
        port: info.get_port(),
        username,
    })
}
