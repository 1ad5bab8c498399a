//! Periodic discovery
//!
//! Passes are serialized: the next sleep only starts once the bridge has
//! answered the previous refresh. The first pass also schedules the one-off
//! sync request.

use super::bridge::BridgeHandle;
use crate::config::TimingConfig;
use crate::storage::IndexStore;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Run discovery forever, persisting the index after each pass
pub async fn run_scheduler(handle: BridgeHandle, timing: TimingConfig, store: Option<IndexStore>) {
    debug!(
        "Waiting {:?} before starting instance discovery",
        timing.startup_delay
    );
    sleep(timing.startup_delay).await;

    let mut first_pass = true;
    loop {
        let report = match handle.refresh().await {
            Ok(report) => report,
            Err(e) => {
                debug!("Stopping scheduler: {e}");
                return;
            }
        };

        if let Some(store) = &store {
            match handle.snapshot().await {
                Ok(services) => {
                    if let Err(e) = store.save(&services).await {
                        warn!("Failed to persist index to {}: {e}", store.path().display());
                    }
                }
                Err(e) => {
                    debug!("Stopping scheduler: {e}");
                    return;
                }
            }
        }

        if first_pass {
            first_pass = false;
            info!(
                "Finished instance discovery: {} new service(s)",
                report.found.len()
            );
            let handle = handle.clone();
            let delay = timing.sync_request_delay;
            tokio::spawn(async move {
                sleep(delay).await;
                if let Err(e) = handle.request_sync().await {
                    warn!("Sync request failed: {e}");
                }
            });
        }

        sleep(timing.refresh_interval).await;
    }
}
