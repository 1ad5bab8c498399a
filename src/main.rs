//! HAP assistant bridge - main entry point

use hap_assistant_bridge::{
    client::{HttpHapClient, PushMessage},
    config::BridgeConfig,
    logging::{init_logging, LogConfig},
    server::{run_scheduler, spawn, BridgeCore},
    services::{unique_id, ServiceIndex},
    storage::IndexStore,
    transport::{LogSink, ReportSink},
    Result,
};

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

const EVENT_BUFFER: usize = 256;
#[cfg(feature = "websocket")]
const OUTBOUND_BUFFER: usize = 64;

/// HAP assistant bridge
#[derive(Parser, Debug)]
#[command(name = "hap-assistant-bridge")]
#[command(about = "Expose HAP accessories to a cloud voice assistant")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, global = true, env = "HAP_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge (default)
    Run,
    /// Validate the configuration and print it
    CheckConfig,
    /// Print the unique id the bridge assigns to a service
    UniqueId {
        /// Instance username, e.g. 0E:3C:22:18:9F:3A
        username: String,
        aid: i64,
        iid: i64,
        /// Service type UUID
        service_type: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run) {
        Command::UniqueId {
            username,
            aid,
            iid,
            service_type,
        } => {
            println!("{}", unique_id(&username, aid, iid, &service_type));
            Ok(())
        }
        Command::CheckConfig => {
            let config = BridgeConfig::load(cli.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Run => {
            let mut config = BridgeConfig::load(cli.config.as_deref())?;
            config.debug |= cli.debug;
            run(config).await
        }
    }
}

async fn run(config: BridgeConfig) -> Result<()> {
    init_logging(LogConfig::from_bridge(&config))?;
    info!("Starting HAP assistant bridge v{}", env!("CARGO_PKG_VERSION"));

    let (event_tx, event_rx) = mpsc::channel::<PushMessage>(EVENT_BUFFER);
    let client = Arc::new(HttpHapClient::new(&config.hap, event_tx)?);

    let store = IndexStore::new(config.persist_path());
    let index = match store.load().await {
        Ok(index) => index,
        Err(e) => {
            warn!("Ignoring unreadable index at {}: {e}", store.path().display());
            ServiceIndex::new()
        }
    };

    #[cfg(feature = "websocket")]
    let outbound = config.cloud.clone().map(|cloud| {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        (cloud, tx, rx)
    });

    #[cfg(feature = "websocket")]
    let sink: Arc<dyn ReportSink> = match &outbound {
        Some((_, tx, _)) => Arc::new(hap_assistant_bridge::transport::ChannelSink::new(tx.clone())),
        None => Arc::new(LogSink),
    };
    #[cfg(not(feature = "websocket"))]
    let sink: Arc<dyn ReportSink> = {
        if config.cloud.is_some() {
            warn!("Cloud endpoint configured but the websocket feature is disabled");
        }
        Arc::new(LogSink)
    };

    if config.cloud.is_none() {
        info!("No cloud endpoint configured; state reports are only logged");
    }

    let core = BridgeCore::new(&config, client, sink).with_index(index);
    let (handle, bridge_task) = spawn(core, event_rx);

    #[cfg(feature = "websocket")]
    let _cloud_link = outbound.map(|(cloud, tx, rx)| {
        let link = hap_assistant_bridge::transport::websocket::CloudLink::new(
            cloud,
            handle.clone(),
            tx,
            rx,
        );
        tokio::spawn(link.run())
    });

    let scheduler = tokio::spawn(run_scheduler(
        handle.clone(),
        config.timing.clone(),
        Some(store.clone()),
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    scheduler.abort();
    if let Ok(services) = handle.snapshot().await {
        if let Err(e) = store.save(&services).await {
            warn!("Failed to persist index on shutdown: {e}");
        }
    }
    handle.shutdown().await?;
    if let Err(e) = bridge_task.await {
        warn!("Bridge task ended abnormally: {e}");
    }

    Ok(())
}
