//! Logging setup
//!
//! Logs always go to stderr; a configured log file additionally receives a
//! plain-text copy rotated daily. `RUST_LOG` overrides the default level.

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: Level,

    /// Daily-rotated log file
    pub file_path: Option<PathBuf>,

    /// Include thread IDs
    pub thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_path: None,
            thread_ids: false,
        }
    }
}

impl LogConfig {
    /// Derive logging settings from the bridge configuration
    pub fn from_bridge(config: &BridgeConfig) -> Self {
        Self {
            level: if config.debug { Level::DEBUG } else { Level::INFO },
            file_path: config.log_file.clone(),
            ..Default::default()
        }
    }
}

/// Install the global subscriber
pub fn init_logging(config: LogConfig) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(config.thread_ids);

    let file_layer = match &config.file_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let appender = tracing_appender::rolling::daily(
                path.parent().unwrap_or_else(|| Path::new(".")),
                path.file_name()
                    .unwrap_or_else(|| OsStr::new("hap-assistant-bridge.log")),
            );
            Some(
                fmt::layer()
                    .with_writer(appender)
                    .with_ansi(false)
                    .with_thread_ids(config.thread_ids),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| BridgeError::config(format!("Failed to initialize logging: {e}")))
}
