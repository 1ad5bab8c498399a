//! Configuration management for the HAP assistant bridge
//!
//! Configuration is layered: built-in defaults, then an optional file
//! (TOML/JSON/YAML, anything the `config` crate understands), then
//! `HAP_BRIDGE__*` environment variables.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment prefix for overrides, e.g. `HAP_BRIDGE__HAP__PIN`
pub const ENV_PREFIX: &str = "HAP_BRIDGE";

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Local accessory protocol settings
    pub hap: HapConfig,

    /// Services whose resolved name contains any of these substrings are ignored
    pub accessory_filter: Vec<String>,

    /// Services whose accessory serial number equals any of these are ignored
    pub accessory_serial_filter: Vec<String>,

    /// Instance usernames that are never parsed (case-insensitive)
    pub instance_blacklist: Vec<String>,

    /// Exact-match service rename rules
    pub device_name_map: Vec<RenameRule>,

    /// Pin required for secure device categories
    pub two_factor_auth_pin: Option<String>,

    /// Expose secure categories even when no pin is configured
    pub disable_pin_code_requirement: bool,

    /// Extra spoken names for television channels
    pub channel_aliases: Vec<ChannelAlias>,

    /// Report temperatures to the assistant in Fahrenheit
    pub force_fahrenheit: bool,

    /// Enable debug logging
    pub debug: bool,

    /// Scheduling of discovery and reports
    pub timing: TimingConfig,

    /// Consecutive missed discovery passes before a service is evicted
    pub lost_limit: u32,

    /// Keep television cycling anchors when a service is rediscovered
    pub retain_cycling_state: bool,

    /// Assistant cloud connection (bridge runs offline when absent)
    pub cloud: Option<CloudConfig>,

    /// Where the service index is persisted
    pub persist_path: Option<PathBuf>,

    /// Optional log file (rotated daily)
    pub log_file: Option<PathBuf>,
}

/// Local accessory protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HapConfig {
    /// Pin presented to instances in the `Authorization` header
    pub pin: String,

    /// Statically configured instances
    pub instances: Vec<StaticInstance>,

    /// Browse the network for `_hap._tcp` instances
    pub mdns: bool,

    /// mDNS browse window
    #[serde(with = "humantime_serde")]
    pub browse_timeout: Duration,

    /// Per-request timeout for control, status and listing calls
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// An instance reachable without mDNS
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaticInstance {
    pub host: String,
    pub port: u16,
    /// Instance identity (the `id` TXT record, e.g. `0E:3C:22:18:9F:3A`)
    pub username: String,
}

/// Replace a resolved service name verbatim
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenameRule {
    pub replace: String,
    pub with: String,
}

/// Additional names for a television channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelAlias {
    /// Channel configured name (without station prefix)
    pub channel: String,
    pub alias: Vec<String>,
}

/// Discovery and reporting schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay before the first discovery pass
    #[serde(with = "humantime_serde")]
    pub startup_delay: Duration,

    /// Interval between discovery passes
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,

    /// Delay between the first completed pass and the sync request
    #[serde(with = "humantime_serde")]
    pub sync_request_delay: Duration,

    /// Quiescence window for push-driven state reports
    #[serde(with = "humantime_serde")]
    pub report_debounce: Duration,
}

/// Assistant cloud websocket endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    pub url: Url,
    pub token: String,
    #[serde(with = "humantime_serde", default = "default_reconnect_delay")]
    pub reconnect_delay: Duration,
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(10)
}

impl Default for HapConfig {
    fn default() -> Self {
        Self {
            pin: "031-45-154".to_string(),
            instances: Vec::new(),
            mdns: true,
            browse_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(15),
            // 96 passes of 15 minutes is one day of absence before eviction
            refresh_interval: Duration::from_secs(900),
            sync_request_delay: Duration::from_secs(15),
            report_debounce: Duration::from_secs(1),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            hap: HapConfig::default(),
            accessory_filter: Vec::new(),
            accessory_serial_filter: Vec::new(),
            instance_blacklist: Vec::new(),
            device_name_map: Vec::new(),
            two_factor_auth_pin: None,
            disable_pin_code_requirement: false,
            channel_aliases: Vec::new(),
            force_fahrenheit: false,
            debug: false,
            timing: TimingConfig::default(),
            lost_limit: 96,
            retain_cycling_state: false,
            cloud: None,
            persist_path: None,
            log_file: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(BridgeError::config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        let loaded: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("accessory_filter")
                    .with_list_parse_key("accessory_serial_filter")
                    .with_list_parse_key("instance_blacklist"),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.timing.report_debounce.is_zero() {
            return Err(BridgeError::config("timing.report_debounce must be non-zero"));
        }
        if self.timing.refresh_interval.is_zero() {
            return Err(BridgeError::config("timing.refresh_interval must be non-zero"));
        }
        if let Some(rule) = self.device_name_map.iter().find(|r| r.replace.is_empty()) {
            return Err(BridgeError::config(format!(
                "device_name_map entry renaming to '{}' has an empty 'replace'",
                rule.with
            )));
        }
        if let Some(pin) = &self.two_factor_auth_pin {
            if pin.trim().is_empty() {
                return Err(BridgeError::config("two_factor_auth_pin must not be blank"));
            }
        }
        Ok(())
    }

    /// Effective persistence path for the service index
    pub fn persist_path(&self) -> PathBuf {
        self.persist_path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".hap-assistant-bridge")
                .join("services.json")
        })
    }
}
