//! Error types for the HAP assistant bridge
//!
//! Failures are scoped: a connectivity or parse problem with one instance is
//! reported through these types but never aborts work on other instances.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Error types for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Instance unreachable (ping or listing failed)
    #[error("Connectivity failure: {0}")]
    Connectivity(String),

    /// Malformed accessory tree from an instance
    #[error("Parse failure: {0}")]
    Parse(String),

    /// Push registration rejected by an instance
    #[error("Subscription failure: {0}")]
    Subscription(String),

    /// A live control or status call failed
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Adapter cannot express a command for the service
    #[error("Unsupported command: {0}")]
    TranslationUnsupported(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network discovery errors
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// WebSocket errors
    #[cfg(feature = "websocket")]
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not found errors (services, instances)
    #[error("Not found: {0}")]
    NotFound(String),

    /// The bridge actor has shut down
    #[error("Bridge unavailable: {0}")]
    Unavailable(String),
}

/// Structured error code for machine-readable error handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Connection errors (1000-1099)
    ConnectionTimeout,
    InstanceUnreachable,
    TransportFailed,

    // Configuration errors (1200-1299)
    ConfigurationInvalid,

    // Device errors (1300-1399)
    DeviceNotFound,
    DeviceTypeUnsupported,
    SubscriptionRejected,

    // Data errors (1400-1499)
    ParsingFailed,
    InvalidInput,

    // Discovery errors (1500-1599)
    DiscoveryFailed,

    // Internal errors (1900-1999)
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get numeric error code
    pub fn as_number(&self) -> u32 {
        match self {
            ErrorCode::ConnectionTimeout => 1001,
            ErrorCode::InstanceUnreachable => 1002,
            ErrorCode::TransportFailed => 1003,

            ErrorCode::ConfigurationInvalid => 1201,

            ErrorCode::DeviceNotFound => 1301,
            ErrorCode::DeviceTypeUnsupported => 1302,
            ErrorCode::SubscriptionRejected => 1303,

            ErrorCode::ParsingFailed => 1401,
            ErrorCode::InvalidInput => 1402,

            ErrorCode::DiscoveryFailed => 1501,

            ErrorCode::ServiceUnavailable => 1901,
        }
    }

    /// Get error category
    pub fn category(&self) -> &'static str {
        match self.as_number() {
            1000..=1099 => "connection",
            1200..=1299 => "configuration",
            1300..=1399 => "device",
            1400..=1499 => "data",
            1500..=1599 => "discovery",
            _ => "internal",
        }
    }
}

impl BridgeError {
    /// Create a connectivity error
    pub fn connectivity<S: Into<String>>(msg: S) -> Self {
        BridgeError::Connectivity(msg.into())
    }

    /// Create a parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        BridgeError::Parse(msg.into())
    }

    /// Create a subscription error
    pub fn subscription<S: Into<String>>(msg: S) -> Self {
        BridgeError::Subscription(msg.into())
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        BridgeError::Transport(msg.into())
    }

    /// Create an unsupported-command error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        BridgeError::TranslationUnsupported(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        BridgeError::Config(msg.into())
    }

    /// Create a discovery error
    pub fn discovery<S: Into<String>>(msg: S) -> Self {
        BridgeError::Discovery(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        BridgeError::Timeout(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        BridgeError::InvalidInput(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        BridgeError::NotFound(msg.into())
    }

    /// Create an unavailable error
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        BridgeError::Unavailable(msg.into())
    }

    /// Create a websocket error
    #[cfg(feature = "websocket")]
    pub fn websocket<S: Into<String>>(msg: S) -> Self {
        BridgeError::WebSocket(msg.into())
    }

    /// Map this error to its structured code
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            BridgeError::Connectivity(_) => ErrorCode::InstanceUnreachable,
            BridgeError::Parse(_) | BridgeError::Json(_) => ErrorCode::ParsingFailed,
            BridgeError::Subscription(_) => ErrorCode::SubscriptionRejected,
            BridgeError::Transport(_) | BridgeError::Http(_) | BridgeError::Io(_) => {
                ErrorCode::TransportFailed
            }
            #[cfg(feature = "websocket")]
            BridgeError::WebSocket(_) => ErrorCode::TransportFailed,
            BridgeError::TranslationUnsupported(_) => ErrorCode::DeviceTypeUnsupported,
            BridgeError::Config(_) => ErrorCode::ConfigurationInvalid,
            BridgeError::Discovery(_) => ErrorCode::DiscoveryFailed,
            BridgeError::Timeout(_) => ErrorCode::ConnectionTimeout,
            BridgeError::InvalidInput(_) => ErrorCode::InvalidInput,
            BridgeError::NotFound(_) => ErrorCode::DeviceNotFound,
            BridgeError::Unavailable(_) => ErrorCode::ServiceUnavailable,
        }
    }

    /// Whether a later attempt could succeed without a config change.
    ///
    /// Control writes are never retried by the bridge itself; this only
    /// informs discovery and reconnect loops.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Connectivity(_)
            | BridgeError::Transport(_)
            | BridgeError::Timeout(_)
            | BridgeError::Discovery(_)
            | BridgeError::Io(_) => true,
            #[cfg(feature = "websocket")]
            BridgeError::WebSocket(_) => true,
            BridgeError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl From<config::ConfigError> for BridgeError {
    fn from(err: config::ConfigError) -> Self {
        BridgeError::Config(err.to_string())
    }
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BridgeError::WebSocket(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_categorized() {
        assert_eq!(
            BridgeError::connectivity("ping failed").to_error_code(),
            ErrorCode::InstanceUnreachable
        );
        assert_eq!(ErrorCode::InstanceUnreachable.category(), "connection");
        assert_eq!(ErrorCode::ParsingFailed.as_number(), 1401);
        assert_eq!(ErrorCode::DiscoveryFailed.category(), "discovery");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BridgeError::transport("reset").is_retryable());
        assert!(!BridgeError::parse("bad json").is_retryable());
        assert!(!BridgeError::config("missing").is_retryable());
    }
}
