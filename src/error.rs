//! Top-level error type for the monitor binary
//!
//! Each boundary keeps its own error enum (`MqttError`, `ConfigError`);
//! this one aggregates them for callers that cross several.

use crate::config::ConfigError;
use crate::transport::MqttError;
use std::time::Duration;
use thiserror::Error;

/// Main error type for monitor operations
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] MqttError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    #[error("Timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    #[error("Connection failed: {status}")]
    ConnectionFailed { status: String },

    #[error("Publish to {topic} failed: {cause}")]
    PublishFailed { topic: String, cause: String },
}

impl MonitorError {
    pub fn timeout<S: Into<String>>(what: S, waited: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            waited,
        }
    }
}

/// Result type alias for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let transport: MonitorError = MqttError::InvalidBrokerUrl("x".to_string()).into();
        assert!(matches!(transport, MonitorError::Transport(_)));

        let config: MonitorError = ConfigError::InvalidConfig("bad".to_string()).into();
        assert!(config.to_string().contains("bad"));

        let io: MonitorError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(matches!(io, MonitorError::Io(_)));
    }

    #[test]
    fn test_timeout_display() {
        let error = MonitorError::timeout("broker acknowledgement", Duration::from_secs(5));
        assert_eq!(
            error.to_string(),
            "Timed out after 5s waiting for broker acknowledgement"
        );
    }

    #[test]
    fn test_publish_failure_is_not_reported_as_connection_failure() {
        let error = MonitorError::PublishFailed {
            topic: "fuzzer_commands".to_string(),
            cause: "event queue full".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Publish to fuzzer_commands failed: event queue full"
        );
        assert!(!error.to_string().starts_with("Connection failed"));
    }
}
