//! Configuration for the fuzzing monitor
//!
//! Every section is optional; an empty file yields a monitor pointed at the
//! fuzzer's default WebSocket broker on `127.0.0.1:9001`.

use crate::transport::mqtt::{BrokerEndpoint, ReconnectConfig};
use crate::viewport::Tool;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Main monitor configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub events: EventsSection,
    #[serde(default)]
    pub viewport: ViewportSection,
}

/// MQTT connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL: mqtt://, mqtts://, ws://, wss:// (http/https alias ws/wss)
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    /// Prefix of the generated MQTT client id
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Validate the broker's TLS certificate
    #[serde(default)]
    pub verify_tls: bool,
    /// Re-issue subscriptions after the transport reconnects
    #[serde(default = "default_true")]
    pub resubscribe_on_reconnect: bool,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Largest accepted packet; SVG markup for big CFGs runs to megabytes
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

fn default_broker_url() -> String {
    "ws://127.0.0.1:9001/mqtt".to_string()
}

fn default_client_id_prefix() -> String {
    "fuzzmon".to_string()
}

fn default_true() -> bool {
    true
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_max_packet_size() -> usize {
    16 * 1024 * 1024
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
            client_id_prefix: default_client_id_prefix(),
            username_env: None,
            password_env: None,
            verify_tls: false,
            resubscribe_on_reconnect: true,
            keep_alive_secs: default_keep_alive_secs(),
            max_packet_size: default_max_packet_size(),
        }
    }
}

/// Reconnection policy applied by the transport driver
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    /// Attempts before the connection is declared failed (0 = unlimited)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>,
    /// Delay used once `backoff_ms` is exhausted
    #[serde(default = "default_sustained_delay_ms")]
    pub sustained_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    20
}

fn default_backoff_ms() -> Vec<u64> {
    vec![250, 500, 1000, 2000, 5000]
}

fn default_sustained_delay_ms() -> u64 {
    5000
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            sustained_delay_ms: default_sustained_delay_ms(),
        }
    }
}

impl ReconnectSection {
    pub fn to_reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
            backoff_pattern: self.backoff_ms.clone(),
            sustained_delay: self.sustained_delay_ms,
        }
    }
}

/// Event queue sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventsSection {
    /// Capacity of the monitor's single event queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Pan/zoom behaviour shared by the diagram views
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewportSection {
    #[serde(default = "default_zoom_min")]
    pub zoom_min: f64,
    #[serde(default = "default_zoom_max")]
    pub zoom_max: f64,
    /// Zoom factor applied per wheel notch
    #[serde(default = "default_wheel_scale_factor")]
    pub wheel_scale_factor: f64,
    #[serde(default = "default_tool")]
    pub default_tool: Tool,
    /// Size of the drawing surface the markup is placed on
    #[serde(default = "default_content_width")]
    pub content_width: f64,
    #[serde(default = "default_content_height")]
    pub content_height: f64,
    /// Initial viewer size until the first resize arrives
    #[serde(default = "default_viewer_size")]
    pub viewer_width: f64,
    #[serde(default = "default_viewer_size")]
    pub viewer_height: f64,
}

fn default_zoom_min() -> f64 {
    0.02
}

fn default_zoom_max() -> f64 {
    50.0
}

fn default_wheel_scale_factor() -> f64 {
    2.0
}

fn default_tool() -> Tool {
    Tool::Pan
}

fn default_content_width() -> f64 {
    10_000.0
}

fn default_content_height() -> f64 {
    15_000.0
}

fn default_viewer_size() -> f64 {
    400.0
}

impl Default for ViewportSection {
    fn default() -> Self {
        Self {
            zoom_min: default_zoom_min(),
            zoom_max: default_zoom_max(),
            wheel_scale_factor: default_wheel_scale_factor(),
            default_tool: default_tool(),
            content_width: default_content_width(),
            content_height: default_content_height(),
            viewer_width: default_viewer_size(),
            viewer_height: default_viewer_size(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MonitorConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: MonitorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        BrokerEndpoint::parse(&self.mqtt.broker_url)
            .map_err(|_| ConfigError::InvalidBrokerUrl(self.mqtt.broker_url.clone()))?;

        self.reconnect
            .to_reconnect_config()
            .validate()
            .map_err(ConfigError::InvalidConfig)?;

        if self.events.queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "events.queue_capacity must be greater than 0".to_string(),
            ));
        }

        let viewport = &self.viewport;
        if !(viewport.zoom_min > 0.0 && viewport.zoom_min < viewport.zoom_max) {
            return Err(ConfigError::InvalidConfig(format!(
                "viewport zoom range must satisfy 0 < zoom_min < zoom_max, got {}..{}",
                viewport.zoom_min, viewport.zoom_max
            )));
        }
        if viewport.wheel_scale_factor <= 1.0 {
            return Err(ConfigError::InvalidConfig(
                "viewport.wheel_scale_factor must be greater than 1".to_string(),
            ));
        }
        if viewport.content_width <= 0.0 || viewport.content_height <= 0.0 {
            return Err(ConfigError::InvalidConfig(
                "viewport content size must be positive".to_string(),
            ));
        }
        if !(viewport.viewer_width > 0.0 && viewport.viewer_height > 0.0) {
            return Err(ConfigError::InvalidConfig(
                "viewport viewer size must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Get MQTT username from environment variable
    pub fn get_mqtt_username(&self) -> Option<String> {
        get_env_var_optional(self.mqtt.username_env.as_ref())
    }

    /// Get MQTT password from environment variable
    pub fn get_mqtt_password(&self) -> Option<String> {
        get_env_var_optional(self.mqtt.password_env.as_ref())
    }
}

fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
    env_var_name.and_then(|name| std::env::var(name).ok())
}
