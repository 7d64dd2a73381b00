//! MQTT implementation of the transport layer
//!
//! This module keeps pure functions apart from I/O for testability.
//!
//! # Architecture
//!
//! - [`connection`] - Pure broker addressing, options and error types
//! - [`status`] - Pure connection-status state machine and reconnection policy
//! - [`event_mapper`] - Pure mapping of rumqttc events to transport events
//! - [`client`] - Impure rumqttc session and its driver task
//!
//! # Usage
//!
//! ```rust,no_run
//! use fuzzmon::config::MonitorConfig;
//! use fuzzmon::monitor::Monitor;
//! use fuzzmon::transport::mqtt::MqttConnector;
//!
//! # tokio_test::block_on(async {
//! let config = MonitorConfig::default();
//! let connector = MqttConnector::from_config(&config);
//! let mut monitor = Monitor::new(connector, &config);
//! monitor.connect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod event_mapper;
pub mod status;

pub use client::{MqttConnector, MqttSession};
pub use connection::{
    configure_mqtt_options, BrokerEndpoint, BrokerScheme, ConnectOptions, MqttError,
    ReconnectConfig,
};
pub use event_mapper::{ErrorClass, EventMapper};
pub use status::{ConnectionEvent, ConnectionStatus, ReconnectionDecision, StatusMachine};
