//! fuzzmon - live monitoring client for fuzzing campaigns
//!
//! Connects to the MQTT broker a fuzzing backend publishes on and keeps an
//! up-to-date picture of the campaign: the control-flow graph, the coverage
//! chart, run statistics and the active breakpoint set.
//!
//! # Overview
//!
//! - [`transport`]: broker endpoints, the rumqttc session driver and the
//!   connection status machine
//! - [`monitor`]: the event loop tying together the connection manager,
//!   topic router, visualization store and publisher
//! - [`viewport`]: per-diagram pan/zoom state, independent from content
//! - [`protocol`]: the topic set and payload schemas
//! - [`console`]: the terminal renderer behind `fuzzmon run`
//!
//! # Quick Start
//!
//! ```rust
//! use fuzzmon::monitor::{TopicRouter, VisualizationStore};
//!
//! let store = VisualizationStore::new();
//! let router = TopicRouter::new();
//!
//! let outcome = router.dispatch(&store, "fuzzer_stats", br#"{"coverage": 12, "runs": 340}"#);
//!
//! assert!(outcome.is_applied());
//! assert_eq!(store.stats().coverage, 12);
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod monitor;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;
pub mod viewport;

pub use config::{ConfigError, MonitorConfig};
pub use error::{MonitorError, MonitorResult};
pub use monitor::{Monitor, MonitorEvent, MonitorHandle, MonitorView, Publisher};
pub use protocol::{BreakpointList, BreakpointRecord, FuzzerStats, Topic};
pub use transport::mqtt::{ConnectionStatus, MqttConnector};
pub use viewport::{Diagram, Tool, Viewport, ViewportAction};
