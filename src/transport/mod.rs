//! Transport layer for the monitor
//!
//! This module provides the transport abstraction the connection manager owns
//! and the MQTT implementation of it. A [`Connector`] opens one
//! [`TransportSession`] per `connect()`; the session reports everything that
//! happens on the wire as [`TransportEvent`]s pushed into the monitor's event
//! queue, tagged with the [`SessionId`] that produced them.

use crate::monitor::MonitorEvent;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use tokio::sync::mpsc;

pub mod mqtt;

pub use mqtt::{BrokerEndpoint, ConnectOptions, MqttError};
pub use rumqttc::QoS;

/// Identifies one transport session; superseded sessions never reuse an id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Everything a session reports back to the monitor
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Broker acknowledged the connection
    Connected { session_present: bool },
    /// Link dropped; the transport is retrying on its own
    LinkLost(String),
    /// Unrecoverable failure; the session stopped
    Fatal(String),
    /// Publish received on a subscribed topic
    Message { topic: String, payload: Bytes },
    /// A subscribe request left the client with this packet id
    SubscribeSent { pkid: u16 },
    /// Broker answered a subscribe; `None` marks a rejected filter
    SubscribeAcked {
        pkid: u16,
        granted: Vec<Option<QoS>>,
    },
    /// Outbound publish finished its QoS handshake
    PublishCompleted { pkid: u16 },
}

/// Request handed to a connector when a session is opened
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub endpoint: BrokerEndpoint,
    pub options: ConnectOptions,
}

/// Event sink given to a session, bound to its id
#[derive(Debug, Clone)]
pub struct SessionEvents {
    session: SessionId,
    sender: mpsc::Sender<MonitorEvent>,
}

impl SessionEvents {
    pub fn new(session: SessionId, sender: mpsc::Sender<MonitorEvent>) -> Self {
        Self { session, sender }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Queue an event, waiting for capacity. Returns false once the monitor
    /// has dropped its receiver.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.sender
            .send(MonitorEvent::Transport {
                session: self.session,
                event,
            })
            .await
            .is_ok()
    }
}

/// Opens transport sessions
///
/// The connection manager holds exactly one connector and at most one live
/// session at a time. Tests substitute a fake connector.
pub trait Connector: Send {
    /// Start a session. The returned session must report the connection
    /// outcome asynchronously through `events`.
    fn open(
        &mut self,
        request: &SessionRequest,
        events: SessionEvents,
    ) -> Result<Box<dyn TransportSession>, MqttError>;
}

/// A live transport handle
#[async_trait]
pub trait TransportSession: Send {
    /// Request a subscription; completion arrives as `SubscribeAcked`
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), MqttError>;

    /// Queue a publish without waiting for delivery
    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), MqttError>;

    /// Close the connection and stop every background task of the session
    async fn close(&mut self) -> Result<(), MqttError>;
}

/// Type alias for the production connector
pub type MqttTransport = mqtt::MqttConnector;
