//! Connection manager
//!
//! Owns the single transport session and the connection status. Transport
//! events for the live session are folded into the status through
//! [`StatusMachine`]; entering `Connected` arms the subscription set.
//!
//! Subscribe requests are correlated with their SubAck by packet id. The
//! client assigns ids in request order, so requests wait in a FIFO until the
//! transport reports the id it used. Requests still queued in the client
//! survive a link loss and are not issued again on reconnect.

use super::MonitorEvent;
use crate::protocol::Topic;
use crate::transport::mqtt::{ConnectionEvent, ConnectionStatus, StatusMachine};
use crate::transport::{
    BrokerEndpoint, ConnectOptions, Connector, MqttError, QoS, SessionEvents, SessionId,
    SessionRequest, TransportEvent, TransportSession,
};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// A message delivered on the live session
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Per-topic subscription progress on the live session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Handed to the client, no packet id yet
    Requested,
    /// Subscribe packet sent, awaiting SubAck
    Sent { pkid: u16 },
    Granted(QoS),
    Rejected,
    /// The client refused the request
    Failed,
}

struct ActiveSession {
    id: SessionId,
    handle: Box<dyn TransportSession>,
    options: ConnectOptions,
    /// Subscribe requests issued but not yet assigned a packet id
    unsent_subscriptions: VecDeque<Topic>,
    /// Subscribe packets awaiting SubAck
    inflight_subscriptions: HashMap<u16, Topic>,
    subscriptions: HashMap<Topic, SubscriptionState>,
}

pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    session: Option<ActiveSession>,
    status: watch::Sender<ConnectionStatus>,
    events: mpsc::Sender<MonitorEvent>,
    next_session: u64,
}

impl ConnectionManager {
    pub fn new(connector: Box<dyn Connector>, events: mpsc::Sender<MonitorEvent>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            connector,
            session: None,
            status,
            events,
            next_session: 1,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Id of the live session, if any
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|session| session.id)
    }

    /// Subscription progress for `topic` on the live session
    pub fn subscription(&self, topic: Topic) -> Option<SubscriptionState> {
        self.session
            .as_ref()
            .and_then(|active| active.subscriptions.get(&topic).copied())
    }

    /// Open a new session, closing any previous one first
    pub async fn connect(
        &mut self,
        broker_uri: &str,
        options: ConnectOptions,
    ) -> Result<SessionId, MqttError> {
        self.close_session().await;
        self.transition(ConnectionEvent::ConnectRequested);

        let endpoint = match BrokerEndpoint::parse(broker_uri) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.transition(ConnectionEvent::Fatal(e.to_string()));
                return Err(e);
            }
        };

        let id = SessionId(self.next_session);
        self.next_session += 1;

        let request = SessionRequest { endpoint, options };
        let handle = match self
            .connector
            .open(&request, SessionEvents::new(id, self.events.clone()))
        {
            Ok(handle) => handle,
            Err(e) => {
                self.transition(ConnectionEvent::Fatal(e.to_string()));
                return Err(e);
            }
        };

        info!(session = %id, broker = %request.endpoint, "Connecting");
        self.session = Some(ActiveSession {
            id,
            handle,
            options,
            unsent_subscriptions: VecDeque::new(),
            inflight_subscriptions: HashMap::new(),
            subscriptions: HashMap::new(),
        });
        Ok(id)
    }

    /// Close the session and move to `Disconnected`
    pub async fn disconnect(&mut self) {
        self.close_session().await;
        self.transition(ConnectionEvent::Closed);
    }

    /// Fold one transport event into the status. Returns the message to route
    /// when the event carried one.
    pub async fn handle_transport_event(
        &mut self,
        session: SessionId,
        event: TransportEvent,
    ) -> Option<InboundMessage> {
        if self.session_id() != Some(session) {
            debug!(%session, ?event, "Discarding event from superseded session");
            return None;
        }

        match event {
            TransportEvent::Connected { session_present } => {
                let from = self.status();
                if self.transition(ConnectionEvent::ConnAckReceived).is_some() {
                    let resubscribe = self
                        .session
                        .as_ref()
                        .is_some_and(|s| s.options.resubscribe_on_reconnect);
                    if StatusMachine::should_subscribe(from, resubscribe) {
                        self.subscribe_all();
                    } else {
                        debug!(session_present, "Relying on persistent session subscriptions");
                    }
                }
                None
            }
            TransportEvent::LinkLost(reason) => {
                // unacked subscribe packets die with the link
                if let Some(active) = self.session.as_mut() {
                    active.inflight_subscriptions.clear();
                }
                self.transition(ConnectionEvent::LinkLost(reason));
                None
            }
            TransportEvent::Fatal(reason) => {
                self.transition(ConnectionEvent::Fatal(reason));
                self.close_session().await;
                None
            }
            TransportEvent::Message { topic, payload } => Some(InboundMessage { topic, payload }),
            TransportEvent::SubscribeSent { pkid } => {
                if let Some(active) = self.session.as_mut() {
                    match active.unsent_subscriptions.pop_front() {
                        Some(topic) => {
                            active.inflight_subscriptions.insert(pkid, topic);
                            active
                                .subscriptions
                                .insert(topic, SubscriptionState::Sent { pkid });
                        }
                        None => debug!(pkid, "Subscribe packet for untracked request"),
                    }
                }
                None
            }
            TransportEvent::SubscribeAcked { pkid, granted } => {
                let Some(active) = self.session.as_mut() else {
                    return None;
                };
                let Some(topic) = active.inflight_subscriptions.remove(&pkid) else {
                    debug!(pkid, ?granted, "SubAck for untracked subscribe packet");
                    return None;
                };
                let state = match granted.first() {
                    Some(Some(qos)) => {
                        info!(%topic, ?qos, "Subscribed");
                        SubscriptionState::Granted(*qos)
                    }
                    _ => {
                        warn!(%topic, "Subscription rejected by broker");
                        SubscriptionState::Rejected
                    }
                };
                active.subscriptions.insert(topic, state);
                None
            }
            TransportEvent::PublishCompleted { pkid } => {
                debug!(pkid, "Publish completed");
                None
            }
        }
    }

    /// Hand a publish to the live session
    ///
    /// Fails with `NotConnected` when not connected, without touching the
    /// status. A transport failure additionally moves to `ConnectionError`.
    pub async fn publish(&mut self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), MqttError> {
        let status = self.status();
        let result = match self.session.as_ref() {
            Some(session) if StatusMachine::can_publish(status) => {
                session.handle.publish(topic, payload, qos)
            }
            _ => return Err(MqttError::NotConnected { status }),
        };

        if let Err(e) = result {
            self.transition(ConnectionEvent::Fatal(e.to_string()));
            self.close_session().await;
            return Err(e);
        }
        Ok(())
    }

    fn subscribe_all(&mut self) {
        let Some(active) = self.session.as_mut() else {
            return;
        };

        for topic in Topic::ALL {
            if active.unsent_subscriptions.contains(&topic) {
                debug!(%topic, "Subscription still queued from before reconnect");
                continue;
            }
            let state = match active.handle.subscribe(topic.as_str(), QoS::ExactlyOnce) {
                Ok(()) => {
                    debug!(%topic, "Subscription requested");
                    active.unsent_subscriptions.push_back(topic);
                    SubscriptionState::Requested
                }
                Err(e) => {
                    warn!(%topic, error = %e, "Subscription failed");
                    SubscriptionState::Failed
                }
            };
            active.subscriptions.insert(topic, state);
        }
    }

    fn transition(&mut self, event: ConnectionEvent) -> Option<ConnectionStatus> {
        let from = self.status();
        let to = StatusMachine::apply(from, &event)?;
        StatusMachine::log_state_transition(from, to, &event);
        self.status.send_replace(to);
        Some(to)
    }

    async fn close_session(&mut self) {
        if let Some(mut active) = self.session.take() {
            debug!(session = %active.id, "Closing session");
            if let Err(e) = active.handle.close().await {
                warn!(session = %active.id, error = %e, "Error while closing session");
            }
        }
    }
}
