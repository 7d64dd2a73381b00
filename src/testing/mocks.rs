//! Fake transport for testing
//!
//! [`FakeConnector`] opens [`FakeSession`]s that never touch the network.
//! Everything they are asked to do is recorded, and tests drive the monitor
//! by injecting [`TransportEvent`]s through [`FakeConnector::emit`].

use crate::transport::{
    Connector, MqttError, QoS, SessionEvents, SessionId, SessionRequest, TransportEvent,
    TransportSession,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

pub type PublishedMessage = (String, Vec<u8>, QoS);

#[derive(Debug, Default)]
struct FakeState {
    requests: Vec<(SessionId, SessionRequest)>,
    sinks: HashMap<SessionId, SessionEvents>,
    subscriptions: Vec<String>,
    publishes: Vec<PublishedMessage>,
    closed: Vec<SessionId>,
    fail_open: bool,
    fail_publish: bool,
    failing_subscriptions: HashSet<String>,
}

/// Records every session it opens; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        lock(&self.state)
    }

    /// Make subsequent `open` calls fail
    pub fn fail_open(&self, fail: bool) {
        self.state().fail_open = fail;
    }

    /// Make publishes on every session fail at the transport level
    pub fn fail_publish(&self, fail: bool) {
        self.state().fail_publish = fail;
    }

    /// Make the client refuse subscribe requests for `topic`
    pub fn fail_subscribe(&self, topic: &str) {
        self.state().failing_subscriptions.insert(topic.to_string());
    }

    pub fn opened_sessions(&self) -> Vec<SessionId> {
        self.state().requests.iter().map(|(id, _)| *id).collect()
    }

    pub fn last_request(&self) -> Option<SessionRequest> {
        self.state().requests.last().map(|(_, request)| request.clone())
    }

    pub fn last_session(&self) -> Option<SessionId> {
        self.state().requests.last().map(|(id, _)| *id)
    }

    /// Topic filters the client accepted across all sessions, in order
    pub fn subscriptions(&self) -> Vec<String> {
        self.state().subscriptions.clone()
    }

    pub fn publishes(&self) -> Vec<PublishedMessage> {
        self.state().publishes.clone()
    }

    pub fn closed_sessions(&self) -> Vec<SessionId> {
        self.state().closed.clone()
    }

    /// Push an event into the monitor queue as if `session` produced it
    pub async fn emit(&self, session: SessionId, event: TransportEvent) -> bool {
        let sink = self.state().sinks.get(&session).cloned();
        match sink {
            Some(sink) => sink.emit(event).await,
            None => false,
        }
    }

    /// Emit on the most recently opened session
    pub async fn emit_latest(&self, event: TransportEvent) -> bool {
        match self.last_session() {
            Some(session) => self.emit(session, event).await,
            None => false,
        }
    }
}

impl Connector for FakeConnector {
    fn open(
        &mut self,
        request: &SessionRequest,
        events: SessionEvents,
    ) -> Result<Box<dyn TransportSession>, MqttError> {
        let mut state = self.state();
        if state.fail_open {
            return Err(MqttError::ConnectionFailedStr("injected open failure".to_string()));
        }

        let id = events.session();
        state.requests.push((id, request.clone()));
        state.sinks.insert(id, events);

        Ok(Box::new(FakeSession {
            id,
            state: self.state.clone(),
            closed: false,
        }))
    }
}

/// Session handle produced by [`FakeConnector`]
#[derive(Debug)]
pub struct FakeSession {
    id: SessionId,
    state: Arc<Mutex<FakeState>>,
    closed: bool,
}

#[async_trait]
impl TransportSession for FakeSession {
    fn subscribe(&self, topic: &str, _qos: QoS) -> Result<(), MqttError> {
        let mut state = lock(&self.state);
        if state.failing_subscriptions.contains(topic) {
            return Err(MqttError::SubscriptionFailed(
                format!("injected subscribe failure for {topic}").into(),
            ));
        }
        state.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), MqttError> {
        let mut state = lock(&self.state);
        if state.fail_publish {
            return Err(MqttError::PublishFailed("injected publish failure".into()));
        }
        state.publishes.push((topic.to_string(), payload, qos));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), MqttError> {
        if !self.closed {
            self.closed = true;
            lock(&self.state).closed.push(self.id);
        }
        Ok(())
    }
}

fn lock(state: &Mutex<FakeState>) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
