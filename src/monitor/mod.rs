//! The monitor event loop
//!
//! [`Monitor`] owns the connection manager, topic router, visualization store
//! and viewport controller, and drains one bounded queue of
//! [`MonitorEvent`]s one at a time. Transport drivers, publishers and UI
//! handles only ever talk to it through that queue.
//!
//! ```rust,no_run
//! use fuzzmon::config::MonitorConfig;
//! use fuzzmon::monitor::Monitor;
//! use fuzzmon::testing::FakeConnector;
//!
//! # tokio_test::block_on(async {
//! let config = MonitorConfig::default();
//! let mut monitor = Monitor::new(FakeConnector::new(), &config);
//! let view = monitor.view();
//! monitor.connect().await.unwrap();
//! println!("{}", *view.status.borrow());
//! # });
//! ```

pub mod connection_manager;
pub mod publisher;
pub mod router;
pub mod store;

pub use connection_manager::{ConnectionManager, InboundMessage, SubscriptionState};
pub use publisher::{log_publish_failure, ErrorCallback, PublishFailure, PublishRequest, Publisher};
pub use router::{DispatchOutcome, TopicRouter};
pub use store::{StoreSnapshot, StoreWatch, VisualizationStore};

use crate::config::MonitorConfig;
use crate::protocol::Topic;
use crate::transport::mqtt::ConnectionStatus;
use crate::transport::{ConnectOptions, Connector, MqttError, SessionId, TransportEvent};
use crate::viewport::{Diagram, Viewport, ViewportAction, ViewportController};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Everything the monitor reacts to
#[derive(Debug)]
pub enum MonitorEvent {
    /// Reported by the transport session `session`
    Transport {
        session: SessionId,
        event: TransportEvent,
    },
    /// (Re)connect to the configured broker
    Connect,
    Disconnect,
    Publish(PublishRequest),
    Viewport {
        diagram: Diagram,
        action: ViewportAction,
    },
    Resize {
        diagram: Diagram,
        width: f64,
        height: f64,
    },
    /// Begin teardown; later events are discarded
    Shutdown,
}

/// Read side of the monitor for renderers
#[derive(Debug, Clone)]
pub struct MonitorView {
    pub status: watch::Receiver<ConnectionStatus>,
    pub store: StoreWatch,
    pub graph_viewport: watch::Receiver<Viewport>,
    pub coverage_viewport: watch::Receiver<Viewport>,
}

/// Cloneable sender for UI-side events
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    sender: mpsc::Sender<MonitorEvent>,
}

impl MonitorHandle {
    /// Queue an event without waiting. Returns false and logs when the
    /// queue is full or the monitor has stopped.
    pub fn send(&self, event: MonitorEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(?event, "Monitor event queue full, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Monitor stopped, dropping event");
                false
            }
        }
    }

    pub fn connect(&self) -> bool {
        self.send(MonitorEvent::Connect)
    }

    pub fn disconnect(&self) -> bool {
        self.send(MonitorEvent::Disconnect)
    }

    pub fn viewport(&self, diagram: Diagram, action: ViewportAction) -> bool {
        self.send(MonitorEvent::Viewport { diagram, action })
    }

    pub fn resize(&self, diagram: Diagram, width: f64, height: f64) -> bool {
        self.send(MonitorEvent::Resize {
            diagram,
            width,
            height,
        })
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.sender.clone())
    }

    /// Request teardown, waiting for queue capacity
    pub async fn shutdown(&self) {
        let _ = self.sender.send(MonitorEvent::Shutdown).await;
    }
}

pub struct Monitor {
    connection: ConnectionManager,
    router: TopicRouter,
    store: VisualizationStore,
    viewports: ViewportController,
    sender: mpsc::Sender<MonitorEvent>,
    receiver: mpsc::Receiver<MonitorEvent>,
    broker_url: String,
    connect_options: ConnectOptions,
    shutting_down: bool,
}

impl Monitor {
    pub fn new<C>(connector: C, config: &MonitorConfig) -> Self
    where
        C: Connector + 'static,
    {
        let (sender, receiver) = mpsc::channel(config.events.queue_capacity.max(1));

        Self {
            connection: ConnectionManager::new(Box::new(connector), sender.clone()),
            router: TopicRouter::new(),
            store: VisualizationStore::new(),
            viewports: ViewportController::new(&config.viewport),
            sender,
            receiver,
            broker_url: config.mqtt.broker_url.clone(),
            connect_options: ConnectOptions {
                resubscribe_on_reconnect: config.mqtt.resubscribe_on_reconnect,
                verify_tls: config.mqtt.verify_tls,
            },
            shutting_down: false,
        }
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            sender: self.sender.clone(),
        }
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.sender.clone())
    }

    pub fn view(&self) -> MonitorView {
        MonitorView {
            status: self.connection.subscribe_status(),
            store: self.store.watch(),
            graph_viewport: self.viewports.subscribe(Diagram::Graph),
            coverage_viewport: self.viewports.subscribe(Diagram::Coverage),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn store(&self) -> &VisualizationStore {
        &self.store
    }

    pub fn viewports(&self) -> &ViewportController {
        &self.viewports
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.connection.session_id()
    }

    pub fn subscription(&self, topic: Topic) -> Option<SubscriptionState> {
        self.connection.subscription(topic)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Connect to the configured broker
    pub async fn connect(&mut self) -> Result<SessionId, MqttError> {
        let broker_url = self.broker_url.clone();
        self.connect_to(&broker_url, self.connect_options).await
    }

    pub async fn connect_to(
        &mut self,
        broker_uri: &str,
        options: ConnectOptions,
    ) -> Result<SessionId, MqttError> {
        if self.shutting_down {
            return Err(MqttError::ConnectionFailedStr(
                "monitor is shutting down".to_string(),
            ));
        }
        self.connection.connect(broker_uri, options).await
    }

    pub async fn disconnect(&mut self) {
        self.connection.disconnect().await;
    }

    /// Process one event. Returns false once teardown has begun.
    pub async fn handle_event(&mut self, event: MonitorEvent) -> bool {
        if self.shutting_down {
            debug!(?event, "Discarding event after teardown");
            return false;
        }

        match event {
            MonitorEvent::Transport { session, event } => {
                if let Some(message) = self.connection.handle_transport_event(session, event).await
                {
                    let _span = crate::dispatch_span!(topic = %message.topic).entered();
                    self.router
                        .dispatch(&self.store, &message.topic, &message.payload);
                }
            }
            MonitorEvent::Connect => {
                // failures are already reflected in the status
                let _ = self.connect().await;
            }
            MonitorEvent::Disconnect => self.disconnect().await,
            MonitorEvent::Publish(request) => {
                if let Err(e) = self
                    .connection
                    .publish(&request.topic, request.payload.clone(), request.qos)
                    .await
                {
                    request.fail(e);
                }
            }
            MonitorEvent::Viewport { diagram, action } => {
                self.viewports.apply(diagram, action);
            }
            MonitorEvent::Resize {
                diagram,
                width,
                height,
            } => {
                self.viewports.resize(diagram, width, height);
            }
            MonitorEvent::Shutdown => {
                self.shutdown().await;
                return false;
            }
        }
        true
    }

    /// Handle every event already queued, without waiting for more
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.receiver.try_recv() {
            handled += 1;
            if !self.handle_event(event).await {
                break;
            }
        }
        handled
    }

    /// Drain the queue until a `Shutdown` event arrives
    pub async fn run(mut self) {
        info!(broker = %self.broker_url, "Monitor event loop started");
        while let Some(event) = self.receiver.recv().await {
            if !self.handle_event(event).await {
                break;
            }
        }
        self.shutdown().await;
        info!("Monitor event loop stopped");
    }

    /// Close the transport and discard anything still queued
    pub async fn shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;

        self.connection.disconnect().await;
        self.receiver.close();

        let mut discarded = 0usize;
        while let Ok(event) = self.receiver.try_recv() {
            if let MonitorEvent::Publish(request) = &event {
                request.fail("monitor shutting down");
            }
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "Discarded queued events during teardown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeConnector;
    use bytes::Bytes;

    fn monitor() -> (Monitor, FakeConnector) {
        let connector = FakeConnector::new();
        (
            Monitor::new(connector.clone(), &MonitorConfig::default()),
            connector,
        )
    }

    #[tokio::test]
    async fn test_messages_reach_the_store() {
        let (mut monitor, connector) = monitor();
        let session = monitor.connect().await.unwrap();

        connector
            .emit(session, TransportEvent::Connected { session_present: false })
            .await;
        connector
            .emit(
                session,
                TransportEvent::Message {
                    topic: "fuzzer_stats".to_string(),
                    payload: Bytes::from_static(br#"{"coverage": 3, "runs": 4}"#),
                },
            )
            .await;
        monitor.process_pending().await;

        assert_eq!(monitor.status(), ConnectionStatus::Connected);
        assert_eq!(monitor.store().stats().coverage, 3);
    }

    #[tokio::test]
    async fn test_events_after_shutdown_are_discarded() {
        let (mut monitor, connector) = monitor();
        let session = monitor.connect().await.unwrap();

        monitor.shutdown().await;
        assert_eq!(monitor.status(), ConnectionStatus::Disconnected);

        let handled = monitor
            .handle_event(MonitorEvent::Transport {
                session,
                event: TransportEvent::Message {
                    topic: "cfg".to_string(),
                    payload: Bytes::from_static(b"<svg/>"),
                },
            })
            .await;

        assert!(!handled);
        assert_eq!(monitor.store().graph(), None);
        assert_eq!(connector.closed_sessions(), vec![session]);
    }

    #[tokio::test]
    async fn test_shutdown_fails_queued_publishes() {
        let (mut monitor, _connector) = monitor();
        let failures = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = failures.clone();
        let publisher = monitor
            .publisher()
            .with_error_callback(move |f| sink.lock().unwrap().push(f.cause.clone()));

        publisher.publish("breakpoints", "[]");
        monitor.shutdown().await;

        assert_eq!(*failures.lock().unwrap(), vec!["monitor shutting down".to_string()]);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (monitor, connector) = monitor();
        let handle = monitor.handle();
        let task = tokio::spawn(monitor.run());

        assert!(handle.connect());
        handle.shutdown().await;
        task.await.unwrap();

        assert_eq!(connector.opened_sessions().len(), 1);
        assert_eq!(connector.closed_sessions().len(), 1);
        assert!(!handle.connect());
    }

    #[tokio::test]
    async fn test_connect_event_after_fatal_reconnects() {
        let (mut monitor, connector) = monitor();
        let first = monitor.connect().await.unwrap();
        connector
            .emit(first, TransportEvent::Fatal("refused".to_string()))
            .await;
        monitor.process_pending().await;
        assert_eq!(monitor.status(), ConnectionStatus::ConnectionError);

        monitor.handle().connect();
        monitor.process_pending().await;

        assert_eq!(monitor.status(), ConnectionStatus::Connecting);
        assert_ne!(monitor.session_id(), Some(first));
    }
}
