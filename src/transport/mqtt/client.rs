//! rumqttc-backed transport sessions
//!
//! Each session owns an `AsyncClient` plus a spawned driver task that polls
//! the rumqttc event loop, maps everything it sees through [`EventMapper`]
//! and pushes the result into the monitor's event queue. Link losses are
//! retried here with the configured backoff; the monitor only ever sees
//! [`TransportEvent`]s.

use super::connection::{configure_mqtt_options, ClientSettings, MqttError, ReconnectConfig};
use super::event_mapper::{ErrorClass, EventMapper};
use super::status::{ReconnectionDecision, StatusMachine};
use crate::config::MonitorConfig;
use crate::transport::{
    Connector, QoS, SessionEvents, SessionRequest, TransportEvent, TransportSession,
};
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the rumqttc request channel per session
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// How long `close()` waits for the DISCONNECT to go out
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// How long `close()` waits for the driver after signalling shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Opens rumqttc sessions
#[derive(Debug, Clone)]
pub struct MqttConnector {
    settings: ClientSettings,
    reconnect: ReconnectConfig,
}

impl MqttConnector {
    pub fn new(settings: ClientSettings, reconnect: ReconnectConfig) -> Self {
        Self {
            settings,
            reconnect,
        }
    }

    /// Build a connector from the loaded configuration, reading credentials
    /// from the configured environment variables
    pub fn from_config(config: &MonitorConfig) -> Self {
        let credentials = config
            .get_mqtt_username()
            .map(|username| (username, config.get_mqtt_password().unwrap_or_default()));

        let settings = ClientSettings {
            client_id_prefix: config.mqtt.client_id_prefix.clone(),
            credentials,
            keep_alive: Duration::from_secs(config.mqtt.keep_alive_secs),
            max_packet_size: config.mqtt.max_packet_size,
        };

        Self::new(settings, config.reconnect.to_reconnect_config())
    }
}

impl Connector for MqttConnector {
    fn open(
        &mut self,
        request: &SessionRequest,
        events: SessionEvents,
    ) -> Result<Box<dyn TransportSession>, MqttError> {
        let _span = crate::mqtt_span!(operation = "open", session = %events.session()).entered();
        let mqtt_options =
            configure_mqtt_options(&request.endpoint, &request.options, &self.settings)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            broker = %request.endpoint,
            session = %events.session(),
            "Opening MQTT session"
        );

        let driver = tokio::spawn(drive_event_loop(
            event_loop,
            events,
            self.reconnect.clone(),
            shutdown_rx,
        ));

        Ok(Box::new(MqttSession {
            client,
            shutdown_tx,
            driver: Some(driver),
        }))
    }
}

/// A live rumqttc session
pub struct MqttSession {
    client: AsyncClient,
    shutdown_tx: watch::Sender<bool>,
    driver: Option<JoinHandle<()>>,
}

#[async_trait]
impl TransportSession for MqttSession {
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), MqttError> {
        self.client
            .try_subscribe(topic, qos)
            .map_err(|e| MqttError::SubscriptionFailed(Box::new(e)))
    }

    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), MqttError> {
        self.client
            .try_publish(topic, qos, false, payload)
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))
    }

    async fn close(&mut self) -> Result<(), MqttError> {
        let Some(mut driver) = self.driver.take() else {
            return Ok(());
        };

        if let Err(e) = self.client.try_disconnect() {
            debug!("DISCONNECT not queued: {}", e);
        }

        if tokio::time::timeout(DISCONNECT_GRACE, &mut driver)
            .await
            .is_ok()
        {
            info!("MQTT session closed");
            return Ok(());
        }

        let _ = self.shutdown_tx.send(true);
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut driver).await {
            Ok(Ok(())) => info!("MQTT session closed"),
            Ok(Err(e)) if !e.is_cancelled() => warn!("Session driver ended with error: {}", e),
            Ok(Err(_)) => {}
            Err(_) => {
                warn!("Session driver didn't shut down gracefully, forcing abort");
                driver.abort();
            }
        }
        Ok(())
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// Poll the event loop until shutdown, our own DISCONNECT, a fatal error or
/// an exhausted reconnection budget
async fn drive_event_loop(
    mut event_loop: EventLoop,
    events: SessionEvents,
    reconnect: ReconnectConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let session = events.session();
    let mut reconnect_attempts = 0u32;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!(%session, "Shutdown signal received, stopping session driver");
                    break;
                }
            }

            polled = event_loop.poll() => match polled {
                Ok(event) => {
                    if EventMapper::is_disconnect_sent(&event) {
                        debug!(%session, "DISCONNECT sent");
                        break;
                    }
                    let Some(mapped) = EventMapper::route(&event) else {
                        continue;
                    };
                    if matches!(mapped, TransportEvent::Connected { .. }) {
                        reconnect_attempts = 0;
                    }
                    if !events.emit(mapped).await {
                        break;
                    }
                }
                Err(e) => match EventMapper::classify_error(&e) {
                    ErrorClass::Terminated => break,
                    ErrorClass::Fatal => {
                        error!(%session, "MQTT connection failed: {}", e);
                        events.emit(TransportEvent::Fatal(e.to_string())).await;
                        break;
                    }
                    ErrorClass::LinkLost => {
                        warn!(%session, "MQTT event loop error: {}", e);
                        if !events.emit(TransportEvent::LinkLost(e.to_string())).await {
                            break;
                        }

                        let shutdown_requested = *shutdown_rx.borrow();
                        match StatusMachine::should_attempt_reconnection(
                            reconnect_attempts,
                            &reconnect,
                            shutdown_requested,
                        ) {
                            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                                reconnect_attempts = attempt;
                                info!(%session, "Reconnection attempt {} in {}ms", attempt, delay_ms);
                                if !interruptible_sleep(shutdown_rx.clone(), delay_ms).await {
                                    break;
                                }
                            }
                            ReconnectionDecision::AbortShutdownRequested => break,
                            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                                let reason = format!(
                                    "Max reconnection attempts ({reconnect_attempts}) exceeded"
                                );
                                error!(%session, "{}", reason);
                                events.emit(TransportEvent::Fatal(reason)).await;
                                break;
                            }
                        }
                    }
                },
            }
        }
    }

    debug!(%session, "Session driver stopped");
}

/// Perform interruptible sleep with shutdown monitoring
/// Returns true if sleep completed, false if shutdown requested
async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
    tokio::select! {
        changed = shutdown_rx.changed() => {
            if changed.is_err() || *shutdown_rx.borrow() {
                info!("Shutdown signal received during reconnection delay, stopping");
                return false;
            }
            true
        }
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
            true
        }
    }
}
