//! Outbound command path back to the broker
//!
//! Publishing is fire-and-forget. The [`Publisher`] handle only enqueues a
//! [`PublishRequest`] on the monitor's event queue; the monitor hands it to
//! the live session. Every failure, whether the queue is full, the monitor is
//! not connected or the transport rejects the publish, ends up in the
//! request's error callback. Nothing is retried.

use super::MonitorEvent;
use crate::transport::QoS;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::error;

/// Details handed to the error callback
#[derive(Debug, Clone, PartialEq)]
pub struct PublishFailure {
    pub topic: String,
    /// Payload as text, lossily decoded
    pub message: String,
    pub cause: String,
}

/// Invoked once for every publish that could not be handed to the transport
pub type ErrorCallback = Arc<dyn Fn(&PublishFailure) + Send + Sync>;

/// Default callback: log topic, message and cause
pub fn log_publish_failure(failure: &PublishFailure) {
    error!(
        topic = %failure.topic,
        message = %failure.message,
        cause = %failure.cause,
        "Publish failed"
    );
}

/// A queued publish
pub struct PublishRequest {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    on_error: ErrorCallback,
}

impl PublishRequest {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            on_error: Arc::new(log_publish_failure),
        }
    }

    pub fn with_error_callback(mut self, on_error: ErrorCallback) -> Self {
        self.on_error = on_error;
        self
    }

    /// Report a failure through the callback
    pub fn fail(&self, cause: impl fmt::Display) {
        let failure = PublishFailure {
            topic: self.topic.clone(),
            message: String::from_utf8_lossy(&self.payload).into_owned(),
            cause: cause.to_string(),
        };
        (self.on_error)(&failure);
    }
}

impl fmt::Debug for PublishRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishRequest")
            .field("topic", &self.topic)
            .field("payload_len", &self.payload.len())
            .field("qos", &self.qos)
            .finish()
    }
}

/// Cloneable publish handle
#[derive(Clone)]
pub struct Publisher {
    sender: mpsc::Sender<MonitorEvent>,
    qos: QoS,
    on_error: ErrorCallback,
}

impl Publisher {
    pub(crate) fn new(sender: mpsc::Sender<MonitorEvent>) -> Self {
        Self {
            sender,
            qos: QoS::ExactlyOnce,
            on_error: Arc::new(log_publish_failure),
        }
    }

    /// Replace the error callback
    pub fn with_error_callback<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&PublishFailure) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(on_error);
        self
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    /// Publish at the handle's QoS (exactly-once unless overridden)
    pub fn publish(&self, topic: &str, message: impl Into<Vec<u8>>) {
        self.publish_with_qos(topic, message, self.qos);
    }

    pub fn publish_with_qos(&self, topic: &str, message: impl Into<Vec<u8>>, qos: QoS) {
        let request =
            PublishRequest::new(topic, message, qos).with_error_callback(self.on_error.clone());

        match self.sender.try_send(MonitorEvent::Publish(request)) {
            Ok(()) => {}
            Err(TrySendError::Full(MonitorEvent::Publish(request))) => {
                request.fail("event queue full");
            }
            Err(TrySendError::Closed(MonitorEvent::Publish(request))) => {
                request.fail("monitor stopped");
            }
            Err(_) => {}
        }
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher").field("qos", &self.qos).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_publisher(
        sender: mpsc::Sender<MonitorEvent>,
    ) -> (Publisher, Arc<Mutex<Vec<PublishFailure>>>) {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        let publisher = Publisher::new(sender)
            .with_error_callback(move |failure| sink.lock().unwrap().push(failure.clone()));
        (publisher, failures)
    }

    #[tokio::test]
    async fn test_publish_enqueues_exactly_once() {
        let (tx, mut rx) = mpsc::channel(4);
        let (publisher, failures) = recording_publisher(tx);

        publisher.publish("breakpoints", "[4198400]");

        match rx.recv().await {
            Some(MonitorEvent::Publish(request)) => {
                assert_eq!(request.topic, "breakpoints");
                assert_eq!(request.payload, b"[4198400]".to_vec());
                assert_eq!(request.qos, QoS::ExactlyOnce);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_reports_through_callback() {
        let (tx, _rx) = mpsc::channel(1);
        let (publisher, failures) = recording_publisher(tx);

        publisher.publish("a", "first");
        publisher.publish("b", "second");

        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].topic, "b");
        assert_eq!(failures[0].message, "second");
        assert_eq!(failures[0].cause, "event queue full");
    }

    #[tokio::test]
    async fn test_closed_queue_reports_through_callback() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (publisher, failures) = recording_publisher(tx);

        publisher.publish("a", "x");

        assert_eq!(failures.lock().unwrap()[0].cause, "monitor stopped");
    }

    #[test]
    fn test_request_fail_invokes_callback() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let request = PublishRequest::new("t", "m", QoS::AtLeastOnce)
            .with_error_callback(Arc::new(move |f: &PublishFailure| {
                *sink.lock().unwrap() = Some(f.cause.clone());
            }));

        request.fail("not connected");

        assert_eq!(seen.lock().unwrap().as_deref(), Some("not connected"));
    }
}
