//! Pure mapping of rumqttc events onto transport events
//!
//! The session driver polls the rumqttc event loop and hands every event and
//! error through here before anything reaches the monitor.

use crate::transport::TransportEvent;
use rumqttc::{ConnectionError, Event, Outgoing, Packet, SubscribeReasonCode};
use tracing::trace;

/// Pure routing decisions for rumqttc events
pub struct EventMapper;

/// How the driver reacts to an event-loop error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry after backoff
    LinkLost,
    /// Stop the session and report the failure
    Fatal,
    /// The client handle is gone; stop quietly
    Terminated,
}

impl EventMapper {
    /// Translate a polled event, or `None` for infrastructure traffic
    pub fn route(event: &Event) -> Option<TransportEvent> {
        match event {
            Event::Incoming(Packet::ConnAck(connack)) => Some(TransportEvent::Connected {
                session_present: connack.session_present,
            }),
            Event::Incoming(Packet::Publish(publish)) => Some(TransportEvent::Message {
                topic: publish.topic.clone(),
                payload: publish.payload.clone(),
            }),
            Event::Incoming(Packet::SubAck(suback)) => Some(TransportEvent::SubscribeAcked {
                pkid: suback.pkid,
                granted: suback
                    .return_codes
                    .iter()
                    .map(|code| match code {
                        SubscribeReasonCode::Success(qos) => Some(*qos),
                        SubscribeReasonCode::Failure => None,
                    })
                    .collect(),
            }),
            Event::Incoming(Packet::PubComp(pubcomp)) => Some(TransportEvent::PublishCompleted {
                pkid: pubcomp.pkid,
            }),
            Event::Incoming(Packet::PubAck(puback)) => Some(TransportEvent::PublishCompleted {
                pkid: puback.pkid,
            }),
            Event::Outgoing(Outgoing::Subscribe(pkid)) => {
                Some(TransportEvent::SubscribeSent { pkid: *pkid })
            }
            other => {
                trace!("Unrouted MQTT event: {:?}", other);
                None
            }
        }
    }

    /// True once our own DISCONNECT has gone out
    pub fn is_disconnect_sent(event: &Event) -> bool {
        matches!(event, Event::Outgoing(Outgoing::Disconnect))
    }

    /// Classify an event-loop error
    pub fn classify_error(error: &ConnectionError) -> ErrorClass {
        match error {
            ConnectionError::RequestsDone => ErrorClass::Terminated,
            ConnectionError::ConnectionRefused(_) => ErrorClass::Fatal,
            ConnectionError::Tls(_) => ErrorClass::Fatal,
            _ => ErrorClass::LinkLost,
        }
    }
}
