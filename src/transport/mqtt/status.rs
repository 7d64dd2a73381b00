//! Pure connection-status state machine and reconnection logic
//!
//! Every status change the monitor observes goes through
//! [`StatusMachine::apply`], which either yields the new status or `None`
//! when the event leaves the status untouched.

use super::connection::ReconnectConfig;
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

/// Observable connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    ConnectionError,
}

impl ConnectionStatus {
    /// Human-readable label shown to the operator
    pub fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting",
            Self::ConnectionError => "Connection Error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Events that drive status transitions
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// `connect()` was called
    ConnectRequested,
    /// ConnAck received from broker
    ConnAckReceived,
    /// Link dropped, transport retrying
    LinkLost(String),
    /// Unrecoverable error
    Fatal(String),
    /// `disconnect()` or teardown
    Closed,
}

/// Pure status transition and reconnection decision logic
pub struct StatusMachine;

impl StatusMachine {
    /// Next status for `event`, or `None` when the event changes nothing
    pub fn apply(current: ConnectionStatus, event: &ConnectionEvent) -> Option<ConnectionStatus> {
        use ConnectionStatus::*;

        let next = match (current, event) {
            (_, ConnectionEvent::ConnectRequested) => Connecting,
            (Connecting | Reconnecting, ConnectionEvent::ConnAckReceived) => Connected,
            (_, ConnectionEvent::ConnAckReceived) => return None,
            (Connected, ConnectionEvent::LinkLost(_)) => Reconnecting,
            (_, ConnectionEvent::LinkLost(_)) => return None,
            (ConnectionError, ConnectionEvent::Fatal(_)) => return None,
            (_, ConnectionEvent::Fatal(_)) => ConnectionError,
            (_, ConnectionEvent::Closed) => Disconnected,
        };

        (next != current).then_some(next)
    }

    /// Whether entering `Connected` from `from` must (re)issue subscriptions
    pub fn should_subscribe(from: ConnectionStatus, resubscribe_on_reconnect: bool) -> bool {
        match from {
            ConnectionStatus::Connecting => true,
            ConnectionStatus::Reconnecting => resubscribe_on_reconnect,
            _ => false,
        }
    }

    /// Check if connection status allows publishing
    pub fn can_publish(status: ConnectionStatus) -> bool {
        matches!(status, ConnectionStatus::Connected)
    }

    /// Determine if reconnection should be attempted
    /// Supports unlimited retries when max_attempts is None
    pub fn should_attempt_reconnection(
        current_attempts: u32,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        if let Some(max_attempts) = config.max_attempts {
            if current_attempts >= max_attempts {
                return ReconnectionDecision::AbortMaxAttemptsExceeded;
            }
        }

        let attempt = current_attempts + 1;
        ReconnectionDecision::Proceed {
            attempt,
            delay_ms: config.calculate_backoff_delay(attempt),
        }
    }

    /// Log connection status transition
    pub fn log_state_transition(from: ConnectionStatus, to: ConnectionStatus, event: &ConnectionEvent) {
        use ConnectionStatus::*;

        match (from, to, event) {
            (Connecting, Connected, _) => {
                info!("MQTT connection established successfully");
            }
            (Reconnecting, Connected, _) => {
                info!("Reconnection successful");
            }
            (Connected, Reconnecting, ConnectionEvent::LinkLost(reason)) => {
                warn!(reason = %reason, "MQTT connection lost, reconnecting");
            }
            (_, ConnectionError, ConnectionEvent::Fatal(reason)) => {
                error!(reason = %reason, "MQTT connection failed");
            }
            _ => {
                info!("MQTT connection status: {} -> {}", from, to);
            }
        }
    }
}

/// Decision result for reconnection attempts
#[derive(Debug, PartialEq)]
pub enum ReconnectionDecision {
    /// Proceed with reconnection attempt
    Proceed { attempt: u32, delay_ms: u64 },
    /// Abort reconnection - shutdown requested
    AbortShutdownRequested,
    /// Abort reconnection - max attempts exceeded
    AbortMaxAttemptsExceeded,
}
