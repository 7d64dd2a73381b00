//! Connection lifecycle tests
//!
//! Drives a monitor backed by the fake transport through synthetic
//! connect, link-loss and failure events and checks the observable status
//! sequence and subscription traffic.

use fuzzmon::config::MonitorConfig;
use fuzzmon::monitor::{Monitor, MonitorEvent, SubscriptionState};
use fuzzmon::protocol::Topic;
use fuzzmon::testing::FakeConnector;
use fuzzmon::transport::mqtt::ConnectionStatus;
use fuzzmon::transport::{ConnectOptions, QoS, TransportEvent};
use tokio::sync::watch;

fn test_monitor(config: &MonitorConfig) -> (Monitor, FakeConnector) {
    let connector = FakeConnector::new();
    (Monitor::new(connector.clone(), config), connector)
}

fn connected() -> TransportEvent {
    TransportEvent::Connected {
        session_present: false,
    }
}

/// Play the broker side of the subscribe exchange for `count` queued requests
async fn complete_subscriptions(
    monitor: &mut Monitor,
    connector: &FakeConnector,
    first_pkid: u16,
    count: u16,
) {
    for pkid in first_pkid..first_pkid + count {
        connector
            .emit_latest(TransportEvent::SubscribeSent { pkid })
            .await;
        connector
            .emit_latest(TransportEvent::SubscribeAcked {
                pkid,
                granted: vec![Some(QoS::ExactlyOnce)],
            })
            .await;
    }
    monitor.process_pending().await;
}

/// Collect every status the receiver has not seen yet
fn drain_statuses(
    rx: &mut watch::Receiver<ConnectionStatus>,
    seen: &mut Vec<ConnectionStatus>,
) {
    if rx.has_changed().unwrap_or(false) {
        seen.push(*rx.borrow_and_update());
    }
}

#[tokio::test]
async fn test_happy_path_status_sequence() {
    // Arrange
    let (mut monitor, connector) = test_monitor(&MonitorConfig::default());
    let mut status = monitor.view().status;
    let mut seen = vec![*status.borrow_and_update()];

    // Act
    monitor.connect().await.unwrap();
    drain_statuses(&mut status, &mut seen);
    connector.emit_latest(connected()).await;
    monitor.process_pending().await;
    drain_statuses(&mut status, &mut seen);

    // Assert
    assert_eq!(
        seen,
        vec![
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected
        ]
    );
}

#[tokio::test]
async fn test_link_loss_and_recovery_resubscribes_once_per_transition() {
    // Arrange
    let (mut monitor, connector) = test_monitor(&MonitorConfig::default());
    monitor.connect().await.unwrap();
    connector.emit_latest(connected()).await;
    monitor.process_pending().await;
    complete_subscriptions(&mut monitor, &connector, 1, 4).await;
    assert_eq!(connector.subscriptions().len(), Topic::ALL.len());

    // Act: two losses, two recoveries, plus a duplicate ack
    for round in 1..=2u16 {
        connector
            .emit_latest(TransportEvent::LinkLost("reset by peer".to_string()))
            .await;
        monitor.process_pending().await;
        assert_eq!(monitor.status(), ConnectionStatus::Reconnecting);

        connector.emit_latest(connected()).await;
        connector.emit_latest(connected()).await;
        monitor.process_pending().await;
        assert_eq!(monitor.status(), ConnectionStatus::Connected);
        complete_subscriptions(&mut monitor, &connector, 1 + round * 4, 4).await;
    }

    // Assert: initial connect plus two reconnects, each topic once per transition
    let subscriptions = connector.subscriptions();
    assert_eq!(subscriptions.len(), 3 * Topic::ALL.len());
    for topic in Topic::ALL {
        let count = subscriptions.iter().filter(|t| *t == topic.as_str()).count();
        assert_eq!(count, 3, "unexpected subscription count for {topic}");
    }
}

#[tokio::test]
async fn test_persistent_session_skips_resubscribe() {
    // Arrange
    let (mut monitor, connector) = test_monitor(&MonitorConfig::default());
    let options = ConnectOptions {
        resubscribe_on_reconnect: false,
        verify_tls: false,
    };
    monitor
        .connect_to("mqtt://127.0.0.1:1883", options)
        .await
        .unwrap();
    connector.emit_latest(connected()).await;
    monitor.process_pending().await;

    // Act
    connector
        .emit_latest(TransportEvent::LinkLost("timeout".to_string()))
        .await;
    connector
        .emit_latest(TransportEvent::Connected {
            session_present: true,
        })
        .await;
    monitor.process_pending().await;

    // Assert
    assert_eq!(monitor.status(), ConnectionStatus::Connected);
    assert_eq!(connector.subscriptions().len(), Topic::ALL.len());
    let request = connector.last_request().unwrap();
    assert!(!request.options.resubscribe_on_reconnect);
    assert_eq!(request.endpoint.to_string(), "mqtt://127.0.0.1:1883");
}

#[tokio::test]
async fn test_refused_subscription_leaves_other_topics_subscribed() {
    // Arrange
    let (mut monitor, connector) = test_monitor(&MonitorConfig::default());
    connector.fail_subscribe("breakpoints");
    monitor.connect().await.unwrap();

    // Act
    connector.emit_latest(connected()).await;
    monitor.process_pending().await;
    complete_subscriptions(&mut monitor, &connector, 1, 3).await;

    // Assert
    assert_eq!(monitor.status(), ConnectionStatus::Connected);
    assert_eq!(
        connector.subscriptions(),
        vec!["cfg", "fuzzer_stats", "coverage_over_time"]
    );
    assert_eq!(
        monitor.subscription(Topic::Breakpoints),
        Some(SubscriptionState::Failed)
    );
    for topic in [Topic::Cfg, Topic::FuzzerStats, Topic::CoverageOverTime] {
        assert_eq!(
            monitor.subscription(topic),
            Some(SubscriptionState::Granted(QoS::ExactlyOnce)),
            "unexpected state for {topic}"
        );
    }
}

#[tokio::test]
async fn test_fatal_error_is_terminal_until_explicit_connect() {
    // Arrange
    let (mut monitor, connector) = test_monitor(&MonitorConfig::default());
    monitor.connect().await.unwrap();
    connector.emit_latest(connected()).await;
    monitor.process_pending().await;

    // Act
    connector
        .emit_latest(TransportEvent::Fatal("connection refused".to_string()))
        .await;
    monitor.process_pending().await;

    // Assert: late acks from the dead session change nothing
    assert_eq!(monitor.status(), ConnectionStatus::ConnectionError);
    assert_eq!(monitor.session_id(), None);
    let first = connector.opened_sessions()[0];
    connector.emit(first, connected()).await;
    monitor.process_pending().await;
    assert_eq!(monitor.status(), ConnectionStatus::ConnectionError);

    // Act: explicit reconnect
    monitor.handle().send(MonitorEvent::Connect);
    monitor.process_pending().await;
    connector.emit_latest(connected()).await;
    monitor.process_pending().await;

    // Assert
    assert_eq!(monitor.status(), ConnectionStatus::Connected);
    assert_eq!(connector.opened_sessions().len(), 2);
}

#[tokio::test]
async fn test_new_connect_closes_previous_handle_first() {
    // Arrange
    let (mut monitor, connector) = test_monitor(&MonitorConfig::default());
    let first = monitor.connect().await.unwrap();

    // Act
    let second = monitor.connect().await.unwrap();

    // Assert
    assert_ne!(first, second);
    assert_eq!(connector.closed_sessions(), vec![first]);
    assert_eq!(monitor.session_id(), Some(second));
}

#[tokio::test]
async fn test_superseded_session_messages_are_discarded() {
    // Arrange
    let (mut monitor, connector) = test_monitor(&MonitorConfig::default());
    let first = monitor.connect().await.unwrap();
    let second = monitor.connect().await.unwrap();
    connector.emit(second, connected()).await;
    monitor.process_pending().await;

    // Act: the closed session still had a message in flight
    monitor
        .handle_event(MonitorEvent::Transport {
            session: first,
            event: TransportEvent::Message {
                topic: "cfg".to_string(),
                payload: bytes::Bytes::from_static(b"<svg>stale</svg>"),
            },
        })
        .await;

    // Assert
    assert_eq!(monitor.store().graph(), None);
}

#[tokio::test]
async fn test_invalid_broker_url_surfaces_as_connection_error() {
    // Arrange
    let (mut monitor, connector) = test_monitor(&MonitorConfig::default());

    // Act
    let result = monitor
        .connect_to("not a url", ConnectOptions::default())
        .await;

    // Assert
    assert!(result.is_err());
    assert_eq!(monitor.status(), ConnectionStatus::ConnectionError);
    assert!(connector.opened_sessions().is_empty());
}

#[tokio::test]
async fn test_open_failure_surfaces_as_connection_error() {
    // Arrange
    let (mut monitor, connector) = test_monitor(&MonitorConfig::default());
    connector.fail_open(true);

    // Act
    let result = monitor.connect().await;

    // Assert
    assert!(result.is_err());
    assert_eq!(monitor.status(), ConnectionStatus::ConnectionError);
}

#[tokio::test]
async fn test_disconnect_releases_handle() {
    // Arrange
    let (mut monitor, connector) = test_monitor(&MonitorConfig::default());
    let session = monitor.connect().await.unwrap();
    connector.emit_latest(connected()).await;
    monitor.process_pending().await;

    // Act
    monitor.handle().disconnect();
    monitor.process_pending().await;

    // Assert
    assert_eq!(monitor.status(), ConnectionStatus::Disconnected);
    assert_eq!(connector.closed_sessions(), vec![session]);
}

#[tokio::test]
async fn test_shutdown_releases_handle_on_every_path() {
    // Arrange
    let (monitor, connector) = test_monitor(&MonitorConfig::default());
    let handle = monitor.handle();
    let view = monitor.view();
    let task = tokio::spawn(monitor.run());

    // Act
    handle.connect();
    handle.shutdown().await;
    task.await.unwrap();

    // Assert
    assert_eq!(*view.status.borrow(), ConnectionStatus::Disconnected);
    assert_eq!(connector.opened_sessions(), connector.closed_sessions());
}
