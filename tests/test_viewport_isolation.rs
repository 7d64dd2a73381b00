//! Viewport isolation tests
//!
//! Content updates must never touch a diagram's pan/zoom state; only
//! explicit viewport actions and resizes do.

use bytes::Bytes;
use fuzzmon::config::MonitorConfig;
use fuzzmon::monitor::{Monitor, MonitorEvent};
use fuzzmon::testing::FakeConnector;
use fuzzmon::transport::TransportEvent;
use fuzzmon::viewport::{Diagram, Point, Transform, ViewportAction};

async fn connected_monitor() -> (Monitor, FakeConnector) {
    let connector = FakeConnector::new();
    let mut monitor = Monitor::new(connector.clone(), &MonitorConfig::default());
    monitor.connect().await.unwrap();
    connector
        .emit_latest(TransportEvent::Connected {
            session_present: false,
        })
        .await;
    monitor.process_pending().await;
    (monitor, connector)
}

async fn deliver(monitor: &mut Monitor, connector: &FakeConnector, topic: &str, payload: &'static [u8]) {
    connector
        .emit_latest(TransportEvent::Message {
            topic: topic.to_string(),
            payload: Bytes::from_static(payload),
        })
        .await;
    monitor.process_pending().await;
}

#[tokio::test]
async fn test_cfg_updates_keep_in_progress_transform() {
    // Arrange
    let (mut monitor, connector) = connected_monitor().await;
    deliver(&mut monitor, &connector, "cfg", b"<svg>first</svg>").await;
    let handle = monitor.handle();
    handle.viewport(Diagram::Graph, ViewportAction::Pan { dx: 120.0, dy: -35.5 });
    handle.viewport(
        Diagram::Graph,
        ViewportAction::Zoom {
            factor: 3.0,
            at: Point::new(50.0, 80.0),
        },
    );
    monitor.process_pending().await;
    let before = monitor.viewports().current(Diagram::Graph).transform;

    // Act
    deliver(&mut monitor, &connector, "cfg", b"<svg>second</svg>").await;

    // Assert
    let after = monitor.viewports().current(Diagram::Graph).transform;
    assert_eq!(before, after);
    assert_ne!(after, Transform::default());
    assert_eq!(monitor.store().graph().as_deref(), Some("<svg>second</svg>"));
}

#[tokio::test]
async fn test_content_update_does_not_notify_viewport_watchers() {
    // Arrange
    let (mut monitor, connector) = connected_monitor().await;
    let mut graph_viewport = monitor.view().graph_viewport;
    let _ = graph_viewport.borrow_and_update();

    // Act
    deliver(&mut monitor, &connector, "cfg", b"<svg/>").await;
    deliver(&mut monitor, &connector, "coverage_over_time", b"<svg/>").await;

    // Assert
    assert!(!graph_viewport.has_changed().unwrap());
}

#[tokio::test]
async fn test_only_explicit_reset_restores_identity() {
    // Arrange
    let (mut monitor, connector) = connected_monitor().await;
    monitor
        .handle()
        .viewport(Diagram::Coverage, ViewportAction::Pan { dx: 10.0, dy: 10.0 });
    monitor.process_pending().await;
    deliver(&mut monitor, &connector, "coverage_over_time", b"<svg/>").await;
    assert_ne!(
        monitor.viewports().current(Diagram::Coverage).transform,
        Transform::default()
    );

    // Act
    monitor
        .handle_event(MonitorEvent::Viewport {
            diagram: Diagram::Coverage,
            action: ViewportAction::Reset,
        })
        .await;

    // Assert
    assert_eq!(
        monitor.viewports().current(Diagram::Coverage).transform,
        Transform::default()
    );
}

#[tokio::test]
async fn test_diagrams_have_independent_viewports() {
    // Arrange
    let (mut monitor, _connector) = connected_monitor().await;

    // Act
    monitor
        .handle()
        .viewport(Diagram::Graph, ViewportAction::ZoomOnViewerCenter { factor: 2.0 });
    monitor.process_pending().await;

    // Assert
    assert_eq!(monitor.viewports().current(Diagram::Graph).transform.scale, 2.0);
    assert_eq!(
        monitor.viewports().current(Diagram::Coverage).transform,
        Transform::default()
    );
}

#[tokio::test]
async fn test_repeated_resize_is_idempotent() {
    // Arrange
    let (mut monitor, _connector) = connected_monitor().await;
    let handle = monitor.handle();

    // Act
    handle.resize(Diagram::Graph, 800.0, 600.0);
    monitor.process_pending().await;
    let once = monitor.viewports().current(Diagram::Graph);
    handle.resize(Diagram::Graph, 800.0, 600.0);
    monitor.process_pending().await;

    // Assert
    assert_eq!(monitor.viewports().current(Diagram::Graph), once);
    assert_eq!(once.viewer.width, 800.0);
    assert_eq!(once.transform.scale, 1.0);
}
