//! Per-diagram viewport channels

use super::{Diagram, Viewport, ViewportAction};
use crate::config::ViewportSection;
use tokio::sync::watch;
use tracing::debug;

/// Owns one viewport per diagram and publishes each on its own watch channel
#[derive(Debug)]
pub struct ViewportController {
    graph: watch::Sender<Viewport>,
    coverage: watch::Sender<Viewport>,
}

impl ViewportController {
    pub fn new(section: &ViewportSection) -> Self {
        let (graph, _) = watch::channel(Viewport::from_config(section));
        let (coverage, _) = watch::channel(Viewport::from_config(section));
        Self { graph, coverage }
    }

    fn channel(&self, diagram: Diagram) -> &watch::Sender<Viewport> {
        match diagram {
            Diagram::Graph => &self.graph,
            Diagram::Coverage => &self.coverage,
        }
    }

    pub fn subscribe(&self, diagram: Diagram) -> watch::Receiver<Viewport> {
        self.channel(diagram).subscribe()
    }

    pub fn current(&self, diagram: Diagram) -> Viewport {
        self.channel(diagram).borrow().clone()
    }

    /// Apply a user action; receivers are notified only on change
    pub fn apply(&self, diagram: Diagram, action: ViewportAction) -> bool {
        let changed = self
            .channel(diagram)
            .send_if_modified(|viewport| viewport.apply(action));
        debug!(%diagram, ?action, changed, "Viewport action");
        changed
    }

    pub fn resize(&self, diagram: Diagram, width: f64, height: f64) -> bool {
        self.channel(diagram)
            .send_if_modified(|viewport| viewport.resize(width, height))
    }
}
