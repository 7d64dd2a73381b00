//! Visualization state store
//!
//! Four independent slices, each holding only its latest value. Every slice
//! is a watch channel so renderers are woken on change; writing a value equal
//! to the current one does not wake anyone.

use crate::protocol::{BreakpointList, FuzzerStats};
use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug)]
pub struct VisualizationStore {
    graph: watch::Sender<Option<String>>,
    coverage: watch::Sender<Option<String>>,
    stats: watch::Sender<FuzzerStats>,
    breakpoints: watch::Sender<BreakpointList>,
}

/// Point-in-time copy of every slice
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSnapshot {
    pub graph: Option<String>,
    pub coverage: Option<String>,
    pub stats: FuzzerStats,
    pub breakpoints: BreakpointList,
}

/// Receivers for every slice
#[derive(Debug, Clone)]
pub struct StoreWatch {
    pub graph: watch::Receiver<Option<String>>,
    pub coverage: watch::Receiver<Option<String>>,
    pub stats: watch::Receiver<FuzzerStats>,
    pub breakpoints: watch::Receiver<BreakpointList>,
}

impl Default for VisualizationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VisualizationStore {
    pub fn new() -> Self {
        Self {
            graph: watch::channel(None).0,
            coverage: watch::channel(None).0,
            stats: watch::channel(FuzzerStats::default()).0,
            breakpoints: watch::channel(Vec::new()).0,
        }
    }

    pub fn graph(&self) -> Option<String> {
        self.graph.borrow().clone()
    }

    pub fn coverage(&self) -> Option<String> {
        self.coverage.borrow().clone()
    }

    pub fn stats(&self) -> FuzzerStats {
        self.stats.borrow().clone()
    }

    pub fn breakpoints(&self) -> BreakpointList {
        self.breakpoints.borrow().clone()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            graph: self.graph(),
            coverage: self.coverage(),
            stats: self.stats(),
            breakpoints: self.breakpoints(),
        }
    }

    pub fn watch(&self) -> StoreWatch {
        StoreWatch {
            graph: self.graph.subscribe(),
            coverage: self.coverage.subscribe(),
            stats: self.stats.subscribe(),
            breakpoints: self.breakpoints.subscribe(),
        }
    }

    pub(crate) fn set_graph(&self, markup: String) -> bool {
        replace_if_changed(&self.graph, Some(markup))
    }

    pub(crate) fn set_coverage(&self, markup: String) -> bool {
        replace_if_changed(&self.coverage, Some(markup))
    }

    pub(crate) fn set_stats(&self, stats: FuzzerStats) -> bool {
        replace_if_changed(&self.stats, stats)
    }

    pub(crate) fn set_breakpoints(&self, breakpoints: BreakpointList) -> bool {
        replace_if_changed(&self.breakpoints, breakpoints)
    }
}

fn replace_if_changed<T: PartialEq>(slot: &watch::Sender<T>, value: T) -> bool {
    slot.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    })
}
