//! Topic router
//!
//! Maps an incoming topic onto a decode-and-apply step against the store.
//! Decode failures stop here: they are logged and the slice keeps its value.

use super::store::VisualizationStore;
use crate::protocol::{decode_breakpoints, decode_fuzzer_stats, decode_markup, DecodeError, Topic};
use tracing::{debug, warn};

/// What happened to one dispatched message
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Decoded and written to its slice
    Applied(Topic),
    /// Topic outside the subscription set
    Ignored,
    /// Payload failed to decode; slice unchanged
    Rejected(DecodeError),
}

impl DispatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, DispatchOutcome::Applied(_))
    }
}

/// Stateless topic-to-slice dispatcher
#[derive(Debug, Default, Clone, Copy)]
pub struct TopicRouter;

impl TopicRouter {
    pub fn new() -> Self {
        Self
    }

    /// Topics the connection manager subscribes to on every (re)connect
    pub fn subscriptions(&self) -> &'static [Topic] {
        &Topic::ALL
    }

    pub fn dispatch(&self, store: &VisualizationStore, topic: &str, payload: &[u8]) -> DispatchOutcome {
        let Some(known) = Topic::from_wire(topic) else {
            debug!(topic, "Ignoring message on unknown topic");
            return DispatchOutcome::Ignored;
        };

        let changed = match known {
            Topic::Cfg => store.set_graph(decode_markup(payload)),
            Topic::CoverageOverTime => store.set_coverage(decode_markup(payload)),
            Topic::FuzzerStats => match decode_fuzzer_stats(payload) {
                Ok(stats) => store.set_stats(stats),
                Err(e) => return Self::reject(e, payload),
            },
            Topic::Breakpoints => match decode_breakpoints(payload) {
                Ok(breakpoints) => store.set_breakpoints(breakpoints),
                Err(e) => return Self::reject(e, payload),
            },
        };

        debug!(topic = %known, bytes = payload.len(), changed, "Applied message");
        DispatchOutcome::Applied(known)
    }

    fn reject(error: DecodeError, payload: &[u8]) -> DispatchOutcome {
        warn!(
            topic = %error.topic(),
            bytes = payload.len(),
            error = %error,
            "Dropping malformed payload"
        );
        DispatchOutcome::Rejected(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_written_verbatim() {
        let store = VisualizationStore::new();
        let router = TopicRouter::new();

        let outcome = router.dispatch(&store, "cfg", b"<svg><g/></svg>");
        assert!(matches!(outcome, DispatchOutcome::Applied(Topic::Cfg)));
        assert_eq!(store.graph().as_deref(), Some("<svg><g/></svg>"));

        router.dispatch(&store, "coverage_over_time", b"<svg id=\"c\"/>");
        assert_eq!(store.coverage().as_deref(), Some("<svg id=\"c\"/>"));
    }

    #[test]
    fn test_invalid_utf8_markup_is_lossy() {
        let store = VisualizationStore::new();
        TopicRouter::new().dispatch(&store, "cfg", &[b'<', 0xff, b'>']);
        assert_eq!(store.graph().as_deref(), Some("<\u{fffd}>"));
    }

    #[test]
    fn test_unknown_topic_ignored() {
        let store = VisualizationStore::new();
        let before = store.snapshot();

        let outcome = TopicRouter::new().dispatch(&store, "weather", b"{}");

        assert!(matches!(outcome, DispatchOutcome::Ignored));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_malformed_stats_keep_previous_value() {
        let store = VisualizationStore::new();
        let router = TopicRouter::new();

        router.dispatch(&store, "fuzzer_stats", br#"{"coverage": 42, "runs": 1000}"#);
        let outcome = router.dispatch(&store, "fuzzer_stats", b"{bad json");

        assert!(matches!(outcome, DispatchOutcome::Rejected(_)));
        assert_eq!(store.stats().coverage, 42);
        assert_eq!(store.stats().runs, 1000);
    }

    #[test]
    fn test_breakpoints_fully_replaced() {
        let store = VisualizationStore::new();
        let router = TopicRouter::new();

        router.dispatch(&store, "breakpoints", br#"[{"id":1}]"#);
        assert_eq!(store.breakpoints().len(), 1);

        router.dispatch(&store, "breakpoints", b"[]");
        assert!(store.breakpoints().is_empty());
    }

    #[test]
    fn test_dispatch_is_idempotent() {
        let store = VisualizationStore::new();
        let router = TopicRouter::new();
        let payload = br#"{"coverage": 7, "runs": 9}"#;

        router.dispatch(&store, "fuzzer_stats", payload);
        let once = store.snapshot();
        router.dispatch(&store, "fuzzer_stats", payload);

        assert_eq!(store.snapshot(), once);
    }

    #[test]
    fn test_subscription_set() {
        assert_eq!(TopicRouter::new().subscriptions(), &Topic::ALL);
    }
}
