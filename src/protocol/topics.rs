//! The fixed topic set published by the fuzzer backend
//!
//! The monitor only ever subscribes to these four topics. Anything else that
//! arrives on the connection is ignored by the router.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A topic in the closed subscription set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Control-flow graph rendered as SVG markup
    Cfg,
    /// Aggregate fuzzer statistics as a JSON object
    FuzzerStats,
    /// Coverage-over-time chart rendered as SVG markup
    CoverageOverTime,
    /// Currently installed breakpoints as a JSON array
    Breakpoints,
}

impl Topic {
    /// Every topic, in subscription order
    pub const ALL: [Topic; 4] = [
        Topic::Cfg,
        Topic::FuzzerStats,
        Topic::CoverageOverTime,
        Topic::Breakpoints,
    ];

    /// Wire name of the topic
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Cfg => "cfg",
            Topic::FuzzerStats => "fuzzer_stats",
            Topic::CoverageOverTime => "coverage_over_time",
            Topic::Breakpoints => "breakpoints",
        }
    }

    /// Resolve a wire topic name, `None` for topics outside the set
    pub fn from_wire(topic: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.as_str() == topic)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known topic
#[derive(Debug, Error, PartialEq)]
#[error("Unknown topic: '{0}'")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::from_wire(s).ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(Topic::Cfg.as_str(), "cfg");
        assert_eq!(Topic::FuzzerStats.as_str(), "fuzzer_stats");
        assert_eq!(Topic::CoverageOverTime.as_str(), "coverage_over_time");
        assert_eq!(Topic::Breakpoints.as_str(), "breakpoints");
    }

    #[test]
    fn test_from_wire_known_topics() {
        for topic in Topic::ALL {
            assert_eq!(Topic::from_wire(topic.as_str()), Some(topic));
        }
    }

    #[test]
    fn test_from_wire_is_exact_match() {
        assert_eq!(Topic::from_wire("CFG"), None);
        assert_eq!(Topic::from_wire("/cfg"), None);
        assert_eq!(Topic::from_wire("cfg/"), None);
        assert_eq!(Topic::from_wire(""), None);
    }

    #[test]
    fn test_from_str_error() {
        let err = "test/hello".parse::<Topic>().unwrap_err();
        assert_eq!(err, UnknownTopic("test/hello".to_string()));
        assert!(err.to_string().contains("test/hello"));
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&Topic::CoverageOverTime).unwrap();
        assert_eq!(json, "\"coverage_over_time\"");
        let topic: Topic = serde_json::from_str("\"fuzzer_stats\"").unwrap();
        assert_eq!(topic, Topic::FuzzerStats);
    }

    proptest! {
        #[test]
        fn unknown_names_never_resolve(name in "[a-z_/]{0,24}") {
            let known = Topic::ALL.iter().any(|t| t.as_str() == name);
            prop_assert_eq!(Topic::from_wire(&name).is_some(), known);
        }
    }
}
