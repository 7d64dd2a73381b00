//! Payload schemas for the structured topics
//!
//! `fuzzer_stats` and `breakpoints` carry JSON. Both are decoded against
//! explicit schemas here; markup topics are passed through as text.

use super::topics::Topic;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Aggregate statistics published by the fuzzer on `fuzzer_stats`
///
/// Only `coverage` and `runs` are required. The backend publishes its whole
/// stats record, so the remaining fields are accepted when present and
/// defaulted otherwise; unknown fields are ignored.
///
/// # Examples
/// ```
/// use fuzzmon::protocol::decode_fuzzer_stats;
///
/// let stats = decode_fuzzer_stats(br#"{"coverage": 42, "runs": 1000}"#).unwrap();
/// assert_eq!(stats.coverage, 42);
/// assert_eq!(stats.runs, 1000);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FuzzerStats {
    /// Lower bound of basic blocks reached
    pub coverage: u64,
    /// Number of inputs sent to the target
    pub runs: u64,
    #[serde(default)]
    pub start_time_epoch: f64,
    #[serde(default)]
    pub end_time_epoch: f64,
    /// Human readable start time
    #[serde(default)]
    pub start_time: String,
    /// Runtime in seconds
    #[serde(default)]
    pub runtime: f64,
    #[serde(default)]
    pub crashes: u64,
    #[serde(default)]
    pub timeouts: u64,
    /// Breakpoint interruptions handled by the debugger
    #[serde(default)]
    pub breakpoint_interruptions: u64,
    #[serde(default)]
    pub runs_per_sec: f64,
    #[serde(default)]
    pub cfg_updates: Vec<CfgUpdate>,
    #[serde(default)]
    pub config_file_path: String,
    #[serde(default)]
    pub corpus_state: Vec<String>,
}

/// One growth step of the recovered control-flow graph
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CfgUpdate {
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub total_basic_blocks: u64,
    #[serde(default)]
    pub total_edges: u64,
}

/// A single breakpoint as published on `breakpoints`
///
/// The backend publishes either bare addresses or objects; both shapes are
/// accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BreakpointRecord {
    /// Bare breakpoint address
    Address(u64),
    /// Structured record
    Detailed(BreakpointDetails),
}

/// Structured breakpoint record; fields the monitor does not know are kept
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BreakpointDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Breakpoint number assigned by GDB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gdb_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BreakpointRecord {
    /// Address of the breakpoint, when the record carries one
    pub fn address(&self) -> Option<u64> {
        match self {
            BreakpointRecord::Address(address) => Some(*address),
            BreakpointRecord::Detailed(details) => details.address,
        }
    }
}

impl fmt::Display for BreakpointRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakpointRecord::Address(address) => write!(f, "{address:#x}"),
            BreakpointRecord::Detailed(details) => {
                match (details.gdb_number.or(details.id), details.address) {
                    (Some(number), Some(address)) => write!(f, "#{number} {address:#x}"),
                    (None, Some(address)) => write!(f, "{address:#x}"),
                    (Some(number), None) => write!(f, "#{number}"),
                    (None, None) => write!(f, "{}", Value::Object(details.extra.clone())),
                }
            }
        }
    }
}

/// Ordered breakpoint list, replaced wholesale on every update
pub type BreakpointList = Vec<BreakpointRecord>;

/// Payload decode failures on structured topics
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed '{topic}' payload: {source}")]
    Malformed {
        topic: Topic,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Topic the rejected payload arrived on
    pub fn topic(&self) -> Topic {
        match self {
            DecodeError::Malformed { topic, .. } => *topic,
        }
    }
}

/// Decode a `fuzzer_stats` payload (pure function)
pub fn decode_fuzzer_stats(payload: &[u8]) -> Result<FuzzerStats, DecodeError> {
    serde_json::from_slice(payload).map_err(|source| DecodeError::Malformed {
        topic: Topic::FuzzerStats,
        source,
    })
}

/// Decode a `breakpoints` payload (pure function)
pub fn decode_breakpoints(payload: &[u8]) -> Result<BreakpointList, DecodeError> {
    serde_json::from_slice(payload).map_err(|source| DecodeError::Malformed {
        topic: Topic::Breakpoints,
        source,
    })
}

/// Markup payloads are taken verbatim; invalid UTF-8 sequences are replaced
pub fn decode_markup(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}
