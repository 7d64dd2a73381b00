//! Wire protocol between the fuzzer backend and the monitor
//!
//! The backend publishes on a closed set of topics; this module names them and
//! defines the schemas of the structured payloads.

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::*;
