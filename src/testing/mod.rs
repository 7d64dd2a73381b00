//! Testing utilities and fake implementations
//!
//! This module provides a fake transport for testing the monitor without a
//! running MQTT broker.

pub mod mocks;

pub use mocks::*;
