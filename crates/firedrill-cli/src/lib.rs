//! Command line driver for firedrill scenarios

pub mod logging;
pub mod replay;

/// Scenario written by `firedrill init`
pub const EXAMPLE_SCENARIO: &str = include_str!("../scenarios/fire_drill.toml");
