//! Runtime glue: configuration, error types, crash reporting, telemetry, and
//! the signal-aware runner.

pub mod config;
pub mod crash;
pub mod error;
pub mod runner;
pub mod telemetry;
