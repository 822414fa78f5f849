// THEORY:
// This file is the main entry point for the `mist_meter` library crate. It
// exposes the fog-detection pipeline (`pipeline::MistPipeline`) and the pieces
// it is built from, so the `mist_meter` binary and the `mist_tester`
// calibration tool share one implementation of the measurement and overlay.
//
// - `core_modules`: the pure stages (frame loading, metrics, rule,
//   classifier, fusion, annotation).
// - `dispatch`: the three outbound sinks.
// - `config`, `error`, `lock`: the ambient plumbing around a run.

pub mod config;
pub mod core_modules;
pub mod dispatch;
pub mod error;
pub mod lock;
pub mod pipeline;

pub use config::MeterConfig;
pub use error::MeterError;
pub use pipeline::{MistPipeline, ProductionPipeline, RunOutcome};
