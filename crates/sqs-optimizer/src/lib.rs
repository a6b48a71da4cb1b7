//! # sqs-optimizer
//!
//! Orchestration of special quasirandom structure searches.
//!
//! Provides configuration validation against the engine parser, a
//! cancellable run driver that streams progress snapshots, and the
//! composition root that ties validation, runs and share links together.

mod config;
mod orchestrator;
mod runner;
pub mod telemetry;
mod validator;

pub use config::{OrchestratorConfig, DEFAULT_APP_URL, DEFAULT_DOCS_URL};
pub use orchestrator::Orchestrator;
pub use runner::{OptimizationRunner, RunEvent, RunHandle};
pub use validator::ConfigValidator;
