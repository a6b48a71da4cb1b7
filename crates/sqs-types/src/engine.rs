//! Boundary to the external optimization engine.

use async_trait::async_trait;

use crate::config::{Configuration, Precision, RunConfig};
use crate::errors::EngineFault;
use crate::progress::{ProgressReporter, RunResult};

/// Core engine interface.
///
/// Implementations wrap the actual search (a native module, a remote
/// service, or the synthetic engine in `sqs-engine`). An engine is
/// constructed once and shared by reference; callers hold it in an `Arc`.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Parse a raw configuration.
    ///
    /// Returns the engine's raw answer: either a normalised document or an
    /// object carrying `key`, `msg`, `code` and `parameter`. Classification
    /// into a [`crate::ParseOutcome`] happens at the call site through
    /// [`crate::classify`]. `Err` means the parser itself faulted.
    fn parse_config(&self, raw: &Configuration) -> Result<Configuration, EngineFault>;

    /// Run one optimization to completion or cooperative cancellation.
    ///
    /// `reporter` is called synchronously at the engine's reporting points;
    /// a [`crate::Control::Stop`] answer asks the engine to wind down. The
    /// future must still resolve after a stop request.
    async fn optimize(
        &self,
        config: RunConfig,
        precision: Precision,
        reporter: ProgressReporter,
    ) -> Result<RunResult, EngineFault>;
}
