//! Progress reporting and run results.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{Configuration, Precision};

/// Unique optimization run identifier.
pub type RunId = Uuid;

/// Point-in-time optimization statistics reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Iterations currently being evaluated.
    pub working: u64,
    /// Iterations evaluated so far.
    pub finished: u64,
    pub best_rank: i64,
    pub best_objective: f64,
}

/// What the progress consumer wants the engine to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Control {
    Continue,
    /// Cooperative cancellation request. The engine observes it at its own
    /// check points and still settles normally afterwards.
    Stop,
}

impl Default for Control {
    fn default() -> Self {
        Self::Continue
    }
}

impl Control {
    pub fn is_stop(self) -> bool {
        matches!(self, Self::Stop)
    }
}

type Sink = dyn Fn(ProgressSnapshot) -> Control + Send + Sync;

/// Handle the engine calls from its reporting points.
///
/// `report` runs synchronously on the engine's reporting path, so sinks must
/// return quickly.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<Sink>,
}

impl ProgressReporter {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(ProgressSnapshot) -> Control + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// A reporter nobody listens to. Always answers `Continue`.
    pub fn detached() -> Self {
        Self::new(|_| Control::Continue)
    }

    pub fn report(&self, snapshot: ProgressSnapshot) -> Control {
        (self.sink)(snapshot)
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}

/// Final outcome of a settled optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub precision: Precision,
    pub best_objective: Option<f64>,
    pub best_rank: Option<i64>,
    /// Iterations evaluated before the run settled.
    pub finished: u64,
    /// Whether the engine stopped early because a stop was requested.
    pub cancelled: bool,
    /// Engine-defined result pack (structures, objectives, ...).
    pub payload: Configuration,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn new(run_id: RunId, precision: Precision, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            precision,
            best_objective: None,
            best_rank: None,
            finished: 0,
            cancelled: false,
            payload: Configuration::Null,
            started_at,
            finished_at: started_at,
        }
    }

    pub fn with_best(mut self, rank: i64, objective: f64) -> Self {
        self.best_rank = Some(rank);
        self.best_objective = Some(objective);
        self
    }

    pub fn with_payload(mut self, payload: Configuration) -> Self {
        self.payload = payload;
        self
    }

    pub fn mark_finished(&mut self, finished: u64, cancelled: bool) {
        self.finished = finished;
        self.cancelled = cancelled;
        self.finished_at = Utc::now();
    }

    pub fn duration(&self) -> Duration {
        self.finished_at - self.started_at
    }
}
