//! Synthetic SQS engine.
//!
//! Implements the engine boundary in-process so the orchestrator can be
//! exercised end to end without the native optimizer.

pub mod parser;
pub mod search;

pub use parser::{parse_document, read_model, Model, Sublattice};
pub use search::{SearchSettings, SyntheticEngine};
