use thiserror::Error;
use uuid::Uuid;

use crate::config::Configuration;
use crate::diagnostics::Diagnostic;

/// Main error type for the SQS orchestration core
#[derive(Error, Debug)]
pub enum SqsError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Configuration rejected with {} diagnostic(s)", diagnostics.len())]
    Rejected { diagnostics: Vec<Diagnostic> },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Structural failures of the share-token codec.
///
/// These are always surfaced to the caller: a corrupted link must never
/// silently produce a different configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Encoding failed: {message}")]
    Encoding { message: String },

    #[error("Decoding failed: {message}")]
    Decoding { message: String },

    #[error("Invalid share link: {message}")]
    InvalidLink { message: String },
}

/// A fault raised by the engine while parsing or optimizing.
///
/// The payload is whatever the engine attached and is carried unmodified.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Engine fault: {message}")]
pub struct EngineFault {
    pub message: String,
    pub payload: Configuration,
}

impl EngineFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: Configuration::Null,
        }
    }

    pub fn with_payload(mut self, payload: Configuration) -> Self {
        self.payload = payload;
        self
    }
}

/// Run-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error("{0}")]
    Engine(#[from] EngineFault),

    #[error("A run is already in flight: {run_id}")]
    AlreadyRunning { run_id: Uuid },

    #[error("Run aborted before settling: {message}")]
    Aborted { message: String },
}

/// Result type alias for SQS operations
pub type SqsResult<T> = Result<T, SqsError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::SqsError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_display() {
        let error = CodecError::Decoding {
            message: "invalid gzip header".to_string(),
        };

        assert!(error.to_string().contains("Decoding failed"));
        assert!(error.to_string().contains("invalid gzip header"));
    }

    #[test]
    fn test_error_conversion() {
        let fault = EngineFault::new("out of memory").with_payload(json!({"errno": 12}));
        let run_error: RunError = fault.clone().into();
        let sqs_error: SqsError = run_error.into();

        match sqs_error {
            SqsError::Run(RunError::Engine(inner)) => assert_eq!(inner, fault),
            other => panic!("Expected Run error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejected_counts_diagnostics() {
        let error = SqsError::Rejected {
            diagnostics: vec![Diagnostic::warning(vec!["iterations".into()], "bad")],
        };
        assert_eq!(
            error.to_string(),
            "Configuration rejected with 1 diagnostic(s)"
        );
    }

    #[test]
    fn test_config_error_macro() {
        let error = config_error!("Missing required field: {}", "app_url");
        assert!(matches!(error, SqsError::Config(_)));
        assert_eq!(
            error.to_string(),
            "Configuration error: Missing required field: app_url"
        );
    }
}
