//! Logging setup for binaries and tests embedding the orchestrator.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{filter, fmt, registry};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "sqs_optimizer=info,sqs_codec=info,sqs_engine=info";

pub fn new_filter(default_filter: &str) -> filter::EnvFilter {
    filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter::EnvFilter::new(default_filter))
}

/// Install a global fmt subscriber filtered by `RUST_LOG`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    registry()
        .with(fmt::layer().with_target(true).with_filter(new_filter(default_filter)))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        let _ = init_tracing(DEFAULT_FILTER);
        assert!(!init_tracing("debug"));
    }
}
