//! Configuration gate in front of the engine.
//!
//! [`ConfigValidator`] turns whatever the engine parser answers (or how it
//! fails) into a well-formed [`ParseOutcome`] and UI-ready [`Diagnostic`]s.
//! Engine faults never escape this boundary.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use sqs_types::{
    classify, normalize_modes, Configuration, Diagnostic, Engine, ParseError, ParseOutcome,
};

/// Flattened engine keys and the public field path they stand for.
const PATH_REMAPPING: &[(&str, &[&str])] = &[("sites", &["composition", "sites"])];

const FALLBACK_MESSAGE: &str = "The engine rejected the configuration.";

pub struct ConfigValidator<E: Engine + ?Sized> {
    engine: Arc<E>,
    docs_url: Option<String>,
}

impl<E: Engine + ?Sized> ConfigValidator<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            docs_url: None,
        }
    }

    pub fn with_docs_url(mut self, docs_url: Option<String>) -> Self {
        self.docs_url = docs_url;
        self
    }

    /// Ask the engine to parse `config`.
    ///
    /// Mode selectors are normalised first; an unrecognised selector is
    /// reported without consulting the engine. A parser fault or panic
    /// becomes [`ParseError::unknown`].
    pub fn parse_config(&self, config: &Configuration) -> ParseOutcome {
        let normalized = match normalize_modes(config) {
            Ok(normalized) => normalized,
            Err(error) => {
                debug!(key = %error.key, "mode selector rejected before engine parse");
                return Err(error);
            }
        };

        let answer = catch_unwind(AssertUnwindSafe(|| self.engine.parse_config(&normalized)));
        match answer {
            Ok(Ok(raw)) => {
                let outcome = classify(raw);
                if let Err(error) = &outcome {
                    debug!(key = %error.key, code = error.code.code(), "engine rejected configuration");
                }
                outcome
            }
            Ok(Err(fault)) => {
                warn!(error = %fault, "engine parser faulted, reporting unknown parse error");
                Err(ParseError::unknown())
            }
            Err(_) => {
                warn!("engine parser panicked, reporting unknown parse error");
                Err(ParseError::unknown())
            }
        }
    }

    /// Diagnostics for `config`; empty when the engine accepts it.
    ///
    /// A rejection yields exactly one warning-level diagnostic.
    pub fn validate(&self, config: &Configuration) -> Vec<Diagnostic> {
        match self.parse_config(config) {
            Ok(_) => Vec::new(),
            Err(error) => vec![self.diagnostic_for(&error)],
        }
    }

    pub fn diagnostic_for(&self, error: &ParseError) -> Diagnostic {
        let message = if error.msg.trim().is_empty() {
            FALLBACK_MESSAGE.to_string()
        } else {
            error.msg.clone()
        };
        let diagnostic = Diagnostic::warning(Self::path_for_key(Some(&error.key)), message);

        match (&self.docs_url, &error.parameter) {
            (Some(docs), Some(parameter)) if !parameter.is_empty() => {
                diagnostic.with_help_url(format!("{docs}#{parameter}"))
            }
            _ => diagnostic,
        }
    }

    /// Map a flattened engine key to the nested field path shown to the user.
    ///
    /// Unmapped keys become a single segment; an absent or empty key is the
    /// document root.
    pub fn path_for_key(key: Option<&str>) -> Vec<String> {
        match key {
            None | Some("") => Vec::new(),
            Some(key) => PATH_REMAPPING
                .iter()
                .find(|(flattened, _)| *flattened == key)
                .map(|(_, path)| path.iter().map(|segment| segment.to_string()).collect())
                .unwrap_or_else(|| vec![key.to_string()]),
        }
    }
}
