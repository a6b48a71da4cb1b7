//! Field-scoped validation messages for the presentation layer.

use serde::{Deserialize, Serialize};

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Advisory: shown next to the field, does not by itself block editing.
    Warning,
    /// The configuration cannot be used as is.
    Error,
}

/// A message attached to a position in the configuration tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Nested field path, outermost segment first. Empty for the document root.
    pub path: Vec<String>,
    pub message: String,
    pub severity: Severity,
    /// Documentation page for the offending parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,
}

impl Diagnostic {
    pub fn new(path: Vec<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            path,
            message: message.into(),
            severity,
            help_url: None,
        }
    }

    pub fn warning(path: Vec<String>, message: impl Into<String>) -> Self {
        Self::new(path, message, Severity::Warning)
    }

    pub fn with_help_url(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn diagnostic_serialization() {
        let diagnostic = Diagnostic::warning(
            vec!["composition".into(), "sites".into()],
            "overlapping sublattices",
        );
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["severity"], "warning");
        assert!(json.get("help_url").is_none());

        let back: Diagnostic = serde_json::from_value(json).unwrap();
        assert_eq!(back, diagnostic);
    }
}
