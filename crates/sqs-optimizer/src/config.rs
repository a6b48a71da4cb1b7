//! Orchestrator settings.

use serde::{Deserialize, Serialize};

use sqs_types::{config_error, Precision, SqsResult};

pub const DEFAULT_APP_URL: &str = "https://sqsgen.gehringer.tech";
pub const DEFAULT_DOCS_URL: &str =
    "https://sqsgenerator.readthedocs.io/en/latest/input_parameters.html";

pub const ENV_APP_URL: &str = "SQSGEN_APP_URL";
pub const ENV_DOCS_URL: &str = "SQSGEN_DOCS_URL";
pub const ENV_PRECISION: &str = "SQSGEN_PRECISION";
pub const ENV_STRIP_STRUCTURE_FILE: &str = "SQSGEN_STRIP_STRUCTURE_FILE";

/// Top-level configuration for an [`crate::Orchestrator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Web application share links point at.
    pub app_url: String,

    /// Parameter documentation page; diagnostics link to `<docs_url>#<parameter>`.
    pub docs_url: Option<String>,

    /// Precision used when the caller does not choose one. `None` defers to
    /// the precision in the validated configuration.
    pub default_precision: Option<Precision>,

    /// Remove `structure.file` before sharing. A link recipient cannot read
    /// the sender's local files.
    pub strip_structure_file: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            app_url: DEFAULT_APP_URL.to_string(),
            docs_url: Some(DEFAULT_DOCS_URL.to_string()),
            default_precision: None,
            strip_structure_file: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `SQSGEN_*` environment variables.
    pub fn from_env() -> SqsResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`Self::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> SqsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_APP_URL) {
            config.app_url = url;
        }
        if let Some(url) = lookup(ENV_DOCS_URL) {
            config.docs_url = if url.trim().is_empty() { None } else { Some(url) };
        }
        if let Some(precision) = lookup(ENV_PRECISION) {
            let precision = precision
                .parse::<Precision>()
                .map_err(|e| config_error!("{ENV_PRECISION}: {e}"))?;
            config.default_precision = Some(precision);
        }
        if let Some(flag) = lookup(ENV_STRIP_STRUCTURE_FILE) {
            config.strip_structure_file = match flag.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(config_error!(
                        "{ENV_STRIP_STRUCTURE_FILE}: expected a boolean, got {other:?}"
                    ))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_app_url(mut self, url: impl Into<String>) -> Self {
        self.app_url = url.into();
        self
    }

    pub fn with_docs_url(mut self, url: Option<String>) -> Self {
        self.docs_url = url;
        self
    }

    pub fn with_default_precision(mut self, precision: Precision) -> Self {
        self.default_precision = Some(precision);
        self
    }

    pub fn with_strip_structure_file(mut self, strip: bool) -> Self {
        self.strip_structure_file = strip;
        self
    }

    pub fn validate(&self) -> SqsResult<()> {
        url::Url::parse(&self.app_url).map_err(|e| config_error!("app_url {:?}: {e}", self.app_url))?;
        Ok(())
    }
}
