//! Composition root: validate, run, share.

use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use sqs_codec::ShareLink;
use sqs_types::{
    Configuration, Control, Diagnostic, Engine, Precision, ProgressSnapshot, RunConfig,
    RunResult, SqsError, SqsResult,
};

use crate::config::OrchestratorConfig;
use crate::runner::{OptimizationRunner, RunHandle};
use crate::validator::ConfigValidator;

/// Wires the validator, runner and share-link codec around one engine.
pub struct Orchestrator<E: Engine + ?Sized + 'static> {
    config: OrchestratorConfig,
    validator: ConfigValidator<E>,
    runner: OptimizationRunner<E>,
}

impl<E: Engine + ?Sized + 'static> Orchestrator<E> {
    pub fn new(engine: Arc<E>, config: OrchestratorConfig) -> Self {
        let validator =
            ConfigValidator::new(engine.clone()).with_docs_url(config.docs_url.clone());
        let runner = OptimizationRunner::new(engine);
        Self {
            config,
            validator,
            runner,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn validator(&self) -> &ConfigValidator<E> {
        &self.validator
    }

    pub fn runner(&self) -> &OptimizationRunner<E> {
        &self.runner
    }

    pub fn validate(&self, config: &Configuration) -> Vec<Diagnostic> {
        self.validator.validate(config)
    }

    /// Parse `config`, turning a rejection into [`SqsError::Rejected`].
    pub fn parse(&self, config: &Configuration) -> SqsResult<RunConfig> {
        self.validator.parse_config(config).map_err(|error| {
            warn!(key = %error.key, "configuration rejected");
            SqsError::Rejected {
                diagnostics: vec![self.validator.diagnostic_for(&error)],
            }
        })
    }

    /// Caller choice, then the configured default, then the document's own.
    fn resolve_precision(&self, requested: Option<Precision>, run_config: &RunConfig) -> Precision {
        requested
            .or(self.config.default_precision)
            .unwrap_or(run_config.precision)
    }

    /// Validate and start a run without waiting for it.
    pub fn start(
        &self,
        config: &Configuration,
        precision: Option<Precision>,
    ) -> SqsResult<RunHandle> {
        let run_config = self.parse(config)?;
        let precision = self.resolve_precision(precision, &run_config);
        Ok(self
            .runner
            .start(run_config.with_precision(precision), precision)?)
    }

    /// Validate, run to settlement and stream progress to `on_progress`.
    ///
    /// A rejected configuration never reaches the engine.
    pub async fn submit<F>(
        &self,
        config: &Configuration,
        precision: Option<Precision>,
        on_progress: F,
    ) -> SqsResult<RunResult>
    where
        F: FnMut(&ProgressSnapshot) -> Control,
    {
        let run_config = self.parse(config)?;
        let precision = self.resolve_precision(precision, &run_config);
        let result = self
            .runner
            .run(run_config.with_precision(precision), precision, on_progress)
            .await?;
        Ok(result)
    }

    /// Share link reproducing `config`.
    ///
    /// Configurations the engine rejects are not shared.
    pub fn share(&self, config: &Configuration) -> SqsResult<Url> {
        self.parse(config)?;

        let mut shared = config.clone();
        if self.config.strip_structure_file {
            if let Some(structure) = shared.get_mut("structure").and_then(|s| s.as_object_mut()) {
                structure.remove("file");
            }
        }

        let link = ShareLink::build(&self.config.app_url, &shared)?;
        info!(link_len = link.as_str().len(), "share link created");
        Ok(link)
    }

    /// Configuration carried by a share link. Decoding failures are errors;
    /// nothing partial is returned.
    pub fn load(&self, link: &str) -> SqsResult<Configuration> {
        ShareLink::parse(link).map_err(|error| {
            warn!(error = %error, "share link could not be decoded");
            SqsError::from(error)
        })
    }

    /// Load a share link and run the configuration it carries.
    pub async fn submit_link<F>(
        &self,
        link: &str,
        precision: Option<Precision>,
        on_progress: F,
    ) -> SqsResult<RunResult>
    where
        F: FnMut(&ProgressSnapshot) -> Control,
    {
        let config = self.load(link)?;
        self.submit(&config, precision, on_progress).await
    }
}
