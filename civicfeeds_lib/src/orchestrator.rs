//! Uniform lifecycle around any extractor: extract, check for data, persist, report.
//!
//! No retries happen here; sub-unit retries belong to the extractors.

use std::path::PathBuf;
use std::sync::Arc;

use civicfeeds_transport::BrowserLauncher;

use crate::config::{AppConfig, SourceConfig};
use crate::extract::{extractor_for, Extractor, ExtractorDeps};
use crate::sink::{CsvSink, ProjectLayout, Sink};

/// Terminal state of one source run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success { records: usize, path: PathBuf },
    /// The extractor finished but produced nothing. Not a failure.
    NoData,
    Failed { reason: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::NoData => "no data",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Drives one extractor through the lifecycle and logs exactly one terminal line.
///
/// Extraction errors and sink errors are hard failures; an empty record set is
/// reported as [`RunOutcome::NoData`] and nothing is written.
pub async fn run(
    extractor: &dyn Extractor,
    name: &str,
    config: &SourceConfig,
    sink: &dyn Sink,
) -> RunOutcome {
    tracing::info!("Starting {} scraper", name);

    let records = match extractor.extract(config).await {
        Ok(records) => records,
        Err(e) => {
            tracing::error!("{}: failed after extraction error (0 records): {}", name, e);
            return RunOutcome::Failed {
                reason: e.to_string(),
            };
        }
    };

    if records.is_empty() {
        tracing::warn!("{}: no data produced (0 records)", name);
        return RunOutcome::NoData;
    }

    match sink.write(&records, &config.output()) {
        Ok(path) => {
            tracing::info!(
                "{}: saved {} records to {}",
                name,
                records.len(),
                path.display()
            );
            RunOutcome::Success {
                records: records.len(),
                path,
            }
        }
        Err(e) => {
            tracing::error!("{}: failed to persist {} records: {}", name, records.len(), e);
            RunOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceReport {
    /// Configuration key.
    pub key: String,
    /// Display name.
    pub name: String,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<SourceReport>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_success()).count()
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.total()
    }
}

/// Runs configured sources one after another against a shared sink.
pub struct Orchestrator {
    config: AppConfig,
    deps: ExtractorDeps,
    sink: Arc<dyn Sink>,
}

impl Orchestrator {
    /// Orchestrator writing CSV files under `project_root`.
    pub fn new(
        config: AppConfig,
        project_root: PathBuf,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Self {
        let layout = ProjectLayout::new(project_root, config.data_dirs.clone());
        let sink: Arc<dyn Sink> = Arc::new(CsvSink::new(layout.clone()));
        let deps = ExtractorDeps {
            launcher,
            browser: config.browser.clone(),
            layout,
        };
        Self { config, deps, sink }
    }

    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = sink;
        self
    }

    /// Runs one source by key. Unknown or invalid configuration is a failed run.
    pub async fn run_source(&self, key: &str) -> SourceReport {
        let source = match self.config.source(key) {
            Ok(source) => source,
            Err(e) => {
                tracing::error!("{}: failed before extraction (0 records): {}", key, e);
                return SourceReport {
                    key: key.to_string(),
                    name: key.to_string(),
                    outcome: RunOutcome::Failed {
                        reason: e.to_string(),
                    },
                };
            }
        };

        let name = source.display_name(key).to_string();
        let extractor = extractor_for(source, &self.deps);
        let outcome = run(extractor.as_ref(), &name, source, self.sink.as_ref()).await;
        SourceReport {
            key: key.to_string(),
            name,
            outcome,
        }
    }

    /// Runs the given sources sequentially, in the order given.
    pub async fn run_sources<S: AsRef<str>>(&self, keys: &[S]) -> RunSummary {
        let mut summary = RunSummary::default();
        for key in keys {
            summary.reports.push(self.run_source(key.as_ref()).await);
        }
        tracing::info!("Successful: {}/{}", summary.succeeded(), summary.total());
        summary
    }

    /// Runs every source marked `enabled`, in configuration order.
    pub async fn run_enabled(&self) -> RunSummary {
        let keys = self.config.enabled_sources();
        self.run_sources(&keys).await
    }
}
