//! Scrape coordinator
//!
//! Runs one task end to end: fan out to the enabled source adapters, record
//! progress as each resolves, merge what came back, classify it, and write the
//! result (or the failure) to the task store.
//!
//! A failing adapter is recorded against its source and the others carry on.
//! The task fails only when every adapter failed, when nothing was collected,
//! or when classification fails.

use anyhow::Context;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use super::analysis::{analyze_corpus, AnalysisSettings};
use super::classifier::{ClassificationError, Classifier};
use super::corpus::{merge, SourceOutcome};
use crate::models::{AnalysisResult, SourceKind, TaskUpdate};
use crate::sources::{AdapterRegistry, SourceError, SourceRequest};
use crate::store::{StoreError, TaskStore};

/// Progress once the coordinator picks the task up
pub const PROGRESS_STARTED: u8 = 5;
/// Width of the scraping band above `PROGRESS_STARTED`
pub const PROGRESS_SCRAPE_BAND: u8 = 75;
pub const PROGRESS_CLASSIFYING: u8 = 85;

/// Task-level failures
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Every enabled source failed; lists each source's reason
    #[error("All sources failed: {0}")]
    AllSourcesFailed(String),

    #[error("No reviews collected from any source")]
    EmptyCorpus,

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One scrape request: the product plus one request per enabled source
#[derive(Debug, Clone)]
pub struct ScrapeJob {
    pub product_name: String,
    pub requests: Vec<SourceRequest>,
}

impl ScrapeJob {
    pub fn sources(&self) -> Vec<SourceKind> {
        self.requests.iter().map(SourceRequest::kind).collect()
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Per-adapter deadline
    pub source_timeout: Duration,
    pub analysis: AnalysisSettings,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            source_timeout: Duration::from_secs(120),
            analysis: AnalysisSettings::default(),
        }
    }
}

#[derive(Clone)]
pub struct ScrapeCoordinator {
    store: TaskStore,
    adapters: AdapterRegistry,
    classifier: Arc<dyn Classifier>,
    settings: CoordinatorSettings,
}

/// Progress after `done` of `total` sources resolved
pub fn scrape_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return PROGRESS_STARTED;
    }
    let band = done.min(total) * PROGRESS_SCRAPE_BAND as usize / total;
    PROGRESS_STARTED + band as u8
}

impl ScrapeCoordinator {
    pub fn new(
        store: TaskStore,
        adapters: AdapterRegistry,
        classifier: Arc<dyn Classifier>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            store,
            adapters,
            classifier,
            settings,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Create a task for `job` and run it in the background
    pub async fn start(&self, job: ScrapeJob) -> Result<String, StoreError> {
        let task_id = self.store.create(&job.sources()).await?;

        let coordinator = self.clone();
        let id = task_id.clone();
        tokio::spawn(async move {
            info!(task_id = %id, product = %job.product_name, "Background scrape task started");

            if let Err(e) = coordinator.execute(&id, job).await {
                error!(task_id = %id, error = %format!("{:#}", e), "Background scrape task failed");
            } else {
                info!(task_id = %id, "Background scrape task finished");
            }
        });

        Ok(task_id)
    }

    /// Run a task and write its terminal state
    ///
    /// The returned error covers task failure and store failures alike; in
    /// both cases the task has been moved to `failed` when the store allows.
    pub async fn execute(&self, task_id: &str, job: ScrapeJob) -> anyhow::Result<()> {
        match self.run(task_id, &job).await {
            Ok(result) => {
                self.store
                    .set_result(task_id, result)
                    .await
                    .context("storing task result")?;
                info!(task_id = %task_id, "Task completed");
                Ok(())
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Task failed");
                self.store
                    .set_error(task_id, &e.to_string())
                    .await
                    .context("storing task failure")?;
                Err(e.into())
            }
        }
    }

    async fn run(&self, task_id: &str, job: &ScrapeJob) -> Result<AnalysisResult, ScrapeError> {
        let sources = job.sources();
        let names: Vec<&str> = sources.iter().map(SourceKind::display_name).collect();
        self.store
            .update(
                task_id,
                TaskUpdate::running(
                    PROGRESS_STARTED,
                    format!("Scraping {} sources: {}", sources.len(), names.join(", ")),
                ),
            )
            .await?;

        let outcomes = self.fetch_all(task_id, &job.requests).await?;

        if !outcomes.is_empty() && outcomes.iter().all(|o| o.result.is_err()) {
            let reasons: Vec<String> = outcomes
                .iter()
                .filter_map(|o| o.result.as_ref().err().map(|e| format!("{}: {}", o.source, e)))
                .collect();
            return Err(ScrapeError::AllSourcesFailed(reasons.join("; ")));
        }

        let corpus = merge(outcomes);
        if corpus.is_empty() {
            return Err(ScrapeError::EmptyCorpus);
        }

        self.store
            .update(
                task_id,
                TaskUpdate::progress(
                    PROGRESS_CLASSIFYING,
                    format!("Classifying {} reviews", corpus.total_records()),
                ),
            )
            .await?;

        let outcome = analyze_corpus(
            Arc::clone(&self.classifier),
            &job.product_name,
            &corpus,
            &self.settings.analysis,
        )
        .await?;

        Ok(AnalysisResult {
            product_name: job.product_name.clone(),
            sources: corpus.sources(),
            data_summary: corpus.summaries,
            sentiment_analysis: outcome.analysis,
            processing_mode: outcome.processing_mode,
        })
    }

    /// Run every adapter concurrently; outcomes come back in request order
    async fn fetch_all(
        &self,
        task_id: &str,
        requests: &[SourceRequest],
    ) -> Result<Vec<SourceOutcome>, ScrapeError> {
        let timeout = self.settings.source_timeout;
        let mut pending: FuturesUnordered<_> = requests
            .iter()
            .enumerate()
            .map(|(index, request)| {
                let adapter = self.adapters.get(request.kind());
                async move {
                    let source = request.kind();
                    info!(task_id = %task_id, source = %source, "Source fetch started");
                    let result = match adapter {
                        Some(adapter) => {
                            match tokio::time::timeout(timeout, adapter.fetch(request)).await {
                                Ok(result) => result,
                                Err(_) => Err(SourceError::Timeout(timeout.as_secs())),
                            }
                        }
                        None => Err(SourceError::Config(format!(
                            "no adapter registered for {}",
                            source
                        ))),
                    };
                    (
                        index,
                        SourceOutcome {
                            source,
                            query: request.query(),
                            result,
                        },
                    )
                }
            })
            .collect();

        let total = requests.len();
        let mut slots: Vec<Option<SourceOutcome>> = (0..total).map(|_| None).collect();
        let mut done = 0;

        while let Some((index, outcome)) = pending.next().await {
            done += 1;
            let message = match &outcome.result {
                Ok(batch) => {
                    info!(task_id = %task_id, source = %outcome.source, count = batch.len(), "Source fetch finished");
                    format!("{} finished: {} reviews", outcome.source.display_name(), batch.len())
                }
                Err(e) => {
                    warn!(task_id = %task_id, source = %outcome.source, error = %e, "Source fetch failed");
                    format!("{} failed: {}", outcome.source.display_name(), e)
                }
            };
            self.store
                .update(task_id, TaskUpdate::progress(scrape_progress(done, total), message))
                .await?;
            slots[index] = Some(outcome);
        }

        Ok(slots.into_iter().flatten().collect())
    }
}
