//! Batch orchestrator: drives the pipeline across the item catalog.
//!
//! Per item the lifecycle is `Pending -> InProgress -> {Succeeded,
//! Failed(retryable), Failed(terminal)}`. A run seeds the store from the
//! catalog, skips items that already succeeded or failed terminally, and
//! dispatches the rest through a bounded worker pool. Each worker owns one
//! in-flight backend invocation at a time; the store is the only shared
//! mutable resource and every write is a single-item upsert.
//!
//! The attempt counter and the per-class failure tally are persisted after
//! every attempt, so a crash or cancellation mid-run resumes correctly:
//! reruns only pick up pending and retryable-failed items and never retry a
//! class past its configured ceiling.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{BackendAdapter, InvocationRequest};
use crate::catalog::{Catalog, CatalogError, Item};
use crate::error::{ClassifiedError, RetryClass, StoreError};
use crate::extract;
use crate::prompt::PromptTemplate;
use crate::schema::{validate, KanjiRecord};
use crate::store::{GenerationOutcome, ResultStore};

use super::config::{ConfigError, GenerationConfig};

/// How many times a failed store write is retried before the run aborts.
const STORE_WRITE_TRIES: usize = 3;

/// Errors that can occur during pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Catalog could not be loaded.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The result store failed and the run cannot proceed with
    /// unpersisted state.
    #[error("result store error: {0}")]
    Store(#[from] StoreError),

    /// A worker task panicked.
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Summary of one batch run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Identifier for this run, carried through the logs.
    pub run_id: Uuid,
    /// Items that ended the run with a validated record.
    pub succeeded: u64,
    /// Items that needed at least one retry this run (any final status).
    pub retried: u64,
    /// Items that hit their retry ceiling and will not be reattempted.
    pub failed_terminal: u64,
    /// Items left retryable (cancellation mid-run).
    pub failed_retryable: u64,
    /// Items skipped because the store already resolved them.
    pub skipped: u64,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl RunReport {
    fn new(run_id: Uuid, skipped: u64) -> Self {
        Self {
            run_id,
            succeeded: 0,
            retried: 0,
            failed_terminal: 0,
            failed_retryable: 0,
            skipped,
            duration: Duration::ZERO,
        }
    }

    /// Whether the run should be reported as failed to the caller.
    pub fn has_terminal_failures(&self) -> bool {
        self.failed_terminal > 0
    }
}

/// Final per-item status within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemStatus {
    Succeeded,
    FailedRetryable,
    FailedTerminal,
}

#[derive(Debug)]
struct ItemResult {
    status: ItemStatus,
    attempts_this_run: u32,
}

/// Coordinates catalog traversal, backend invocation, extraction,
/// validation, retry policy, and persistence.
pub struct BatchOrchestrator {
    config: GenerationConfig,
    adapter: Arc<dyn BackendAdapter>,
    store: Arc<Mutex<ResultStore>>,
    template: PromptTemplate,
    shutdown_tx: broadcast::Sender<()>,
    // Keeps the channel alive so a signal sent before `run` subscribes is
    // neither an error nor lost.
    early_shutdown: std::sync::Mutex<broadcast::Receiver<()>>,
}

impl BatchOrchestrator {
    /// Creates a new orchestrator. The backend adapter and schema version
    /// are fixed for the lifetime of the run.
    pub fn new(
        config: GenerationConfig,
        adapter: Arc<dyn BackendAdapter>,
        store: ResultStore,
        template: PromptTemplate,
    ) -> Self {
        // Buffer size of 1 is sufficient since cancellation is sent once.
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        Self {
            config,
            adapter,
            store: Arc::new(Mutex::new(store)),
            template,
            shutdown_tx,
            early_shutdown: std::sync::Mutex::new(shutdown_rx),
        }
    }

    /// Returns a handle that cancels the run when signalled. Dispatch of new
    /// items stops immediately; in-flight invocations finish or time out.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Returns a handle to the shared result store.
    pub fn store(&self) -> Arc<Mutex<ResultStore>> {
        Arc::clone(&self.store)
    }

    /// Runs the batch over the catalog and returns the run summary.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Store` if persistence failed after retries;
    /// the run aborts rather than proceed with unpersisted state.
    pub async fn run(self: Arc<Self>, catalog: &Catalog) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();

        // Resume semantics: only pending and retryable-failed items are
        // dispatched; their persisted attempt counters (total and per retry
        // class) carry over.
        type Work = (Item, u32, BTreeMap<RetryClass, u32>);
        let work: Vec<Work> = {
            let mut store = self.store.lock().await;
            store.seed(catalog)?;
            catalog
                .items()
                .iter()
                .filter_map(|item| match store.get(&item.kanji) {
                    Some(entry) if !entry.needs_work() => None,
                    Some(entry) => Some((
                        item.clone(),
                        entry.attempts,
                        entry.attempts_by_class.clone(),
                    )),
                    None => Some((item.clone(), 0, BTreeMap::new())),
                })
                .collect()
        };
        let skipped = (catalog.len() - work.len()) as u64;
        let work: Vec<Work> = if self.config.limit > 0 {
            work.into_iter().take(self.config.limit).collect()
        } else {
            work
        };

        info!(
            run_id = %run_id,
            backend = %self.config.backend,
            schema = %self.config.schema_version,
            items = work.len(),
            skipped,
            concurrency = self.config.concurrency,
            "Starting generation run"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        // A signal sent before this point landed in the receiver held since
        // construction.
        let already_cancelled = {
            let mut early = self
                .early_shutdown
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            !matches!(
                early.try_recv(),
                Err(broadcast::error::TryRecvError::Empty)
            )
        };
        if already_cancelled {
            info!(run_id = %run_id, "Cancellation already signalled; dispatching nothing");
        }

        let mut handles = Vec::with_capacity(work.len());
        let work = if already_cancelled { Vec::new() } else { work };

        for (item, prior_attempts, prior_by_class) in work {
            // Biased towards shutdown so a pending cancellation always wins
            // over dispatching another item.
            let permit = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!(run_id = %run_id, "Cancellation received; stopping dispatch");
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let this = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                let result = this
                    .process_item(&item, prior_attempts, prior_by_class)
                    .await;
                drop(permit);
                result
            }));
        }

        let mut report = RunReport::new(run_id, skipped);
        let mut store_error: Option<StoreError> = None;
        for handle in handles {
            match handle.await? {
                Ok(result) => {
                    match result.status {
                        ItemStatus::Succeeded => report.succeeded += 1,
                        ItemStatus::FailedRetryable => report.failed_retryable += 1,
                        ItemStatus::FailedTerminal => report.failed_terminal += 1,
                    }
                    if result.attempts_this_run > 1 {
                        report.retried += 1;
                    }
                }
                Err(e) => {
                    // A write that failed after retries; stop the run rather
                    // than continue with unpersisted state.
                    error!(run_id = %run_id, error = %e, "Result store write failed; aborting run");
                    let _ = self.shutdown_tx.send(());
                    store_error.get_or_insert(e);
                }
            }
        }

        report.duration = started.elapsed();
        if let Some(e) = store_error {
            return Err(PipelineError::Store(e));
        }

        info!(
            run_id = %run_id,
            succeeded = report.succeeded,
            retried = report.retried,
            failed_terminal = report.failed_terminal,
            failed_retryable = report.failed_retryable,
            skipped = report.skipped,
            duration_s = report.duration.as_secs(),
            "Generation run finished"
        );
        Ok(report)
    }

    /// Processes one item to a terminal-or-retryable outcome, persisting
    /// after every attempt.
    ///
    /// The terminal decision is per retry class: each class is measured
    /// against its own ceiling, so an error class first seen on a late
    /// attempt still gets its full quota of retries.
    async fn process_item(
        &self,
        item: &Item,
        prior_attempts: u32,
        mut attempts_by_class: BTreeMap<RetryClass, u32>,
    ) -> Result<ItemResult, StoreError> {
        let mut attempts = prior_attempts;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            attempts += 1;
            debug!(kanji = %item.kanji, attempt = attempts, "Generating explanation");

            match self.attempt(item).await {
                Ok(record) => {
                    self.persist(
                        item,
                        GenerationOutcome::Succeeded {
                            record,
                            backend: self.adapter.kind(),
                            attempts,
                        },
                    )
                    .await?;
                    info!(kanji = %item.kanji, attempts, "Validated record persisted");
                    return Ok(ItemResult {
                        status: ItemStatus::Succeeded,
                        attempts_this_run: attempts - prior_attempts,
                    });
                }
                Err(error) => {
                    let class = error.retry_class();
                    let class_attempts = {
                        let slot = attempts_by_class.entry(class).or_insert(0);
                        *slot += 1;
                        *slot
                    };
                    let terminal = class_attempts >= self.config.max_attempts_for(class);
                    warn!(
                        kanji = %item.kanji,
                        attempt = attempts,
                        class_attempt = class_attempts,
                        kind = %error.kind,
                        terminal,
                        "Attempt failed: {}",
                        error.message
                    );
                    self.persist(
                        item,
                        GenerationOutcome::Failed {
                            error,
                            backend: self.adapter.kind(),
                            attempts,
                            attempts_by_class: attempts_by_class.clone(),
                            retryable: !terminal,
                        },
                    )
                    .await?;

                    if terminal {
                        return Ok(ItemResult {
                            status: ItemStatus::FailedTerminal,
                            attempts_this_run: attempts - prior_attempts,
                        });
                    }

                    // Short pause before the next attempt; cancellation
                    // leaves the item retryable for the next run.
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => {
                            return Ok(ItemResult {
                                status: ItemStatus::FailedRetryable,
                                attempts_this_run: attempts - prior_attempts,
                            });
                        }
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                    }
                }
            }
        }
    }

    /// One attempt: invoke, extract, validate.
    async fn attempt(&self, item: &Item) -> Result<KanjiRecord, ClassifiedError> {
        let request = InvocationRequest {
            prompt: self.template.render(&item.kanji),
            timeout: self.config.invocation_timeout,
            model: self.config.model.clone(),
        };
        let raw = self.adapter.invoke(&request).await?;
        let doc = extract::extract(raw, self.adapter.kind())?;
        let record = validate(&doc, self.config.schema_version)?;
        Ok(record)
    }

    /// Persists an outcome, retrying at the store layer before giving up.
    async fn persist(&self, item: &Item, outcome: GenerationOutcome) -> Result<(), StoreError> {
        let mut last_err = None;
        for write_try in 1..=STORE_WRITE_TRIES {
            {
                let mut store = self.store.lock().await;
                match store.put(item, outcome.clone()) {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        warn!(
                            kanji = %item.kanji,
                            write_try,
                            error = %e,
                            "Store write failed"
                        );
                        last_err = Some(e);
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Err(last_err
            .unwrap_or_else(|| StoreError::WriteConflict("store write failed".to_string())))
    }
}
