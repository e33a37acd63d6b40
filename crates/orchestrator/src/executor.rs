//! Batch execution: bounded concurrency inside a batch, strict ordering between batches.
//!
//! Workers only report events over a channel. The coordinator loop owns every
//! piece of mutable run state (outcomes, in-flight gauge, token totals) and
//! turns events into progress updates.

use crate::backend::{Backend, BackendError, RetryFailure, RetryPolicy};
use crate::error::{ErrorClass, StepError};
use crate::files::FileAccess;
use crate::prompt::build_prompt;
use corpus_chunker::{ContentType, SemanticChunker};
use corpus_graph::{DependencyGraph, ExecutionBatch, ExecutionPlan};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

/// Result of analyzing one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOutcome {
    pub index: usize,
    pub text: Option<String>,
    pub tokens_used: usize,
    pub attempts: u32,
    pub error: Option<StepError>,
}

/// Result of analyzing one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub file: String,
    pub batch: usize,
    pub status: StepStatus,
    /// Ordered by chunk index
    pub chunks: Vec<ChunkOutcome>,
    pub error: Option<StepError>,
    /// A dependency of this file failed earlier in the run
    pub recovered: bool,
    pub elapsed_ms: u64,
}

impl StepOutcome {
    fn skipped(file: &str, batch: usize, error: StepError) -> Self {
        Self {
            file: file.to_string(),
            batch,
            status: StepStatus::Skipped,
            chunks: Vec::new(),
            error: Some(error),
            recovered: false,
            elapsed_ms: 0,
        }
    }

    pub fn tokens_used(&self) -> usize {
        self.chunks.iter().map(|c| c.tokens_used).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryKind {
    SkippedFailedStep,
    ForcedCycleBatch,
    ReducedConcurrency,
    Sampled,
    Cancelled,
    Halted,
}

/// Something the run did to keep going (or to stop cleanly)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub batch: Option<usize>,
    pub kind: RecoveryKind,
    pub detail: String,
}

impl RecoveryAction {
    pub fn new(batch: Option<usize>, kind: RecoveryKind, detail: impl Into<String>) -> Self {
        Self {
            batch,
            kind,
            detail: detail.into(),
        }
    }
}

/// Snapshot sent to a [`ProgressSink`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub batch: usize,
    pub total_batches: usize,
    pub completed_files: usize,
    pub total_files: usize,
    pub chunks_processed: usize,
    pub in_flight: usize,
    pub tokens_used: usize,
    pub current_file: Option<String>,
}

pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, update: &ProgressUpdate);

    fn on_batch_start(&self, _batch: &ExecutionBatch, _total_batches: usize) {}

    fn on_finish(&self, _update: &ProgressUpdate) {}
}

pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_progress(&self, _update: &ProgressUpdate) {}
}

/// Forwards progress updates to an unbounded channel
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn on_progress(&self, update: &ProgressUpdate) {
        // Receiver may be gone; progress is best-effort
        let _ = self.tx.send(update.clone());
    }
}

/// Runs between batches to release memory
pub trait CleanupHook: Send + Sync {
    fn between_batches(&self, completed_batch: usize);
}

/// Clears the file content cache between batches
pub struct CacheCleanup {
    files: Arc<dyn FileAccess>,
}

impl CacheCleanup {
    pub fn new(files: Arc<dyn FileAccess>) -> Self {
        Self { files }
    }
}

impl CleanupHook for CacheCleanup {
    fn between_batches(&self, completed_batch: usize) {
        log::debug!("Releasing cached content after batch {completed_batch}");
        self.files.clear_cache();
    }
}

/// Per-run knobs supplied by the caller
pub struct ExecutionOptions {
    pub cancel: CancellationToken,
    pub progress: Arc<dyn ProgressSink>,
    pub cleanup: Option<Arc<dyn CleanupHook>>,
    /// Overrides the configured skip-on-failure behavior
    pub skip_failed_steps: Option<bool>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            progress: Arc::new(NoopProgress),
            cleanup: None,
            skip_failed_steps: None,
        }
    }
}

/// Resource accounting for a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub peak_in_flight: usize,
    pub tokens_used: usize,
    pub chunks_processed: usize,
    pub batches_run: usize,
    pub final_concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Ordered by batch, then by position within the batch
    pub steps: Vec<StepOutcome>,
    pub recovery_actions: Vec<RecoveryAction>,
    pub resources: ResourceUsage,
    pub halted: bool,
    pub cancelled: bool,
}

impl ExecutionReport {
    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

/// Shared, read-only state handed to every worker
pub(crate) struct WorkerContext {
    pub backend: Arc<dyn Backend>,
    pub files: Arc<dyn FileAccess>,
    pub chunker: SemanticChunker,
    pub retry: RetryPolicy,
    pub token_budget: usize,
    pub root: PathBuf,
}

enum WorkerEvent {
    Started { file: String },
    ChunkFinished { tokens_used: usize },
    Finished(StepOutcome),
}

/// Tracks in-flight work; mutated only by the coordinator
#[derive(Default)]
struct Gauge {
    in_flight: usize,
    peak_in_flight: usize,
    tokens_used: usize,
    chunks_processed: usize,
    completed_files: usize,
}

pub(crate) struct Executor {
    ctx: Arc<WorkerContext>,
    concurrency: usize,
    skip_failed_steps: bool,
    batch_time_budget: Option<Duration>,
}

impl Executor {
    pub(crate) fn new(
        ctx: WorkerContext,
        concurrency: usize,
        skip_failed_steps: bool,
        batch_time_budget: Option<Duration>,
    ) -> Self {
        Self {
            ctx: Arc::new(ctx),
            concurrency: concurrency.max(1),
            skip_failed_steps,
            batch_time_budget,
        }
    }

    /// Run every batch of `plan` in order
    pub(crate) async fn run(
        &self,
        plan: &ExecutionPlan,
        graph: &DependencyGraph,
        options: &ExecutionOptions,
    ) -> ExecutionReport {
        let skip_failed = options.skip_failed_steps.unwrap_or(self.skip_failed_steps);
        let total_batches = plan.batches.len();
        let total_files = plan.file_count();

        let mut concurrency = self.concurrency;
        let mut gauge = Gauge::default();
        let mut steps: Vec<StepOutcome> = Vec::with_capacity(total_files);
        let mut failed: HashSet<String> = HashSet::new();
        let mut actions: Vec<RecoveryAction> = Vec::new();
        let mut halted = false;
        let mut cancelled = false;
        let mut batches_run = 0;

        for batch in &plan.batches {
            if halted || options.cancel.is_cancelled() {
                if !halted && !cancelled {
                    cancelled = true;
                    actions.push(RecoveryAction::new(
                        Some(batch.index),
                        RecoveryKind::Cancelled,
                        "cancellation requested before batch start",
                    ));
                }
                let reason = if halted {
                    StepError::new(ErrorClass::Internal, "run halted after an earlier failure")
                } else {
                    StepError::new(ErrorClass::Cancelled, "run cancelled")
                };
                steps.extend(
                    batch
                        .files
                        .iter()
                        .map(|f| StepOutcome::skipped(f, batch.index, reason.clone())),
                );
                continue;
            }

            if batch.forced {
                actions.push(RecoveryAction::new(
                    Some(batch.index),
                    RecoveryKind::ForcedCycleBatch,
                    format!("{} file(s) in dependency cycles scheduled together", batch.len()),
                ));
            }

            options.progress.on_batch_start(batch, total_batches);
            log::info!(
                "Running batch {}/{} ({} files, concurrency {concurrency})",
                batch.index + 1,
                total_batches,
                batch.len()
            );

            let started = Instant::now();
            let outcomes = self
                .run_batch(
                    batch,
                    concurrency,
                    graph,
                    &failed,
                    options,
                    &mut gauge,
                    total_batches,
                    total_files,
                )
                .await;
            let elapsed = started.elapsed();
            batches_run += 1;

            for outcome in outcomes {
                match outcome.status {
                    StepStatus::Failed => {
                        failed.insert(outcome.file.clone());
                        let reason = outcome
                            .error
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_default();
                        if skip_failed {
                            actions.push(RecoveryAction::new(
                                Some(batch.index),
                                RecoveryKind::SkippedFailedStep,
                                format!("{}: {reason}", outcome.file),
                            ));
                        } else if !halted {
                            halted = true;
                            actions.push(RecoveryAction::new(
                                Some(batch.index),
                                RecoveryKind::Halted,
                                format!("{} failed: {reason}", outcome.file),
                            ));
                        }
                    }
                    StepStatus::Skipped if !cancelled && options.cancel.is_cancelled() => {
                        cancelled = true;
                        actions.push(RecoveryAction::new(
                            Some(batch.index),
                            RecoveryKind::Cancelled,
                            "cancellation requested during batch",
                        ));
                    }
                    _ => {}
                }
                steps.push(outcome);
            }

            if let Some(budget) = self.batch_time_budget {
                if elapsed > budget && concurrency > 1 {
                    let reduced = (concurrency / 2).max(1);
                    log::warn!(
                        "Batch {} took {} ms (budget {} ms); reducing concurrency {concurrency} -> {reduced}",
                        batch.index,
                        elapsed.as_millis(),
                        budget.as_millis()
                    );
                    actions.push(RecoveryAction::new(
                        Some(batch.index),
                        RecoveryKind::ReducedConcurrency,
                        format!("{concurrency} -> {reduced}"),
                    ));
                    concurrency = reduced;
                }
            }

            if let Some(cleanup) = &options.cleanup {
                if batch.index + 1 < total_batches {
                    cleanup.between_batches(batch.index);
                }
            }
        }

        let finish = ProgressUpdate {
            batch: total_batches,
            total_batches,
            completed_files: gauge.completed_files,
            total_files,
            chunks_processed: gauge.chunks_processed,
            in_flight: 0,
            tokens_used: gauge.tokens_used,
            current_file: None,
        };
        options.progress.on_finish(&finish);

        ExecutionReport {
            steps,
            recovery_actions: actions,
            resources: ResourceUsage {
                peak_in_flight: gauge.peak_in_flight,
                tokens_used: gauge.tokens_used,
                chunks_processed: gauge.chunks_processed,
                batches_run,
                final_concurrency: concurrency,
            },
            halted,
            cancelled,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_batch(
        &self,
        batch: &ExecutionBatch,
        concurrency: usize,
        graph: &DependencyGraph,
        failed: &HashSet<String>,
        options: &ExecutionOptions,
        gauge: &mut Gauge,
        total_batches: usize,
        total_files: usize,
    ) -> Vec<StepOutcome> {
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::channel::<WorkerEvent>(EVENT_CHANNEL_CAPACITY);
        let mut workers = JoinSet::new();

        for file in &batch.files {
            let recovered = graph
                .dependencies(file)
                .map(|deps| deps.iter().any(|dep| failed.contains(*dep)))
                .unwrap_or(false);
            let ctx = Arc::clone(&self.ctx);
            let semaphore = Arc::clone(&semaphore);
            let cancel = options.cancel.clone();
            let tx = tx.clone();
            let file = file.clone();
            let batch_index = batch.index;

            workers.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        if cancel.is_cancelled() {
                            StepOutcome::skipped(
                                &file,
                                batch_index,
                                StepError::new(ErrorClass::Cancelled, "run cancelled"),
                            )
                        } else {
                            process_file(&ctx, &file, batch_index, recovered, &cancel, &tx).await
                        }
                    }
                    Err(err) => StepOutcome {
                        status: StepStatus::Failed,
                        ..StepOutcome::skipped(
                            &file,
                            batch_index,
                            StepError::new(ErrorClass::Internal, err.to_string()),
                        )
                    },
                };
                let _ = tx.send(WorkerEvent::Finished(outcome)).await;
            });
        }
        drop(tx);

        let mut outcomes: HashMap<String, StepOutcome> = HashMap::with_capacity(batch.len());
        let mut running: HashSet<String> = HashSet::new();
        while let Some(event) = rx.recv().await {
            let current_file = match event {
                WorkerEvent::Started { file } => {
                    running.insert(file.clone());
                    gauge.in_flight += 1;
                    gauge.peak_in_flight = gauge.peak_in_flight.max(gauge.in_flight);
                    Some(file)
                }
                WorkerEvent::ChunkFinished { tokens_used } => {
                    gauge.chunks_processed += 1;
                    gauge.tokens_used += tokens_used;
                    None
                }
                WorkerEvent::Finished(outcome) => {
                    if running.remove(&outcome.file) {
                        gauge.in_flight -= 1;
                    }
                    gauge.completed_files += 1;
                    let file = outcome.file.clone();
                    outcomes.insert(file.clone(), outcome);
                    Some(file)
                }
            };

            options.progress.on_progress(&ProgressUpdate {
                batch: batch.index,
                total_batches,
                completed_files: gauge.completed_files,
                total_files,
                chunks_processed: gauge.chunks_processed,
                in_flight: gauge.in_flight,
                tokens_used: gauge.tokens_used,
                current_file,
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                log::error!("Worker in batch {} crashed: {err}", batch.index);
            }
        }
        gauge.in_flight = 0;

        batch
            .files
            .iter()
            .map(|file| {
                outcomes.remove(file).unwrap_or_else(|| {
                    gauge.completed_files += 1;
                    StepOutcome {
                        status: StepStatus::Failed,
                        ..StepOutcome::skipped(
                            file,
                            batch.index,
                            StepError::new(ErrorClass::Internal, "worker exited without an outcome"),
                        )
                    }
                })
            })
            .collect()
    }
}

async fn process_file(
    ctx: &WorkerContext,
    file: &str,
    batch: usize,
    recovered: bool,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<WorkerEvent>,
) -> StepOutcome {
    let started = Instant::now();
    let _ = tx
        .send(WorkerEvent::Started {
            file: file.to_string(),
        })
        .await;

    let finish = |status: StepStatus, chunks: Vec<ChunkOutcome>, error: Option<StepError>| {
        StepOutcome {
            file: file.to_string(),
            batch,
            status,
            chunks,
            error,
            recovered,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    };

    let content = match ctx.files.read_file(&ctx.root.join(file)).await {
        Ok(content) => content,
        Err(err) => {
            log::warn!("Cannot read {file}: {err}");
            return finish(
                StepStatus::Failed,
                Vec::new(),
                Some(StepError::new(ErrorClass::Input, err.to_string())),
            );
        }
    };

    let chunks = ctx
        .chunker
        .chunk(&content, ContentType::from_path(file), Some(file));
    let total = chunks.len();
    let mut outcomes = Vec::with_capacity(total);
    let mut first_error: Option<StepError> = None;

    for chunk in &chunks {
        let prompt = build_prompt(chunk, total);
        match ctx
            .retry
            .call(ctx.backend.as_ref(), &prompt, ctx.token_budget, cancel)
            .await
        {
            Ok(retried) => {
                let tokens_used = retried.response.usage.total();
                let _ = tx.send(WorkerEvent::ChunkFinished { tokens_used }).await;
                outcomes.push(ChunkOutcome {
                    index: chunk.index,
                    text: Some(retried.response.text),
                    tokens_used,
                    attempts: retried.attempts,
                    error: None,
                });
            }
            Err(RetryFailure { error: err, attempts }) => {
                let class = match err {
                    BackendError::Cancelled => ErrorClass::Cancelled,
                    BackendError::Timeout(_) => ErrorClass::Resource,
                    _ => ErrorClass::Backend,
                };
                let error = StepError::new(class, format!("chunk {}: {err}", chunk.index));
                outcomes.push(ChunkOutcome {
                    index: chunk.index,
                    text: None,
                    tokens_used: 0,
                    attempts,
                    error: Some(error.clone()),
                });
                if class == ErrorClass::Cancelled {
                    return finish(StepStatus::Skipped, outcomes, Some(error));
                }
                log::warn!("Analysis of {file} chunk {} failed: {err}", chunk.index);
                first_error.get_or_insert(error);
            }
        }
    }

    match first_error {
        Some(error) => finish(StepStatus::Failed, outcomes, Some(error)),
        None => finish(StepStatus::Completed, outcomes, None),
    }
}
