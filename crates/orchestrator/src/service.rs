use crate::backend::{Backend, RetryPolicy};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::executor::{
    CacheCleanup, CleanupHook, ExecutionOptions, Executor, RecoveryAction, RecoveryKind,
    ResourceUsage, StepOutcome, StepStatus, WorkerContext,
};
use crate::files::{FileAccess, FsFileAccess};
use crate::planner::{plan_analysis, AnalysisPlan};
use crate::prompt;
use crate::scanner::FileScanner;
use crate::synthesis::{synthesize, SynthesisReport};
use corpus_chunker::{Chunk, ContentType, SemanticChunker};
use corpus_graph::{
    normalize_path, DependencyEdge, DependencyGraph, ExecutionPlan, GraphBuilder, Scheduler,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Chunks for several files plus the dependencies between them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiFileChunks {
    pub files: BTreeMap<String, Vec<Chunk>>,
    pub cross_file_relationships: Vec<DependencyEdge>,
    /// Files that could not be read, with the reason
    pub errors: BTreeMap<String, String>,
}

/// Everything a coordinated run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub plan: AnalysisPlan,
    pub execution_plan: ExecutionPlan,
    pub completed_steps: Vec<StepOutcome>,
    pub failed_steps: Vec<StepOutcome>,
    pub skipped_steps: Vec<StepOutcome>,
    pub recovery_actions: Vec<RecoveryAction>,
    pub resources: ResourceUsage,
    pub report: SynthesisReport,
    pub halted: bool,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl AnalysisOutcome {
    /// No failures and the run reached the last batch
    pub fn is_success(&self) -> bool {
        self.failed_steps.is_empty() && !self.halted && !self.cancelled
    }

    pub fn recovered_steps(&self) -> impl Iterator<Item = &StepOutcome> {
        self.completed_steps.iter().filter(|s| s.recovered)
    }
}

/// Plan, graph and schedule for one project, before execution
struct PreparedRun {
    root: PathBuf,
    plan: AnalysisPlan,
    graph: DependencyGraph,
    execution: ExecutionPlan,
}

/// Corpus preparation facade: chunking, planning and coordinated analysis
pub struct CorpusService {
    config: OrchestratorConfig,
    chunker: SemanticChunker,
    backend: Arc<dyn Backend>,
    files: Arc<dyn FileAccess>,
}

impl CorpusService {
    /// Create a service; chunk sizes shrink to fit the backend token budget
    pub fn new(config: OrchestratorConfig, backend: Arc<dyn Backend>) -> Result<Self> {
        config.validate()?;
        let chunker_config = config
            .chunker
            .clone()
            .fit_to_budget(config.backend_token_budget, prompt::reserved_tokens());
        let chunker = SemanticChunker::new(chunker_config)?;
        let files: Arc<dyn FileAccess> = Arc::new(FsFileAccess::new(config.content_cache_entries));

        Ok(Self {
            config,
            chunker,
            backend,
            files,
        })
    }

    #[must_use]
    pub fn with_file_access(mut self, files: Arc<dyn FileAccess>) -> Self {
        self.files = files;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn chunker(&self) -> &SemanticChunker {
        &self.chunker
    }

    /// Chunk in-memory text
    pub fn chunk(&self, text: &str, content_type: ContentType, source: Option<&str>) -> Vec<Chunk> {
        self.chunker.chunk(text, content_type, source)
    }

    /// Chunk one file, detecting its content type from the extension
    pub async fn chunk_file(&self, path: &Path) -> Result<Vec<Chunk>> {
        let content = self.files.read_file(path).await?;
        let source = normalize_path(&path.to_string_lossy());
        Ok(self
            .chunker
            .chunk(&content, ContentType::from_path(path), Some(&source)))
    }

    /// Chunk several files and resolve the dependencies between them.
    ///
    /// Unreadable files are reported in `errors` rather than failing the call.
    pub async fn chunk_multiple_files(&self, paths: &[PathBuf]) -> MultiFileChunks {
        let names: Vec<String> = paths
            .iter()
            .map(|p| normalize_path(&p.to_string_lossy()))
            .collect();
        let mut builder = GraphBuilder::new(&names);
        let mut result = MultiFileChunks::default();

        for (path, name) in paths.iter().zip(&names) {
            match self.files.read_file(path).await {
                Ok(content) => {
                    builder.add_source(name, &content);
                    let chunks = self
                        .chunker
                        .chunk(&content, ContentType::from_path(path), Some(name));
                    result.files.insert(name.clone(), chunks);
                }
                Err(err) => {
                    log::warn!("Cannot read {}: {err}", path.display());
                    result.errors.insert(name.clone(), err.to_string());
                }
            }
        }

        result.cross_file_relationships = builder
            .build()
            .edges()
            .into_iter()
            .filter(|e| !e.is_self_loop())
            .collect();
        result
    }

    /// Scan `root` and decide strategy, concurrency and sampling
    pub fn plan_project_analysis(&self, root: &Path) -> Result<AnalysisPlan> {
        let root = Self::check_root(root)?;
        let files = self.scanner(&root).scan();
        Ok(plan_analysis(&root.to_string_lossy(), &files, &self.config))
    }

    /// Plan plus dependency-ordered batches for the selected files
    pub async fn create_execution_plan(&self, root: &Path) -> Result<ExecutionPlan> {
        Ok(self.prepare(root).await?.execution)
    }

    /// Run the analysis of `root` batch by batch and synthesize the results
    pub async fn execute_coordinated_analysis(
        &self,
        root: &Path,
        options: ExecutionOptions,
    ) -> Result<AnalysisOutcome> {
        let started = Instant::now();
        let prepared = self.prepare(root).await?;
        let PreparedRun {
            root,
            plan,
            graph,
            execution,
        } = prepared;

        let cleanup = options.cleanup.clone().or_else(|| {
            plan.strategy.cleans_between_batches().then(|| {
                Arc::new(CacheCleanup::new(Arc::clone(&self.files))) as Arc<dyn CleanupHook>
            })
        });
        let options = ExecutionOptions { cleanup, ..options };

        let executor = Executor::new(
            WorkerContext {
                backend: Arc::clone(&self.backend),
                files: Arc::clone(&self.files),
                chunker: self.chunker.clone(),
                retry: RetryPolicy::from_config(&self.config),
                token_budget: self.config.backend_token_budget,
                root,
            },
            plan.concurrency,
            self.config.skip_failed_steps,
            self.config.batch_time_budget(),
        );
        let run = executor.run(&execution, &graph, &options).await;

        let mut recovery_actions = Vec::with_capacity(run.recovery_actions.len() + 1);
        if plan.sampled {
            recovery_actions.push(RecoveryAction::new(
                None,
                RecoveryKind::Sampled,
                format!(
                    "analyzing {} of {} files",
                    plan.selected_files.len(),
                    plan.file_count
                ),
            ));
        }
        recovery_actions.extend(run.recovery_actions);

        let report = synthesize(&run.steps, &graph, &execution.cycles, plan.file_count);
        log::info!("{}", report.summary());

        let mut completed_steps = Vec::new();
        let mut failed_steps = Vec::new();
        let mut skipped_steps = Vec::new();
        for step in run.steps {
            match step.status {
                StepStatus::Completed => completed_steps.push(step),
                StepStatus::Failed => failed_steps.push(step),
                StepStatus::Skipped => skipped_steps.push(step),
            }
        }

        Ok(AnalysisOutcome {
            plan,
            execution_plan: execution,
            completed_steps,
            failed_steps,
            skipped_steps,
            recovery_actions,
            resources: run.resources,
            report,
            halted: run.halted,
            cancelled: run.cancelled,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn prepare(&self, root: &Path) -> Result<PreparedRun> {
        let root = Self::check_root(root)?;
        let scanned = self.scanner(&root).scan();
        let plan = plan_analysis(&root.to_string_lossy(), &scanned, &self.config);

        let mut builder = GraphBuilder::new(&plan.selected_files);
        for relative in &plan.selected_files {
            match self.files.read_file(&root.join(relative)).await {
                Ok(content) => {
                    builder.add_source(relative, &content);
                }
                Err(err) => log::warn!("Cannot read {relative} for dependency extraction: {err}"),
            }
        }
        let graph = builder.build();
        let execution = Scheduler::new()
            .with_max_files_per_batch(self.config.max_files_per_batch)
            .plan(&graph);

        Ok(PreparedRun {
            root,
            plan,
            graph,
            execution,
        })
    }

    fn scanner(&self, root: &Path) -> FileScanner {
        FileScanner::new(root).with_max_file_size(self.config.max_file_size_bytes)
    }

    fn check_root(root: &Path) -> Result<PathBuf> {
        if !root.is_dir() {
            return Err(OrchestratorError::InvalidPath(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        Ok(root.to_path_buf())
    }
}
