use async_trait::async_trait;
use corpus_chunker::ChunkerConfig;
use corpus_orchestrator::{
    Backend, BackendError, BackendResponse, ChannelProgress, CleanupHook, CorpusService,
    ErrorClass, ExecutionOptions, FileAccess, FsFileAccess, OrchestratorConfig, OrchestratorError,
    RecoveryKind, RetryConfig, StepStatus, Strategy, TokenUsage,
};
use pretty_assertions::assert_eq;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tokio_util::sync::CancellationToken;

/// Scripted backend keyed by the `Source:` line of each prompt
#[derive(Default)]
struct FakeBackend {
    calls: Mutex<Vec<String>>,
    failing: HashSet<String>,
    /// Transient failures left per source
    flaky: Mutex<HashMap<String, usize>>,
    /// Prompts carrying this `Part:` prefix fail permanently
    failing_part: Option<&'static str>,
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeBackend {
    fn failing(files: &[&str]) -> Self {
        Self {
            failing: files.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn source_of(prompt: &str) -> String {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix("Source: "))
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl Backend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn invoke(&self, prompt: &str, _budget: usize) -> Result<BackendResponse, BackendError> {
        let source = source_of(prompt);
        self.calls.lock().unwrap().push(source.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let failing_part = self
            .failing_part
            .is_some_and(|part| prompt.lines().any(|line| line.starts_with(part)));
        if failing_part || self.failing.contains(&source) {
            return Err(BackendError::MalformedResponse(format!("cannot parse {source}")));
        }
        if let Some(left) = self.flaky.lock().unwrap().get_mut(&source) {
            if *left > 0 {
                *left -= 1;
                return Err(BackendError::RateLimited);
            }
        }

        Ok(BackendResponse {
            text: format!("analysis of {source}"),
            usage: TokenUsage {
                prompt_tokens: prompt.len() / 4,
                completion_tokens: 8,
            },
            elapsed_ms: 1,
        })
    }
}

fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        max_concurrent_tasks: 3,
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        },
        step_timeout_ms: 5_000,
        ..OrchestratorConfig::default()
    }
}

/// a.js -> b.js -> c.js
fn chain_project() -> TempDir {
    let temp = tempdir().unwrap();
    write(temp.path(), "a.js", "import { b } from './b.js';\nexport const a = () => b();\n");
    write(temp.path(), "b.js", "import { c } from './c';\nexport const b = () => c();\n");
    write(temp.path(), "c.js", "export const c = () => 42;\n");
    temp
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn service(backend: Arc<FakeBackend>) -> CorpusService {
    CorpusService::new(test_config(), backend).unwrap()
}

/// Filesystem access that counts cache clears
#[derive(Default)]
struct CountingFiles {
    inner: FsFileAccess,
    clears: AtomicUsize,
}

#[async_trait]
impl FileAccess for CountingFiles {
    async fn read_file(&self, path: &Path) -> std::io::Result<Arc<str>> {
        self.inner.read_file(path).await
    }

    fn clear_cache(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear_cache();
    }
}

#[derive(Default)]
struct RecordingCleanup {
    batches: Mutex<Vec<usize>>,
}

impl CleanupHook for RecordingCleanup {
    fn between_batches(&self, completed_batch: usize) {
        self.batches.lock().unwrap().push(completed_batch);
    }
}

#[tokio::test]
async fn dependencies_are_analyzed_first() {
    let project = chain_project();
    let backend = Arc::new(FakeBackend::default());
    let outcome = service(Arc::clone(&backend))
        .execute_coordinated_analysis(project.path(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(backend.calls(), vec!["c.js", "b.js", "a.js"]);
    assert!(outcome.is_success());
    assert_eq!(outcome.completed_steps.len(), 3);
    assert_eq!(outcome.execution_plan.batches.len(), 3);
    assert_eq!(outcome.report.correlations.len(), 2);
    assert_eq!(outcome.report.coverage, 1.0);
    assert_eq!(outcome.report.aggregate_score, 100.0);
    assert!(outcome.report.files[0].analysis.contains("analysis of c.js"));
    assert!(outcome.resources.tokens_used > 0);
}

#[tokio::test]
async fn failed_steps_are_skipped_and_dependents_marked_recovered() {
    let project = chain_project();
    let backend = Arc::new(FakeBackend::failing(&["b.js"]));
    let outcome = service(Arc::clone(&backend))
        .execute_coordinated_analysis(project.path(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(backend.calls(), vec!["c.js", "b.js", "a.js"]);
    assert_eq!(outcome.failed_steps.len(), 1);
    assert_eq!(outcome.failed_steps[0].file, "b.js");
    assert_eq!(outcome.failed_steps[0].status, StepStatus::Failed);
    assert_eq!(
        outcome.failed_steps[0].error.as_ref().map(|e| e.class),
        Some(ErrorClass::Backend)
    );

    let recovered: Vec<&str> = outcome.recovered_steps().map(|s| s.file.as_str()).collect();
    assert_eq!(recovered, vec!["a.js"]);
    assert!(outcome
        .recovery_actions
        .iter()
        .any(|a| a.kind == RecoveryKind::SkippedFailedStep));
    assert!(!outcome.halted);
    assert!(outcome.report.correlations.is_empty());
    assert!((outcome.report.coverage - 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn failure_halts_the_run_when_skipping_is_disabled() {
    let project = chain_project();
    let backend = Arc::new(FakeBackend::failing(&["b.js"]));
    let options = ExecutionOptions {
        skip_failed_steps: Some(false),
        ..ExecutionOptions::default()
    };
    let outcome = service(Arc::clone(&backend))
        .execute_coordinated_analysis(project.path(), options)
        .await
        .unwrap();

    assert_eq!(backend.calls(), vec!["c.js", "b.js"]);
    assert!(outcome.halted);
    assert_eq!(outcome.skipped_steps.len(), 1);
    assert_eq!(outcome.skipped_steps[0].file, "a.js");
    assert!(outcome
        .recovery_actions
        .iter()
        .any(|a| a.kind == RecoveryKind::Halted));
    assert!(!outcome.is_success());
}

#[tokio::test]
async fn cancelled_runs_do_not_call_the_backend() {
    let project = chain_project();
    let backend = Arc::new(FakeBackend::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = service(Arc::clone(&backend))
        .execute_coordinated_analysis(
            project.path(),
            ExecutionOptions {
                cancel,
                ..ExecutionOptions::default()
            },
        )
        .await
        .unwrap();

    assert!(backend.calls().is_empty());
    assert!(outcome.cancelled);
    assert_eq!(outcome.skipped_steps.len(), 3);
    assert!(outcome
        .skipped_steps
        .iter()
        .all(|s| s.error.as_ref().map(|e| e.class) == Some(ErrorClass::Cancelled)));
    assert_eq!(
        outcome
            .recovery_actions
            .iter()
            .filter(|a| a.kind == RecoveryKind::Cancelled)
            .count(),
        1
    );
}

#[tokio::test]
async fn transient_backend_errors_are_retried() {
    let project = chain_project();
    let backend = Arc::new(FakeBackend::default());
    backend.flaky.lock().unwrap().insert("a.js".to_string(), 2);

    let outcome = service(Arc::clone(&backend))
        .execute_coordinated_analysis(project.path(), ExecutionOptions::default())
        .await
        .unwrap();

    assert!(outcome.is_success());
    let a = outcome
        .completed_steps
        .iter()
        .find(|s| s.file == "a.js")
        .unwrap();
    assert_eq!(a.chunks[0].attempts, 3);
    assert_eq!(backend.calls().len(), 5);
}

#[tokio::test]
async fn one_failed_chunk_does_not_stop_the_rest_of_the_file() {
    let temp = tempdir().unwrap();
    let mut code = String::new();
    for i in 0..60 {
        code.push_str(&format!("pub fn item_{i}(x: usize) -> usize {{\n    x + {i}\n}}\n\n"));
    }
    write(temp.path(), "lib.rs", &code);

    let config = OrchestratorConfig {
        chunker: ChunkerConfig {
            overlap_tokens: 10,
            ..ChunkerConfig::with_sizes(100, 150, 40)
        },
        ..test_config()
    };
    let backend = Arc::new(FakeBackend {
        failing_part: Some("Part: 1 of"),
        ..FakeBackend::default()
    });
    let outcome = CorpusService::new(config, Arc::clone(&backend) as Arc<dyn Backend>)
        .unwrap()
        .execute_coordinated_analysis(temp.path(), ExecutionOptions::default())
        .await
        .unwrap();

    let chunk_count = backend.calls().len();
    assert!(chunk_count > 2);
    assert_eq!(outcome.failed_steps.len(), 1);
    let step = &outcome.failed_steps[0];
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.chunks.len(), chunk_count);
    let indices: Vec<usize> = step.chunks.iter().map(|c| c.index).collect();
    assert_eq!(indices, (0..chunk_count).collect::<Vec<_>>());

    let failed: Vec<usize> = step
        .chunks
        .iter()
        .filter(|c| c.error.is_some())
        .map(|c| c.index)
        .collect();
    assert_eq!(failed, vec![0]);
    assert_eq!(step.chunks[0].attempts, 1);
    assert_eq!(
        step.error.as_ref().map(|e| e.class),
        Some(ErrorClass::Backend)
    );

    let expected = (chunk_count - 1) as f64 / chunk_count as f64;
    assert!((outcome.report.chunk_success_rate - expected).abs() < 1e-9);
}

#[tokio::test]
async fn timeouts_after_retries_are_resource_failures() {
    let temp = tempdir().unwrap();
    write(temp.path(), "slow.py", "VALUE = 1\n");
    let config = OrchestratorConfig {
        step_timeout_ms: 20,
        retry: RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
        },
        ..test_config()
    };
    let backend = Arc::new(FakeBackend {
        delay: Duration::from_millis(500),
        ..FakeBackend::default()
    });

    let outcome = CorpusService::new(config, Arc::clone(&backend) as Arc<dyn Backend>)
        .unwrap()
        .execute_coordinated_analysis(temp.path(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(backend.calls().len(), 2);
    assert_eq!(outcome.failed_steps.len(), 1);
    let step = &outcome.failed_steps[0];
    assert_eq!(step.error.as_ref().map(|e| e.class), Some(ErrorClass::Resource));
    assert_eq!(step.chunks.len(), 1);
    assert_eq!(step.chunks[0].attempts, 2);
}

#[tokio::test]
async fn slow_batches_reduce_concurrency() {
    let project = chain_project();
    let config = OrchestratorConfig {
        batch_time_budget_ms: Some(1),
        ..test_config()
    };
    let backend = Arc::new(FakeBackend {
        delay: Duration::from_millis(30),
        ..FakeBackend::default()
    });

    let outcome = CorpusService::new(config, backend)
        .unwrap()
        .execute_coordinated_analysis(project.path(), ExecutionOptions::default())
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.plan.concurrency, 3);
    assert_eq!(outcome.resources.final_concurrency, 1);
    let reductions: Vec<(Option<usize>, &str)> = outcome
        .recovery_actions
        .iter()
        .filter(|a| a.kind == RecoveryKind::ReducedConcurrency)
        .map(|a| (a.batch, a.detail.as_str()))
        .collect();
    assert_eq!(reductions, vec![(Some(0), "3 -> 1")]);
}

#[tokio::test]
async fn cleanup_runs_between_batches_only() {
    let project = chain_project();
    let hook = Arc::new(RecordingCleanup::default());
    let options = ExecutionOptions {
        cleanup: Some(Arc::clone(&hook) as Arc<dyn CleanupHook>),
        ..ExecutionOptions::default()
    };

    let outcome = service(Arc::new(FakeBackend::default()))
        .execute_coordinated_analysis(project.path(), options)
        .await
        .unwrap();

    assert_eq!(outcome.execution_plan.batches.len(), 3);
    assert_eq!(*hook.batches.lock().unwrap(), vec![0, 1]);
}

#[tokio::test]
async fn large_scale_runs_clear_the_file_cache_between_batches() {
    let temp = tempdir().unwrap();
    let extensions = ["py", "js", "rs", "md", "txt"];
    for i in 0..30 {
        let ext = extensions[i % extensions.len()];
        write(temp.path(), &format!("d1/d2/d3/d4/d5/file{i}.{ext}"), &format!("value {i}\n"));
    }
    let config = OrchestratorConfig {
        max_files_per_batch: 10,
        ..test_config()
    };
    let files = Arc::new(CountingFiles::default());
    let service = CorpusService::new(config, Arc::new(FakeBackend::default()))
        .unwrap()
        .with_file_access(Arc::clone(&files) as Arc<dyn FileAccess>);

    let outcome = service
        .execute_coordinated_analysis(temp.path(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.plan.strategy, Strategy::LargeScale);
    assert_eq!(outcome.execution_plan.batches.len(), 3);
    assert_eq!(outcome.completed_steps.len(), 30);
    assert_eq!(files.clears.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn simple_runs_keep_the_file_cache() {
    let project = chain_project();
    let files = Arc::new(CountingFiles::default());
    let outcome = service(Arc::new(FakeBackend::default()))
        .with_file_access(Arc::clone(&files) as Arc<dyn FileAccess>)
        .execute_coordinated_analysis(project.path(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.plan.strategy, Strategy::Simple);
    assert_eq!(files.clears.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrency_never_exceeds_the_limit() {
    let temp = tempdir().unwrap();
    for i in 0..8 {
        write(temp.path(), &format!("mod{i}.py"), &format!("VALUE = {i}\n"));
    }
    let backend = Arc::new(FakeBackend {
        delay: Duration::from_millis(20),
        ..FakeBackend::default()
    });

    let outcome = service(Arc::clone(&backend))
        .execute_coordinated_analysis(temp.path(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.execution_plan.batches.len(), 1);
    assert_eq!(outcome.completed_steps.len(), 8);
    assert!(backend.peak.load(Ordering::SeqCst) <= 3);
    assert!(outcome.resources.peak_in_flight <= 3);
    assert!(outcome.resources.peak_in_flight >= 1);
}

#[tokio::test]
async fn cycles_run_in_a_forced_batch() {
    let temp = tempdir().unwrap();
    write(temp.path(), "a.js", "import { b } from './b';\nexport const a = 1;\n");
    write(temp.path(), "b.js", "import { a } from './a';\nexport const b = 2;\n");

    let outcome = service(Arc::new(FakeBackend::default()))
        .execute_coordinated_analysis(temp.path(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.completed_steps.len(), 2);
    assert_eq!(outcome.report.cycles.len(), 1);
    assert!(outcome
        .recovery_actions
        .iter()
        .any(|a| a.kind == RecoveryKind::ForcedCycleBatch));
}

#[tokio::test]
async fn progress_reports_every_file() {
    let project = chain_project();
    let (sink, mut rx) = ChannelProgress::new();
    let options = ExecutionOptions {
        progress: Arc::new(sink),
        ..ExecutionOptions::default()
    };
    service(Arc::new(FakeBackend::default()))
        .execute_coordinated_analysis(project.path(), options)
        .await
        .unwrap();

    let mut last = None;
    while let Ok(update) = rx.try_recv() {
        last = Some(update);
    }
    let last = last.unwrap();
    assert_eq!(last.completed_files, 3);
    assert_eq!(last.total_files, 3);
    assert_eq!(last.chunks_processed, 3);
}

#[tokio::test]
async fn execution_plan_orders_the_project() {
    let project = chain_project();
    let plan = service(Arc::new(FakeBackend::default()))
        .create_execution_plan(project.path())
        .await
        .unwrap();

    assert_eq!(plan.order, vec!["c.js", "b.js", "a.js"]);
    assert!(plan.cycles.is_empty());
}

#[tokio::test]
async fn multiple_files_report_relationships_and_errors() {
    let project = chain_project();
    let paths = vec![
        project.path().join("a.js"),
        project.path().join("b.js"),
        project.path().join("missing.js"),
    ];
    let result = service(Arc::new(FakeBackend::default()))
        .chunk_multiple_files(&paths)
        .await;

    assert_eq!(result.files.len(), 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.cross_file_relationships.len(), 1);
    assert!(result.cross_file_relationships[0].from.ends_with("a.js"));
    assert!(result.cross_file_relationships[0].to.ends_with("b.js"));
}

#[test]
fn planning_requires_a_directory() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("file.txt");
    fs::write(&file, "x").unwrap();

    let err = service(Arc::new(FakeBackend::default()))
        .plan_project_analysis(&file)
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidPath(_)));
}

#[test]
fn small_projects_use_the_simple_strategy() {
    let project = chain_project();
    let plan = service(Arc::new(FakeBackend::default()))
        .plan_project_analysis(project.path())
        .unwrap();

    assert_eq!(plan.file_count, 3);
    assert_eq!(plan.strategy, Strategy::Simple);
    assert_eq!(plan.concurrency, 3);
    assert!(!plan.sampled);
    assert_eq!(plan.content_types, vec!["code:javascript"]);
}
