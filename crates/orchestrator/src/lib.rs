//! # Corpus Orchestrator
//!
//! Plans and runs backend analysis over a whole project.
//!
//! ## Pipeline
//!
//! ```text
//! Directory
//!     │
//!     ├──> File Scanner (.gitignore aware)
//!     │
//!     ├──> Planner
//!     │      └─ complexity, strategy, sampling, task groups
//!     │
//!     ├──> Dependency Graph + Scheduler
//!     │      └─ dependency-ordered batches
//!     │
//!     ├──> Executor (bounded concurrency per batch)
//!     │      └─ chunk -> prompt -> backend (retry, timeout, cancel)
//!     │
//!     └──> Synthesis
//!            └─ merged analyses, correlations, coverage
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use corpus_orchestrator::{
//!     Backend, BackendError, BackendResponse, CorpusService, ExecutionOptions,
//!     OrchestratorConfig, TokenUsage,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Backend for Echo {
//!     async fn invoke(&self, prompt: &str, _budget: usize) -> Result<BackendResponse, BackendError> {
//!         Ok(BackendResponse { text: prompt.len().to_string(), usage: TokenUsage::default(), elapsed_ms: 0 })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> corpus_orchestrator::Result<()> {
//!     let service = CorpusService::new(OrchestratorConfig::default(), Arc::new(Echo))?;
//!     let outcome = service
//!         .execute_coordinated_analysis(Path::new("/path/to/project"), ExecutionOptions::default())
//!         .await?;
//!
//!     println!("{}", outcome.report.summary());
//!     Ok(())
//! }
//! ```

mod backend;
mod config;
mod error;
mod executor;
mod files;
mod limits;
mod planner;
mod prompt;
mod scanner;
mod service;
mod synthesis;

pub use backend::{
    Backend, BackendError, BackendResponse, RetriedResponse, RetryFailure, RetryPolicy, TokenUsage,
};
pub use config::{OrchestratorConfig, RetryConfig, DEFAULT_MAX_FILE_SIZE_BYTES};
pub use error::{ErrorClass, OrchestratorError, Result, StepError};
pub use executor::{
    CacheCleanup, ChannelProgress, ChunkOutcome, CleanupHook, ExecutionOptions, ExecutionReport,
    NoopProgress, ProgressSink, ProgressUpdate, RecoveryAction, RecoveryKind, ResourceUsage,
    StepOutcome, StepStatus,
};
pub use files::{FileAccess, FsFileAccess};
pub use limits::default_concurrency;
pub use planner::{
    complexity_score, sample_files, AnalysisPlan, Strategy, TaskGroup, ESTIMATED_MS_PER_CHUNK,
};
pub use prompt::{build_prompt, reserved_tokens, PROMPT_TEMPLATE};
pub use scanner::{FileScanner, ScannedFile};
pub use service::{AnalysisOutcome, CorpusService, MultiFileChunks};
pub use synthesis::{synthesize, Correlation, FileReport, Hub, SynthesisReport, HUB_LIMIT};
