use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use corpus_chunker::{Chunk, ChunkingStats, ContentType, SemanticChunker};
use corpus_orchestrator::{
    AnalysisOutcome, AnalysisPlan, CorpusService, ExecutionOptions, OrchestratorConfig,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod dry_run;
mod progress;

use dry_run::DryRunBackend;
use progress::BarProgress;

#[derive(Parser)]
#[command(name = "corpus-prep")]
#[command(about = "Chunk, order and analyze source corpora for token-limited backends", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for output)
    #[arg(long, global = true)]
    quiet: bool,

    /// TOML configuration file (CORPUS_PREP_* env vars override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Split one file into token-bounded chunks
    Chunk(ChunkArgs),

    /// Show the analysis plan for a project
    Plan(ProjectArgs),

    /// Show dependency-ordered execution batches for a project
    Schedule(ProjectArgs),

    /// Run coordinated analysis over a project
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
struct ChunkArgs {
    /// File to chunk
    path: PathBuf,

    /// Content type tag (code, code:python, markup, plain, or an extension)
    #[arg(long = "type")]
    content_type: Option<String>,

    /// Target chunk size in tokens
    #[arg(long)]
    target: Option<usize>,

    /// Maximum chunk size in tokens
    #[arg(long)]
    max: Option<usize>,

    /// Minimum chunk size in tokens
    #[arg(long)]
    min: Option<usize>,

    /// Overlap between consecutive chunks in tokens
    #[arg(long)]
    overlap: Option<usize>,

    /// Include chunk contents in JSON output
    #[arg(long)]
    with_content: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ProjectArgs {
    /// Project directory
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Project directory
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Use the offline backend that echoes prompt metadata
    #[arg(long)]
    dry_run: bool,

    /// Stop at the first failed step instead of skipping it
    #[arg(long)]
    fail_fast: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct ChunkSummary<'a> {
    index: usize,
    start_line: usize,
    end_line: usize,
    start_offset: usize,
    end_offset: usize,
    estimated_tokens: usize,
    overlap_chars: usize,
    boundary_quality: &'static str,
    coherence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
}

#[derive(Serialize)]
struct ChunkOutput<'a> {
    source: String,
    content_type: String,
    stats: ChunkingStats,
    chunks: Vec<ChunkSummary<'a>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Chunk(args) => run_chunk(args, config)?,
        Commands::Plan(args) => run_plan(args, config)?,
        Commands::Schedule(args) => run_schedule(args, config).await?,
        Commands::Analyze(args) => run_analyze(args, config, cli.quiet).await?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<OrchestratorConfig> {
    let config = match path {
        Some(path) => OrchestratorConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => OrchestratorConfig::default(),
    };
    let config = config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn service(config: OrchestratorConfig) -> Result<CorpusService> {
    CorpusService::new(config, Arc::new(DryRunBackend)).context("Failed to create service")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_chunk(args: ChunkArgs, mut config: OrchestratorConfig) -> Result<()> {
    let chunker_config = &mut config.chunker;
    if let Some(target) = args.target {
        chunker_config.target_chunk_tokens = target;
    }
    if let Some(max) = args.max {
        chunker_config.max_chunk_tokens = max;
    }
    if let Some(min) = args.min {
        chunker_config.min_chunk_tokens = min;
    }
    if let Some(overlap) = args.overlap {
        chunker_config.overlap_tokens = overlap;
    }
    let chunker = SemanticChunker::new(config.chunker).context("Invalid chunker settings")?;

    let content_type = match &args.content_type {
        Some(tag) => ContentType::parse_tag(tag)?,
        None => ContentType::from_path(&args.path),
    };
    let text = std::fs::read_to_string(&args.path)
        .with_context(|| format!("Failed to read {}", args.path.display()))?;
    let source = args.path.to_string_lossy().replace('\\', "/");
    let chunks = chunker.chunk(&text, content_type, Some(&source));
    let stats = SemanticChunker::get_stats(&chunks);

    if args.json {
        let output = ChunkOutput {
            source,
            content_type: content_type.to_string(),
            stats,
            chunks: chunks
                .iter()
                .map(|c| summarize_chunk(c, args.with_content))
                .collect(),
        };
        return print_json(&output);
    }

    println!("{source} ({content_type})");
    for chunk in &chunks {
        println!(
            "  #{:<3} lines {:>5}-{:<5} ~{:>6} tokens  {:<11} coherence {:.2}",
            chunk.index,
            chunk.start_line,
            chunk.end_line,
            chunk.estimated_tokens,
            chunk.boundary_quality.as_str(),
            chunk.coherence
        );
    }
    println!("{stats}");
    Ok(())
}

fn summarize_chunk(chunk: &Chunk, with_content: bool) -> ChunkSummary<'_> {
    ChunkSummary {
        index: chunk.index,
        start_line: chunk.start_line,
        end_line: chunk.end_line,
        start_offset: chunk.start_offset,
        end_offset: chunk.end_offset,
        estimated_tokens: chunk.estimated_tokens,
        overlap_chars: chunk.overlap_chars,
        boundary_quality: chunk.boundary_quality.as_str(),
        coherence: chunk.coherence,
        content: with_content.then_some(chunk.content.as_str()),
    }
}

fn run_plan(args: ProjectArgs, config: OrchestratorConfig) -> Result<()> {
    let plan = service(config)?
        .plan_project_analysis(&args.path)
        .with_context(|| format!("Failed to plan {}", args.path.display()))?;

    if args.json {
        return print_json(&plan);
    }
    print_plan(&plan);
    Ok(())
}

fn print_plan(plan: &AnalysisPlan) {
    println!("Project: {}", plan.root);
    println!(
        "Files: {} ({} bytes) | Selected: {}{}",
        plan.file_count,
        plan.total_bytes,
        plan.selected_files.len(),
        if plan.sampled { " (sampled)" } else { "" }
    );
    println!(
        "Strategy: {} | Complexity: {} | Concurrency: {} | Max depth: {}",
        plan.strategy, plan.complexity, plan.concurrency, plan.max_depth
    );
    println!(
        "Estimated: {} tokens, {} chunks, ~{}s",
        plan.estimated_tokens,
        plan.estimated_chunks,
        plan.estimated_duration_ms.div_ceil(1000)
    );
    println!("Content types: {}", plan.content_types.join(", "));
    for group in &plan.task_groups {
        println!(
            "  {:<24} {:>5} files ~{:>8} tokens {:>5} chunks",
            group.name,
            group.files.len(),
            group.estimated_tokens,
            group.estimated_chunks
        );
    }
}

async fn run_schedule(args: ProjectArgs, config: OrchestratorConfig) -> Result<()> {
    let plan = service(config)?
        .create_execution_plan(&args.path)
        .await
        .with_context(|| format!("Failed to schedule {}", args.path.display()))?;

    if args.json {
        return print_json(&plan);
    }

    println!(
        "{} files in {} batches (max parallelism {})",
        plan.file_count(),
        plan.batches.len(),
        plan.max_parallelism()
    );
    for batch in &plan.batches {
        let marker = if batch.forced { " [cycle]" } else { "" };
        println!("Batch {}{marker}:", batch.index + 1);
        for file in &batch.files {
            println!("  {file}");
        }
    }
    for cycle in &plan.cycles {
        println!("Cycle: {}", cycle.join(" -> "));
    }
    Ok(())
}

async fn run_analyze(args: AnalyzeArgs, config: OrchestratorConfig, quiet: bool) -> Result<()> {
    if !args.dry_run {
        bail!("No analysis backend is configured; pass --dry-run to use the offline backend");
    }

    let service = service(config)?;
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; finishing in-flight work");
            ctrl_c.cancel();
        }
    });

    let options = ExecutionOptions {
        cancel,
        progress: Arc::new(BarProgress::new(0, quiet || args.json)),
        skip_failed_steps: args.fail_fast.then_some(false),
        ..ExecutionOptions::default()
    };
    let outcome = service
        .execute_coordinated_analysis(&args.path, options)
        .await
        .with_context(|| format!("Failed to analyze {}", args.path.display()))?;

    if args.json {
        print_json(&outcome)?;
    } else {
        print_outcome(&outcome);
    }

    if outcome.halted {
        bail!("Analysis halted after a failed step");
    }
    Ok(())
}

fn print_outcome(outcome: &AnalysisOutcome) {
    println!("{}", outcome.report.summary());
    println!(
        "Completed: {} | Failed: {} | Skipped: {} | Tokens: {} | Peak concurrency: {} | {} ms",
        outcome.completed_steps.len(),
        outcome.failed_steps.len(),
        outcome.skipped_steps.len(),
        outcome.resources.tokens_used,
        outcome.resources.peak_in_flight,
        outcome.elapsed_ms
    );
    for step in &outcome.failed_steps {
        let reason = step
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        println!("  failed {}: {reason}", step.file);
    }
    for action in &outcome.recovery_actions {
        println!("  recovery {:?}: {}", action.kind, action.detail);
    }
    if !outcome.report.hubs.is_empty() {
        println!("Hubs:");
        for hub in &outcome.report.hubs {
            println!("  {} ({} dependents)", hub.file, hub.dependents);
        }
    }
}
