//! Project analysis planning: complexity, strategy, sampling and task groups.

use crate::config::OrchestratorConfig;
use crate::scanner::ScannedFile;
use corpus_chunker::{token, ContentType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Rough wall-clock cost of one backend call, used for duration estimates
pub const ESTIMATED_MS_PER_CHUNK: u64 = 4_000;

/// Concurrency cap applied to small projects
const SIMPLE_MAX_CONCURRENCY: usize = 4;

/// Group name for files directly under the project root
const ROOT_GROUP: &str = ".";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Simple,
    Moderate,
    LargeScale,
}

impl Strategy {
    /// Pick a strategy from corpus size and complexity (0-100)
    pub fn select(file_count: usize, complexity: u32) -> Self {
        if file_count > 1_000 || complexity >= 70 {
            Strategy::LargeScale
        } else if file_count > 100 || complexity >= 40 {
            Strategy::Moderate
        } else {
            Strategy::Simple
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Strategy::Simple => "simple",
            Strategy::Moderate => "moderate",
            Strategy::LargeScale => "large_scale",
        }
    }

    /// Large runs evict caches between batches
    pub const fn cleans_between_batches(self) -> bool {
        matches!(self, Strategy::LargeScale)
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Files analyzed together, grouped by top-level directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub name: String,
    pub files: Vec<String>,
    pub estimated_tokens: usize,
    pub estimated_chunks: usize,
}

/// Summary of what an analysis run would do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisPlan {
    pub root: String,
    /// Files discovered before sampling
    pub file_count: usize,
    pub total_bytes: u64,
    pub estimated_tokens: usize,
    pub estimated_chunks: usize,
    pub max_depth: usize,
    pub content_types: Vec<String>,
    pub complexity: u32,
    pub strategy: Strategy,
    pub concurrency: usize,
    pub sampled: bool,
    /// Files that will be analyzed, sorted
    pub selected_files: Vec<String>,
    pub task_groups: Vec<TaskGroup>,
    pub estimated_duration_ms: u64,
}

impl AnalysisPlan {
    pub fn coverage(&self) -> f64 {
        if self.file_count == 0 {
            1.0
        } else {
            self.selected_files.len() as f64 / self.file_count as f64
        }
    }
}

/// Bounded complexity score from corpus shape
pub fn complexity_score(file_count: usize, max_depth: usize, type_count: usize) -> u32 {
    let file_score = ((file_count.max(1) as f64).log10() * 15.0).min(50.0);
    let depth_score = (max_depth as f64 * 5.0).min(25.0);
    let diversity_score = (type_count as f64 * 5.0).min(25.0);
    (file_score + depth_score + diversity_score).round().clamp(0.0, 100.0) as u32
}

/// Directory-stratified, deterministic subset of at most `cap` files.
///
/// Takes one file per top-level directory in turn so every area of the
/// project stays represented. The result keeps the input order.
pub fn sample_files<'a>(files: &'a [ScannedFile], cap: usize) -> Vec<&'a ScannedFile> {
    if files.len() <= cap {
        return files.iter().collect();
    }

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, file) in files.iter().enumerate() {
        groups.entry(top_level(&file.relative)).or_default().push(idx);
    }

    let mut picked: Vec<usize> = Vec::with_capacity(cap);
    let mut round = 0;
    while picked.len() < cap {
        let mut took_any = false;
        for members in groups.values() {
            if picked.len() >= cap {
                break;
            }
            if let Some(&idx) = members.get(round) {
                picked.push(idx);
                took_any = true;
            }
        }
        if !took_any {
            break;
        }
        round += 1;
    }

    picked.sort_unstable();
    picked.into_iter().map(|idx| &files[idx]).collect()
}

pub fn estimated_chunks_for(tokens: usize, config: &OrchestratorConfig) -> usize {
    if tokens <= config.chunker.max_chunk_tokens {
        1
    } else {
        tokens.div_ceil(config.chunker.target_chunk_tokens.max(1))
    }
}

/// Build the plan for `files` discovered under `root`
pub fn plan_analysis(root: &str, files: &[ScannedFile], config: &OrchestratorConfig) -> AnalysisPlan {
    let max_depth = files
        .iter()
        .map(|f| f.relative.matches('/').count())
        .max()
        .unwrap_or(0);
    let content_types: BTreeSet<String> = files
        .iter()
        .map(|f| ContentType::from_path(&f.relative).to_string())
        .collect();
    let complexity = complexity_score(files.len(), max_depth, content_types.len());
    let strategy = Strategy::select(files.len(), complexity);

    let concurrency = match strategy {
        Strategy::Simple => config.max_concurrent_tasks.min(SIMPLE_MAX_CONCURRENCY),
        Strategy::Moderate | Strategy::LargeScale => config.max_concurrent_tasks,
    }
    .max(1);

    let sampled = strategy == Strategy::LargeScale
        && config.enable_sampling
        && files.len() > config.sampling_threshold
        && files.len() > config.sample_cap;
    let selected: Vec<&ScannedFile> = if sampled {
        sample_files(files, config.sample_cap)
    } else {
        files.iter().collect()
    };

    let mut groups: BTreeMap<&str, TaskGroup> = BTreeMap::new();
    for file in &selected {
        let name = top_level(&file.relative);
        let tokens = token::estimate_len(file.size_bytes as usize);
        let group = groups.entry(name).or_insert_with(|| TaskGroup {
            name: name.to_string(),
            files: Vec::new(),
            estimated_tokens: 0,
            estimated_chunks: 0,
        });
        group.files.push(file.relative.clone());
        group.estimated_tokens += tokens;
        group.estimated_chunks += estimated_chunks_for(tokens, config);
    }
    let task_groups: Vec<TaskGroup> = groups.into_values().collect();

    let estimated_tokens = task_groups.iter().map(|g| g.estimated_tokens).sum();
    let estimated_chunks: usize = task_groups.iter().map(|g| g.estimated_chunks).sum();
    let estimated_duration_ms =
        estimated_chunks.div_ceil(concurrency) as u64 * ESTIMATED_MS_PER_CHUNK;

    log::info!(
        "Selected {strategy} strategy for {} files (complexity {complexity}, concurrency {concurrency}{})",
        files.len(),
        if sampled { ", sampled" } else { "" }
    );

    AnalysisPlan {
        root: root.to_string(),
        file_count: files.len(),
        total_bytes: files.iter().map(|f| f.size_bytes).sum(),
        estimated_tokens,
        estimated_chunks,
        max_depth,
        content_types: content_types.into_iter().collect(),
        complexity,
        strategy,
        concurrency,
        sampled,
        selected_files: selected.iter().map(|f| f.relative.clone()).collect(),
        task_groups,
        estimated_duration_ms,
    }
}

fn top_level(relative: &str) -> &str {
    match relative.split_once('/') {
        Some((dir, _)) => dir,
        None => ROOT_GROUP,
    }
}
