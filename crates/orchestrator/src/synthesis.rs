//! Merge per-file outcomes into one report with cross-file correlations.

use crate::error::StepError;
use crate::executor::{StepOutcome, StepStatus};
use corpus_graph::{DependencyGraph, GraphStats, ReferenceKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Number of most-depended-on files listed in a report
pub const HUB_LIMIT: usize = 10;

const CHUNK_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub file: String,
    pub status: StepStatus,
    pub chunk_count: usize,
    /// Chunk analyses in chunk order
    pub analysis: String,
    pub tokens_used: usize,
    pub elapsed_ms: u64,
    pub recovered: bool,
    pub error: Option<StepError>,
}

/// A dependency edge whose both ends were analyzed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    pub from: String,
    pub to: String,
    pub kind: ReferenceKind,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hub {
    pub file: String,
    pub dependents: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisReport {
    /// One entry per step, in execution order
    pub files: Vec<FileReport>,
    pub correlations: Vec<Correlation>,
    pub hubs: Vec<Hub>,
    pub cycles: Vec<Vec<String>>,
    pub graph: GraphStats,
    /// Analyzed files over all files discovered in the corpus
    pub coverage: f64,
    pub chunk_success_rate: f64,
    /// 0-100
    pub aggregate_score: f64,
    pub total_tokens: usize,
}

impl SynthesisReport {
    pub fn completed_files(&self) -> impl Iterator<Item = &FileReport> {
        self.files
            .iter()
            .filter(|f| f.status == StepStatus::Completed)
    }

    /// One-paragraph human summary
    pub fn summary(&self) -> String {
        let completed = self.completed_files().count();
        format!(
            "Analyzed {completed}/{} files ({:.0}% coverage), {} correlations, {} cycles, score {:.1}",
            self.files.len(),
            self.coverage * 100.0,
            self.correlations.len(),
            self.cycles.len(),
            self.aggregate_score
        )
    }
}

/// Build the final report from step outcomes.
///
/// `corpus_files` counts every discovered file, including ones dropped by sampling.
pub fn synthesize(
    steps: &[StepOutcome],
    graph: &DependencyGraph,
    cycles: &[Vec<String>],
    corpus_files: usize,
) -> SynthesisReport {
    let files: Vec<FileReport> = steps.iter().map(file_report).collect();

    let analyzed: HashSet<&str> = files
        .iter()
        .filter(|f| f.status == StepStatus::Completed)
        .map(|f| f.file.as_str())
        .collect();

    let correlations: Vec<Correlation> = graph
        .edges()
        .into_iter()
        .filter(|e| !e.is_self_loop())
        .filter(|e| analyzed.contains(e.from.as_str()) && analyzed.contains(e.to.as_str()))
        .map(|e| Correlation {
            from: e.from,
            to: e.to,
            kind: e.kind,
            symbol: e.symbol,
        })
        .collect();

    let hubs = graph
        .hubs(HUB_LIMIT)
        .into_iter()
        .map(|(file, dependents)| Hub {
            file: file.to_string(),
            dependents,
        })
        .collect();

    let total_chunks: usize = steps.iter().map(|s| s.chunks.len()).sum();
    let ok_chunks: usize = steps
        .iter()
        .flat_map(|s| &s.chunks)
        .filter(|c| c.error.is_none())
        .count();
    let chunk_success_rate = if total_chunks == 0 {
        if steps.is_empty() || !analyzed.is_empty() {
            1.0
        } else {
            0.0
        }
    } else {
        ok_chunks as f64 / total_chunks as f64
    };
    let coverage = if corpus_files == 0 {
        1.0
    } else {
        (analyzed.len() as f64 / corpus_files as f64).min(1.0)
    };
    let aggregate_score = (100.0 * chunk_success_rate * coverage * 10.0).round() / 10.0;

    SynthesisReport {
        total_tokens: files.iter().map(|f| f.tokens_used).sum(),
        files,
        correlations,
        hubs,
        cycles: cycles.to_vec(),
        graph: graph.stats(),
        coverage,
        chunk_success_rate,
        aggregate_score,
    }
}

fn file_report(step: &StepOutcome) -> FileReport {
    let mut chunks: Vec<_> = step.chunks.iter().collect();
    chunks.sort_by_key(|c| c.index);
    let analysis = chunks
        .iter()
        .filter_map(|c| c.text.as_deref())
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR);

    FileReport {
        file: step.file.clone(),
        status: step.status,
        chunk_count: step.chunks.len(),
        analysis,
        tokens_used: step.tokens_used(),
        elapsed_ms: step.elapsed_ms,
        recovered: step.recovered,
        error: step.error.clone(),
    }
}
