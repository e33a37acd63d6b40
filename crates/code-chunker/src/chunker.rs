use crate::boundary::BoundaryRegistry;
use crate::config::ChunkerConfig;
use crate::content_type::ContentType;
use crate::error::{ChunkerError, Result};
use crate::token::{self, CHARS_PER_TOKEN};
use crate::types::{BoundaryQuality, Chunk};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Token-bounded chunker that snaps chunk ends to structural boundaries
#[derive(Debug, Clone)]
pub struct SemanticChunker {
    config: ChunkerConfig,
    registry: BoundaryRegistry,
}

/// Byte range of one planned chunk
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    quality: BoundaryQuality,
}

impl SemanticChunker {
    /// Create a chunker with the default boundary detectors
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        Self::with_registry(config, BoundaryRegistry::default())
    }

    /// Create a chunker with custom boundary detectors
    pub fn with_registry(config: ChunkerConfig, registry: BoundaryRegistry) -> Result<Self> {
        config.validate().map_err(ChunkerError::invalid_config)?;
        Ok(Self { config, registry })
    }

    /// Get configuration
    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into an ordered chunk sequence.
    ///
    /// `source` names the origin; without one a content hash identifies the blob.
    /// Whitespace-only text yields no chunks.
    pub fn chunk(&self, text: &str, content_type: ContentType, source: Option<&str>) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let source_id = source_id_for(text, source);
        let boundaries: Vec<usize> = if self.config.semantic_boundaries {
            self.registry
                .detect(text, content_type)
                .into_iter()
                .map(|b| b.offset)
                .collect()
        } else {
            Vec::new()
        };

        let spans = if token::estimate(text) <= self.config.max_chunk_tokens {
            vec![Span {
                start: 0,
                end: text.len(),
                quality: BoundaryQuality::Optimal,
            }]
        } else {
            self.plan_spans(text, &boundaries)
        };

        let chunks = build_chunks(text, &spans, &boundaries, content_type, &source_id);
        log::debug!(
            "Chunked {source_id}: {} chunks ({} best-effort)",
            chunks.len(),
            chunks
                .iter()
                .filter(|c| c.boundary_quality == BoundaryQuality::BestEffort)
                .count()
        );
        chunks
    }

    /// Read and chunk a file, detecting its content type from the extension
    pub fn chunk_file(&self, path: impl AsRef<Path>) -> Result<Vec<Chunk>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let source = path.to_string_lossy().replace('\\', "/");
        Ok(self.chunk(&content, ContentType::from_path(path), Some(&source)))
    }

    fn plan_spans(&self, text: &str, boundaries: &[usize]) -> Vec<Span> {
        let len = text.len();
        let min_chars = token::tokens_to_chars(self.config.min_chunk_tokens);
        let max_chars = token::tokens_to_chars(self.config.max_chunk_tokens);
        let target_chars =
            token::tokens_to_chars(self.config.target_chunk_tokens).max(CHARS_PER_TOKEN);
        let overlap_chars = token::tokens_to_chars(self.config.overlap_tokens);
        let radius = self.config.boundary_search_radius;

        // Latest end that still leaves a final chunk of at least `min_chars`.
        let tail_floor = (len + overlap_chars).saturating_sub(min_chars);

        let mut spans = Vec::new();
        let mut start = 0;

        loop {
            if token::estimate_len(len - start) <= self.config.max_chunk_tokens {
                spans.push(Span {
                    start,
                    end: len,
                    quality: BoundaryQuality::Optimal,
                });
                break;
            }

            let mut naive = start + target_chars;
            if tail_floor >= start + min_chars {
                naive = naive.min(tail_floor);
            }
            naive = floor_char_boundary(text, naive);
            if naive <= start {
                naive = ceil_char_boundary(text, start + 1);
            }

            let lo = (start + min_chars)
                .max(start + 1)
                .max(naive.saturating_sub(radius));
            let mut hi = (start + max_chars).min(naive + radius).min(len);
            if tail_floor >= lo {
                hi = hi.min(tail_floor);
            }

            let (end, quality) = match nearest_boundary(boundaries, naive, lo, hi) {
                Some(offset) => (offset, BoundaryQuality::Optimal),
                None => (naive, BoundaryQuality::BestEffort),
            };
            spans.push(Span {
                start,
                end,
                quality,
            });

            let mut next = floor_char_boundary(text, end.saturating_sub(overlap_chars));
            if next <= start {
                next = end;
            }
            start = next;
        }

        spans
    }

    /// Get statistics about chunking
    #[must_use]
    pub fn get_stats(chunks: &[Chunk]) -> ChunkingStats {
        let tokens = || chunks.iter().map(|c| c.estimated_tokens);
        let best_effort = chunks
            .iter()
            .filter(|c| c.boundary_quality == BoundaryQuality::BestEffort)
            .count();

        ChunkingStats {
            total_chunks: chunks.len(),
            total_lines: chunks.iter().map(Chunk::line_count).sum(),
            total_tokens: tokens().sum(),
            avg_tokens_per_chunk: if chunks.is_empty() {
                0
            } else {
                tokens().sum::<usize>() / chunks.len()
            },
            min_tokens: tokens().min().unwrap_or(0),
            max_tokens: tokens().max().unwrap_or(0),
            optimal: chunks.len() - best_effort,
            best_effort,
        }
    }
}

impl Default for SemanticChunker {
    fn default() -> Self {
        Self {
            config: ChunkerConfig::default(),
            registry: BoundaryRegistry::default(),
        }
    }
}

/// Chunk `text` with `config`
pub fn chunk(text: &str, content_type: ContentType, config: &ChunkerConfig) -> Result<Vec<Chunk>> {
    Ok(SemanticChunker::new(config.clone())?.chunk(text, content_type, None))
}

/// Reassemble a chunk sequence, dropping each chunk's overlap with its predecessor
#[must_use]
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.index);

    let capacity = ordered.iter().map(|c| c.content.len()).sum();
    let mut out = String::with_capacity(capacity);
    for (pos, chunk) in ordered.iter().enumerate() {
        if pos == 0 {
            out.push_str(&chunk.content);
        } else {
            out.push_str(chunk.fresh_content());
        }
    }
    out
}

/// Identifier for a source: its path, or a content hash for anonymous blobs
#[must_use]
pub fn source_id_for(content: &str, path: Option<&str>) -> String {
    match path {
        Some(path) if !path.is_empty() => path.to_string(),
        _ => {
            let digest = Sha256::digest(content.as_bytes());
            let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
            format!("blob:{hex}")
        }
    }
}

/// Nearest boundary to `target` inside `[lo, hi]`; equidistant candidates resolve to the earlier one
fn nearest_boundary(boundaries: &[usize], target: usize, lo: usize, hi: usize) -> Option<usize> {
    if lo > hi {
        return None;
    }

    let idx = boundaries.partition_point(|&offset| offset < target);
    let left = idx
        .checked_sub(1)
        .map(|i| boundaries[i])
        .filter(|&offset| offset >= lo && offset <= hi);
    let right = boundaries
        .get(idx)
        .copied()
        .filter(|&offset| offset >= lo && offset <= hi);

    match (left, right) {
        (Some(l), Some(r)) => {
            if target - l <= r - target {
                Some(l)
            } else {
                Some(r)
            }
        }
        (Some(l), None) => Some(l),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    }
}

fn build_chunks(
    text: &str,
    spans: &[Span],
    boundaries: &[usize],
    content_type: ContentType,
    source_id: &str,
) -> Vec<Chunk> {
    let mut starts = LineCounter::default();
    let mut ends = LineCounter::default();
    let last = spans.len().saturating_sub(1);

    spans
        .iter()
        .enumerate()
        .map(|(index, span)| {
            let overlap_chars = index
                .checked_sub(1)
                .map_or(0, |prev| spans[prev].end.saturating_sub(span.start));
            let content = &text[span.start..span.end];
            Chunk {
                index,
                source_id: source_id.to_string(),
                content: content.to_string(),
                content_type,
                estimated_tokens: token::estimate(content),
                start_offset: span.start,
                end_offset: span.end,
                start_line: starts.line_at(text, span.start),
                end_line: ends.line_at(text, span.end.saturating_sub(1).max(span.start)),
                overlap_chars,
                boundary_quality: span.quality,
                coherence: coherence(text, span, span.start + overlap_chars, boundaries, content_type),
                previous: index.checked_sub(1),
                next: (index < last).then_some(index + 1),
            }
        })
        .collect()
}

/// Incremental 1-based line lookup for non-decreasing offsets
#[derive(Debug, Default)]
struct LineCounter {
    offset: usize,
    newlines: usize,
}

impl LineCounter {
    fn line_at(&mut self, text: &str, offset: usize) -> usize {
        if offset < self.offset {
            self.offset = 0;
            self.newlines = 0;
        }
        self.newlines += text.as_bytes()[self.offset..offset]
            .iter()
            .filter(|&&b| b == b'\n')
            .count();
        self.offset = offset;
        self.newlines + 1
    }
}

fn coherence(
    text: &str,
    span: &Span,
    fresh_start: usize,
    boundaries: &[usize],
    content_type: ContentType,
) -> f32 {
    let at_boundary = |offset: usize| boundaries.binary_search(&offset).is_ok();
    let starts_clean = fresh_start == 0 || at_boundary(fresh_start);
    let ends_clean = span.end == text.len() || at_boundary(span.end);
    let content = &text[span.start..span.end];

    let balance = match content_type {
        ContentType::Code(_) => delimiter_balance(content),
        ContentType::Markup => {
            let fences = content
                .lines()
                .filter(|line| {
                    let line = line.trim_start();
                    line.starts_with("```") || line.starts_with("~~~")
                })
                .count();
            if fences % 2 == 0 {
                1.0
            } else {
                0.0
            }
        }
        ContentType::Plain => 1.0,
        ContentType::Unknown => 0.5,
    };

    let mut score = 0.3 * balance;
    if starts_clean {
        score += 0.4;
    }
    if ends_clean {
        score += 0.3;
    }
    score.clamp(0.0, 1.0)
}

fn delimiter_balance(content: &str) -> f32 {
    let mut depth = [0i64; 3];
    for b in content.bytes() {
        match b {
            b'{' => depth[0] += 1,
            b'}' => depth[0] -= 1,
            b'(' => depth[1] += 1,
            b')' => depth[1] -= 1,
            b'[' => depth[2] += 1,
            b']' => depth[2] -= 1,
            _ => {}
        }
    }
    let imbalance: i64 = depth.iter().map(|d| d.abs()).sum();
    1.0 / (1.0 + imbalance as f32)
}

fn floor_char_boundary(text: &str, idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    let mut idx = idx;
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(text: &str, idx: usize) -> usize {
    let mut idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Statistics about chunking results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingStats {
    pub total_chunks: usize,
    pub total_lines: usize,
    pub total_tokens: usize,
    pub avg_tokens_per_chunk: usize,
    pub min_tokens: usize,
    pub max_tokens: usize,
    pub optimal: usize,
    pub best_effort: usize,
}

impl std::fmt::Display for ChunkingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Chunks: {} | Lines: {} | Tokens: {} | Avg: {} | Range: {}-{} | Best-effort: {}",
            self.total_chunks,
            self.total_lines,
            self.total_tokens,
            self.avg_tokens_per_chunk,
            self.min_tokens,
            self.max_tokens,
            self.best_effort
        )
    }
}
