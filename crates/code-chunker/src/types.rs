use crate::content_type::ContentType;
use serde::{Deserialize, Serialize};

/// How well a chunk's end lines up with the content's structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryQuality {
    /// Ends at a detected boundary or at the end of the source
    Optimal,
    /// Ends at a raw offset because no boundary was in range
    BestEffort,
}

impl BoundaryQuality {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Optimal => "optimal",
            Self::BestEffort => "best_effort",
        }
    }
}

/// A token-bounded slice of one source.
///
/// Chunks are immutable once produced; re-chunking yields a new sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Position in the sequence (0-based, contiguous per source)
    pub index: usize,

    /// Path or `blob:<hash>` identifier of the source
    pub source_id: String,

    /// The chunk text, including any overlap carried from the predecessor
    pub content: String,

    /// Content-type tag of the source
    pub content_type: ContentType,

    /// Estimated token count of `content`
    pub estimated_tokens: usize,

    /// Byte offset of `content` in the source
    pub start_offset: usize,

    /// Exclusive end byte offset of `content` in the source
    pub end_offset: usize,

    /// Start line (1-indexed)
    pub start_line: usize,

    /// End line (1-indexed, inclusive)
    pub end_line: usize,

    /// Leading bytes of `content` duplicated from the previous chunk
    pub overlap_chars: usize,

    /// Whether the end lines up with a structural boundary
    pub boundary_quality: BoundaryQuality,

    /// Heuristic structural coherence in `[0, 1]`
    pub coherence: f32,

    /// Index of the preceding chunk
    pub previous: Option<usize>,

    /// Index of the following chunk
    pub next: Option<usize>,
}

impl Chunk {
    /// Get the number of lines in this chunk
    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Length of the chunk in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Content without the overlap prefix
    #[must_use]
    pub fn fresh_content(&self) -> &str {
        self.content.get(self.overlap_chars..).unwrap_or(&self.content)
    }

    #[must_use]
    pub const fn is_first(&self) -> bool {
        self.previous.is_none()
    }

    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str, overlap_chars: usize) -> Chunk {
        Chunk {
            index: 1,
            source_id: "test.rs".to_string(),
            content: content.to_string(),
            content_type: ContentType::Plain,
            estimated_tokens: crate::token::estimate(content),
            start_offset: 10,
            end_offset: 10 + content.len(),
            start_line: 10,
            end_line: 15,
            overlap_chars,
            boundary_quality: BoundaryQuality::Optimal,
            coherence: 1.0,
            previous: Some(0),
            next: None,
        }
    }

    #[test]
    fn test_chunk_line_count() {
        assert_eq!(chunk("code", 0).line_count(), 6);
    }

    #[test]
    fn test_fresh_content_skips_overlap() {
        let c = chunk("abcdef", 2);
        assert_eq!(c.fresh_content(), "cdef");
        assert!(!c.is_first());
        assert!(c.is_last());
    }

    #[test]
    fn test_fresh_content_tolerates_bad_overlap() {
        let c = chunk("héllo", 2);
        assert_eq!(c.fresh_content(), "héllo");
    }
}
