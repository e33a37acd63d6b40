//! # Corpus Chunker
//!
//! Token-bounded chunking that keeps code, markup and prose fragments structurally whole.
//!
//! ## Architecture
//!
//! ```text
//! Source text
//!     │
//!     ├──> Content type (from extension or explicit tag)
//!     │
//!     ├──> Boundary detection (regex heuristics per family)
//!     │    ├─> Code: functions, methods, classes, block ends
//!     │    ├─> Markup: headings, fences, list items
//!     │    └─> Plain: paragraphs
//!     │
//!     └──> Chunk planning
//!          ├─> Naive end at target size
//!          ├─> Snap to nearest boundary inside [min, max]
//!          └─> Carry overlap into the next chunk
//! ```
//!
//! ## Example
//!
//! ```rust
//! use corpus_chunker::{reconstruct, ContentType, Language, SemanticChunker};
//!
//! let chunker = SemanticChunker::default();
//! let code = "fn process(input: &str) -> String {\n    input.trim().to_uppercase()\n}\n";
//!
//! let chunks = chunker.chunk(code, ContentType::Code(Language::Rust), Some("example.rs"));
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(reconstruct(&chunks), code);
//! ```

mod boundary;
mod chunker;
mod config;
mod content_type;
mod error;
mod language;
pub mod token;
mod types;

pub use boundary::{
    detect as detect_boundaries, Boundary, BoundaryDetector, BoundaryKind, BoundaryRegistry,
    CodeBoundaryDetector, MarkupBoundaryDetector, ParagraphBoundaryDetector,
};
pub use chunker::{chunk, reconstruct, source_id_for, ChunkingStats, SemanticChunker};
pub use config::{ChunkerConfig, DEFAULT_BOUNDARY_SEARCH_RADIUS};
pub use content_type::ContentType;
pub use error::{ChunkerError, Result};
pub use language::Language;
pub use types::{BoundaryQuality, Chunk};
