//! # Corpus Graph
//!
//! File-level dependency analysis and dependency-ordered scheduling.
//!
//! ## Architecture
//!
//! ```text
//! (path, content)[]
//!     │
//!     ├──> Extractor (reference patterns per language)
//!     │      └─ imports, requires, dynamic imports, mod, #include
//!     │
//!     ├──> Resolver (known file set)
//!     │      └─ drops bare packages and externally rooted paths
//!     │
//!     ├──> Dependency Graph (petgraph)
//!     │      ├─ Nodes: files in input order
//!     │      └─ Edges: a depends on b
//!     │
//!     └──> Scheduler
//!            ├─ Cycle detection (DFS with recursion stack)
//!            ├─ Kahn ordering with force-append for cycles
//!            └─ Batches of mutually independent files
//! ```

mod builder;
mod cycles;
mod error;
mod extractor;
mod graph;
mod resolver;
mod scheduler;
mod types;

pub use builder::GraphBuilder;
pub use cycles::detect_cycles;
pub use error::{GraphError, Result};
pub use extractor::extract;
pub use graph::DependencyGraph;
pub use resolver::{normalize_path, FileIndex};
pub use scheduler::{ExecutionBatch, ExecutionPlan, Scheduler, TopologicalOrder};
pub use types::{DependencyEdge, ExtractedReference, GraphStats, ReferenceKind};
