use crate::extractor::extract;
use crate::graph::DependencyGraph;
use crate::resolver::{normalize_path, FileIndex};
use crate::types::{DependencyEdge, ExtractedReference};

/// Build a dependency graph from file contents.
///
/// Every known file becomes a node, whether or not it has references.
/// References that do not resolve to a known file are counted and dropped.
pub struct GraphBuilder {
    index: FileIndex,
    graph: DependencyGraph,
    unresolved: usize,
}

impl GraphBuilder {
    /// Start a graph over the known file set (relative, `/`-separated paths)
    pub fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let files: Vec<String> = files
            .into_iter()
            .map(|f| normalize_path(f.as_ref()))
            .collect();
        let index = FileIndex::new(&files);
        let mut graph = DependencyGraph::new();
        for file in files {
            graph.add_file(file);
        }
        Self {
            index,
            graph,
            unresolved: 0,
        }
    }

    /// Extract and resolve the references in one file; returns how many edges were added
    pub fn add_source(&mut self, path: &str, content: &str) -> usize {
        let path = normalize_path(path);
        let refs = extract(content, &path);
        self.add_references(&path, &refs)
    }

    /// Resolve already-extracted references found in `path`
    pub fn add_references(&mut self, path: &str, refs: &[ExtractedReference]) -> usize {
        let path = normalize_path(path);
        let mut added = 0;
        for reference in refs {
            match self.index.resolve(&path, reference) {
                Some(target) => {
                    let mut edge = DependencyEdge::new(path.clone(), target, reference.kind);
                    edge.symbol = reference.symbol.clone();
                    if self.graph.add_edge(edge) {
                        added += 1;
                    }
                }
                None => {
                    log::debug!("Unresolved reference in {path}: {}", reference.path);
                    self.unresolved += 1;
                }
            }
        }
        added
    }

    pub fn build(mut self) -> DependencyGraph {
        self.graph.record_unresolved(self.unresolved);
        log::info!("Built dependency graph: {}", self.graph.stats());
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_edges_from_sources() {
        let mut builder = GraphBuilder::new(["src/a.ts", "src/b.ts", "src/c.ts"]);
        builder.add_source("src/a.ts", "import { b } from './b';\nimport React from 'react';\n");
        builder.add_source("src/b.ts", "const c = require('./c');\n");
        builder.add_source("src/c.ts", "export const c = 1;\n");
        let graph = builder.build();

        assert_eq!(graph.files(), vec!["src/a.ts", "src/b.ts", "src/c.ts"]);
        assert_eq!(graph.dependencies("src/a.ts").unwrap(), vec!["src/b.ts"]);
        assert_eq!(graph.dependencies("src/b.ts").unwrap(), vec!["src/c.ts"]);

        let stats = graph.stats();
        assert_eq!(stats.edges, 2);
        assert_eq!(stats.unresolved_references, 1);
    }

    #[test]
    fn edges_keep_symbols() {
        let mut builder = GraphBuilder::new(["main.py", "util.py"]);
        builder.add_source("main.py", "from util import parse\n");
        let edges = builder.build().edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].symbol.as_deref(), Some("parse"));
    }

    #[test]
    fn imports_above_the_root_are_unresolved() {
        let mut builder = GraphBuilder::new(["src/app/a.js", "shared.js"]);
        let added = builder.add_source("src/app/a.js", "import x from '../../../shared';\n");
        let graph = builder.build();

        assert_eq!(added, 0);
        assert!(graph.dependencies("src/app/a.js").unwrap().is_empty());
        assert_eq!(graph.stats().unresolved_references, 1);
    }
}
