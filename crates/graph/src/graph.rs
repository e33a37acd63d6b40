use crate::error::{GraphError, Result};
use crate::types::{DependencyEdge, GraphStats, ReferenceKind};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Edge payload stored in the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EdgeData {
    pub(crate) kind: ReferenceKind,
    pub(crate) symbol: Option<String>,
}

/// Directed file-to-file dependency graph.
///
/// An edge `a -> b` means `a` depends on `b`. Files keep their insertion
/// order, which every traversal uses as its tie-breaker.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, EdgeData>,
    index: HashMap<String, NodeIndex>,
    seen_edges: HashSet<(NodeIndex, NodeIndex, Option<String>)>,
    unresolved_references: usize,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from every file in `files` plus the endpoints of `edges`
    pub fn build<I, S>(files: I, edges: impl IntoIterator<Item = DependencyEdge>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut graph = Self::new();
        for file in files {
            graph.add_file(file);
        }
        for edge in edges {
            graph.add_edge(edge);
        }
        graph
    }

    /// Build a graph whose files are exactly the endpoints of `edges`
    pub fn from_edges(edges: impl IntoIterator<Item = DependencyEdge>) -> Self {
        Self::build(std::iter::empty::<String>(), edges)
    }

    /// Add a file node; returns the existing node when already present
    pub fn add_file(&mut self, path: impl Into<String>) -> NodeIndex {
        let path = path.into();
        if let Some(&idx) = self.index.get(&path) {
            return idx;
        }
        let idx = self.graph.add_node(path.clone());
        self.index.insert(path, idx);
        idx
    }

    /// Add an edge; duplicate `(from, to, symbol)` triples are ignored. Returns whether it was new.
    pub fn add_edge(&mut self, edge: DependencyEdge) -> bool {
        let from = self.add_file(edge.from);
        let to = self.add_file(edge.to);
        if !self.seen_edges.insert((from, to, edge.symbol.clone())) {
            return false;
        }
        self.graph.add_edge(
            from,
            to,
            EdgeData {
                kind: edge.kind,
                symbol: edge.symbol,
            },
        );
        true
    }

    pub(crate) fn record_unresolved(&mut self, count: usize) {
        self.unresolved_references += count;
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// Files in insertion order
    pub fn files(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].as_str())
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All edges in insertion order
    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.graph
            .edge_references()
            .map(|e| DependencyEdge {
                from: self.graph[e.source()].clone(),
                to: self.graph[e.target()].clone(),
                kind: e.weight().kind,
                symbol: e.weight().symbol.clone(),
            })
            .collect()
    }

    /// Files that `path` depends on, in insertion order
    pub fn dependencies(&self, path: &str) -> Result<Vec<&str>> {
        let idx = self.node(path)?;
        Ok(self.neighbor_paths(idx, Direction::Outgoing))
    }

    /// Files that depend on `path`, in insertion order
    pub fn dependents(&self, path: &str) -> Result<Vec<&str>> {
        let idx = self.node(path)?;
        Ok(self.neighbor_paths(idx, Direction::Incoming))
    }

    /// Files with the most dependents; ties keep insertion order. Files nobody depends on are omitted.
    pub fn hubs(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut hubs: Vec<(usize, &str, usize)> = self
            .graph
            .node_indices()
            .map(|idx| {
                let count = self.neighbor_positions(idx, Direction::Incoming).len();
                (idx.index(), self.graph[idx].as_str(), count)
            })
            .filter(|&(_, _, count)| count > 0)
            .collect();
        hubs.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
        hubs.into_iter()
            .take(limit)
            .map(|(_, path, count)| (path, count))
            .collect()
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            files: self.file_count(),
            edges: self.edge_count(),
            unresolved_references: self.unresolved_references,
            self_loops: self
                .graph
                .edge_references()
                .filter(|e| e.source() == e.target())
                .count(),
        }
    }

    fn node(&self, path: &str) -> Result<NodeIndex> {
        self.index
            .get(path)
            .copied()
            .ok_or_else(|| GraphError::NodeNotFound(path.to_string()))
    }

    fn neighbor_paths(&self, idx: NodeIndex, direction: Direction) -> Vec<&str> {
        self.neighbor_positions(idx, direction)
            .into_iter()
            .map(|pos| self.graph[NodeIndex::new(pos)].as_str())
            .collect()
    }

    /// Position of `path` in insertion order
    pub(crate) fn position(&self, path: &str) -> Option<usize> {
        self.index.get(path).map(|idx| idx.index())
    }

    pub(crate) fn path_at(&self, position: usize) -> &str {
        self.graph[NodeIndex::new(position)].as_str()
    }

    /// Distinct neighbor positions, ascending
    pub(crate) fn neighbor_positions(&self, idx: NodeIndex, direction: Direction) -> Vec<usize> {
        let mut positions: Vec<usize> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| n.index())
            .collect();
        positions.sort_unstable();
        positions.dedup();
        positions
    }

    /// Distinct dependency positions for every node, indexed by position
    pub(crate) fn dependency_lists(&self) -> Vec<Vec<usize>> {
        self.graph
            .node_indices()
            .map(|idx| self.neighbor_positions(idx, Direction::Outgoing))
            .collect()
    }

    /// Distinct dependent positions for every node, indexed by position
    pub(crate) fn dependent_lists(&self) -> Vec<Vec<usize>> {
        self.graph
            .node_indices()
            .map(|idx| self.neighbor_positions(idx, Direction::Incoming))
            .collect()
    }
}
