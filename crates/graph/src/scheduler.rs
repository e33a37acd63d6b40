//! Dependency-ordered scheduling.
//!
//! Dependencies always come before their dependents. Cycles never stall the
//! scheduler: files that cannot be ordered normally are force-placed in input
//! order and flagged.

use crate::cycles::detect_cycles;
use crate::graph::DependencyGraph;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Files that may run concurrently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionBatch {
    pub index: usize,
    pub files: Vec<String>,
    /// Placed by the cycle safety valve rather than by satisfied dependencies
    pub forced: bool,
}

impl ExecutionBatch {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Result of a topological sort
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologicalOrder {
    /// Every file exactly once
    pub order: Vec<String>,
    /// Files appended after the queue drained because they sit on or behind a cycle
    pub forced: Vec<String>,
}

impl TopologicalOrder {
    pub fn has_cycles(&self) -> bool {
        !self.forced.is_empty()
    }
}

/// Everything needed to run a corpus in dependency order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub order: Vec<String>,
    pub batches: Vec<ExecutionBatch>,
    pub cycles: Vec<Vec<String>>,
    pub forced: Vec<String>,
}

impl ExecutionPlan {
    /// Width of the widest batch
    pub fn max_parallelism(&self) -> usize {
        self.batches.iter().map(ExecutionBatch::len).max().unwrap_or(0)
    }

    pub fn file_count(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Orders files and groups them into dependency-safe batches
#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler {
    max_files_per_batch: Option<usize>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split rounds wider than `max` into consecutive batches
    #[must_use]
    pub fn with_max_files_per_batch(mut self, max: usize) -> Self {
        self.max_files_per_batch = (max > 0).then_some(max);
        self
    }

    /// Kahn's algorithm over dependency counts, seeded in insertion order
    pub fn topological_order(&self, graph: &DependencyGraph) -> TopologicalOrder {
        let deps = graph.dependency_lists();
        let dependents = graph.dependent_lists();
        let n = deps.len();

        let mut remaining: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut placed = vec![false; n];
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(node) = queue.pop_front() {
            placed[node] = true;
            order.push(graph.path_at(node).to_string());
            for &dependent in &dependents[node] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 && !placed[dependent] {
                    queue.push_back(dependent);
                }
            }
        }

        let forced: Vec<String> = (0..n)
            .filter(|&i| !placed[i])
            .map(|i| graph.path_at(i).to_string())
            .collect();
        if !forced.is_empty() {
            log::warn!(
                "{} file(s) could not be ordered by dependencies; appending in input order",
                forced.len()
            );
        }
        order.extend(forced.iter().cloned());

        TopologicalOrder { order, forced }
    }

    /// Group `order` into rounds whose members depend only on earlier rounds.
    ///
    /// Dependencies on files outside `order` count as satisfied. When a round
    /// would be empty, the earliest remaining file is force-placed alone.
    pub fn partition_into_batches(
        &self,
        order: &[String],
        graph: &DependencyGraph,
    ) -> Vec<ExecutionBatch> {
        let deps = graph.dependency_lists();
        let dependents = graph.dependent_lists();
        let n = deps.len();

        // Graph position -> rank in `order`; files not in `order` are not scheduled.
        let mut rank: Vec<Option<usize>> = vec![None; n];
        let mut members: Vec<usize> = Vec::with_capacity(order.len());
        for path in order {
            if let Some(pos) = graph.position(path) {
                if rank[pos].is_none() {
                    rank[pos] = Some(members.len());
                    members.push(pos);
                }
            }
        }

        let mut remaining = vec![0usize; n];
        for &pos in &members {
            remaining[pos] = deps[pos].iter().filter(|&&d| rank[d].is_some()).count();
        }

        let mut placed = vec![false; n];
        let mut placed_count = 0;
        let mut next_unplaced = 0;
        let mut frontier: Vec<usize> = members
            .iter()
            .copied()
            .filter(|&pos| remaining[pos] == 0)
            .collect();
        let mut batches: Vec<ExecutionBatch> = Vec::new();

        while placed_count < members.len() {
            let forced = frontier.is_empty();
            if forced {
                while placed[members[next_unplaced]] {
                    next_unplaced += 1;
                }
                frontier.push(members[next_unplaced]);
            }
            frontier.sort_by_key(|&pos| rank[pos]);

            let mut next_frontier = Vec::new();
            for &pos in &frontier {
                placed[pos] = true;
            }
            placed_count += frontier.len();
            for &pos in &frontier {
                for &dependent in &dependents[pos] {
                    if rank[dependent].is_none() || placed[dependent] {
                        continue;
                    }
                    remaining[dependent] -= 1;
                    if remaining[dependent] == 0 {
                        next_frontier.push(dependent);
                    }
                }
            }

            let files: Vec<String> = frontier
                .iter()
                .map(|&pos| graph.path_at(pos).to_string())
                .collect();
            let width = self.max_files_per_batch.unwrap_or(files.len()).max(1);
            for part in files.chunks(width) {
                batches.push(ExecutionBatch {
                    index: batches.len(),
                    files: part.to_vec(),
                    forced,
                });
            }

            frontier = next_frontier;
        }

        batches
    }

    /// Order, batch and cycle report for the whole graph
    pub fn plan(&self, graph: &DependencyGraph) -> ExecutionPlan {
        let topo = self.topological_order(graph);
        let batches = self.partition_into_batches(&topo.order, graph);
        log::info!(
            "Scheduled {} files into {} batches ({} forced)",
            topo.order.len(),
            batches.len(),
            topo.forced.len()
        );
        ExecutionPlan {
            cycles: detect_cycles(graph),
            order: topo.order,
            batches,
            forced: topo.forced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DependencyEdge, ReferenceKind};
    use pretty_assertions::assert_eq;

    fn graph(files: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        DependencyGraph::build(
            files.iter().copied(),
            edges
                .iter()
                .map(|(from, to)| DependencyEdge::new(*from, *to, ReferenceKind::StaticImport)),
        )
    }

    fn batch_files(batches: &[ExecutionBatch]) -> Vec<Vec<&str>> {
        batches
            .iter()
            .map(|b| b.files.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn chain_runs_dependencies_first() {
        let g = graph(&["A", "B", "C"], &[("A", "B"), ("B", "C")]);
        let plan = Scheduler::new().plan(&g);
        assert_eq!(plan.order, vec!["C", "B", "A"]);
        assert_eq!(batch_files(&plan.batches), vec![vec!["C"], vec!["B"], vec!["A"]]);
        assert!(plan.cycles.is_empty());
        assert!(plan.batches.iter().all(|b| !b.forced));
    }

    #[test]
    fn two_file_cycle_is_force_placed() {
        let g = graph(&["A", "B"], &[("A", "B"), ("B", "A")]);
        let plan = Scheduler::new().plan(&g);
        assert_eq!(plan.cycles, vec![vec!["A".to_string(), "B".to_string()]]);
        assert_eq!(plan.order, vec!["A", "B"]);
        assert_eq!(plan.forced, vec!["A", "B"]);
        assert_eq!(batch_files(&plan.batches), vec![vec!["A"], vec!["B"]]);
        assert!(plan.batches[0].forced);
        assert!(!plan.batches[1].forced);
    }

    #[test]
    fn independent_files_share_a_batch() {
        let g = graph(&["main", "a", "b", "c"], &[("main", "a"), ("main", "b"), ("main", "c")]);
        let plan = Scheduler::new().plan(&g);
        assert_eq!(batch_files(&plan.batches), vec![vec!["a", "b", "c"], vec!["main"]]);
        assert_eq!(plan.max_parallelism(), 3);
    }

    #[test]
    fn wide_rounds_are_split() {
        let g = graph(&["a", "b", "c", "d", "e"], &[]);
        let batches = Scheduler::new()
            .with_max_files_per_batch(2)
            .plan(&g)
            .batches;
        assert_eq!(
            batch_files(&batches),
            vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]
        );
        assert_eq!(batches.iter().map(|b| b.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn self_loop_goes_through_safety_valve() {
        let g = graph(&["a", "b"], &[("a", "a"), ("b", "a")]);
        let plan = Scheduler::new().plan(&g);
        assert_eq!(plan.cycles, vec![vec!["a".to_string()]]);
        assert_eq!(batch_files(&plan.batches), vec![vec!["a"], vec!["b"]]);
        assert!(plan.batches[0].forced);
    }

    #[test]
    fn subset_ignores_dependencies_outside_it() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let order = vec!["b".to_string(), "a".to_string()];
        let batches = Scheduler::new().partition_into_batches(&order, &g);
        assert_eq!(batch_files(&batches), vec![vec!["b"], vec!["a"]]);
    }

    #[test]
    fn empty_graph_yields_empty_plan() {
        let plan = Scheduler::new().plan(&DependencyGraph::new());
        assert!(plan.order.is_empty());
        assert!(plan.batches.is_empty());
        assert_eq!(plan.max_parallelism(), 0);
    }
}
