use corpus_graph::{
    detect_cycles, DependencyEdge, DependencyGraph, GraphBuilder, ReferenceKind, Scheduler,
};
use pretty_assertions::assert_eq;
use std::collections::{HashMap, HashSet};

/// Small deterministic generator so graph shapes are reproducible
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn random_graph(seed: u64, nodes: usize, edges: usize, acyclic: bool) -> DependencyGraph {
    let mut rng = Lcg(seed);
    let files: Vec<String> = (0..nodes).map(|i| format!("f{i}")).collect();
    let mut generated = Vec::new();
    for _ in 0..edges {
        let a = rng.below(nodes as u64) as usize;
        let b = rng.below(nodes as u64) as usize;
        let (from, to) = if acyclic {
            if a == b {
                continue;
            }
            (a.max(b), a.min(b))
        } else {
            (a, b)
        };
        generated.push(DependencyEdge::new(
            files[from].clone(),
            files[to].clone(),
            ReferenceKind::StaticImport,
        ));
    }
    DependencyGraph::build(files, generated)
}

#[test]
fn order_contains_every_file_once() {
    for seed in 0..40 {
        let graph = random_graph(seed, 30, 60, seed % 2 == 0);
        let topo = Scheduler::new().topological_order(&graph);
        assert_eq!(topo.order.len(), graph.file_count());
        let unique: HashSet<&String> = topo.order.iter().collect();
        assert_eq!(unique.len(), graph.file_count(), "seed {seed}");
    }
}

#[test]
fn acyclic_order_puts_dependencies_first() {
    for seed in 0..40 {
        let graph = random_graph(seed, 25, 50, true);
        let topo = Scheduler::new().topological_order(&graph);
        assert!(!topo.has_cycles());
        assert!(detect_cycles(&graph).is_empty());

        let position: HashMap<&str, usize> = topo
            .order
            .iter()
            .enumerate()
            .map(|(i, f)| (f.as_str(), i))
            .collect();
        for edge in graph.edges() {
            assert!(position[edge.to.as_str()] < position[edge.from.as_str()], "seed {seed}");
        }
    }
}

#[test]
fn batches_never_precede_their_dependencies() {
    for seed in 0..40 {
        let graph = random_graph(seed, 30, 45, seed % 3 == 0);
        let scheduler = Scheduler::new().with_max_files_per_batch(4);
        let plan = scheduler.plan(&graph);

        let batch_of: HashMap<&str, usize> = plan
            .batches
            .iter()
            .flat_map(|b| b.files.iter().map(move |f| (f.as_str(), b.index)))
            .collect();
        assert_eq!(batch_of.len(), graph.file_count(), "seed {seed}");
        assert!(plan.batches.iter().all(|b| !b.is_empty() && b.len() <= 4));

        for batch in plan.batches.iter().filter(|b| !b.forced) {
            for file in &batch.files {
                for dep in graph.dependencies(file).unwrap() {
                    assert!(
                        batch_of[dep] < batch.index,
                        "seed {seed}: {file} in batch {} before {dep}",
                        batch.index
                    );
                }
            }
        }
    }
}

#[test]
fn cyclic_graphs_report_cycles_and_terminate() {
    for seed in 0..40 {
        let graph = random_graph(seed, 20, 40, false);
        let plan = Scheduler::new().plan(&graph);
        if !plan.forced.is_empty() {
            assert!(!plan.cycles.is_empty(), "seed {seed}");
            assert!(plan.cycles.iter().all(|c| !c.is_empty()));
            assert!(plan.batches.iter().any(|b| b.forced));
        }
        let covered: usize = plan.batches.iter().map(|b| b.len()).sum();
        assert_eq!(covered, graph.file_count());
    }
}

#[test]
fn plans_are_deterministic() {
    let graph = random_graph(7, 30, 70, false);
    let first = Scheduler::new().plan(&graph);
    let second = Scheduler::new().plan(&graph);
    assert_eq!(first, second);
}

#[test]
fn mixed_language_project_schedules_end_to_end() {
    let sources = [
        ("src/lib.rs", "mod config;\nmod net;\npub use config::Settings;\n"),
        ("src/config.rs", "pub struct Settings;\n"),
        ("src/net.rs", "use crate::config::Settings;\npub fn connect(_: &Settings) {}\n"),
        ("tools/report.py", "from tools import fmt\nimport json\n"),
        ("tools/fmt.py", "def render(x):\n    return str(x)\n"),
        ("tools/__init__.py", ""),
    ];
    let mut builder = GraphBuilder::new(sources.iter().map(|(p, _)| *p));
    for (path, content) in &sources {
        builder.add_source(path, content);
    }
    let graph = builder.build();

    assert_eq!(
        graph.dependencies("src/lib.rs").unwrap(),
        vec!["src/config.rs", "src/net.rs"]
    );
    assert_eq!(graph.dependencies("src/net.rs").unwrap(), vec!["src/config.rs"]);
    assert_eq!(graph.dependencies("tools/report.py").unwrap(), vec!["tools/fmt.py"]);

    let plan = Scheduler::new().plan(&graph);
    assert!(plan.cycles.is_empty());
    let first: Vec<&str> = plan.batches[0].files.iter().map(String::as_str).collect();
    assert_eq!(first, vec!["src/config.rs", "tools/fmt.py", "tools/__init__.py"]);
    assert_eq!(plan.order.last().map(String::as_str), Some("src/lib.rs"));

    let json = serde_json::to_string(&plan).unwrap();
    assert!(json.contains("\"batches\""));
}
