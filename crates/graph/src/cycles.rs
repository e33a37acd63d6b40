use crate::graph::DependencyGraph;
use std::collections::HashSet;

/// Find dependency cycles with a depth-first walk over files in insertion order.
///
/// Each cycle is the stack slice from the revisited file to the current one,
/// e.g. `[a, b]` for `a -> b -> a`. A self-loop is a one-file cycle. Cycles with
/// the same member set are reported once, in discovery order.
pub fn detect_cycles(graph: &DependencyGraph) -> Vec<Vec<String>> {
    let deps = graph.dependency_lists();
    let n = deps.len();

    let mut visited = vec![false; n];
    let mut on_stack = vec![false; n];
    let mut seen_sets: HashSet<Vec<usize>> = HashSet::new();
    let mut cycles = Vec::new();

    for root in 0..n {
        if visited[root] {
            continue;
        }

        // (node, index of the next dependency to explore)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        let mut path: Vec<usize> = vec![root];
        visited[root] = true;
        on_stack[root] = true;

        while let Some(top) = stack.last_mut() {
            let (node, next) = *top;
            let Some(&dep) = deps[node].get(next) else {
                on_stack[node] = false;
                path.pop();
                stack.pop();
                continue;
            };
            top.1 += 1;

            if on_stack[dep] {
                if let Some(start) = path.iter().position(|&p| p == dep) {
                    let members = path[start..].to_vec();
                    let mut key = members.clone();
                    key.sort_unstable();
                    if seen_sets.insert(key) {
                        cycles.push(
                            members
                                .into_iter()
                                .map(|pos| graph.path_at(pos).to_string())
                                .collect(),
                        );
                    }
                }
            } else if !visited[dep] {
                visited[dep] = true;
                on_stack[dep] = true;
                path.push(dep);
                stack.push((dep, 0));
            }
        }
    }

    if !cycles.is_empty() {
        log::warn!("Detected {} dependency cycle(s)", cycles.len());
    }
    cycles
}
