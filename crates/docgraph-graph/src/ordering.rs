use std::collections::HashSet;

use docgraph_core::ComponentId;

use crate::graph::DependencyGraph;
use crate::scc::find_cycles;

/// Breaks every cycle found in `graph` by removing exactly one edge per cycle:
/// the first edge, in lexicographic node order around the cycle, that is
/// actually present. This is deterministic given the same input graph, which
/// matters because which edge gets dropped changes the documentation order.
pub fn break_cycles(graph: &mut DependencyGraph) -> Vec<(ComponentId, ComponentId)> {
    let mut removed = Vec::new();
    let cycles = find_cycles(graph);
    for mut cycle in cycles {
        cycle.sort();
        let len = cycle.len();
        for j in 0..len {
            let from = &cycle[j];
            let to = &cycle[(j + 1) % len];
            if graph.remove_edge(from, to) {
                tracing::warn!(from = %from, to = %to, "removed edge to break cycle");
                removed.push((from.clone(), to.clone()));
                break;
            }
        }
    }
    removed
}

/// Produces the order components should be documented in: dependencies before
/// dependents, so that by the time a component is written every component it
/// calls already has a docstring to draw on. Ties are broken lexicographically
/// by component id for determinism.
pub fn dependency_first_order(graph: &DependencyGraph) -> Vec<ComponentId> {
    let mut has_incoming: HashSet<&ComponentId> = HashSet::new();
    for node in graph.nodes() {
        for dep in graph.dependencies_of(node) {
            has_incoming.insert(dep);
        }
    }

    let mut all_nodes: Vec<&ComponentId> = graph.nodes().collect();
    all_nodes.sort();

    let mut roots: Vec<&ComponentId> = all_nodes
        .iter()
        .copied()
        .filter(|n| !has_incoming.contains(n))
        .collect();
    roots.sort();

    let mut order = Vec::new();
    let mut visited = HashSet::new();
    for root in roots {
        visit(graph, root, &mut visited, &mut order);
    }
    // Anything not reached from a root (can happen inside a leftover cycle
    // edge, or via a component only reachable through another acyclic branch
    // already fully visited) is appended in sorted order.
    for node in all_nodes {
        visit(graph, node, &mut visited, &mut order);
    }
    order
}

fn visit<'a>(
    graph: &'a DependencyGraph,
    node: &'a ComponentId,
    visited: &mut HashSet<&'a ComponentId>,
    order: &mut Vec<ComponentId>,
) {
    if !visited.insert(node) {
        return;
    }
    for dep in graph.dependencies_of(node) {
        visit(graph, dep, visited, order);
    }
    order.push(node.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgraph_core::types::{CodeComponent, ComponentKind, ComponentMap, Location};

    fn component(id: &str, deps: &[&str]) -> CodeComponent {
        CodeComponent {
            id: id.to_string(),
            kind: ComponentKind::Function,
            file_path: "m.py".to_string(),
            relative_path: "m.py".to_string(),
            source_text: String::new(),
            location: Location {
                start_line: 1,
                end_line: 1,
            },
            has_doc: false,
            doc_text: String::new(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn breaks_simple_cycle() {
        let mut map = ComponentMap::new();
        map.insert(component("a", &["b"]));
        map.insert(component("b", &["a"]));
        let mut graph = DependencyGraph::from_components(&map);
        let removed = break_cycles(&mut graph);
        assert_eq!(removed.len(), 1);
        assert!(find_cycles(&graph).is_empty());
    }

    #[test]
    fn dependencies_come_before_dependents() {
        let mut map = ComponentMap::new();
        map.insert(component("a", &["b"]));
        map.insert(component("b", &["c"]));
        map.insert(component("c", &[]));
        let graph = DependencyGraph::from_components(&map);
        let order = dependency_first_order(&graph);
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("c") < pos("b"));
        assert!(pos("b") < pos("a"));
    }
}
