use std::collections::HashMap;

use docgraph_core::ComponentId;

use crate::graph::DependencyGraph;

/// Tarjan's strongly-connected-components algorithm over a [`DependencyGraph`].
/// Returns every SCC with more than one member — singleton components are, by
/// definition, acyclic and are not interesting to the cycle breaker.
pub fn find_cycles(graph: &DependencyGraph) -> Vec<Vec<ComponentId>> {
    let mut state = TarjanState::default();
    let mut nodes: Vec<&ComponentId> = graph.nodes().collect();
    nodes.sort();
    for node in nodes {
        if !state.indices.contains_key(node) {
            strongconnect(graph, node, &mut state);
        }
    }
    state
        .components
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .collect()
}

#[derive(Default)]
struct TarjanState {
    index_counter: usize,
    stack: Vec<ComponentId>,
    on_stack: std::collections::HashSet<ComponentId>,
    indices: HashMap<ComponentId, usize>,
    lowlinks: HashMap<ComponentId, usize>,
    components: Vec<Vec<ComponentId>>,
}

fn strongconnect(graph: &DependencyGraph, node: &ComponentId, state: &mut TarjanState) {
    state.indices.insert(node.clone(), state.index_counter);
    state.lowlinks.insert(node.clone(), state.index_counter);
    state.index_counter += 1;
    state.stack.push(node.clone());
    state.on_stack.insert(node.clone());

    for neighbor in graph.dependencies_of(node) {
        if !state.indices.contains_key(neighbor) {
            strongconnect(graph, neighbor, state);
            let neighbor_low = state.lowlinks[neighbor];
            let node_low = state.lowlinks[node];
            state.lowlinks.insert(node.clone(), node_low.min(neighbor_low));
        } else if state.on_stack.contains(neighbor) {
            let neighbor_index = state.indices[neighbor];
            let node_low = state.lowlinks[node];
            state.lowlinks.insert(node.clone(), node_low.min(neighbor_index));
        }
    }

    if state.lowlinks[node] == state.indices[node] {
        let mut scc = Vec::new();
        loop {
            let member = state.stack.pop().expect("stack non-empty while closing an SCC");
            state.on_stack.remove(&member);
            let done = &member == node;
            scc.push(member);
            if done {
                break;
            }
        }
        state.components.push(scc);
    }
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
    fn finds_a_two_node_cycle() {
        let mut map = ComponentMap::new();
        map.insert(component("a", &["b"]));
        map.insert(component("b", &["a"]));
        let graph = DependencyGraph::from_components(&map);
        let cycles = find_cycles(&graph);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 2);
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let mut map = ComponentMap::new();
        map.insert(component("a", &["b"]));
        map.insert(component("b", &[]));
        let graph = DependencyGraph::from_components(&map);
        assert!(find_cycles(&graph).is_empty());
    }
}
