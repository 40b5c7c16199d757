use std::collections::{HashMap, HashSet};

use docgraph_core::types::ComponentMap;
use docgraph_core::ComponentId;

/// An adjacency-list view over a [`ComponentMap`]'s `depends_on` edges, used by
/// the cycle-detection and ordering passes. Kept separate from `ComponentMap`
/// so that cycle-breaking can mutate edges without touching component bodies.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub edges: HashMap<ComponentId, HashSet<ComponentId>>,
}

impl DependencyGraph {
    pub fn from_components(components: &ComponentMap) -> Self {
        let mut edges = HashMap::new();
        for component in components.components.values() {
            edges.insert(component.id.clone(), component.depends_on.clone());
        }
        Self { edges }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ComponentId> {
        self.edges.keys()
    }

    pub fn remove_edge(&mut self, from: &str, to: &str) -> bool {
        self.edges.get_mut(from).is_some_and(|set| set.remove(to))
    }

    pub fn dependencies_of(&self, node: &str) -> Vec<&ComponentId> {
        let mut deps: Vec<&ComponentId> = self
            .edges
            .get(node)
            .map(|set| set.iter().collect())
            .unwrap_or_default();
        deps.sort();
        deps
    }
}
