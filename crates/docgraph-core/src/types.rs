use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Fully-qualified identifier for a [`CodeComponent`], e.g. `pkg.file.Class.method`.
pub type ComponentId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Function,
    Method,
    Class,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComponentKind::Function => "function",
            ComponentKind::Method => "method",
            ComponentKind::Class => "class",
        };
        write!(f, "{s}")
    }
}

/// 1-based, inclusive line span within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start_line: u32,
    pub end_line: u32,
}

/// The unit of work for the documentation pipeline: a function, method, or class
/// extracted from the repository's source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeComponent {
    pub id: ComponentId,
    pub kind: ComponentKind,
    pub file_path: String,
    pub relative_path: String,
    pub source_text: String,
    pub location: Location,
    pub has_doc: bool,
    pub doc_text: String,
    pub depends_on: HashSet<ComponentId>,
}

impl CodeComponent {
    /// The last dotted segment of `id`, i.e. the component's own name.
    pub fn name(&self) -> &str {
        self.id.rsplit('.').next().unwrap_or(self.id.as_str())
    }

    /// True for `__init__`, the only method never documented on its own.
    pub fn is_constructor(&self) -> bool {
        self.kind == ComponentKind::Method && self.name() == "__init__"
    }

    /// Heuristic used by the Orchestrator's skip rule: a docstring with more than
    /// ten whitespace-separated tokens is considered "non-trivial".
    pub fn has_nontrivial_doc(&self) -> bool {
        self.has_doc && self.doc_text.split_whitespace().count() > 10
    }

    /// Owning class id for a method (`pkg.file.Class.method` -> `pkg.file.Class`), if any.
    pub fn owning_class_id(&self) -> Option<ComponentId> {
        if self.kind != ComponentKind::Method {
            return None;
        }
        let mut parts: Vec<&str> = self.id.split('.').collect();
        parts.pop();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("."))
        }
    }
}

/// Owner of all extracted components, keyed by [`ComponentId`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentMap {
    pub components: std::collections::HashMap<ComponentId, CodeComponent>,
}

impl ComponentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, component: CodeComponent) {
        self.components.insert(component.id.clone(), component);
    }

    pub fn get(&self, id: &str) -> Option<&CodeComponent> {
        self.components.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut CodeComponent> {
        self.components.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Every component whose `depends_on` includes `id` — the "called by" set.
    pub fn dependents_of(&self, id: &str) -> Vec<&CodeComponent> {
        let mut out: Vec<&CodeComponent> = self
            .components
            .values()
            .filter(|c| c.depends_on.contains(id))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
