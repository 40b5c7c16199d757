use std::collections::{HashMap, HashSet};

use docgraph_core::types::{CodeComponent, ComponentKind, ComponentMap};

use crate::extractor::{DependencyRef, RawComponent};

/// One file's worth of freshly-extracted components, paired with the dotted
/// module path ([`crate::repository::module_path_for`]) they belong to.
type FileComponents = (String, Vec<RawComponent>);

/// Resolves each component's already-classified [`DependencyRef`]s into fully
/// qualified [`docgraph_core::ComponentId`]s and assembles the repository-wide
/// [`ComponentMap`], including the class -> method augmentation (every method
/// but `__init__` is added to its class's `depends_on`).
pub fn resolve_repository(per_file: Vec<FileComponents>) -> ComponentMap {
    let mut map = ComponentMap::new();
    // module -> (bare name or qualified name -> id), used for same-module and
    // import-target resolution.
    let mut by_module: HashMap<String, HashMap<String, String>> = HashMap::new();

    for (module, components) in &per_file {
        let local = by_module.entry(module.clone()).or_default();
        for raw in components {
            let id = format!("{module}.{}", raw.qualified_name());
            local.insert(raw.name.clone(), id.clone());
            local.insert(raw.qualified_name(), id.clone());
        }
    }

    for (module, components) in per_file {
        let local = by_module.get(&module).cloned().unwrap_or_default();
        for raw in components {
            let id = format!("{module}.{}", raw.qualified_name());
            let depends_on = resolve_refs(&raw.raw_depends_on, &local, &by_module, &id);

            map.insert(CodeComponent {
                id,
                kind: raw.kind,
                file_path: raw.file_path,
                relative_path: raw.relative_path,
                source_text: raw.source_text,
                location: raw.location,
                has_doc: raw.has_doc,
                doc_text: raw.doc_text,
                depends_on,
            });
        }
    }

    add_class_method_edges(&mut map);
    map
}

/// Resolves each [`DependencyRef`] strictly against (a) the current module's
/// own components, for [`DependencyRef::Local`], or (b) the target module
/// named by the import itself, for [`DependencyRef::Imported`] and
/// [`DependencyRef::ImportedModuleAttr`]. A name that doesn't resolve this way
/// — an out-of-repo import, an unresolved same-module reference — is dropped
/// rather than guessed at via a repository-wide name scan; that tolerant
/// matching belongs to the Searcher, not here.
fn resolve_refs(
    raw_refs: &HashSet<DependencyRef>,
    local: &HashMap<String, String>,
    by_module: &HashMap<String, HashMap<String, String>>,
    self_id: &str,
) -> HashSet<String> {
    let mut resolved = HashSet::new();
    for dep in raw_refs {
        let target = match dep {
            DependencyRef::Local(name) => local.get(name),
            DependencyRef::Imported { module, name } => {
                by_module.get(module).and_then(|m| m.get(name))
            }
            DependencyRef::ImportedModuleAttr { module, attr } => {
                by_module.get(module).and_then(|m| m.get(attr))
            }
        };
        if let Some(id) = target {
            if id != self_id {
                resolved.insert(id.clone());
            }
        }
        // Anything left unresolved is treated as an external symbol (stdlib
        // call, third-party import) and simply dropped from the graph.
    }
    resolved
}

/// Every method but `__init__` becomes a dependency of its owning class,
/// mirroring the rule that a class is only "understood" once its methods are.
fn add_class_method_edges(map: &mut ComponentMap) {
    let mut additions: HashMap<String, Vec<String>> = HashMap::new();
    for component in map.components.values() {
        if component.kind != ComponentKind::Method {
            continue;
        }
        if component.is_constructor() {
            continue;
        }
        if let Some(class_id) = component.owning_class_id() {
            additions
                .entry(class_id)
                .or_default()
                .push(component.id.clone());
        }
    }
    for (class_id, method_ids) in additions {
        if let Some(class) = map.get_mut(&class_id) {
            class.depends_on.extend(method_ids);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgraph_core::types::Location;

    fn raw(
        name: &str,
        kind: ComponentKind,
        owning_class: Option<&str>,
        deps: &[&str],
    ) -> RawComponent {
        RawComponent {
            name: name.to_string(),
            kind,
            owning_class: owning_class.map(|s| s.to_string()),
            file_path: "m.py".to_string(),
            relative_path: "m.py".to_string(),
            source_text: String::new(),
            location: Location {
                start_line: 1,
                end_line: 1,
            },
            has_doc: false,
            doc_text: String::new(),
            raw_depends_on: deps
                .iter()
                .map(|s| DependencyRef::Local(s.to_string()))
                .collect(),
        }
    }

    #[test]
    fn resolves_same_module_call() {
        let components = vec![
            raw("foo", ComponentKind::Function, None, &["bar"]),
            raw("bar", ComponentKind::Function, None, &[]),
        ];
        let map = resolve_repository(vec![("m".to_string(), components)]);
        let foo = map.get("m.foo").unwrap();
        assert!(foo.depends_on.contains("m.bar"));
    }

    #[test]
    fn class_depends_on_its_methods_except_init() {
        let components = vec![
            raw("Greeter", ComponentKind::Class, None, &[]),
            raw("__init__", ComponentKind::Method, Some("Greeter"), &[]),
            raw("greet", ComponentKind::Method, Some("Greeter"), &[]),
        ];
        let map = resolve_repository(vec![("m".to_string(), components)]);
        let class = map.get("m.Greeter").unwrap();
        assert!(class.depends_on.contains("m.Greeter.greet"));
        assert!(!class.depends_on.contains("m.Greeter.__init__"));
    }
}
