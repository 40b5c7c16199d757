use docgraph_core::types::{CodeComponent, ComponentMap};

use crate::context::ContextStore;
use crate::external::ExternalRetrieval;
use crate::reader::InfoRequest;

/// Strips a receiver prefix (`self.x`, `instance.y`, `Class.z`) down to the
/// bare trailing name a dependency id's last segment would be matched
/// against.
fn bare_name(requested: &str) -> &str {
    requested.rsplit('.').next().unwrap_or(requested)
}

/// Finds the best dependency-id match for `requested` among `candidates`
/// (the current component's outgoing edges), using the tolerant three-tier
/// rule: exact last-segment match, last-segment-ends-with match, then
/// substring-of-full-path match. Ties within a tier are broken by picking the
/// lexicographically smallest id, for determinism.
fn resolve_one<'a>(requested: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let target = bare_name(requested);

    let mut exact: Vec<&str> = Vec::new();
    let mut ends_with: Vec<&str> = Vec::new();
    let mut substring: Vec<&str> = Vec::new();

    for &id in candidates {
        let last = id.rsplit('.').next().unwrap_or(id);
        if last == target {
            exact.push(id);
        } else if last.ends_with(target) {
            ends_with.push(id);
        } else if id.contains(requested) {
            substring.push(id);
        }
    }

    for mut tier in [exact, ends_with, substring] {
        if !tier.is_empty() {
            tier.sort();
            return tier.into_iter().next();
        }
    }
    None
}

/// Returns the snippet to show for a resolved class dependency: the header
/// through the end of its constructor, to save budget, or the whole class
/// text if there is no constructor.
fn class_snippet(class: &CodeComponent, map: &ComponentMap) -> String {
    let init_id = format!("{}.__init__", class.id);
    let Some(init) = map.get(&init_id) else {
        return class.source_text.clone();
    };
    if init.location.end_line < class.location.start_line {
        return class.source_text.clone();
    }
    let keep_lines = (init.location.end_line - class.location.start_line + 1) as usize;
    class
        .source_text
        .lines()
        .take(keep_lines)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolves a Reader's [`InfoRequest`] against the dependency graph and merges
/// the results directly into `context`. External queries are answered through
/// `external`; failures are recorded inline rather than aborting the merge.
pub async fn gather(
    request: &InfoRequest,
    component_id: &str,
    map: &ComponentMap,
    context: &mut ContextStore,
    external: &dyn ExternalRetrieval,
) {
    let Some(component) = map.get(component_id) else {
        return;
    };
    let candidates: Vec<&str> = component.depends_on.iter().map(|s| s.as_str()).collect();

    for name in &request.classes {
        if let Some(id) = resolve_one(name, &candidates) {
            if let Some(class) = map.get(id) {
                context.append_class(name, &class_snippet(class, map));
            }
        }
    }

    for name in &request.functions {
        if let Some(id) = resolve_one(name, &candidates) {
            if let Some(func) = map.get(id) {
                context.append_function(name, &func.source_text);
            }
        }
    }

    for name in &request.methods {
        if let Some(id) = resolve_one(name, &candidates) {
            if let Some(method) = map.get(id) {
                context.append_method(name, &method.source_text);
            }
        }
    }

    if request.call_by {
        let snippets: Vec<String> = map
            .dependents_of(component_id)
            .into_iter()
            .map(|c| c.source_text.clone())
            .collect();
        context.append_call_by(&snippets);
    }

    for query in &request.queries {
        let answer = match external.answer(query).await {
            Ok(a) => a,
            Err(e) => e,
        };
        context.append_external(query, &answer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::UnavailableExternalRetrieval;
    use docgraph_core::types::{ComponentKind, Location};

    fn component(id: &str, deps: &[&str]) -> CodeComponent {
        CodeComponent {
            id: id.to_string(),
            kind: ComponentKind::Function,
            file_path: "m.py".to_string(),
            relative_path: "m.py".to_string(),
            source_text: format!("def {}():\n    pass", id.rsplit('.').next().unwrap()),
            location: Location {
                start_line: 1,
                end_line: 2,
            },
            has_doc: false,
            doc_text: String::new(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn resolves_function_by_exact_match() {
        let mut map = ComponentMap::new();
        map.insert(component("m.foo", &["m.bar"]));
        map.insert(component("m.bar", &[]));
        let request = InfoRequest {
            functions: vec!["bar".to_string()],
            ..Default::default()
        };
        let mut ctx = ContextStore::new();
        gather(
            &request,
            "m.foo",
            &map,
            &mut ctx,
            &UnavailableExternalRetrieval,
        )
        .await;
        assert!(ctx.render().contains("def bar"));
    }

    #[tokio::test]
    async fn call_by_reports_sentinel_when_empty() {
        let mut map = ComponentMap::new();
        map.insert(component("m.lonely", &[]));
        let request = InfoRequest {
            call_by: true,
            ..Default::default()
        };
        let mut ctx = ContextStore::new();
        gather(
            &request,
            "m.lonely",
            &map,
            &mut ctx,
            &UnavailableExternalRetrieval,
        )
        .await;
        assert!(ctx
            .render()
            .contains("This component is never called by any other component."));
    }
}
