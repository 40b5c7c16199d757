use std::collections::{HashMap, HashSet};

use docgraph_core::types::{CodeComponent, ComponentKind, Location};
use docgraph_core::{DocgraphError, Result};
use tree_sitter::{Node, Parser, TreeCursor};

/// Names ast.NodeVisitor would hand to `visit_Call`/`visit_Name` that never
/// resolve to a user-defined component.
const EXCLUDED_NAMES: &[&str] = &[
    "self", "cls", "print", "len", "str", "int", "float", "bool", "list", "dict", "set", "tuple",
    "range", "enumerate", "zip", "map", "filter", "sorted", "super", "isinstance", "hasattr",
    "getattr", "setattr", "open", "None", "True", "False",
];

fn is_excluded(name: &str) -> bool {
    EXCLUDED_NAMES.contains(&name) || name.starts_with("__")
}

/// A dependency discovered while walking a component's body, already
/// classified against the file's import table so that
/// [`crate::dependencies::resolve_repository`] never has to guess whether a
/// bare name is a same-module sibling or something pulled in from elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyRef {
    /// A name with no import binding: either a sibling defined in the current
    /// module, or (when dotted, e.g. `Greeter.greet`) a same-module
    /// class-and-member pair resolved through `self` or a locally inferred
    /// constructor type.
    Local(String),
    /// `name` bound by `from module import name [as alias]`.
    Imported { module: String, name: String },
    /// `attr` accessed off a name bound by `import module [as alias]`.
    ImportedModuleAttr { module: String, attr: String },
}

/// A file's import table: every binding introduced by `import`/`from ... import`
/// statements, per SPEC_FULL.md §4.1's import-tracking algorithm.
#[derive(Debug, Clone, Default)]
pub struct Imports {
    /// bound name -> dotted module path, from `import module [as alias]`.
    modules: HashMap<String, String>,
    /// bound name -> (module, original name), from `from module import name [as alias]`.
    names: HashMap<String, (String, String)>,
    /// Modules star-imported (`from module import *`); names are unknown, so
    /// no dependency is ever emitted through one of these.
    #[allow(dead_code)]
    star_modules: HashSet<String>,
}

/// A component found in a single file, prior to cross-file dependency resolution.
#[derive(Debug, Clone)]
pub struct RawComponent {
    pub name: String,
    pub kind: ComponentKind,
    pub owning_class: Option<String>,
    pub file_path: String,
    pub relative_path: String,
    pub source_text: String,
    pub location: Location,
    pub has_doc: bool,
    pub doc_text: String,
    pub raw_depends_on: HashSet<DependencyRef>,
}

impl RawComponent {
    /// The dotted id this component will have once namespaced under its module,
    /// e.g. `pkg.mod.Class.method`.
    pub fn qualified_name(&self) -> String {
        match &self.owning_class {
            Some(class) => format!("{class}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

pub fn extract_file(
    source: &str,
    file_path: &str,
    relative_path: &str,
    module_path: &str,
) -> Result<Vec<RawComponent>> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| DocgraphError::Parse {
            file: file_path.to_string(),
            message: e.to_string(),
        })?;

    let tree = parser.parse(source, None).ok_or_else(|| DocgraphError::Parse {
        file: file_path.to_string(),
        message: "tree-sitter failed to produce a parse tree".to_string(),
    })?;

    let imports = collect_imports(tree.root_node(), source, module_path);

    let mut collector = Collector {
        source,
        file_path,
        relative_path,
        imports: &imports,
        components: Vec::new(),
        current_class: None,
        current_function_deps: HashSet::new(),
        local_names: HashSet::new(),
        local_class: HashMap::new(),
    };
    let mut cursor = tree.walk();
    collector.walk(&mut cursor);
    Ok(collector.components)
}

/// The package a dotted module path belongs to (`pkg.sub.mod` -> `pkg.sub`).
fn package_of(module: &str) -> &str {
    match module.rsplit_once('.') {
        Some((pkg, _)) => pkg,
        None => "",
    }
}

/// Resolves a relative-import target (`.`, `..sibling`, ...) against the
/// current file's module path. One leading dot means "this package"; each
/// further dot climbs one more package level.
fn resolve_relative_module(raw: &str, current_module: &str) -> String {
    let dots = raw.chars().take_while(|c| *c == '.').count();
    let trailing = &raw[dots..];

    let mut base = package_of(current_module).to_string();
    for _ in 1..dots {
        base = package_of(&base).to_string();
    }

    if trailing.is_empty() {
        base
    } else if base.is_empty() {
        trailing.to_string()
    } else {
        format!("{base}.{trailing}")
    }
}

/// Scans the whole file for `import`/`from ... import` statements, per
/// SPEC_FULL.md §4.1's import-tracking algorithm. Imports are collected
/// wherever they appear in the tree (not just at module level), since Python
/// permits them inside functions too.
fn collect_imports(root: Node, source: &str, module_path: &str) -> Imports {
    let mut imports = Imports::default();
    let mut cursor = root.walk();
    collect_imports_rec(&mut cursor, source, module_path, &mut imports);
    imports
}

fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or_default()
}

fn collect_imports_rec(cursor: &mut TreeCursor, source: &str, module_path: &str, imports: &mut Imports) {
    let node = cursor.node();
    match node.kind() {
        "import_statement" => collect_plain_import(&node, source, imports),
        "import_from_statement" => collect_from_import(&node, source, module_path, imports),
        _ => {}
    }
    if cursor.goto_first_child() {
        loop {
            collect_imports_rec(cursor, source, module_path, imports);
            if !cursor.goto_next_sibling() {
                break;
            }
        }
        cursor.goto_parent();
    }
}

/// `import a.b.c`, `import a.b.c as x`, `import a, b as c`.
fn collect_plain_import(node: &Node, source: &str, imports: &mut Imports) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "dotted_name" => {
                let dotted = node_text(&child, source).to_string();
                let binding = dotted.split('.').next().unwrap_or(&dotted).to_string();
                imports.modules.insert(binding, dotted);
            }
            "aliased_import" => {
                let Some(name_node) = child.child_by_field_name("name") else {
                    continue;
                };
                let Some(alias_node) = child.child_by_field_name("alias") else {
                    continue;
                };
                let dotted = node_text(&name_node, source).to_string();
                let alias = node_text(&alias_node, source).to_string();
                imports.modules.insert(alias, dotted);
            }
            _ => {}
        }
    }
}

/// `from a.b import c, d as e`, `from . import x`, `from a.b import *`.
fn collect_from_import(node: &Node, source: &str, module_path: &str, imports: &mut Imports) {
    let Some(module_node) = node.child_by_field_name("module_name") else {
        return;
    };
    let raw_module = node_text(&module_node, source);
    let module = if raw_module.starts_with('.') {
        resolve_relative_module(raw_module, module_path)
    } else {
        raw_module.to_string()
    };

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "wildcard_import" => {
                imports.star_modules.insert(module.clone());
            }
            "dotted_name" if child.id() != module_node.id() => {
                let name = node_text(&child, source).to_string();
                imports.names.insert(name.clone(), (module.clone(), name));
            }
            "aliased_import" => {
                let Some(name_node) = child.child_by_field_name("name") else {
                    continue;
                };
                let Some(alias_node) = child.child_by_field_name("alias") else {
                    continue;
                };
                let name = node_text(&name_node, source).to_string();
                let alias = node_text(&alias_node, source).to_string();
                imports.names.insert(alias, (module.clone(), name));
            }
            _ => {}
        }
    }
}

struct Collector<'a> {
    source: &'a str,
    file_path: &'a str,
    relative_path: &'a str,
    imports: &'a Imports,
    components: Vec<RawComponent>,
    current_class: Option<String>,
    current_function_deps: HashSet<DependencyRef>,
    /// Parameter names and assignment targets seen in the function currently
    /// being walked; suppresses false-positive sibling/import resolution for
    /// genuinely local variables.
    local_names: HashSet<String>,
    /// Variables in the current function inferred to hold an instance of a
    /// class, from a same-scope `x = ClassName(...)` assignment.
    local_class: HashMap<String, DependencyRef>,
}

impl<'a> Collector<'a> {
    fn node_text(&self, node: &Node) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or_default()
    }

    fn location_for(&self, node: &Node) -> Location {
        Location {
            start_line: node.start_position().row as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
        }
    }

    fn docstring_of(&self, body: &Node) -> (bool, String) {
        let mut cursor = body.walk();
        for child in body.children(&mut cursor) {
            if child.kind() == "expression_statement" {
                if let Some(string_node) = child.child(0) {
                    if string_node.kind() == "string" {
                        let raw = self.node_text(&string_node);
                        let trimmed = raw.trim_matches(|c| c == '"' || c == '\'').trim();
                        return (true, trimmed.to_string());
                    }
                }
            }
            // Only the first statement counts; stop at the first non-docstring node.
            return (false, String::new());
        }
        (false, String::new())
    }

    fn walk(&mut self, cursor: &mut TreeCursor<'a>) {
        let node = cursor.node();
        match node.kind() {
            "function_definition" => {
                self.visit_function(&node);
                return;
            }
            "class_definition" => {
                self.visit_class(&node, cursor);
                return;
            }
            "call" => self.visit_call(&node),
            "attribute" => self.visit_attribute(&node),
            _ => {}
        }

        if cursor.goto_first_child() {
            loop {
                self.walk(cursor);
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
            cursor.goto_parent();
        }
    }

    /// Resolves a bare loaded name against the import table, falling back to
    /// "same-module sibling" when it isn't locally shadowed or imported.
    /// Locally defined variables (parameters, assignment targets) are
    /// excluded outright per SPEC_FULL.md §4.1.
    fn resolve_name_ref(&self, name: &str) -> Option<DependencyRef> {
        if is_excluded(name) || self.local_names.contains(name) {
            return None;
        }
        if let Some((module, orig)) = self.imports.names.get(name) {
            return Some(DependencyRef::Imported {
                module: module.clone(),
                name: orig.clone(),
            });
        }
        Some(DependencyRef::Local(name.to_string()))
    }

    fn visit_function(&mut self, node: &Node<'a>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.node_text(&name_node).to_string();
        let body = node.child_by_field_name("body");
        let (has_doc, doc_text) = body.map(|b| self.docstring_of(&b)).unwrap_or_default();

        let saved_deps = std::mem::take(&mut self.current_function_deps);
        let saved_locals = std::mem::take(&mut self.local_names);
        let saved_local_class = std::mem::take(&mut self.local_class);

        if let Some(params) = node.child_by_field_name("parameters") {
            self.collect_parameter_names(&params);
        }
        if let Some(body) = body {
            self.collect_local_assignment_targets(&body);
            let mut cursor = body.walk();
            self.walk_body_collecting_deps(&mut cursor);
        }
        let deps = std::mem::replace(&mut self.current_function_deps, saved_deps);
        self.local_names = saved_locals;
        self.local_class = saved_local_class;

        let kind = if self.current_class.is_some() {
            ComponentKind::Method
        } else {
            ComponentKind::Function
        };

        self.components.push(RawComponent {
            name,
            kind,
            owning_class: self.current_class.clone(),
            file_path: self.file_path.to_string(),
            relative_path: self.relative_path.to_string(),
            source_text: self.node_text(node).to_string(),
            location: self.location_for(node),
            has_doc,
            doc_text,
            raw_depends_on: deps,
        });
    }

    /// Parameter names (including `self`/`cls`, harmless since they're already
    /// excluded elsewhere) become part of the local shadow set.
    fn collect_parameter_names(&mut self, params: &Node<'a>) {
        let mut cursor = params.walk();
        for child in params.children(&mut cursor) {
            let ident = match child.kind() {
                "identifier" => Some(child),
                "typed_parameter" | "default_parameter" | "typed_default_parameter" => {
                    child.child_by_field_name("name").or_else(|| child.child(0))
                }
                _ => None,
            };
            if let Some(ident) = ident {
                if ident.kind() == "identifier" {
                    self.local_names.insert(self.node_text(&ident).to_string());
                }
            }
        }
    }

    /// A lightweight pre-pass collecting every simple `name = ...` assignment
    /// target anywhere in the function body (not recursing into nested
    /// `def`/`class`, which are opaque), so later dependency resolution can
    /// tell a local variable apart from a module-level sibling.
    fn collect_local_assignment_targets(&mut self, body: &Node<'a>) {
        let mut cursor = body.walk();
        self.collect_assignment_targets_rec(&mut cursor);
    }

    fn collect_assignment_targets_rec(&mut self, cursor: &mut TreeCursor<'a>) {
        let node = cursor.node();
        match node.kind() {
            "function_definition" | "class_definition" => return,
            "assignment" | "augmented_assignment" => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.record_assignment_target(&left);
                }
            }
            "for_statement" => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.record_assignment_target(&left);
                }
            }
            "with_item" => {
                if let Some(alias) = node.child_by_field_name("alias") {
                    self.record_assignment_target(&alias);
                }
            }
            _ => {}
        }
        if cursor.goto_first_child() {
            loop {
                self.collect_assignment_targets_rec(cursor);
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
            cursor.goto_parent();
        }
    }

    fn record_assignment_target(&mut self, target: &Node<'a>) {
        match target.kind() {
            "identifier" => {
                self.local_names.insert(self.node_text(target).to_string());
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" => {
                let mut cursor = target.walk();
                for child in target.children(&mut cursor) {
                    self.record_assignment_target(&child);
                }
            }
            _ => {}
        }
    }

    fn visit_class(&mut self, node: &Node<'a>, _outer_cursor: &mut TreeCursor<'a>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.node_text(&name_node).to_string();
        let body = node.child_by_field_name("body");
        let (has_doc, doc_text) = body.map(|b| self.docstring_of(&b)).unwrap_or_default();

        let mut base_deps = HashSet::new();
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for child in superclasses.children(&mut cursor) {
                if child.kind() == "identifier" {
                    let base = self.node_text(&child);
                    if let Some(dep) = self.resolve_name_ref(base) {
                        base_deps.insert(dep);
                    }
                }
            }
        }

        self.components.push(RawComponent {
            name: name.clone(),
            kind: ComponentKind::Class,
            owning_class: None,
            file_path: self.file_path.to_string(),
            relative_path: self.relative_path.to_string(),
            source_text: self.node_text(node).to_string(),
            location: self.location_for(node),
            has_doc,
            doc_text,
            raw_depends_on: base_deps,
        });

        let saved_class = self.current_class.replace(name);
        if let Some(body) = body {
            let mut cursor = body.walk();
            if cursor.goto_first_child() {
                loop {
                    self.walk(&mut cursor);
                    if !cursor.goto_next_sibling() {
                        break;
                    }
                }
            }
        }
        self.current_class = saved_class;
    }

    /// Walks a function body purely to populate `current_function_deps`,
    /// without re-entering [`Self::walk`]'s top-level component detection
    /// (nested `def`s inside a function body are intentionally ignored, matching
    /// the "only module-level and class-level components" rule).
    fn walk_body_collecting_deps(&mut self, cursor: &mut TreeCursor<'a>) {
        let node = cursor.node();
        match node.kind() {
            "assignment" => {
                self.note_constructor_assignment(&node);
            }
            "call" => self.visit_call(&node),
            "attribute" => self.visit_attribute(&node),
            "function_definition" | "class_definition" => return,
            _ => {}
        }
        if cursor.goto_first_child() {
            loop {
                self.walk_body_collecting_deps(cursor);
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
            cursor.goto_parent();
        }
    }

    /// Records `x = ClassName(...)` so later `x.method()` calls in the same
    /// function resolve through the inferred type, per SPEC_FULL.md §4.1's
    /// constructor-assignment type inference.
    fn note_constructor_assignment(&mut self, node: &Node<'a>) {
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };
        if left.kind() != "identifier" || right.kind() != "call" {
            return;
        }
        let Some(func) = right.child_by_field_name("function") else {
            return;
        };
        if func.kind() != "identifier" {
            return;
        }
        let class_name = self.node_text(&func);
        if is_excluded(class_name) {
            return;
        }
        if let Some(class_ref) = self.resolve_name_ref(class_name) {
            let var = self.node_text(&left).to_string();
            self.local_class.insert(var, class_ref);
        }
    }

    fn visit_call(&mut self, node: &Node<'a>) {
        let Some(func) = node.child_by_field_name("function") else {
            return;
        };
        if let Some(target) = self.call_target(&func) {
            self.current_function_deps.insert(target);
        }
    }

    fn visit_attribute(&mut self, node: &Node<'a>) {
        if let Some(target) = self.call_target(node) {
            self.current_function_deps.insert(target);
        }
    }

    /// Resolves `foo`, `self.foo`, a constructor-typed local's `.foo`, an
    /// imported module's `.foo`, or `a.b.foo` down to a [`DependencyRef`].
    /// Attribute access through a variable whose type cannot be inferred is
    /// dropped rather than guessed, per SPEC_FULL.md §4.1.
    fn call_target(&self, node: &Node<'a>) -> Option<DependencyRef> {
        match node.kind() {
            "identifier" => self.resolve_name_ref(self.node_text(node)),
            "attribute" => {
                let object = node.child_by_field_name("object")?;
                let attr = node.child_by_field_name("attribute")?;
                let attr_name = self.node_text(&attr).to_string();
                if object.kind() != "identifier" {
                    return None;
                }
                let object_name = self.node_text(&object);

                if object_name == "self" {
                    let class = self.current_class.as_ref()?;
                    return Some(DependencyRef::Local(format!("{class}.{attr_name}")));
                }
                if let Some(class_ref) = self.local_class.get(object_name) {
                    return Some(match class_ref {
                        DependencyRef::Local(class) => {
                            DependencyRef::Local(format!("{class}.{attr_name}"))
                        }
                        DependencyRef::Imported { module, name } => DependencyRef::Imported {
                            module: module.clone(),
                            name: format!("{name}.{attr_name}"),
                        },
                        DependencyRef::ImportedModuleAttr { .. } => return None,
                    });
                }
                if let Some(module) = self.imports.modules.get(object_name) {
                    return Some(DependencyRef::ImportedModuleAttr {
                        module: module.clone(),
                        attr: attr_name,
                    });
                }
                // Type of `object_name` isn't inferable (an arbitrary value,
                // parameter, or otherwise untyped local): no dependency is
                // emitted rather than guessed.
                None
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(src: &str) -> Vec<RawComponent> {
        extract_file(src, "g.py", "g.py", "g").unwrap()
    }

    #[test]
    fn extracts_function_and_class() {
        let src = "def helper():\n    pass\n\n\nclass Greeter:\n    def greet(self):\n        helper()\n";
        let components = extract(src);
        let names: Vec<_> = components.iter().map(|c| c.qualified_name()).collect();
        assert!(names.contains(&"helper".to_string()));
        assert!(names.contains(&"Greeter".to_string()));
        assert!(names.contains(&"Greeter.greet".to_string()));

        let greet = components
            .iter()
            .find(|c| c.qualified_name() == "Greeter.greet")
            .unwrap();
        assert!(greet
            .raw_depends_on
            .contains(&DependencyRef::Local("helper".to_string())));
    }

    #[test]
    fn captures_docstrings() {
        let src = "def documented():\n    \"\"\"Does a thing.\"\"\"\n    return 1\n";
        let components = extract(src);
        let f = &components[0];
        assert!(f.has_doc);
        assert_eq!(f.doc_text, "Does a thing.");
    }

    #[test]
    fn class_base_is_a_dependency() {
        let src = "class Base:\n    pass\n\n\nclass Child(Base):\n    pass\n";
        let components = extract(src);
        let child = components.iter().find(|c| c.name == "Child").unwrap();
        assert!(child
            .raw_depends_on
            .contains(&DependencyRef::Local("Base".to_string())));
    }

    #[test]
    fn unimported_same_named_sibling_in_another_module_is_not_guessed() {
        // `helper` is never imported here, so the dependency stays a bare
        // `Local("helper")` reference scoped to this module only; resolving
        // it against some unrelated module's `helper` is the resolver's job
        // to refuse, not the extractor's job to prevent.
        let src = "def caller():\n    return helper()\n";
        let components = extract(src);
        let caller = components.iter().find(|c| c.name == "caller").unwrap();
        assert!(caller
            .raw_depends_on
            .contains(&DependencyRef::Local("helper".to_string())));
    }

    #[test]
    fn from_import_resolves_to_imported_module_and_name() {
        let src = "from pkg.mod import helper\n\n\ndef caller():\n    return helper()\n";
        let components = extract(src);
        let caller = components.iter().find(|c| c.name == "caller").unwrap();
        assert!(caller.raw_depends_on.contains(&DependencyRef::Imported {
            module: "pkg.mod".to_string(),
            name: "helper".to_string(),
        }));
    }

    #[test]
    fn aliased_from_import_resolves_to_original_name() {
        let src = "from pkg.mod import helper as h\n\n\ndef caller():\n    return h()\n";
        let components = extract(src);
        let caller = components.iter().find(|c| c.name == "caller").unwrap();
        assert!(caller.raw_depends_on.contains(&DependencyRef::Imported {
            module: "pkg.mod".to_string(),
            name: "helper".to_string(),
        }));
    }

    #[test]
    fn plain_import_module_attribute_resolves() {
        let src = "import pkg.mod\n\n\ndef caller():\n    return pkg.mod.helper()\n";
        let components = extract(src);
        let caller = components.iter().find(|c| c.name == "caller").unwrap();
        // `pkg.mod.helper()` parses as attribute access on `pkg`, whose import
        // binding is `pkg` (the first segment of `import pkg.mod`).
        assert!(caller.raw_depends_on.iter().any(|d| matches!(
            d,
            DependencyRef::ImportedModuleAttr { module, .. } if module == "pkg.mod"
        )));
    }

    #[test]
    fn local_variable_shadows_same_named_import() {
        let src = "from pkg.mod import helper\n\n\ndef caller(helper):\n    return helper()\n";
        let components = extract(src);
        let caller = components.iter().find(|c| c.name == "caller").unwrap();
        assert!(caller.raw_depends_on.is_empty());
    }

    #[test]
    fn constructor_assignment_infers_attribute_call_target() {
        let src =
            "class Greeter:\n    def greet(self):\n        pass\n\n\ndef caller():\n    g = Greeter()\n    g.greet()\n";
        let components = extract(src);
        let caller = components.iter().find(|c| c.name == "caller").unwrap();
        assert!(caller
            .raw_depends_on
            .contains(&DependencyRef::Local("Greeter.greet".to_string())));
    }

    #[test]
    fn untyped_attribute_access_is_dropped() {
        let src = "def caller(obj):\n    return obj.method()\n";
        let components = extract(src);
        let caller = components.iter().find(|c| c.name == "caller").unwrap();
        assert!(caller.raw_depends_on.is_empty());
    }

    #[test]
    fn relative_import_resolves_against_current_package() {
        let src = "from . import sibling\n\n\ndef caller():\n    return sibling()\n";
        let components = extract_file(src, "pkg/mod.py", "pkg/mod.py", "pkg.mod").unwrap();
        let caller = components.iter().find(|c| c.name == "caller").unwrap();
        assert!(caller.raw_depends_on.contains(&DependencyRef::Imported {
            module: "pkg".to_string(),
            name: "sibling".to_string(),
        }));
    }
}
