use std::path::Path;

use docgraph_core::types::ComponentMap;
use docgraph_core::{DocgraphError, Result};
use docgraph_parser::{extract_file, module_path_for};

/// Produces the new text of a component's source given the already-stripped
/// docstring content. Replaces the first statement of the body if it is a
/// string-literal expression; otherwise inserts a new one. The new text is
/// dedented, re-indented one level deeper than the declaration, and framed by
/// triple quotes so that regenerating the enclosing file preserves alignment.
pub fn set_component_doc(source_text: &str, new_doc: &str) -> String {
    let lines: Vec<&str> = source_text.lines().collect();
    if lines.is_empty() {
        return source_text.to_string();
    }

    let decl_indent = leading_whitespace(lines[0]);
    let signature_end = find_signature_end(&lines);
    let body_indent = lines
        .get(signature_end + 1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| leading_whitespace(l))
        .unwrap_or_else(|| format!("{decl_indent}    "));

    let existing_doc_span = find_existing_docstring(&lines, signature_end);

    let rendered: Vec<String> = render_docstring(new_doc, &body_indent);

    let mut out: Vec<String> = Vec::with_capacity(lines.len() + rendered.len());
    out.extend(lines[..=signature_end].iter().map(|s| s.to_string()));
    out.extend(rendered);
    match existing_doc_span {
        Some((_start, end)) => out.extend(lines[end + 1..].iter().map(|s| s.to_string())),
        None => out.extend(lines[signature_end + 1..].iter().map(|s| s.to_string())),
    }

    out.join("\n")
}

fn leading_whitespace(line: &str) -> String {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').collect()
}

/// Scans for the line where the `def`/`class` signature closes, tracking
/// paren balance so a multi-line parameter list doesn't trip the `:` check.
fn find_signature_end(lines: &[&str]) -> usize {
    let mut depth: i32 = 0;
    for (i, line) in lines.iter().enumerate() {
        for c in line.chars() {
            match c {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ => {}
            }
        }
        if depth <= 0 && line.trim_end().ends_with(':') {
            return i;
        }
    }
    0
}

/// If the body's first statement is a string-literal expression, returns its
/// `(start, end)` line indices (inclusive, 0-based) within `lines`.
fn find_existing_docstring(lines: &[&str], signature_end: usize) -> Option<(usize, usize)> {
    let mut i = signature_end + 1;
    while i < lines.len() && lines[i].trim().is_empty() {
        i += 1;
    }
    let first = lines.get(i)?.trim();
    let (quote, triple) = if first.starts_with("\"\"\"") {
        ("\"\"\"", true)
    } else if first.starts_with("'''") {
        ("'''", true)
    } else if first.starts_with('"') || first.starts_with('\'') {
        (&first[..1], false)
    } else {
        return None;
    };

    if triple {
        let after_open = &first[quote.len()..];
        if after_open.contains(quote) {
            return Some((i, i));
        }
        let mut j = i + 1;
        while j < lines.len() {
            if lines[j].contains(quote) {
                return Some((i, j));
            }
            j += 1;
        }
        Some((i, lines.len() - 1))
    } else {
        Some((i, i))
    }
}

fn render_docstring(new_doc: &str, indent: &str) -> Vec<String> {
    let dedented = dedent(new_doc);
    let mut out = Vec::new();
    let body_lines: Vec<&str> = dedented.lines().collect();
    if body_lines.len() <= 1 {
        out.push(format!("{indent}\"\"\"{}\"\"\"", dedented.trim()));
        return out;
    }
    out.push(format!("{indent}\"\"\"{}", body_lines[0]));
    for line in &body_lines[1..] {
        if line.trim().is_empty() {
            out.push(String::new());
        } else {
            out.push(format!("{indent}{line}"));
        }
    }
    out.push(format!("{indent}\"\"\""));
    out
}

fn dedent(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let min_indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| leading_whitespace(l).len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| {
            if l.len() >= min_indent {
                &l[min_indent..]
            } else {
                l.trim_start()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splices the component's rewritten source back into its file and writes the
/// file atomically (write to a sibling temp file, then rename over the
/// original).
pub fn write_component(
    repo_root: &Path,
    relative_path: &str,
    start_line: u32,
    end_line: u32,
    new_component_text: &str,
) -> Result<()> {
    let path = repo_root.join(relative_path);
    let original = std::fs::read_to_string(&path)?;
    let lines: Vec<&str> = original.lines().collect();

    let start = (start_line as usize).saturating_sub(1);
    let end = (end_line as usize).min(lines.len());
    if start >= lines.len() || start > end {
        return Err(DocgraphError::Writeback(
            relative_path.to_string(),
            "component line range out of bounds for current file contents".to_string(),
        ));
    }

    let mut new_lines: Vec<&str> = Vec::with_capacity(lines.len());
    new_lines.extend_from_slice(&lines[..start]);
    new_lines.extend(new_component_text.lines());
    new_lines.extend_from_slice(&lines[end..]);

    let mut new_text = new_lines.join("\n");
    if original.ends_with('\n') {
        new_text.push('\n');
    }

    let tmp_path = path.with_extension("docgraph.tmp");
    std::fs::write(&tmp_path, &new_text)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// After a writeback, re-extracts `relative_path` and refreshes the location,
/// source text, and doc fields of every component from that file already
/// present in `map`. Dependency edges are left untouched — they depend on
/// call sites, not on docstring text, so a docstring-only edit cannot change
/// them.
pub fn reparse_file(repo_root: &Path, relative_path: &str, map: &mut ComponentMap) -> Result<()> {
    let path = repo_root.join(relative_path);
    let source = std::fs::read_to_string(&path)?;
    let module = module_path_for(relative_path);
    let raw_components = extract_file(&source, &path.to_string_lossy(), relative_path, &module)?;

    for raw in raw_components {
        let id = format!("{module}.{}", raw.qualified_name());
        if let Some(existing) = map.get_mut(&id) {
            existing.location = raw.location;
            existing.source_text = raw.source_text;
            existing.has_doc = raw.has_doc;
            existing.doc_text = raw.doc_text;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_docstring_into_undocumented_function() {
        let source = "def foo():\n    return 1\n";
        let updated = set_component_doc(source, "Summary: returns one.");
        assert_eq!(
            updated,
            "def foo():\n    \"\"\"Summary: returns one.\"\"\"\n    return 1"
        );
    }

    #[test]
    fn replaces_existing_single_line_docstring() {
        let source = "def foo():\n    \"\"\"old doc\"\"\"\n    return 1\n";
        let updated = set_component_doc(source, "new doc");
        assert_eq!(updated, "def foo():\n    \"\"\"new doc\"\"\"\n    return 1");
    }

    #[test]
    fn replaces_existing_multiline_docstring() {
        let source = "def foo():\n    \"\"\"\n    old doc\n    spanning lines\n    \"\"\"\n    return 1\n";
        let updated = set_component_doc(source, "fresh summary");
        assert!(updated.contains("fresh summary"));
        assert!(!updated.contains("old doc"));
        assert!(updated.contains("return 1"));
    }

    #[test]
    fn handles_multiline_signature() {
        let source = "def foo(\n    a,\n    b,\n):\n    return a + b\n";
        let updated = set_component_doc(source, "Adds two numbers.");
        assert!(updated.contains("):\n    \"\"\"Adds two numbers.\"\"\"\n    return a + b"));
    }

    #[test]
    fn write_component_replaces_the_right_lines() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("m.py");
        std::fs::write(&file, "def a():\n    pass\n\n\ndef b():\n    pass\n").unwrap();
        write_component(dir.path(), "m.py", 1, 2, "def a():\n    \"\"\"doc\"\"\"\n    pass").unwrap();
        let updated = std::fs::read_to_string(&file).unwrap();
        assert!(updated.contains("\"\"\"doc\"\"\""));
        assert!(updated.contains("def b():"));
    }
}
