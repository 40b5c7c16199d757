use std::path::Path;

use docgraph_core::types::ComponentMap;
use docgraph_core::Result;
use walkdir_lite::walk_python_files;

use crate::dependencies::resolve_repository;
use crate::extractor::{extract_file, RawComponent};

mod walkdir_lite {
    use std::path::{Path, PathBuf};

    /// Recursively lists `*.py` files under `root`, skipping common non-source
    /// directories. Returns paths sorted for deterministic processing order.
    pub fn walk_python_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        walk(root, &mut out)?;
        out.sort();
        Ok(out)
    }

    fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
        if !dir.is_dir() {
            return Ok(());
        }
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if path.is_dir() {
                if matches!(
                    name.as_ref(),
                    ".git" | "__pycache__" | "venv" | ".venv" | "node_modules" | ".tox"
                ) {
                    continue;
                }
                walk(&path, out)?;
            } else if name.ends_with(".py") {
                out.push(path);
            }
        }
        Ok(())
    }
}

/// Converts a file's path, relative to the repository root, into a dotted
/// module path (`pkg/sub/mod.py` -> `pkg.sub.mod`, `pkg/__init__.py` -> `pkg`).
pub fn module_path_for(relative_path: &str) -> String {
    let without_ext = relative_path.trim_end_matches(".py");
    let without_init = without_ext.trim_end_matches("/__init__").to_string();
    let without_init = if without_init.is_empty() {
        without_ext.to_string()
    } else {
        without_init
    };
    without_init.replace(['/', '\\'], ".")
}

/// Parses every `*.py` file under `repo_root`, then resolves cross-file
/// dependencies into a fully populated [`ComponentMap`].
pub fn parse_repository(repo_root: &Path) -> Result<ComponentMap> {
    let files = walk_python_files(repo_root)?;

    let mut per_file: Vec<(String, Vec<RawComponent>)> = Vec::new();
    for path in files {
        let relative = path
            .strip_prefix(repo_root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        let source = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        let module = module_path_for(&relative);
        match extract_file(&source, &path.to_string_lossy(), &relative, &module) {
            Ok(components) => per_file.push((module, components)),
            Err(e) => {
                tracing::warn!(file = %relative, error = %e, "skipping file with parse errors");
            }
        }
    }

    Ok(resolve_repository(per_file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_path_conversion() {
        assert_eq!(module_path_for("pkg/sub/mod.py"), "pkg.sub.mod");
        assert_eq!(module_path_for("pkg/__init__.py"), "pkg");
        assert_eq!(module_path_for("top.py"), "top");
    }

    #[test]
    fn parses_small_repository() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.py"),
            "def foo():\n    return bar()\n\n\ndef bar():\n    return 1\n",
        )
        .unwrap();
        let map = parse_repository(dir.path()).unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.get("a.foo").is_some());
    }
}
