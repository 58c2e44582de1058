use std::path::Path;

use tracer_core::walk::{relative_path, walk_source_files};
use tracer_core::{Result, TracerError};
use tree_sitter::Parser;

use crate::import_match;
use crate::types::CallSite;
use crate::visitor::find_call_sites;

/// Find every call site for `/<target_file_rel>::<target_function_name>`
/// across the repository. Files with parse errors are silently skipped;
/// the target's own defining file is excluded from the scan.
pub fn locate(repo_root: &Path, target_file_rel: &str, target_function_name: &str) -> Result<Vec<CallSite>> {
    let target_abs = repo_root.join(target_file_rel);
    if !target_abs.is_file() {
        return Err(TracerError::FileNotFound(target_file_rel.to_string()));
    }
    let target_abs = std::fs::canonicalize(&target_abs).unwrap_or(target_abs);

    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| TracerError::Parse(e.to_string()))?;

    let mut all_sites = Vec::new();
    for file in walk_source_files(repo_root) {
        let canon = std::fs::canonicalize(&file).unwrap_or_else(|_| file.clone());
        if canon == target_abs {
            continue;
        }

        let Ok(source) = std::fs::read_to_string(&file) else { continue };
        let Some(tree) = parser.parse(&source, None) else { continue };
        if tree.root_node().has_error() {
            continue;
        }

        let file_rel = relative_path(repo_root, &file);
        let imports = import_match::collect(&tree, &source, target_function_name, target_file_rel);
        all_sites.extend(find_call_sites(&tree, &source, &file_rel, target_function_name, &imports));
    }

    Ok(all_sites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn finds_call_sites_across_files_and_skips_the_defining_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("defs.py"), "def get_metric():\n    pass\n").unwrap();
        fs::write(
            dir.path().join("caller_a.py"),
            "from defs import get_metric\n\ndef caller():\n    get_metric()\n",
        )
        .unwrap();
        fs::write(dir.path().join("caller_b.py"), "def unrelated():\n    get_metric()\n").unwrap();

        let sites = locate(dir.path(), "defs.py", "get_metric").unwrap();
        assert_eq!(sites.len(), 2);
        assert!(sites.iter().all(|s| s.file != "defs.py"));
    }

    #[test]
    fn skips_files_with_parse_errors() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("defs.py"), "def get_metric():\n    pass\n").unwrap();
        fs::write(dir.path().join("broken.py"), "def ???(:\n").unwrap();

        let sites = locate(dir.path(), "defs.py", "get_metric").unwrap();
        assert!(sites.is_empty());
    }
}
