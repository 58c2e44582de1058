use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracer_core::{relative_path, CanonicalId, Result, TracerError};

use crate::changed_functions::Targets;
use crate::imports::parse_imports;
use crate::qualify::Qualifier;

static PY_FUNC_DEF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*def\s+([A-Za-z_]\w*)\s*\(").unwrap());

/// A function body as CSA emits it: already rewritten so in-body callees
/// carry canonical IDs. Mirrors the change-set analyser's persisted
/// function record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FunctionRecord {
    pub canonical_id: String,
    pub body: String,
    pub start_line: usize,
    pub file_path: String,
}

/// Scan `source` line by line, the same way the original extractor does:
/// any line whose leftmost content is a `def` header (at *any* indentation)
/// closes the previously-collecting body and opens a new one. This does
/// not nest — a function containing a nested `def` will have its own body
/// cut short at the nested header — matching the change-set analyser's
/// textual (non-AST) extraction scope, which only targets the functions
/// named by the diff.
pub fn extract_functions(
    repo_root: &Path,
    abs_path: &Path,
    targets: &Targets,
    name_index: &HashMap<String, Vec<String>>,
) -> Result<Vec<FunctionRecord>> {
    let source = std::fs::read_to_string(abs_path)
        .map_err(|_| TracerError::FileNotFound(abs_path.display().to_string()))?;
    let file_rel = relative_path(repo_root, abs_path);
    let import_map = parse_imports(&source);

    let mut local_funcs = std::collections::HashSet::new();
    let mut results = Vec::new();

    let mut current_name: Option<String> = None;
    let mut current_body: Vec<&str> = Vec::new();
    let mut current_start_line = 0usize;

    let wants = |name: &str| match targets {
        Targets::All => true,
        Targets::Named(names) => names.contains(name),
    };

    let flush = |name: &str,
                 body: &[&str],
                 start_line: usize,
                 local_funcs: &std::collections::HashSet<String>,
                 results: &mut Vec<FunctionRecord>| {
        let qualifier = Qualifier {
            import_map: &import_map,
            local_funcs,
            current_file_rel: &file_rel,
            name_index,
        };
        let qualified_body: String = body.iter().map(|l| qualifier.qualify_line(l)).collect::<Vec<_>>().join("\n");
        let canonical = CanonicalId::new(file_rel.clone(), vec![name.to_string()])
            .map(|id| id.to_string())
            .unwrap_or_else(|_| format!("/{file_rel}::{name}"));
        results.push(FunctionRecord {
            canonical_id: canonical,
            body: qualified_body,
            start_line,
            file_path: abs_path.display().to_string(),
        });
    };

    for (i, line) in source.lines().enumerate() {
        let lineno = i + 1;
        if let Some(caps) = PY_FUNC_DEF.captures(line) {
            let name = caps.get(1).unwrap().as_str().to_string();
            if let Some(prev_name) = current_name.take() {
                if !current_body.is_empty() {
                    flush(&prev_name, &current_body, current_start_line, &local_funcs, &mut results);
                }
            }
            current_body.clear();
            if wants(&name) {
                local_funcs.insert(name.clone());
                current_start_line = lineno;
                current_body.push(line);
                current_name = Some(name);
            }
        } else if current_name.is_some() {
            current_body.push(line);
        }
    }
    if let Some(name) = current_name {
        if !current_body.is_empty() {
            flush(&name, &current_body, current_start_line, &local_funcs, &mut results);
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn extracts_targeted_function_with_qualified_call() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("mod.py"),
            "def helper():\n    pass\n\ndef outer():\n    helper()\n",
        )
        .unwrap();
        let mut targets = std::collections::HashSet::new();
        targets.insert("outer".to_string());
        let name_index = HashMap::new();
        let records = extract_functions(
            dir.path(),
            &dir.path().join("mod.py"),
            &Targets::Named(targets),
            &name_index,
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].canonical_id, "/mod.py::outer");
        assert!(records[0].body.contains("/mod.py::helper("));
    }

    #[test]
    fn all_target_extracts_every_function() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("new.py"), "def a():\n    pass\ndef b():\n    pass\n").unwrap();
        let name_index = HashMap::new();
        let records = extract_functions(dir.path(), &dir.path().join("new.py"), &Targets::All, &name_index).unwrap();
        assert_eq!(records.len(), 2);
    }
}
