//! Change-set analyser: classifies diff hunks as material or cosmetic,
//! infers which functions changed, qualifies their callees into canonical
//! IDs, and builds the call graph restricted to that changed set.

pub mod callgraph;
pub mod changed_functions;
pub mod diff;
pub mod extract;
pub mod hunks;
pub mod imports;
pub mod qualify;
pub mod status;
pub mod writers;

use std::path::Path;

use tracer_core::Result;

pub use extract::FunctionRecord;

/// Everything the change-set analyser produces for one run.
pub struct Analysis {
    pub functions: Vec<FunctionRecord>,
    pub call_graph: std::collections::HashMap<String, Vec<String>>,
    pub roots: Vec<String>,
}

/// Run the full pipeline: gather material diff hunks and untracked files,
/// infer changed functions, extract and qualify their bodies, and build the
/// restricted call graph. Returns an empty analysis (no functions, no
/// graph, no roots) when nothing changed, matching the dynamic tracer's
/// `{"parents": []}` no-op case.
pub fn analyze(repo_root: &Path) -> Result<Analysis> {
    let diffed = diff::all_changes(repo_root)?;
    let new_files = status::new_python_files(repo_root)?;
    let targets = changed_functions::collect(&diffed, &new_files);

    if targets.is_empty() {
        return Ok(Analysis { functions: Vec::new(), call_graph: Default::default(), roots: Vec::new() });
    }

    let name_index = tracer_si::build_name_index(repo_root);

    let mut functions = Vec::new();
    for (rel_path, target) in &targets {
        let abs_path = repo_root.join(rel_path);
        if !abs_path.is_file() {
            continue;
        }
        functions.extend(extract::extract_functions(repo_root, &abs_path, target, &name_index)?);
    }

    let call_graph = callgraph::build(&functions);
    let roots = callgraph::roots(&call_graph);

    Ok(Analysis { functions, call_graph, roots })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;
    use tempfile::TempDir;

    fn run_git(dir: &Path, args: &[&str]) {
        let status = Command::new("git").arg("-C").arg(dir).args(args).status().unwrap();
        assert!(status.success());
    }

    #[test]
    fn full_pipeline_on_untracked_file() {
        let dir = TempDir::new().unwrap();
        run_git(dir.path(), &["init", "-q"]);
        run_git(dir.path(), &["config", "user.email", "t@example.com"]);
        run_git(dir.path(), &["config", "user.name", "t"]);
        fs::write(dir.path().join("fresh.py"), "def a():\n    b()\n\ndef b():\n    pass\n").unwrap();

        let analysis = analyze(dir.path()).unwrap();
        assert_eq!(analysis.functions.len(), 2);
        assert_eq!(analysis.roots, vec!["/fresh.py::a".to_string()]);
    }

    #[test]
    fn no_changes_yields_empty_analysis() {
        let dir = TempDir::new().unwrap();
        run_git(dir.path(), &["init", "-q"]);
        let analysis = analyze(dir.path()).unwrap();
        assert!(analysis.functions.is_empty());
        assert!(analysis.roots.is_empty());
    }
}
