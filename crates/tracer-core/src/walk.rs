use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

/// Directory names skipped whenever the static index, change-set analyser,
/// or call-site locator walks the repository, regardless of `.gitignore`
/// contents (or absence thereof).
pub const EXCLUDED_DIRS: [&str; 6] = [".git", "__pycache__", ".venv", "venv", "env", "node_modules"];

fn is_excluded(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| EXCLUDED_DIRS.contains(&n))
        .unwrap_or(false)
}

/// Walk every source file under `root` whose extension is `.py`, skipping
/// [`EXCLUDED_DIRS`] explicitly. Git-ignore rules are deliberately not
/// consulted: the exclusion set is static and independent of the
/// repository's `.gitignore` state.
pub fn walk_source_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(false)
        .filter_entry(|entry| !is_excluded(entry.path()))
        .build();
    for entry in walker.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("py") {
            out.push(path.to_path_buf());
        }
    }
    out
}

/// Convert an absolute path into a repo-relative, forward-slash path (no
/// leading `/`).
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn skips_excluded_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".venv")).unwrap();
        fs::write(dir.path().join(".venv/ignored.py"), "x = 1").unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/mod.py"), "x = 1").unwrap();

        let found = walk_source_files(dir.path());
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("pkg/mod.py"));
    }

    #[test]
    fn relative_path_strips_root_and_normalizes_slashes() {
        let root = Path::new("/repo");
        let file = Path::new("/repo/pkg/mod.py");
        assert_eq!(relative_path(root, file), "pkg/mod.py");
    }
}
