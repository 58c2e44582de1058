use std::path::Path;

use git2::{Delta, DiffOptions, Patch, Repository};
use tracer_core::{Result, TracerError};

use crate::hunks::{is_important_hunk, DiffLine, Hunk};

/// One changed file and the material hunks survived from its diff, whether
/// the change came from the index (staged) or the working tree (unstaged).
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub path: String,
    pub hunks: Vec<Hunk>,
}

fn diff_options() -> DiffOptions {
    let mut opts = DiffOptions::new();
    opts.ignore_whitespace(true)
        .ignore_whitespace_eol(true)
        .ignore_blank_lines(true);
    opts
}

fn patches_from_diff(diff: &git2::Diff) -> Result<Vec<ChangedFile>> {
    let mut files = Vec::new();
    for idx in 0..diff.deltas().len() {
        let delta = diff.get_delta(idx).expect("index within deltas().len()");
        if delta.status() == Delta::Deleted {
            continue;
        }
        let Some(path) = delta.new_file().path().and_then(|p| p.to_str()) else {
            continue;
        };
        let path = path.replace('\\', "/");

        let Some(patch) = Patch::from_diff(diff, idx).map_err(|e| TracerError::Git(e.to_string()))? else {
            continue;
        };

        let num_hunks = patch.num_hunks();
        let mut hunks = Vec::with_capacity(num_hunks);
        for h in 0..num_hunks {
            let (_, num_lines) = patch.hunk(h).map_err(|e| TracerError::Git(e.to_string()))?;
            let mut lines = Vec::with_capacity(num_lines);
            for l in 0..num_lines {
                let line = patch.line_in_hunk(h, l).map_err(|e| TracerError::Git(e.to_string()))?;
                let origin = line.origin();
                if !matches!(origin, '+' | '-' | ' ') {
                    continue;
                }
                let content = std::str::from_utf8(line.content())
                    .unwrap_or("")
                    .trim_end_matches('\n')
                    .to_string();
                lines.push(DiffLine { origin, content });
            }
            hunks.push(Hunk { lines });
        }

        let material: Vec<Hunk> = hunks.into_iter().filter(is_important_hunk).collect();
        if !material.is_empty() {
            files.push(ChangedFile { path, hunks: material });
        }
    }
    Ok(files)
}

/// Unstaged changes: index (or HEAD, if nothing is staged) against the
/// working tree.
pub fn unstaged_changes(repo: &Repository) -> Result<Vec<ChangedFile>> {
    let diff = repo
        .diff_index_to_workdir(None, Some(&mut diff_options()))
        .map_err(|e| TracerError::Git(e.to_string()))?;
    patches_from_diff(&diff)
}

/// Staged changes: HEAD tree against the index. An unborn HEAD (brand-new
/// repository with nothing committed yet) is treated as an empty tree.
pub fn staged_changes(repo: &Repository) -> Result<Vec<ChangedFile>> {
    let head_tree = match repo.head() {
        Ok(head) => Some(head.peel_to_tree().map_err(|e| TracerError::Git(e.to_string()))?),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch || e.code() == git2::ErrorCode::NotFound => None,
        Err(e) => return Err(TracerError::Git(e.to_string())),
    };
    let diff = repo
        .diff_tree_to_index(head_tree.as_ref(), None, Some(&mut diff_options()))
        .map_err(|e| TracerError::Git(e.to_string()))?;
    patches_from_diff(&diff)
}

/// All material changes across both unstaged and staged diffs. A file
/// touched in both shows up twice, each with its own hunk set; callers
/// merge by path (see `changed_functions::collect`).
pub fn all_changes(repo_root: &Path) -> Result<Vec<ChangedFile>> {
    let repo = Repository::open(repo_root).map_err(|e| TracerError::Git(e.to_string()))?;
    let mut files = unstaged_changes(&repo)?;
    files.extend(staged_changes(&repo)?);
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;
    use tempfile::TempDir;

    fn run_git(dir: &Path, args: &[&str]) {
        let status = Command::new("git").arg("-C").arg(dir).args(args).status().unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        run_git(dir.path(), &["init", "-q"]);
        run_git(dir.path(), &["config", "user.email", "t@example.com"]);
        run_git(dir.path(), &["config", "user.name", "t"]);
        dir
    }

    #[test]
    fn detects_unstaged_material_change() {
        let dir = init_repo();
        fs::write(dir.path().join("a.py"), "def f():\n    pass\n").unwrap();
        run_git(dir.path(), &["add", "."]);
        run_git(dir.path(), &["commit", "-q", "-m", "init"]);

        fs::write(dir.path().join("a.py"), "def f():\n    helper()\n").unwrap();
        let repo = Repository::open(dir.path()).unwrap();
        let changes = unstaged_changes(&repo).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "a.py");
    }

    #[test]
    fn detects_staged_change() {
        let dir = init_repo();
        fs::write(dir.path().join("a.py"), "def f():\n    pass\n").unwrap();
        run_git(dir.path(), &["add", "."]);
        run_git(dir.path(), &["commit", "-q", "-m", "init"]);

        fs::write(dir.path().join("a.py"), "def f():\n    helper()\n").unwrap();
        run_git(dir.path(), &["add", "."]);
        let repo = Repository::open(dir.path()).unwrap();
        let changes = staged_changes(&repo).unwrap();
        assert_eq!(changes.len(), 1);
    }
}
