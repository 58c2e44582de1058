use std::collections::BTreeSet;
use std::path::Path;

use git2::{Repository, Status, StatusOptions};
use tracer_core::{Result, TracerError};

/// Every `.py` file that is untracked or newly staged (`git status`'s `??`
/// or `A` markers), treated as wholly added: every function it defines
/// counts as changed.
pub fn new_python_files(repo_root: &Path) -> Result<BTreeSet<String>> {
    let repo = Repository::open(repo_root).map_err(|e| TracerError::Git(e.to_string()))?;
    let mut opts = StatusOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true).include_ignored(false);
    let statuses = repo.statuses(Some(&mut opts)).map_err(|e| TracerError::Git(e.to_string()))?;

    let mut found = BTreeSet::new();
    for entry in statuses.iter() {
        let status = entry.status();
        let is_added = status.intersects(Status::WT_NEW | Status::INDEX_NEW);
        if !is_added {
            continue;
        }
        let Some(path) = entry.path() else { continue };
        if path.ends_with(".py") {
            found.insert(path.replace('\\', "/"));
        }
    }
    Ok(found)
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
    fn finds_untracked_python_file() {
        let dir = TempDir::new().unwrap();
        run_git(dir.path(), &["init", "-q"]);
        fs::write(dir.path().join("new_mod.py"), "def g():\n    pass\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "hi").unwrap();

        let found = new_python_files(dir.path()).unwrap();
        assert_eq!(found, BTreeSet::from(["new_mod.py".to_string()]));
    }
}
