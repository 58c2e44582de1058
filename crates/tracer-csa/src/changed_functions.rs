use std::collections::{BTreeSet, HashMap, HashSet};

use crate::diff::ChangedFile;
use crate::hunks::changed_function_names;

/// Which functions in a file are considered changed. Untracked/newly-added
/// files count every function they define; files touched by a diff only
/// count the functions named in their material hunks.
#[derive(Debug, Clone)]
pub enum Targets {
    All,
    Named(HashSet<String>),
}

/// Merge the diff-derived changed-function sets with the untracked-file
/// set, keyed by repo-relative path. A file appearing in both the unstaged
/// and staged diffs has its function sets unioned.
pub fn collect(diffed: &[ChangedFile], new_files: &BTreeSet<String>) -> HashMap<String, Targets> {
    let mut out: HashMap<String, Targets> = HashMap::new();

    for file in diffed {
        let mut names = HashSet::new();
        for hunk in &file.hunks {
            names.extend(changed_function_names(hunk));
        }
        if names.is_empty() {
            continue;
        }
        out.entry(file.path.clone())
            .and_modify(|t| {
                if let Targets::Named(existing) = t {
                    existing.extend(names.iter().cloned());
                }
            })
            .or_insert(Targets::Named(names));
    }

    for path in new_files {
        out.entry(path.clone()).or_insert(Targets::All);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hunks::{DiffLine, Hunk};

    fn hunk(lines: &[(char, &str)]) -> Hunk {
        Hunk {
            lines: lines
                .iter()
                .map(|(origin, content)| DiffLine { origin: *origin, content: content.to_string() })
                .collect(),
        }
    }

    #[test]
    fn merges_functions_across_duplicate_file_entries() {
        let diffed = vec![
            ChangedFile { path: "a.py".to_string(), hunks: vec![hunk(&[('+', "def one():")])] },
            ChangedFile { path: "a.py".to_string(), hunks: vec![hunk(&[('+', "def two():")])] },
        ];
        let new_files = BTreeSet::new();
        let collected = collect(&diffed, &new_files);
        match collected.get("a.py").unwrap() {
            Targets::Named(names) => {
                assert!(names.contains("one"));
                assert!(names.contains("two"));
            }
            Targets::All => panic!("expected named targets"),
        }
    }

    #[test]
    fn untracked_file_is_marked_all() {
        let diffed = vec![];
        let new_files = BTreeSet::from(["new.py".to_string()]);
        let collected = collect(&diffed, &new_files);
        assert!(matches!(collected.get("new.py").unwrap(), Targets::All));
    }
}
