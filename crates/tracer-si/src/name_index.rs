use std::collections::HashMap;
use std::path::Path;

use tracer_core::walk::{relative_path, walk_source_files};
use tree_sitter::Parser;

/// Maps a bare top-level function name to every repo-relative file that
/// defines it. Built by walking the whole repository once; used by CSA as
/// the last-resort callee resolver when neither local scope nor the import
/// map can qualify a call.
pub fn build_name_index(repo_root: &Path) -> HashMap<String, Vec<String>> {
    let mut index: HashMap<String, Vec<String>> = HashMap::new();
    let mut parser = Parser::new();
    if parser.set_language(&tree_sitter_python::LANGUAGE.into()).is_err() {
        return index;
    }

    for file in walk_source_files(repo_root) {
        let Ok(source) = std::fs::read_to_string(&file) else { continue };
        let Some(tree) = parser.parse(&source, None) else { continue };
        let rel = relative_path(repo_root, &file);

        let root = tree.root_node();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            if child.kind() != "function_definition" {
                continue;
            }
            let Some(name_node) = child.child_by_field_name("name") else { continue };
            let name = source[name_node.byte_range()].to_string();
            index.entry(name).or_default().push(rel.clone());
        }
    }

    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn indexes_top_level_functions_across_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.py"), "def foo():\n    pass\n").unwrap();
        fs::write(dir.path().join("b.py"), "def foo():\n    pass\ndef bar():\n    pass\n").unwrap();

        let index = build_name_index(dir.path());
        assert_eq!(index.get("foo").unwrap().len(), 2);
        assert_eq!(index.get("bar").unwrap().len(), 1);
        assert!(index.get("missing").is_none());
    }
}
