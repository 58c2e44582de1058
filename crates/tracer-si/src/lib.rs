//! The static index: qualified function lookup, signature extraction, and
//! the repository-wide name-to-files index used as CSA's last-resort
//! callee resolver.

pub mod lookup;
pub mod name_index;
pub mod signature;

use std::path::Path;

use tracer_core::{is_top_level_name, CanonicalId, Result, TracerError};
use tree_sitter::{Parser, Tree};

pub use name_index::build_name_index;
pub use signature::Signature;

/// Parse a Python source file with the shared grammar. Parse failures that
/// tree-sitter cannot recover from at all (rather than producing an AST
/// dotted with `ERROR` nodes) come back as `TracerError::Parse`.
pub fn parse_python(source: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| TracerError::Parse(e.to_string()))?;
    parser
        .parse(source, None)
        .ok_or_else(|| TracerError::Parse("tree-sitter produced no tree".to_string()))
}

/// Signature lookup for a canonical id. Returns the all-zero signature for
/// a top-level sentinel entry without touching the filesystem beyond what
/// the caller already resolved. Tries the static nested-`def` search first;
/// when that fails, falls back to resolving the last path segment through
/// a plain assignment (e.g. a function assigned to a class attribute),
/// which the static search never attempts.
pub fn lookup_signature(repo_root: &Path, id: &CanonicalId) -> Result<Signature> {
    if id.names().len() == 1 && is_top_level_name(&id.names()[0]) {
        return Ok(Signature::default());
    }

    let abs_path = repo_root.join(id.path());
    let source = std::fs::read_to_string(&abs_path)
        .map_err(|_| TracerError::FileNotFound(id.path().to_string()))?;
    let tree = parse_python(&source)?;

    let found = lookup::find_qualified(&tree, &source, id.names())
        .or_else(|| lookup::find_dynamic(&tree, &source, id.names()))
        .ok_or_else(|| TracerError::FunctionNotFound(id.to_string()))?;

    Ok(signature::extract_signature(found.node, &source, found.is_method))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn looks_up_signature_end_to_end() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("m.py"), "def f(x, y=2):\n    pass\n").unwrap();
        let id = CanonicalId::new("m.py", vec!["f".to_string()]).unwrap();
        let sig = lookup_signature(dir.path(), &id).unwrap();
        assert_eq!(sig.params, vec!["x", "y"]);
        assert_eq!(sig.param_required, vec![true, false]);
    }

    #[test]
    fn top_level_sentinel_has_empty_signature() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("m.py"), "x = 1\n").unwrap();
        let id = CanonicalId::new("m.py", vec!["<module>".to_string()]).unwrap();
        let sig = lookup_signature(dir.path(), &id).unwrap();
        assert_eq!(sig.param_count, 0);
    }

    #[test]
    fn falls_back_to_attribute_assignment_when_no_nested_def_matches() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("m.py"),
            "def real_handler(a, b=1):\n    pass\n\nclass Widget:\n    handler = real_handler\n",
        )
        .unwrap();
        let id = CanonicalId::new("m.py", vec!["Widget".to_string(), "handler".to_string()]).unwrap();
        let sig = lookup_signature(dir.path(), &id).unwrap();
        assert_eq!(sig.params, vec!["a", "b"]);
    }

    #[test]
    fn missing_function_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("m.py"), "def f():\n    pass\n").unwrap();
        let id = CanonicalId::new("m.py", vec!["missing".to_string()]).unwrap();
        assert!(matches!(lookup_signature(dir.path(), &id), Err(TracerError::FunctionNotFound(_))));
    }
}
