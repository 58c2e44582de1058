use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracer_core::{CanonicalId, Result, TracerError};
use tree_sitter::Parser;

use crate::value::{FunctionValue, SourceModule};

/// Dotted module name a repo-relative path would import as, mirroring
/// `derive_module_name`: strip the `.py` suffix and replace path
/// separators with dots.
pub fn derive_module_name(rel_path: &str) -> String {
    let trimmed = rel_path.trim_start_matches('/');
    let trimmed = trimmed.strip_suffix(".py").unwrap_or(trimmed);
    let dotted = trimmed.replace('/', ".");
    if dotted.is_empty() {
        "__main__".to_string()
    } else {
        dotted
    }
}

fn parse(source: &str) -> Result<tree_sitter::Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| TracerError::Parse(e.to_string()))?;
    parser
        .parse(source, None)
        .ok_or_else(|| TracerError::Parse("tree-sitter produced no tree".to_string()))
}

fn load_module(repo_root: &Path, rel_path: &str) -> Result<Rc<SourceModule>> {
    let abs_path = repo_root.join(rel_path.trim_start_matches('/'));
    let source = std::fs::read_to_string(&abs_path)
        .map_err(|_| TracerError::FileNotFound(rel_path.to_string()))?;
    let tree = parse(&source)?;
    Ok(Rc::new(SourceModule {
        dotted_name: derive_module_name(rel_path),
        path: abs_path,
        source,
        tree,
    }))
}

/// Resolve a canonical id to a callable. A top-level sentinel resolves to
/// the synthetic `<module>` entry point that runs the file's own
/// top-level statements; anything else is looked up the same way the
/// static index does, then wrapped as a plain function value (never a
/// bound method, since there is no instance yet to bind to).
pub fn resolve_entry(repo_root: &Path, id: &CanonicalId) -> Result<Rc<FunctionValue>> {
    let module = load_module(repo_root, id.path())?;

    if id.is_top_level() {
        let end = module.source.len();
        return Ok(Rc::new(FunctionValue {
            name: "<module>".to_string(),
            module,
            def_start: 0,
            def_end: end,
            is_method: false,
            is_module_entry: true,
        }));
    }

    let found = tracer_si::lookup::find_qualified(&module.tree, &module.source, id.names())
        .ok_or_else(|| TracerError::FunctionNotFound(id.to_string()))?;
    Ok(Rc::new(FunctionValue {
        name: id.leaf().to_string(),
        module,
        def_start: found.node.start_byte(),
        def_end: found.node.end_byte(),
        is_method: found.is_method,
        is_module_entry: false,
    }))
}

/// Import a module by repo-relative path without resolving any particular
/// function in it, for callee lookups the interpreter performs at call
/// time (plain `import`/`from ... import` statements inside traced code).
pub fn import_by_path(repo_root: &Path, rel_path: &str) -> Result<Rc<SourceModule>> {
    load_module(repo_root, rel_path)
}

pub fn is_importable_file(repo_root: &Path, dotted_name: &str) -> Option<PathBuf> {
    let rel = dotted_name.replace('.', "/") + ".py";
    let candidate = repo_root.join(&rel);
    if candidate.is_file() {
        Some(candidate)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn derives_dotted_module_name() {
        assert_eq!(derive_module_name("pkg/mod.py"), "pkg.mod");
        assert_eq!(derive_module_name("/solo.py"), "solo");
    }

    #[test]
    fn resolves_top_level_entry_to_module_body() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("m.py"), "x = 1\nprint(x)\n").unwrap();
        let id = CanonicalId::new("m.py", vec!["<module>".to_string()]).unwrap();
        let entry = resolve_entry(dir.path(), &id).unwrap();
        assert!(entry.is_module_entry);
        assert_eq!(entry.def_end, entry.module.source.len());
    }

    #[test]
    fn resolves_plain_function_entry() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("m.py"), "def f(x):\n    return x\n").unwrap();
        let id = CanonicalId::new("m.py", vec!["f".to_string()]).unwrap();
        let entry = resolve_entry(dir.path(), &id).unwrap();
        assert!(!entry.is_module_entry);
        assert_eq!(entry.name, "f");
    }
}
