use std::path::Path;

use tracer_core::CanonicalId;

/// The `--get_signature` operating mode: a pure AST lookup with no
/// execution, returning either the signature payload or an `{"error":
/// ...}` object the way the original CLI does.
pub fn run(repo_root: &Path, entry_id: &CanonicalId) -> serde_json::Value {
    match tracer_si::lookup_signature(repo_root, entry_id) {
        Ok(sig) => serde_json::to_value(sig).unwrap_or_else(|e| serde_json::json!({"error": e.to_string()})),
        Err(e) => serde_json::json!({"error": e.to_string()}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn returns_signature_payload() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("m.py"), "def f(x, y=2):\n    pass\n").unwrap();
        let id = CanonicalId::new("m.py", vec!["f".to_string()]).unwrap();
        let payload = run(dir.path(), &id);
        assert_eq!(payload["params"], serde_json::json!(["x", "y"]));
    }

    #[test]
    fn returns_error_object_for_missing_function() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("m.py"), "x = 1\n").unwrap();
        let id = CanonicalId::new("m.py", vec!["missing".to_string()]).unwrap();
        let payload = run(dir.path(), &id);
        assert!(payload.get("error").is_some());
    }
}
