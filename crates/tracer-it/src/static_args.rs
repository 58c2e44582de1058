use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracer_core::{CanonicalId, TracerError};
use tree_sitter::{Node, Parser};

use crate::argfilter::filter_arguments;
use crate::env::Env;
use crate::interpreter::{Interpreter, NoopHook};
use crate::projection;
use crate::value::{SourceModule, Value};

pub(crate) fn parse_snippet(text: &str) -> Result<tree_sitter::Tree, TracerError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| TracerError::Parse(e.to_string()))?;
    parser
        .parse(text, None)
        .ok_or_else(|| TracerError::Parse("tree-sitter produced no tree".to_string()))
}

/// Find the first `call` node in a standalone line of source whose
/// callee is a bare name or an attribute access ending in `fn_name`,
/// mirroring the original's `ast.walk` search for a matching `ast.Call`.
pub(crate) fn find_call_node<'a>(root: Node<'a>, source: &str, fn_name: &str) -> Option<Node<'a>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.kind() == "call" {
            if let Some(func) = node.child_by_field_name("function") {
                let matches = match func.kind() {
                    "identifier" => &source[func.byte_range()] == fn_name,
                    "attribute" => func
                        .child_by_field_name("attribute")
                        .map(|a| &source[a.byte_range()] == fn_name)
                        .unwrap_or(false),
                    _ => false,
                };
                if matches {
                    return Some(node);
                }
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
    None
}

pub struct ExtractedArgs {
    pub args: Vec<serde_json::Value>,
    pub kwargs: serde_json::Map<String, serde_json::Value>,
}

/// Resolve the file a call line should be read from: an explicit parent
/// file (the caller's own source, when the callee is defined elsewhere)
/// or, failing that, the callee's own file.
pub(crate) fn resolve_call_site_file(repo_root: &Path, callee_id: &CanonicalId, parent_file: Option<&str>) -> PathBuf {
    match parent_file {
        Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
        Some(p) => repo_root.join(p.trim_start_matches('/')),
        None => repo_root.join(callee_id.path()),
    }
}

/// Read a single line out of `abs_path`, parse it standalone, locate the
/// call to `fn_name` on it, and evaluate each argument expression against
/// `env` using `interpreter`. Shared by the static (§4.4.2) and runtime
/// (§4.4.2.1) extract-args modes; the only difference between them is
/// where `env` comes from — a JSON snapshot for the static mode, the
/// live frame bindings captured mid-execution for the runtime one.
pub(crate) fn evaluate_call_line(
    interpreter: &mut Interpreter,
    abs_path: &Path,
    call_line: usize,
    fn_name: &str,
    env: Env,
) -> Result<(Vec<serde_json::Value>, serde_json::Map<String, serde_json::Value>), String> {
    let source = std::fs::read_to_string(abs_path).map_err(|_| format!("file not found: {}", abs_path.display()))?;
    let lines: Vec<&str> = source.lines().collect();
    if call_line < 1 || call_line > lines.len() {
        return Err(format!("line {call_line} out of range"));
    }
    let line_text = lines[call_line - 1].trim().to_string();

    let tree = parse_snippet(&line_text).map_err(|e| format!("cannot parse line: {e}"))?;
    let call_node = find_call_node(tree.root_node(), &line_text, fn_name)
        .ok_or_else(|| format!("function call to {fn_name} not found on line {call_line}"))?;

    let module = Rc::new(SourceModule { dotted_name: "<call-site>".to_string(), path: abs_path.to_path_buf(), source: line_text, tree });

    let mut args = Vec::new();
    let mut kwargs = serde_json::Map::new();
    if let Some(args_node) = call_node.child_by_field_name("arguments") {
        let mut cursor = args_node.walk();
        for arg in args_node.named_children(&mut cursor) {
            if arg.kind() == "keyword_argument" {
                if let (Some(name_node), Some(value_node)) = (arg.child_by_field_name("name"), arg.child_by_field_name("value")) {
                    let name = module.source[name_node.byte_range()].to_string();
                    if let Ok(value) = interpreter.eval_in_env(value_node, &module, env.clone()) {
                        kwargs.insert(name, projection::project(&value));
                    }
                }
            } else if matches!(arg.kind(), "list_splat" | "dictionary_splat") {
                continue;
            } else if let Ok(value) = interpreter.eval_in_env(arg, &module, env.clone()) {
                args.push(projection::project(&value));
            }
        }
    }

    Ok((args, kwargs))
}

/// The `--extract-call-args` static-context mode: given a captured
/// locals/globals snapshot at the call site, evaluate the call's argument
/// expressions in that context and filter the result against the
/// callee's signature.
pub fn extract(
    repo_root: &Path,
    callee_id: &CanonicalId,
    call_line: usize,
    locals: serde_json::Map<String, serde_json::Value>,
    globals: serde_json::Map<String, serde_json::Value>,
    parent_file: Option<&str>,
) -> Result<ExtractedArgs, String> {
    let abs_path = resolve_call_site_file(repo_root, callee_id, parent_file);

    let locals_env: HashMap<String, Value> = locals.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect();
    let globals_env: HashMap<String, Value> = globals.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect();
    let env = Env { locals: Rc::new(RefCell::new(locals_env)), globals: Rc::new(RefCell::new(globals_env)) };

    let mut hook = NoopHook;
    let mut interpreter = Interpreter::new(repo_root.to_path_buf(), &mut hook);
    let (args, kwargs) = evaluate_call_line(&mut interpreter, &abs_path, call_line, callee_id.leaf(), env)?;

    if let Ok(sig) = tracer_si::lookup_signature(repo_root, callee_id) {
        let filtered = filter_arguments(&sig, args, kwargs);
        if !filtered.missing_required.is_empty() {
            return Err(format!("missing required parameter(s): {}", filtered.missing_required.join(", ")));
        }
        return Ok(ExtractedArgs { args: filtered.args, kwargs: filtered.kwargs });
    }

    Ok(ExtractedArgs { args, kwargs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn evaluates_positional_and_keyword_args_against_snapshot() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("callee.py"), "def handle(x, y=1):\n    pass\n").unwrap();
        fs::write(dir.path().join("caller.py"), "def outer():\n    handle(count, label=name)\n").unwrap();
        let callee_id = CanonicalId::new("callee.py", vec!["handle".to_string()]).unwrap();

        let mut locals = serde_json::Map::new();
        locals.insert("count".to_string(), serde_json::json!(3));
        locals.insert("name".to_string(), serde_json::json!("x"));

        let extracted = extract(dir.path(), &callee_id, 2, locals, serde_json::Map::new(), Some("caller.py")).unwrap();
        assert_eq!(extracted.args, vec![serde_json::json!(3)]);
        assert_eq!(extracted.kwargs.get("label"), None); // filtered: callee has no 'label' param
    }

    #[test]
    fn errors_when_required_param_is_unbound() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("callee.py"), "def handle(x, y):\n    pass\n").unwrap();
        fs::write(dir.path().join("caller.py"), "def outer():\n    handle(count)\n").unwrap();
        let callee_id = CanonicalId::new("callee.py", vec!["handle".to_string()]).unwrap();

        let mut locals = serde_json::Map::new();
        locals.insert("count".to_string(), serde_json::json!(3));

        let result = extract(dir.path(), &callee_id, 2, locals, serde_json::Map::new(), Some("caller.py"));
        assert!(result.is_err());
    }

    #[test]
    fn errors_on_missing_call() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("callee.py"), "def handle(x):\n    pass\n").unwrap();
        fs::write(dir.path().join("caller.py"), "def outer():\n    other()\n").unwrap();
        let callee_id = CanonicalId::new("callee.py", vec!["handle".to_string()]).unwrap();
        let result = extract(dir.path(), &callee_id, 2, serde_json::Map::new(), serde_json::Map::new(), Some("caller.py"));
        assert!(result.is_err());
    }
}
