use serde::Serialize;
use tree_sitter::Node;

/// Mirrors the dynamic tracer's AST-derived signature payload: parallel
/// arrays rather than a `Vec<Param>`, since that is the shape callers on
/// the wire actually consume.
#[derive(Debug, Clone, Serialize, Default)]
pub struct Signature {
    pub params: Vec<String>,
    pub param_count: usize,
    pub param_types: Vec<Option<String>>,
    pub param_defaults: Vec<Option<String>>,
    pub param_required: Vec<bool>,
}

const LITERAL_KINDS: [&str; 6] = ["integer", "float", "true", "false", "none", "string"];

fn param_name<'a>(node: Node<'a>, source: &'a str) -> Option<&'a str> {
    node.child_by_field_name("name")
        .or_else(|| {
            let mut cursor = node.walk();
            node.children(&mut cursor)
                .find(|c| matches!(c.kind(), "identifier" | "list_splat_pattern" | "dictionary_splat_pattern"))
        })
        .map(|n| &source[n.byte_range()])
}

/// Fully qualified for attribute-style annotations (`typing.Dict`), outer
/// constructor name only for subscripted generics (`Mapping[str, int]` ->
/// `Mapping`).
fn render_annotation(node: Node, source: &str) -> String {
    match node.kind() {
        "identifier" => source[node.byte_range()].to_string(),
        "attribute" => {
            let object = node.child_by_field_name("object");
            let attr = node.child_by_field_name("attribute");
            match (object, attr) {
                (Some(object), Some(attr)) => {
                    format!("{}.{}", render_annotation(object, source), &source[attr.byte_range()])
                }
                _ => source[node.byte_range()].to_string(),
            }
        }
        "subscript" => match node.child_by_field_name("value") {
            Some(value) => render_annotation(value, source),
            None => source[node.byte_range()].to_string(),
        },
        _ => source[node.byte_range()].to_string(),
    }
}

/// Simple constants only; complex literal defaults (lists, dicts, tuples,
/// calls, comprehensions, ...) come back as `None`.
fn render_default(node: Node, source: &str) -> Option<String> {
    if LITERAL_KINDS.contains(&node.kind()) {
        return Some(source[node.byte_range()].to_string());
    }
    if node.kind() == "unary_operator" {
        let operator = node.child_by_field_name("operator")?;
        let argument = node.child_by_field_name("argument")?;
        if LITERAL_KINDS.contains(&argument.kind()) {
            return Some(format!(
                "{}{}",
                &source[operator.byte_range()],
                &source[argument.byte_range()]
            ));
        }
    }
    None
}

/// Extract a signature from a `function_definition` node. `is_method`
/// elides a leading `self`/`cls` parameter, mirroring the dynamic tracer's
/// rule that applies only to two-segment (class-method) canonical ids.
pub fn extract_signature(function_node: Node, source: &str, is_method: bool) -> Signature {
    let mut sig = Signature::default();
    let Some(parameters) = function_node.child_by_field_name("parameters") else {
        return sig;
    };

    let mut cursor = parameters.walk();
    for param in parameters.named_children(&mut cursor) {
        match param.kind() {
            "identifier" => {
                let name = &source[param.byte_range()];
                if is_method && (name == "self" || name == "cls") {
                    continue;
                }
                sig.params.push(name.to_string());
                sig.param_types.push(None);
                sig.param_defaults.push(None);
                sig.param_required.push(true);
            }
            "typed_parameter" => {
                let Some(name) = param_name(param, source) else { continue };
                if is_method && (name == "self" || name == "cls") {
                    continue;
                }
                let ty = param.child_by_field_name("type").map(|t| render_annotation(t, source));
                sig.params.push(name.to_string());
                sig.param_types.push(ty);
                sig.param_defaults.push(None);
                sig.param_required.push(true);
            }
            "default_parameter" => {
                let Some(name) = param_name(param, source) else { continue };
                if is_method && (name == "self" || name == "cls") {
                    continue;
                }
                let default = param.child_by_field_name("value").and_then(|v| render_default(v, source));
                sig.params.push(name.to_string());
                sig.param_types.push(None);
                sig.param_defaults.push(default);
                sig.param_required.push(false);
            }
            "typed_default_parameter" => {
                let Some(name) = param_name(param, source) else { continue };
                if is_method && (name == "self" || name == "cls") {
                    continue;
                }
                let ty = param.child_by_field_name("type").map(|t| render_annotation(t, source));
                let default = param.child_by_field_name("value").and_then(|v| render_default(v, source));
                sig.params.push(name.to_string());
                sig.param_types.push(ty);
                sig.param_defaults.push(default);
                sig.param_required.push(false);
            }
            // *args, **kwargs, and the bare `*`/`/` separators carry no
            // single required/default value and are excluded from the
            // parallel arrays.
            _ => {}
        }
    }

    sig.param_count = sig.params.len();
    sig
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse_function(source: &str) -> (tree_sitter::Tree, String) {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_python::LANGUAGE.into()).unwrap();
        let tree = parser.parse(source, None).unwrap();
        (tree, source.to_string())
    }

    fn function_node(tree: &tree_sitter::Tree) -> Node {
        let root = tree.root_node();
        let mut cursor = root.walk();
        root.children(&mut cursor).find(|n| n.kind() == "function_definition").unwrap()
    }

    #[test]
    fn extracts_mixed_params() {
        let source = "def g(x, y: Mapping[str, int] = None, *, z=3):\n    pass\n";
        let (tree, src) = parse_function(source);
        let node = function_node(&tree);
        let sig = extract_signature(node, &src, false);
        assert_eq!(sig.params, vec!["x", "y", "z"]);
        assert_eq!(sig.param_types, vec![None, Some("Mapping".to_string()), None]);
        assert_eq!(sig.param_defaults, vec![None, Some("None".to_string()), Some("3".to_string())]);
        assert_eq!(sig.param_required, vec![true, false, false]);
    }

    #[test]
    fn elides_self_for_methods() {
        let source = "def render(self, count=1):\n    pass\n";
        let (tree, src) = parse_function(source);
        let node = function_node(&tree);
        let sig = extract_signature(node, &src, true);
        assert_eq!(sig.params, vec!["count"]);
    }

    #[test]
    fn complex_default_is_recorded_as_absent_but_not_required() {
        let source = "def f(items=[1, 2]):\n    pass\n";
        let (tree, src) = parse_function(source);
        let node = function_node(&tree);
        let sig = extract_signature(node, &src, false);
        assert_eq!(sig.param_defaults, vec![None]);
        assert_eq!(sig.param_required, vec![false]);
    }

    #[test]
    fn attribute_annotation_is_fully_qualified() {
        let source = "def f(conn: db.Connection):\n    pass\n";
        let (tree, src) = parse_function(source);
        let node = function_node(&tree);
        let sig = extract_signature(node, &src, false);
        assert_eq!(sig.param_types, vec![Some("db.Connection".to_string())]);
    }

    #[test]
    fn negative_number_default_renders() {
        let source = "def f(x=-1):\n    pass\n";
        let (tree, src) = parse_function(source);
        let node = function_node(&tree);
        let sig = extract_signature(node, &src, false);
        assert_eq!(sig.param_defaults, vec![Some("-1".to_string())]);
    }
}
