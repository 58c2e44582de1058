use tree_sitter::{Node, Tree};

use crate::import_match::ImportMatch;
use crate::types::CallSite;

fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

/// `lineno` is 1-indexed, matching the call's reported line number.
fn context_window(lines: &[&str], lineno: usize) -> Vec<String> {
    let start = lineno.saturating_sub(2);
    let end = (lineno + 2).min(lines.len());
    lines[start..end].iter().map(|l| l.to_string()).collect()
}

/// Does this call node's callee match the target, either as a bare name or
/// as the attribute of an attribute access (`module.target(...)` and
/// `obj.target(...)` are both reported — disambiguating them is left to
/// the caller)?
fn matches_target(call: Node, source: &str, target_function_name: &str, imports: &ImportMatch) -> bool {
    let Some(func) = call.child_by_field_name("function") else { return false };
    match func.kind() {
        "identifier" => {
            let name = node_text(func, source);
            name == target_function_name || imports.imported_names.contains(name)
        }
        "attribute" => {
            let Some(attr) = func.child_by_field_name("attribute") else { return false };
            let name = node_text(attr, source);
            name == target_function_name || imports.imported_names.contains(name)
        }
        _ => false,
    }
}

/// Walk every call expression in `tree`, maintaining an explicit
/// enclosing-function stack (classes do not push a scope) and recording a
/// [`CallSite`] for every match.
pub fn find_call_sites(
    tree: &Tree,
    source: &str,
    file_rel: &str,
    target_function_name: &str,
    imports: &ImportMatch,
) -> Vec<CallSite> {
    let lines: Vec<&str> = source.lines().collect();
    let mut sites = Vec::new();
    let mut stack: Vec<Option<String>> = vec![None];
    walk(tree.root_node(), source, file_rel, target_function_name, imports, &lines, &mut stack, &mut sites);
    sites
}

fn walk(
    node: Node,
    source: &str,
    file_rel: &str,
    target_function_name: &str,
    imports: &ImportMatch,
    lines: &[&str],
    stack: &mut Vec<Option<String>>,
    sites: &mut Vec<CallSite>,
) {
    let pushed_function = if node.kind() == "function_definition" {
        let name = node
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_string());
        stack.push(name);
        true
    } else {
        false
    };

    if node.kind() == "call" && matches_target(node, source, target_function_name, imports) {
        let start = node.start_position();
        let lineno = start.row + 1;
        let calling_function = stack.last().cloned().flatten();
        let calling_function_id = calling_function.as_ref().map(|f| format!("/{file_rel}::{f}"));
        sites.push(CallSite {
            file: file_rel.to_string(),
            line: lineno,
            column: start.column,
            call_line: lines.get(start.row).map(|l| l.trim().to_string()).unwrap_or_default(),
            context: context_window(lines, lineno),
            calling_function,
            calling_function_id,
        });
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, file_rel, target_function_name, imports, lines, stack, sites);
    }

    if pushed_function {
        stack.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse(source: &str) -> Tree {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_python::LANGUAGE.into()).unwrap();
        parser.parse(source, None).unwrap()
    }

    #[test]
    fn finds_direct_call_with_enclosing_function() {
        let source = "def caller():\n    get_metric(1)\n";
        let tree = parse(source);
        let imports = ImportMatch::default();
        let sites = find_call_sites(&tree, source, "other.py", "get_metric", &imports);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].calling_function, Some("caller".to_string()));
        assert_eq!(sites[0].calling_function_id, Some("/other.py::caller".to_string()));
    }

    #[test]
    fn classes_do_not_open_a_new_scope() {
        let source = "class Widget:\n    def render(self):\n        get_metric()\n";
        let tree = parse(source);
        let imports = ImportMatch::default();
        let sites = find_call_sites(&tree, source, "other.py", "get_metric", &imports);
        assert_eq!(sites[0].calling_function, Some("render".to_string()));
    }

    #[test]
    fn module_scope_call_has_no_enclosing_function() {
        let source = "get_metric()\n";
        let tree = parse(source);
        let imports = ImportMatch::default();
        let sites = find_call_sites(&tree, source, "other.py", "get_metric", &imports);
        assert_eq!(sites[0].calling_function, None);
        assert_eq!(sites[0].calling_function_id, None);
    }

    #[test]
    fn attribute_call_matches_on_attribute_name() {
        let source = "def caller():\n    module.get_metric()\n";
        let tree = parse(source);
        let imports = ImportMatch::default();
        let sites = find_call_sites(&tree, source, "other.py", "get_metric", &imports);
        assert_eq!(sites.len(), 1);
    }
}
