use tree_sitter::{Node, Tree};

/// Result of resolving a dotted name path against a parsed module.
pub struct FoundFunction<'a> {
    pub node: Node<'a>,
    /// True exactly when the path has two segments, matching the original
    /// dynamic tracer's elision rule: a two-part path is treated as a class
    /// method regardless of whether it actually resolved through a class
    /// body or a nested-function fallback.
    pub is_method: bool,
}

fn identifier_text<'a>(node: Node<'a>, source: &'a str) -> Option<&'a str> {
    node.child_by_field_name("name")
        .or_else(|| {
            let mut cursor = node.walk();
            node.children(&mut cursor).find(|c| c.kind() == "identifier")
        })
        .map(|n| &source[n.byte_range()])
}

fn direct_children<'a>(node: Node<'a>) -> Vec<Node<'a>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

/// Children of a `block` node, skipping anonymous punctuation.
fn body_defs<'a>(block: Node<'a>) -> Vec<Node<'a>> {
    direct_children(block)
        .into_iter()
        .filter(|n| matches!(n.kind(), "function_definition" | "class_definition"))
        .collect()
}

fn module_defs<'a>(tree: &'a Tree) -> Vec<Node<'a>> {
    body_defs(tree.root_node())
}

fn name_matches(node: Node, source: &str, kind: &str, name: &str) -> bool {
    node.kind() == kind && identifier_text(node, source) == Some(name)
}

/// Resolve `names` (the segments after the path in a canonical id) against
/// the parsed module. Mirrors the three branches the dynamic tracer uses to
/// locate a target function by AST traversal: a bare top-level lookup, the
/// class-method-then-nested-function two-part disambiguation, and a
/// step-by-step descent for anything deeper.
pub fn find_qualified<'a>(tree: &'a Tree, source: &'a str, names: &[String]) -> Option<FoundFunction<'a>> {
    match names.len() {
        0 => None,
        1 => find_top_level(tree, source, &names[0]).map(|node| FoundFunction { node, is_method: false }),
        2 => find_two_part(tree, source, &names[0], &names[1]),
        _ => find_deep(tree, source, names),
    }
}

fn find_top_level<'a>(tree: &'a Tree, source: &'a str, name: &str) -> Option<Node<'a>> {
    module_defs(tree)
        .into_iter()
        .find(|n| name_matches(*n, source, "function_definition", name))
}

fn find_two_part<'a>(tree: &'a Tree, source: &'a str, outer: &str, inner: &str) -> Option<FoundFunction<'a>> {
    for candidate in module_defs(tree) {
        if name_matches(candidate, source, "class_definition", outer) {
            if let Some(body) = candidate.child_by_field_name("body") {
                if let Some(method) = body_defs(body)
                    .into_iter()
                    .find(|n| name_matches(*n, source, "function_definition", inner))
                {
                    return Some(FoundFunction { node: method, is_method: true });
                }
            }
            break;
        }
    }

    for candidate in module_defs(tree) {
        if name_matches(candidate, source, "function_definition", outer) {
            if let Some(body) = candidate.child_by_field_name("body") {
                if let Some(nested) = body_defs(body)
                    .into_iter()
                    .find(|n| name_matches(*n, source, "function_definition", inner))
                {
                    return Some(FoundFunction { node: nested, is_method: true });
                }
            }
            break;
        }
    }

    None
}

fn find_deep<'a>(tree: &'a Tree, source: &'a str, names: &[String]) -> Option<FoundFunction<'a>> {
    let mut current = module_defs(tree);
    for (i, part) in names.iter().enumerate() {
        let is_last = i == names.len() - 1;
        let found = current.iter().find(|n| {
            name_matches(**n, source, "function_definition", part) || name_matches(**n, source, "class_definition", part)
        })?;

        if is_last {
            return if found.kind() == "function_definition" {
                Some(FoundFunction { node: *found, is_method: false })
            } else {
                None
            };
        }

        let body = found.child_by_field_name("body")?;
        current = body_defs(body);
    }
    None
}

/// Dynamic fallback (§4.1): when `find_qualified` cannot find a `def`
/// nested directly under `names`, resolve the container for everything but
/// the last segment (module or class/function body, the same way
/// `find_deep` descends), then look for a plain assignment binding the last
/// segment to a name, and follow that name to the top-level function it
/// refers to. This reaches functions assigned to class attributes at
/// class-body scope, which the nested-`def` search never considers.
pub fn find_dynamic<'a>(tree: &'a Tree, source: &'a str, names: &[String]) -> Option<FoundFunction<'a>> {
    if names.is_empty() {
        return None;
    }
    let (container_path, last) = names.split_at(names.len() - 1);
    let last = &last[0];

    let body = if container_path.is_empty() {
        tree.root_node()
    } else {
        let mut current = tree.root_node();
        for part in container_path {
            let found = body_defs(current).into_iter().find(|n| identifier_text(*n, source) == Some(part.as_str()))?;
            current = found.child_by_field_name("body")?;
        }
        current
    };

    let target_name = resolve_assigned_name(body, source, last)?;
    let target = module_defs(tree).into_iter().find(|n| name_matches(*n, source, "function_definition", &target_name))?;
    Some(FoundFunction { node: target, is_method: names.len() == 2 })
}

/// Find a top-level `name = other_name` assignment directly inside `body`
/// and return `other_name`, if the right-hand side is a bare identifier.
fn resolve_assigned_name<'a>(body: Node<'a>, source: &'a str, name: &str) -> Option<String> {
    for stmt in direct_children(body) {
        if stmt.kind() != "expression_statement" {
            continue;
        }
        let mut cursor = stmt.walk();
        let Some(assignment) = stmt.children(&mut cursor).find(|c| c.kind() == "assignment") else {
            continue;
        };
        let Some(left) = assignment.child_by_field_name("left") else {
            continue;
        };
        if left.kind() != "identifier" || &source[left.byte_range()] != name {
            continue;
        }
        if let Some(right) = assignment.child_by_field_name("right") {
            if right.kind() == "identifier" {
                return Some(source[right.byte_range()].to_string());
            }
        }
    }
    None
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
    fn finds_top_level_function() {
        let source = "def foo():\n    pass\n";
        let tree = parse(source);
        let found = find_qualified(&tree, source, &["foo".to_string()]).unwrap();
        assert!(!found.is_method);
        assert_eq!(found.node.kind(), "function_definition");
    }

    #[test]
    fn finds_class_method() {
        let source = "class Widget:\n    def render(self):\n        pass\n";
        let tree = parse(source);
        let found = find_qualified(&tree, source, &["Widget".to_string(), "render".to_string()]).unwrap();
        assert!(found.is_method);
    }

    #[test]
    fn falls_back_to_nested_function() {
        let source = "def outer():\n    def inner():\n        pass\n    return inner\n";
        let tree = parse(source);
        let found = find_qualified(&tree, source, &["outer".to_string(), "inner".to_string()]).unwrap();
        assert!(found.is_method);
        assert_eq!(found.node.kind(), "function_definition");
    }

    #[test]
    fn resolves_deep_nesting() {
        let source = "class A:\n    def b(self):\n        def c():\n            pass\n        return c\n";
        let tree = parse(source);
        let found = find_qualified(
            &tree,
            source,
            &["A".to_string(), "b".to_string(), "c".to_string()],
        )
        .unwrap();
        assert!(!found.is_method);
    }

    #[test]
    fn dynamic_fallback_follows_class_attribute_assignment() {
        let source = "def real_handler(a, b=1):\n    pass\n\nclass Widget:\n    handler = real_handler\n";
        let tree = parse(source);
        let names = vec!["Widget".to_string(), "handler".to_string()];
        assert!(find_qualified(&tree, source, &names).is_none());
        let found = find_dynamic(&tree, source, &names).unwrap();
        assert!(found.is_method);
        assert_eq!(&source[found.node.byte_range()], "def real_handler(a, b=1):\n    pass");
    }

    #[test]
    fn dynamic_fallback_returns_none_without_a_matching_assignment() {
        let source = "class Widget:\n    pass\n";
        let tree = parse(source);
        let names = vec!["Widget".to_string(), "handler".to_string()];
        assert!(find_dynamic(&tree, source, &names).is_none());
    }

    #[test]
    fn missing_function_returns_none() {
        let source = "def foo():\n    pass\n";
        let tree = parse(source);
        assert!(find_qualified(&tree, source, &["bar".to_string()]).is_none());
    }
}
