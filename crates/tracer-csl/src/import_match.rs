use std::collections::HashSet;

use tree_sitter::{Node, Tree};

/// Which local names might refer to the target function: names it was
/// imported under directly, and module aliases whose attribute access
/// (`module.target(...)`) should also count as a call site.
#[derive(Debug, Default)]
pub struct ImportMatch {
    pub imported_names: HashSet<String>,
    pub imported_modules: HashSet<String>,
}

struct TargetModule {
    full: String,
    short: String,
    package: Option<String>,
}

fn target_module(target_file_rel: &str) -> TargetModule {
    let trimmed = target_file_rel.trim_end_matches(".py");
    let parts: Vec<&str> = trimmed.split('/').collect();
    let full = parts.join(".");
    let short = parts.last().copied().unwrap_or("").to_string();
    let package = if parts.len() > 1 { Some(parts[..parts.len() - 1].join(".")) } else { None };
    TargetModule { full, short, package }
}

fn module_matches(module_name: &str, target: &TargetModule) -> bool {
    module_name == target.full
        || module_name.ends_with(&format!(".{}", target.short))
        || module_name == target.short
        || target.package.as_deref() == Some(module_name)
        || target
            .package
            .as_ref()
            .map(|pkg| module_name.ends_with(&format!(".{}", pkg.rsplit('.').next().unwrap_or(pkg))))
            .unwrap_or(false)
}

fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

/// First pass over the file: collect how the target function might be
/// visible locally, given its defining file's repo-relative path and name.
pub fn collect(tree: &Tree, source: &str, target_function_name: &str, target_file_rel: &str) -> ImportMatch {
    let target = target_module(target_file_rel);
    let mut result = ImportMatch::default();

    let mut cursor = tree.root_node().walk();
    visit(tree.root_node(), &mut cursor, source, target_function_name, &target, &mut result);
    result
}

fn visit(
    node: Node,
    cursor: &mut tree_sitter::TreeCursor,
    source: &str,
    target_function_name: &str,
    target: &TargetModule,
    result: &mut ImportMatch,
) {
    match node.kind() {
        "import_statement" => {
            let mut c = node.walk();
            for child in node.children(&mut c) {
                match child.kind() {
                    "dotted_name" => {
                        result.imported_modules.insert(node_text(child, source).to_string());
                    }
                    "aliased_import" => {
                        if let Some(alias) = child.child_by_field_name("alias") {
                            result.imported_modules.insert(node_text(alias, source).to_string());
                        } else if let Some(name) = child.child_by_field_name("name") {
                            result.imported_modules.insert(node_text(name, source).to_string());
                        }
                    }
                    _ => {}
                }
            }
        }
        "import_from_statement" => {
            if let Some(module_node) = node.child_by_field_name("module_name") {
                let (module_name, is_relative) = match module_node.kind() {
                    "relative_import" => {
                        let text = node_text(module_node, source);
                        (text.trim_start_matches('.').to_string(), true)
                    }
                    _ => (node_text(module_node, source).to_string(), false),
                };

                let matches = module_matches(&module_name, target)
                    || (is_relative && (target.short == module_name || module_name.ends_with(&format!(".{}", target.short))))
                    || (is_relative && module_name.is_empty());

                if matches {
                    let mut c = node.walk();
                    for child in node.children(&mut c) {
                        match child.kind() {
                            "dotted_name" => {
                                let name = node_text(child, source);
                                if name == target_function_name {
                                    result.imported_names.insert(name.to_string());
                                }
                            }
                            "aliased_import" => {
                                let name_node = child.child_by_field_name("name");
                                let alias_node = child.child_by_field_name("alias");
                                if let Some(name_node) = name_node {
                                    if node_text(name_node, source) == target_function_name {
                                        let label = alias_node
                                            .map(|a| node_text(a, source))
                                            .unwrap_or_else(|| node_text(name_node, source));
                                        result.imported_names.insert(label.to_string());
                                    }
                                }
                            }
                            "wildcard_import" => {
                                result.imported_names.insert(target_function_name.to_string());
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
        _ => {}
    }

    if node.child_count() > 0 {
        let mut child_cursor = node.walk();
        for child in node.children(&mut child_cursor) {
            visit(child, cursor, source, target_function_name, target, result);
        }
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
    fn direct_import_is_recognised() {
        let source = "from pkg.analytics import get_metric\n";
        let tree = parse(source);
        let m = collect(&tree, source, "get_metric", "pkg/analytics.py");
        assert!(m.imported_names.contains("get_metric"));
    }

    #[test]
    fn aliased_import_tracks_alias() {
        let source = "from pkg.analytics import get_metric as gm\n";
        let tree = parse(source);
        let m = collect(&tree, source, "get_metric", "pkg/analytics.py");
        assert!(m.imported_names.contains("gm"));
    }

    #[test]
    fn module_import_tracks_alias() {
        let source = "import pkg.analytics as analytics\n";
        let tree = parse(source);
        let m = collect(&tree, source, "get_metric", "pkg/analytics.py");
        assert!(m.imported_modules.contains("analytics"));
    }

    #[test]
    fn relative_import_is_recognised() {
        let source = "from .analytics import get_metric\n";
        let tree = parse(source);
        let m = collect(&tree, source, "get_metric", "pkg/analytics.py");
        assert!(m.imported_names.contains("get_metric"));
    }
}
