use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::imports::ImportMap;

static CALL_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Za-z_]\w*\s*\(").unwrap());

/// Rewrites every call-expression token in a line to a canonical-ID-prefixed
/// call, trying each tier in turn: local definition in the same file, the
/// file's own import map (including relative imports resolved against the
/// containing package), the repository-wide name index, and finally
/// leaving the call unqualified.
pub struct Qualifier<'a> {
    pub import_map: &'a ImportMap,
    pub local_funcs: &'a HashSet<String>,
    pub current_file_rel: &'a str,
    pub name_index: &'a HashMap<String, Vec<String>>,
}

impl<'a> Qualifier<'a> {
    fn current_package(&self) -> &str {
        match self.current_file_rel.rfind('/') {
            Some(idx) => &self.current_file_rel[..idx],
            None => "",
        }
    }

    fn qualify_name(&self, name: &str) -> String {
        if self.local_funcs.contains(name) {
            return format!("/{}::{name}", self.current_file_rel);
        }

        if let Some(module) = self.import_map.get(name) {
            let full_module_path = if let Some(relative) = module.strip_prefix('.') {
                let first_component = relative.split('.').next().unwrap_or(relative);
                let pkg = self.current_package();
                if pkg.is_empty() {
                    format!("{first_component}.py")
                } else {
                    format!("{pkg}/{first_component}.py")
                }
            } else {
                let mut parts: Vec<&str> = module.split('.').collect();
                parts.pop();
                format!("{}.py", parts.join("/"))
            };
            return format!("/{full_module_path}::{name}");
        }

        if let Some(candidates) = self.name_index.get(name) {
            if candidates.len() == 1 {
                return format!("/{}::{name}", candidates[0]);
            }
        }

        name.to_string()
    }

    pub fn qualify_line(&self, line: &str) -> String {
        CALL_TOKEN_RE
            .replace_all(line, |caps: &regex::Captures| {
                let matched = caps.get(0).unwrap().as_str();
                let name = matched.trim_end().trim_end_matches('(').trim();
                format!("{}(", self.qualify_name(name))
            })
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashset(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn qualifies_local_call() {
        let imports = ImportMap::new();
        let locals = hashset(&["helper"]);
        let name_index = HashMap::new();
        let q = Qualifier {
            import_map: &imports,
            local_funcs: &locals,
            current_file_rel: "pkg/mod.py",
            name_index: &name_index,
        };
        assert_eq!(q.qualify_line("    helper(x)"), "    /pkg/mod.py::helper(x)");
    }

    #[test]
    fn qualifies_absolute_import() {
        let mut imports = ImportMap::new();
        imports.insert("util".to_string(), "pkg.utils.util".to_string());
        let locals = HashSet::new();
        let name_index = HashMap::new();
        let q = Qualifier {
            import_map: &imports,
            local_funcs: &locals,
            current_file_rel: "pkg/mod.py",
            name_index: &name_index,
        };
        assert_eq!(q.qualify_line("util(1)"), "/pkg/utils.py::util(1)");
    }

    #[test]
    fn qualifies_relative_import_against_package() {
        let mut imports = ImportMap::new();
        imports.insert("helper".to_string(), ".sibling.helper".to_string());
        let locals = HashSet::new();
        let name_index = HashMap::new();
        let q = Qualifier {
            import_map: &imports,
            local_funcs: &locals,
            current_file_rel: "pkg/mod.py",
            name_index: &name_index,
        };
        assert_eq!(q.qualify_line("helper()"), "/pkg/sibling.py::helper(");
    }

    #[test]
    fn falls_back_to_name_index() {
        let imports = ImportMap::new();
        let locals = HashSet::new();
        let mut name_index = HashMap::new();
        name_index.insert("only_here".to_string(), vec!["other/file.py".to_string()]);
        let q = Qualifier {
            import_map: &imports,
            local_funcs: &locals,
            current_file_rel: "pkg/mod.py",
            name_index: &name_index,
        };
        assert_eq!(q.qualify_line("only_here()"), "/other/file.py::only_here(");
    }

    #[test]
    fn unresolvable_call_is_left_unqualified() {
        let imports = ImportMap::new();
        let locals = HashSet::new();
        let name_index = HashMap::new();
        let q = Qualifier {
            import_map: &imports,
            local_funcs: &locals,
            current_file_rel: "pkg/mod.py",
            name_index: &name_index,
        };
        assert_eq!(q.qualify_line("mystery(1)"), "mystery(1)");
    }
}
