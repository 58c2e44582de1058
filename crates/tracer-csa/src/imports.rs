use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

static FROM_IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^from\s+([\w.]+)\s+import\s+([\w,\s]+)$").unwrap());

/// Alias (or bare imported name) -> fully-dotted source. For `import pkg.mod
/// as alias`, the value is the module (`pkg.mod`); for `from pkg.mod import
/// name`, the value is `pkg.mod.name` so the module path can be recovered
/// by dropping the last segment.
pub type ImportMap = HashMap<String, String>;

/// Line-oriented import parser, deliberately not AST-based: it only looks
/// at `import ...` / `from ... import ...` statement lines, matching the
/// change-set analyser's own textual approach to the rest of the file.
pub fn parse_imports(source: &str) -> ImportMap {
    let mut map = ImportMap::new();
    for raw_line in source.lines() {
        let line = raw_line.trim();
        if let Some(rest) = line.strip_prefix("import ") {
            let mut parts = rest.splitn(2, " as ");
            let module = parts.next().unwrap_or("").trim().to_string();
            let alias = parts
                .next()
                .map(|a| a.trim().to_string())
                .unwrap_or_else(|| module.rsplit('.').next().unwrap_or(&module).to_string());
            map.insert(alias, module);
        } else if line.starts_with("from ") {
            if let Some(caps) = FROM_IMPORT_RE.captures(line) {
                let module = caps.get(1).unwrap().as_str();
                let names = caps.get(2).unwrap().as_str();
                for name in names.split(',') {
                    let name = name.trim();
                    if name.is_empty() {
                        continue;
                    }
                    if let Some((real, alias)) = name.split_once(" as ") {
                        map.insert(alias.trim().to_string(), format!("{module}.{}", real.trim()));
                    } else {
                        map.insert(name.to_string(), format!("{module}.{name}"));
                    }
                }
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_import_with_alias() {
        let map = parse_imports("import numpy as np\n");
        assert_eq!(map.get("np"), Some(&"numpy".to_string()));
    }

    #[test]
    fn parses_plain_import_without_alias() {
        let map = parse_imports("import pkg.mod\n");
        assert_eq!(map.get("mod"), Some(&"pkg.mod".to_string()));
    }

    #[test]
    fn parses_from_import_multiple_names() {
        let map = parse_imports("from pkg.mod import foo, bar as baz\n");
        assert_eq!(map.get("foo"), Some(&"pkg.mod.foo".to_string()));
        assert_eq!(map.get("baz"), Some(&"pkg.mod.bar".to_string()));
    }

    #[test]
    fn parses_relative_from_import() {
        let map = parse_imports("from .sibling import helper\n");
        assert_eq!(map.get("helper"), Some(&".sibling.helper".to_string()));
    }
}
