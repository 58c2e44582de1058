use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::extract::FunctionRecord;

static QUALIFIED_CALL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(/[^:]+\.py::[a-zA-Z0-9_]+)\(").unwrap());

/// Directed call graph restricted to the changed-function node set:
/// canonical ID -> canonical IDs of in-set callees. Self-edges — including
/// the one spuriously produced by qualifying a function's own `def` line —
/// are removed.
pub fn build(records: &[FunctionRecord]) -> HashMap<String, Vec<String>> {
    let all_ids: HashSet<&str> = records.iter().map(|r| r.canonical_id.as_str()).collect();
    let mut graph = HashMap::with_capacity(records.len());

    for record in records {
        let mut callees: Vec<String> = QUALIFIED_CALL_RE
            .captures_iter(&record.body)
            .map(|c| c.get(1).unwrap().as_str().to_string())
            .filter(|callee| callee != &record.canonical_id)
            .filter(|callee| all_ids.contains(callee.as_str()))
            .collect();
        callees.sort();
        callees.dedup();
        graph.insert(record.canonical_id.clone(), callees);
    }

    graph
}

/// Nodes with no incoming edge.
pub fn roots(graph: &HashMap<String, Vec<String>>) -> Vec<String> {
    let mut called: HashSet<&str> = HashSet::new();
    for callees in graph.values() {
        called.extend(callees.iter().map(|s| s.as_str()));
    }
    let mut roots: Vec<String> = graph.keys().filter(|id| !called.contains(id.as_str())).cloned().collect();
    roots.sort();
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, body: &str) -> FunctionRecord {
        FunctionRecord {
            canonical_id: id.to_string(),
            body: body.to_string(),
            start_line: 1,
            file_path: "/abs/mod.py".to_string(),
        }
    }

    #[test]
    fn builds_graph_and_finds_roots() {
        let records = vec![
            record("/mod.py::outer", "def /mod.py::outer():\n    /mod.py::inner(x)\n"),
            record("/mod.py::inner", "def /mod.py::inner():\n    pass\n"),
        ];
        let graph = build(&records);
        assert_eq!(graph.get("/mod.py::outer").unwrap(), &vec!["/mod.py::inner".to_string()]);
        assert_eq!(graph.get("/mod.py::inner").unwrap(), &Vec::<String>::new());
        assert_eq!(roots(&graph), vec!["/mod.py::outer".to_string()]);
    }

    #[test]
    fn drops_calls_outside_the_node_set() {
        let records = vec![record("/mod.py::outer", "def /mod.py::outer():\n    external_thing()\n")];
        let graph = build(&records);
        assert_eq!(graph.get("/mod.py::outer").unwrap(), &Vec::<String>::new());
    }
}
