use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use tracer_core::Result;

use crate::extract::FunctionRecord;

#[derive(Serialize)]
struct FunctionEntry<'a> {
    body: &'a str,
    start_line: usize,
    file_path: &'a str,
}

/// Writes `functions.json`, `call_graph.json`, and `parent_functions.json`
/// into `out_dir` (the current directory, by convention).
pub fn write_artifacts(
    out_dir: &Path,
    records: &[FunctionRecord],
    graph: &HashMap<String, Vec<String>>,
    roots: &[String],
) -> Result<()> {
    let functions: HashMap<&str, FunctionEntry> = records
        .iter()
        .map(|r| {
            (
                r.canonical_id.as_str(),
                FunctionEntry { body: &r.body, start_line: r.start_line, file_path: &r.file_path },
            )
        })
        .collect();

    std::fs::write(out_dir.join("functions.json"), serde_json::to_string_pretty(&functions)?)?;
    std::fs::write(out_dir.join("call_graph.json"), serde_json::to_string_pretty(graph)?)?;
    std::fs::write(out_dir.join("parent_functions.json"), serde_json::to_string_pretty(roots)?)?;
    Ok(())
}
