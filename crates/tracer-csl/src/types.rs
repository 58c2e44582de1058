use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CallSite {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub call_line: String,
    pub context: Vec<String>,
    pub calling_function: Option<String>,
    pub calling_function_id: Option<String>,
}
