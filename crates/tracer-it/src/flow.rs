use parking_lot::Mutex;

/// One recorded step of execution, linearized into a flow's event log.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TraceEvent {
    pub linear_index: usize,
    pub function: String,
    pub line: usize,
    pub file: String,
    pub locals: serde_json::Value,
    pub globals: serde_json::Value,
    pub event: String,
}

/// A location the caller wants the tracer to stop at: a function name,
/// a line within it, and optionally a specific file to pin the search to
/// (needed when the same line number recurs across files).
#[derive(Debug, Clone)]
pub struct FlowTarget {
    pub function: String,
    pub line: usize,
    pub raw_location: String,
    pub file: Option<String>,
}

impl FlowTarget {
    pub fn label(&self) -> String {
        if self.raw_location.is_empty() {
            format!("{}:{}", self.function, self.line)
        } else {
            self.raw_location.clone()
        }
    }
}

/// The linearized event log for one flow, plus the monotonic cursor into
/// it that remembers how far the caller has already been served.
pub struct FlowRecorder {
    flow_name: String,
    entry_full_id: String,
    args_key: String,
    inner: Mutex<Inner>,
}

struct Inner {
    events: Vec<TraceEvent>,
    last_served_index: Option<usize>,
}

impl FlowRecorder {
    pub fn new(flow_name: impl Into<String>, entry_full_id: impl Into<String>, args_key: impl Into<String>) -> FlowRecorder {
        FlowRecorder {
            flow_name: flow_name.into(),
            entry_full_id: entry_full_id.into(),
            args_key: args_key.into(),
            inner: Mutex::new(Inner { events: Vec::new(), last_served_index: None }),
        }
    }

    pub fn record(&self, function: String, line: usize, file: String, locals: serde_json::Value, globals: serde_json::Value, event: &str) {
        let mut inner = self.inner.lock();
        let linear_index = inner.events.len();
        inner.events.push(TraceEvent { linear_index, function, line, file, locals, globals, event: event.to_string() });
    }

    fn matches(event: &TraceEvent, function: &str, line: usize, file: Option<&str>) -> bool {
        if !function.is_empty() && event.function != function {
            return false;
        }
        if let Some(file) = file {
            if event.file != file {
                return false;
            }
        }
        event.line >= line
    }

    /// Search for the earliest event at or after `line` matching
    /// `function`/`file`, starting just after `after_index` (or from the
    /// start if `None`). With `allow_wrap`, continues from index 0 back up
    /// to `after_index` if nothing matched in the forward pass.
    pub fn find_index(&self, function: &str, line: usize, after_index: Option<usize>, file: Option<&str>, allow_wrap: bool) -> Option<usize> {
        let inner = self.inner.lock();
        if inner.events.is_empty() {
            return None;
        }
        let start = after_index.map(|i| i + 1).unwrap_or(0);
        let start = start.min(inner.events.len());
        for idx in start..inner.events.len() {
            if Self::matches(&inner.events[idx], function, line, file) {
                return Some(idx);
            }
        }
        if allow_wrap {
            for idx in 0..start {
                if Self::matches(&inner.events[idx], function, line, file) {
                    return Some(idx);
                }
            }
        }
        None
    }

    pub fn slice_to_index(&self, index: usize) -> Vec<TraceEvent> {
        let inner = self.inner.lock();
        if index >= inner.events.len() {
            return Vec::new();
        }
        inner.events[..=index].to_vec()
    }

    pub fn mark_served(&self, index: usize) {
        let mut inner = self.inner.lock();
        if inner.last_served_index.map(|i| index > i).unwrap_or(true) {
            inner.last_served_index = Some(index);
        }
    }

    pub fn last_served_index(&self) -> Option<usize> {
        self.inner.lock().last_served_index
    }

    pub fn latest_index(&self) -> Option<usize> {
        let inner = self.inner.lock();
        inner.events.len().checked_sub(1)
    }
}

/// The JSON payload sent back over the control stream for one resolved
/// step: the events up through `target_index`, plus the last one
/// unpacked into top-level `line`/`filename`/`function`/`locals`/`globals`
/// fields for callers that only care about the final stop point.
pub fn build_flow_payload(recorder: &FlowRecorder, target_index: usize, target: &FlowTarget) -> Option<serde_json::Value> {
    let events = recorder.slice_to_index(target_index);
    let last = events.last()?.clone();
    Some(serde_json::json!({
        "event": "line",
        "flow": recorder.flow_name,
        "entry_full_id": recorder.entry_full_id,
        "args_key": recorder.args_key,
        "target_location": target.label(),
        "requested_line": target.line,
        "requested_function": target.function,
        "linear_index": target_index,
        "line": last.line,
        "filename": last.file,
        "function": last.function,
        "locals": last.locals,
        "globals": last.globals,
        "events": events,
        "last_served_index": recorder.last_served_index(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_forward_match_after_cursor() {
        let rec = FlowRecorder::new("flow", "/a.py::f", "{}");
        rec.record("f".into(), 1, "a.py".into(), serde_json::json!({}), serde_json::json!({}), "line");
        rec.record("f".into(), 5, "a.py".into(), serde_json::json!({}), serde_json::json!({}), "line");
        let idx = rec.find_index("f", 5, None, None, false);
        assert_eq!(idx, Some(1));
    }

    #[test]
    fn wraps_when_target_precedes_cursor() {
        let rec = FlowRecorder::new("flow", "/a.py::f", "{}");
        rec.record("f".into(), 1, "a.py".into(), serde_json::json!({}), serde_json::json!({}), "line");
        rec.record("f".into(), 5, "a.py".into(), serde_json::json!({}), serde_json::json!({}), "line");
        rec.mark_served(1);
        assert_eq!(rec.find_index("f", 1, Some(1), None, false), None);
        assert_eq!(rec.find_index("f", 1, Some(1), None, true), Some(0));
    }

    #[test]
    fn payload_carries_full_event_slice() {
        let rec = FlowRecorder::new("flow", "/a.py::f", "{}");
        rec.record("f".into(), 1, "a.py".into(), serde_json::json!({"x": 1}), serde_json::json!({}), "line");
        let target = FlowTarget { function: "f".into(), line: 1, raw_location: "f:1".into(), file: None };
        let payload = build_flow_payload(&rec, 0, &target).unwrap();
        assert_eq!(payload["line"], 1);
        assert_eq!(payload["events"].as_array().unwrap().len(), 1);
    }
}
