use std::path::PathBuf;
use std::sync::mpsc;

use tracer_core::CanonicalId;

use crate::errors::Signal;
use crate::frame::Stack;
use crate::interpreter::{Interpreter, LineHook, NoopHook};
use crate::module;
use crate::static_args::{self, ExtractedArgs};
use crate::value::Value;

/// Pauses the caller at `call_line` and, rather than recording the step
/// into a flow, evaluates the call's argument expressions right there
/// against the frame's live bindings, then tells the interpreter to stop.
struct PauseAndExtractHook {
    repo_root: PathBuf,
    caller_file: PathBuf,
    call_line: usize,
    fn_name: String,
    result: Option<Result<(Vec<serde_json::Value>, serde_json::Map<String, serde_json::Value>), String>>,
}

impl LineHook for PauseAndExtractHook {
    fn on_line(&mut self, stack: &Stack) -> Result<(), Signal> {
        if self.result.is_some() {
            return Err(Signal::Terminate);
        }
        let frame = stack.current().expect("line hook fired outside a frame");
        if frame.file() != self.caller_file.as_path() || frame.line != self.call_line {
            return Ok(());
        }

        let mut noop = NoopHook;
        let mut sub_interpreter = Interpreter::new(self.repo_root.clone(), &mut noop);
        self.result = Some(static_args::evaluate_call_line(
            &mut sub_interpreter,
            &self.caller_file,
            self.call_line,
            &self.fn_name,
            frame.env.clone(),
        ));
        Err(Signal::Terminate)
    }
}

/// The `--extract-call-args` runtime-context mode: runs the caller
/// function up to `call_line` under the same evaluator the interactive
/// tracer uses, then evaluates the call's argument expressions against
/// the real bindings captured at that point, rather than a JSON-projected
/// snapshot, before filtering against the callee's signature. Runs on its
/// own thread since the interpreter's values are `Rc`-based and must stay
/// off the calling thread.
pub fn extract(
    repo_root: &std::path::Path,
    caller_id: &CanonicalId,
    caller_args: Vec<serde_json::Value>,
    caller_kwargs: serde_json::Map<String, serde_json::Value>,
    call_line: usize,
    callee_id: &CanonicalId,
) -> Result<ExtractedArgs, String> {
    let repo_root = repo_root.to_path_buf();
    let caller_id = caller_id.clone();
    let caller_file = repo_root.join(caller_id.path());
    let fn_name = callee_id.leaf().to_string();
    let (tx, rx) = mpsc::channel::<Result<(Vec<serde_json::Value>, serde_json::Map<String, serde_json::Value>), String>>();

    let thread_repo_root = repo_root.clone();
    let handle = std::thread::spawn(move || {
        let entry = match module::resolve_entry(&thread_repo_root, &caller_id) {
            Ok(entry) => entry,
            Err(e) => {
                tx.send(Err(e.to_string())).ok();
                return;
            }
        };
        let args: Vec<Value> = caller_args.into_iter().map(Value::from_json).collect();
        let kwargs: Vec<(String, Value)> = caller_kwargs.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect();

        let mut hook = PauseAndExtractHook { repo_root: thread_repo_root.clone(), caller_file, call_line, fn_name, result: None };
        let run_result = Interpreter::new(thread_repo_root, &mut hook).run(entry, args, kwargs);

        let outcome = hook.result.take().unwrap_or_else(|| match run_result {
            Err(Signal::Raise(e)) => Err(e.message),
            _ => Err(format!("caller never reached line {call_line}")),
        });
        tx.send(outcome).ok();
    });

    let (args, kwargs) = rx.recv().map_err(|_| "worker thread disconnected".to_string())??;
    handle.join().ok();

    if let Ok(sig) = tracer_si::lookup_signature(&repo_root, callee_id) {
        let filtered = crate::argfilter::filter_arguments(&sig, args, kwargs);
        if !filtered.missing_required.is_empty() {
            return Err(format!("missing required parameter(s): {}", filtered.missing_required.join(", ")));
        }
        return Ok(ExtractedArgs { args: filtered.args, kwargs: filtered.kwargs });
    }
    Ok(ExtractedArgs { args, kwargs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn evaluates_args_from_live_caller_bindings() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("callee.py"), "def handle(x):\n    pass\n").unwrap();
        fs::write(
            dir.path().join("caller.py"),
            "def outer(n):\n    total = n + 1\n    handle(total)\n",
        )
        .unwrap();

        let caller_id = CanonicalId::new("caller.py", vec!["outer".to_string()]).unwrap();
        let callee_id = CanonicalId::new("callee.py", vec!["handle".to_string()]).unwrap();

        let extracted = extract(dir.path(), &caller_id, vec![serde_json::json!(4)], serde_json::Map::new(), 3, &callee_id).unwrap();
        assert_eq!(extracted.args, vec![serde_json::json!(5)]);
    }

    #[test]
    fn errors_when_required_param_is_unbound() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("callee.py"), "def handle(x, y):\n    pass\n").unwrap();
        fs::write(dir.path().join("caller.py"), "def outer(n):\n    handle(n)\n").unwrap();
        let caller_id = CanonicalId::new("caller.py", vec!["outer".to_string()]).unwrap();
        let callee_id = CanonicalId::new("callee.py", vec!["handle".to_string()]).unwrap();
        let result = extract(dir.path(), &caller_id, vec![serde_json::json!(4)], serde_json::Map::new(), 2, &callee_id);
        assert!(result.is_err());
    }

    #[test]
    fn errors_when_caller_never_reaches_the_line() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("callee.py"), "def handle(x):\n    pass\n").unwrap();
        fs::write(dir.path().join("caller.py"), "def outer():\n    pass\n").unwrap();
        let caller_id = CanonicalId::new("caller.py", vec!["outer".to_string()]).unwrap();
        let callee_id = CanonicalId::new("callee.py", vec!["handle".to_string()]).unwrap();
        let result = extract(dir.path(), &caller_id, vec![], serde_json::Map::new(), 5, &callee_id);
        assert!(result.is_err());
    }
}
