use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracer_core::CanonicalId;

use crate::errors::Signal;
use crate::flow::{build_flow_payload, FlowRecorder, FlowTarget};
use crate::frame::Stack;
use crate::interpreter::{Interpreter, LineHook};
use crate::module;
use crate::value::Value;

const WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// What the worker thread reported back over the ready channel.
pub enum Outcome {
    Stopped,
    Finished(serde_json::Value),
    Error { message: String, traceback: Vec<String> },
}

/// A session-ending failure, carrying the synthesized innermost-to-outermost
/// traceback the way `traceback.format_exc()` would in the original.
#[derive(Debug, Clone)]
pub struct TraceError {
    pub message: String,
    pub traceback: Vec<String>,
}

impl From<String> for TraceError {
    fn from(message: String) -> TraceError {
        TraceError { message, traceback: Vec::new() }
    }
}

/// Blocks the worker thread mid-step, at whatever call depth the evaluator
/// is recursed to, exactly the way `bdb`'s `user_line` hook blocks on a
/// `threading.Event` in the original. Because the worker runs on its own
/// real OS thread, parking here inside the evaluator's own call stack is
/// enough to reproduce that behavior without coroutines.
struct ChannelHook {
    recorder: Arc<FlowRecorder>,
    target: Arc<Mutex<FlowTarget>>,
    pinned_file: Arc<Mutex<Option<PathBuf>>>,
    ready_tx: Sender<Outcome>,
    step_rx: Receiver<FlowTarget>,
}

impl LineHook for ChannelHook {
    fn on_line(&mut self, stack: &Stack) -> Result<(), Signal> {
        let frame = stack.current().expect("line hook fired outside a frame");
        let file = frame.file().to_path_buf();

        if let Some(pin) = self.pinned_file.lock().as_ref() {
            if pin != &file {
                return Ok(());
            }
        }

        let locals = crate::projection::project_locals(&frame.env.locals.borrow());
        let globals = crate::projection::project_globals(&frame.env.globals.borrow());
        self.recorder.record(frame.function_name.clone(), frame.line, file.to_string_lossy().to_string(), locals, globals, "line");

        let target = self.target.lock().clone();
        let in_target_function = target.function.is_empty() || target.function == frame.function_name;
        if frame.line >= target.line && in_target_function {
            if self.ready_tx.send(Outcome::Stopped).is_err() {
                return Err(Signal::Terminate);
            }
            match self.step_rx.recv() {
                Ok(next) => *self.target.lock() = next,
                Err(_) => return Err(Signal::Terminate),
            }
        }
        Ok(())
    }
}

/// Runs one entry point on a dedicated worker thread, pausing it at
/// whichever `(function, line)` target the controller last requested.
pub struct Worker {
    step_tx: Sender<FlowTarget>,
    ready_rx: Receiver<Outcome>,
    pinned_file: Arc<Mutex<Option<PathBuf>>>,
    recorder: Arc<FlowRecorder>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(
        repo_root: PathBuf,
        entry_id: CanonicalId,
        args: Vec<serde_json::Value>,
        kwargs: serde_json::Map<String, serde_json::Value>,
        flow_name: String,
        args_key: String,
        initial_target: FlowTarget,
    ) -> Worker {
        let (step_tx, step_rx) = bounded::<FlowTarget>(1);
        let (ready_tx, ready_rx) = bounded::<Outcome>(1);
        let recorder = Arc::new(FlowRecorder::new(flow_name, entry_id.to_string(), args_key));
        let pinned_file = Arc::new(Mutex::new(initial_target.file.as_ref().map(PathBuf::from)));
        let target = Arc::new(Mutex::new(initial_target));

        let thread_recorder = recorder.clone();
        let thread_pinned = pinned_file.clone();
        let thread_ready_tx = ready_tx.clone();

        let handle = std::thread::spawn(move || {
            let entry = match module::resolve_entry(&repo_root, &entry_id) {
                Ok(entry) => entry,
                Err(e) => {
                    thread_ready_tx.send(Outcome::Error { message: e.to_string(), traceback: Vec::new() }).ok();
                    return;
                }
            };
            let converted_args: Vec<Value> = args.into_iter().map(Value::from_json).collect();
            let converted_kwargs: Vec<(String, Value)> = kwargs.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect();

            let mut hook = ChannelHook { recorder: thread_recorder, target, pinned_file: thread_pinned, ready_tx: thread_ready_tx.clone(), step_rx };
            let mut interpreter = Interpreter::new(repo_root, &mut hook);
            match interpreter.run(entry, converted_args, converted_kwargs) {
                Ok(value) => {
                    thread_ready_tx.send(Outcome::Finished(crate::projection::project(&value))).ok();
                }
                Err(Signal::Terminate) => {}
                Err(Signal::Raise(e)) => {
                    thread_ready_tx.send(Outcome::Error { message: e.message, traceback: e.traceback }).ok();
                }
                Err(_) => {
                    thread_ready_tx.send(Outcome::Error { message: "break/continue escaped the traced function".to_string(), traceback: Vec::new() }).ok();
                }
            }
        });

        Worker { step_tx, ready_rx, pinned_file, recorder, handle: Some(handle) }
    }

    /// Ask the worker to run until it next reaches `target`, re-pinning the
    /// file filter if the target names one.
    pub fn continue_until(&self, target: FlowTarget) {
        if let Some(file) = &target.file {
            *self.pinned_file.lock() = Some(PathBuf::from(file));
        }
        self.step_tx.send(target).ok();
    }

    pub fn wait(&self) -> Result<Outcome, RecvTimeoutError> {
        self.ready_rx.recv_timeout(WAIT_TIMEOUT)
    }

    pub fn recorder(&self) -> &Arc<FlowRecorder> {
        &self.recorder
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                // Unblock a worker parked in the hook so it can unwind and
                // the thread doesn't outlive its session.
                let _ = self.step_tx.send(FlowTarget { function: String::new(), line: usize::MAX, raw_location: String::new(), file: None });
            }
            let _ = handle.join();
        }
    }
}

/// One interactive-tracer session: a worker plus the controller logic
/// (§4.4.5.1/§4.4.7) that turns a requested `(function, line)` into a
/// flow payload, reusing already-recorded events before asking the worker
/// to run further.
pub struct Session {
    worker: Worker,
    entry_full_id: String,
    flow_name: String,
}

impl Session {
    pub fn start(
        repo_root: PathBuf,
        entry_id: CanonicalId,
        args: Vec<serde_json::Value>,
        kwargs: serde_json::Map<String, serde_json::Value>,
        flow_name: String,
        args_key: String,
        initial_target: FlowTarget,
    ) -> Result<(Session, serde_json::Value), TraceError> {
        let entry_full_id = entry_id.to_string();
        let worker = Worker::spawn(repo_root, entry_id, args, kwargs, flow_name.clone(), args_key, initial_target.clone());
        let mut session = Session { worker, entry_full_id, flow_name };
        let payload = session.trace_to_target(initial_target)?;
        Ok((session, payload))
    }

    pub fn trace_to_target(&mut self, target: FlowTarget) -> Result<serde_json::Value, TraceError> {
        let recorder = self.worker.recorder().clone();
        let after = recorder.last_served_index();

        let mut index = recorder.find_index(&target.function, target.line, after, target.file.as_deref(), false);
        if index.is_none() {
            let earlier = recorder.find_index(&target.function, target.line, None, target.file.as_deref(), true);
            if let Some(earlier) = earlier {
                if after.map(|a| earlier <= a).unwrap_or(true) {
                    index = Some(earlier);
                }
            }
        }

        if index.is_none() {
            self.worker.continue_until(target.clone());
            match self.worker.wait() {
                Ok(Outcome::Stopped) => {}
                Ok(Outcome::Finished(value)) => return Ok(serde_json::json!({"event": "finished", "flow": self.flow_name, "entry_full_id": self.entry_full_id, "result": value})),
                Ok(Outcome::Error { message, traceback }) => return Err(TraceError { message, traceback }),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(if self.worker.is_finished() {
                        "function execution thread died before reaching target location".to_string().into()
                    } else {
                        format!("timed out waiting for {}", target.label()).into()
                    });
                }
                Err(RecvTimeoutError::Disconnected) => return Err("worker thread disconnected".to_string().into()),
            }
            index = recorder.find_index(&target.function, target.line, after, target.file.as_deref(), false);
            if index.is_none() {
                index = recorder.latest_index();
            }
        }

        let Some(index) = index else {
            return Err(format!("no events recorded for target {}", target.label()).into());
        };
        recorder.mark_served(index);
        build_flow_payload(&recorder, index, &target).ok_or_else(|| format!("failed to build payload for {}", target.label()).into())
    }
}
