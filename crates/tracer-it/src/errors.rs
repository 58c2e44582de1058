use crate::value::Value;

/// A raised exception, carrying the message and the formatted frame stack
/// active at the point it was raised.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub message: String,
    pub traceback: Vec<String>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> RuntimeError {
        RuntimeError { message: message.into(), traceback: Vec::new() }
    }

    pub fn with_frame(mut self, frame: impl Into<String>) -> RuntimeError {
        self.traceback.push(frame.into());
        self
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Non-local control transfer produced by statement evaluation. Ordinary
/// expression errors are `Signal::Raise`; `Return`/`Break`/`Continue`
/// unwind the statement walk up to the construct that handles them.
/// `Terminate` unwinds all the way out of the evaluator, used when the
/// controller asks the worker to stop mid-step.
#[derive(Debug, Clone)]
pub enum Signal {
    Return(Value),
    Break,
    Continue,
    Raise(RuntimeError),
    Terminate,
}

pub type EvalResult<T> = Result<T, Signal>;

impl From<RuntimeError> for Signal {
    fn from(err: RuntimeError) -> Signal {
        Signal::Raise(err)
    }
}
