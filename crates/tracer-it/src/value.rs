use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use tree_sitter::Tree;

/// A parsed source file the interpreter can load functions and classes
/// from. Function and class values hold a byte range into this tree
/// rather than a borrowed `Node`, so they can outlive the call that found
/// them; `definition_node` re-resolves the node when it's needed.
pub struct SourceModule {
    pub dotted_name: String,
    pub path: PathBuf,
    pub source: String,
    pub tree: Tree,
}

impl SourceModule {
    pub fn definition_node(&self, start_byte: usize, end_byte: usize) -> Option<tree_sitter::Node<'_>> {
        self.tree.root_node().descendant_for_byte_range(start_byte, end_byte)
    }
}

#[derive(Clone)]
pub struct FunctionValue {
    pub name: String,
    pub module: Rc<SourceModule>,
    pub def_start: usize,
    pub def_end: usize,
    /// True for a function found as a class's method; elides a leading
    /// `self` in the same way the static index does.
    pub is_method: bool,
    /// True for the synthetic `<module>` entry point that runs a file's
    /// top-level statements as if it were a zero-argument function. Its
    /// byte range spans the whole source rather than a single
    /// `function_definition` node.
    pub is_module_entry: bool,
}

#[derive(Clone)]
pub struct ClassValue {
    pub name: String,
    pub module: Rc<SourceModule>,
    pub methods: HashMap<String, Rc<FunctionValue>>,
}

#[derive(Clone)]
pub struct InstanceValue {
    pub class: Rc<ClassValue>,
    pub attrs: HashMap<String, Value>,
}

pub type BuiltinFn = fn(&[Value]) -> Result<Value, String>;

#[derive(Clone)]
pub struct BuiltinFunction {
    pub name: String,
    pub func: BuiltinFn,
}

/// A runtime value of the bundled target-language subset. Mutable
/// container kinds use `Rc<RefCell<_>>` to preserve Python's reference
/// (not value) semantics for lists, dicts, and sets.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<String>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<Vec<(Value, Value)>>>),
    Set(Rc<RefCell<Vec<Value>>>),
    Function(Rc<FunctionValue>),
    Builtin(Rc<BuiltinFunction>),
    Class(Rc<ClassValue>),
    Instance(Rc<RefCell<InstanceValue>>),
    Module(Rc<SourceModule>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(Rc::new(s.into()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn dict(items: Vec<(Value, Value)>) -> Value {
        Value::Dict(Rc::new(RefCell::new(items)))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Set(s) => !s.borrow().is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function",
            Value::Class(_) => "type",
            Value::Instance(_) => "object",
            Value::Module(_) => "module",
        }
    }

    /// A `str()`-equivalent rendering, used both for user-facing string
    /// conversion and as the dict-key stringification rule applied during
    /// JSON-safe projection (see `projection.rs`).
    pub fn display(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{f}"),
            Value::Str(s) => s.as_str().to_string(),
            Value::List(items) => {
                let inner: Vec<String> = items.borrow().iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                format!("({})", inner.join(", "))
            }
            Value::Dict(items) => {
                let inner: Vec<String> =
                    items.borrow().iter().map(|(k, v)| format!("{}: {}", k.repr(), v.repr())).collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Set(items) => {
                let inner: Vec<String> = items.borrow().iter().map(Value::repr).collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Function(f) => format!("<function {}>", f.name),
            Value::Builtin(f) => format!("<built-in function {}>", f.name),
            Value::Class(c) => format!("<class {}>", c.name),
            Value::Instance(i) => format!("<{} object>", i.borrow().class.name),
            Value::Module(m) => format!("<module {}>", m.dotted_name),
        }
    }

    fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{s}'"),
            other => other.display(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(*b as i64 as f64),
            _ => None,
        }
    }

    /// Lossless conversion from a JSON value supplied by the control
    /// stream (call arguments, captured locals/globals snapshots) into a
    /// runtime value.
    pub fn from_json(v: serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::str(s),
            serde_json::Value::Array(items) => Value::list(items.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::dict(map.into_iter().map(|(k, v)| (Value::str(k), Value::from_json(v))).collect()),
        }
    }
}
