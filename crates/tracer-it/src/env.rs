use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

pub type Bindings = Rc<RefCell<HashMap<String, Value>>>;

/// A function's local scope plus the module-level globals it closes over.
/// Name resolution checks locals first, then globals, matching ordinary
/// (non-`global`-declared) Python lookup.
#[derive(Clone)]
pub struct Env {
    pub locals: Bindings,
    pub globals: Bindings,
}

impl Env {
    pub fn module_level(globals: Bindings) -> Env {
        Env { locals: globals.clone(), globals }
    }

    pub fn function_level(globals: Bindings) -> Env {
        Env { locals: Rc::new(RefCell::new(HashMap::new())), globals }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.locals.borrow().get(name) {
            return Some(v.clone());
        }
        if !Rc::ptr_eq(&self.locals, &self.globals) {
            if let Some(v) = self.globals.borrow().get(name) {
                return Some(v.clone());
            }
        }
        None
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.locals.borrow_mut().insert(name.into(), value);
    }

    pub fn is_module_level(&self) -> bool {
        Rc::ptr_eq(&self.locals, &self.globals)
    }
}
