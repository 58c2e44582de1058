use std::collections::HashMap;

use crate::value::Value;

/// JSON-safe projection of a runtime value (§4.4.6): primitives pass
/// through, lists/tuples/sets become arrays, dicts are keyed by `str()` of
/// their key, functions/modules/classes become a `"<Typename>"`
/// placeholder, and anything else is rendered by `str()`.
pub fn project(value: &Value) -> serde_json::Value {
    match value {
        Value::None => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.as_str().to_string()),
        Value::List(items) => serde_json::Value::Array(items.borrow().iter().map(project).collect()),
        Value::Tuple(items) => serde_json::Value::Array(items.iter().map(project).collect()),
        Value::Set(items) => serde_json::Value::Array(items.borrow().iter().map(project).collect()),
        Value::Dict(items) => {
            let mut map = serde_json::Map::new();
            for (k, v) in items.borrow().iter() {
                map.insert(k.display(), project(v));
            }
            serde_json::Value::Object(map)
        }
        Value::Function(_) | Value::Builtin(_) | Value::Class(_) | Value::Module(_) => {
            serde_json::Value::String(format!("<{}>", value.type_name()))
        }
        other => serde_json::Value::String(other.display()),
    }
}

/// Snapshot a frame's local bindings, projecting every value.
pub fn project_locals(locals: &HashMap<String, Value>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, value) in locals {
        map.insert(name.clone(), project(value));
    }
    serde_json::Value::Object(map)
}

/// Snapshot a frame's globals after filtering: dunder names, modules,
/// functions, and classes are excluded, leaving only user data bindings.
pub fn project_globals(globals: &HashMap<String, Value>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, value) in globals {
        if name.starts_with("__") && name.ends_with("__") {
            continue;
        }
        if matches!(value, Value::Module(_) | Value::Function(_) | Value::Builtin(_) | Value::Class(_)) {
            continue;
        }
        map.insert(name.clone(), project(value));
    }
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn primitives_pass_through() {
        assert_eq!(project(&Value::Int(3)), serde_json::json!(3));
        assert_eq!(project(&Value::None), serde_json::Value::Null);
        assert_eq!(project(&Value::str("hi")), serde_json::json!("hi"));
    }

    #[test]
    fn dict_keys_are_stringified() {
        let d = Value::dict(vec![(Value::Int(1), Value::str("a"))]);
        let projected = project(&d);
        assert_eq!(projected, serde_json::json!({"1": "a"}));
    }

    #[test]
    fn functions_become_placeholders() {
        let module = crate::test_support::empty_module();
        let f = Value::Function(Rc::new(crate::value::FunctionValue {
            name: "f".to_string(),
            module,
            def_start: 0,
            def_end: 0,
            is_method: false,
            is_module_entry: false,
        }));
        assert_eq!(project(&f), serde_json::json!("<function>"));
    }

    #[test]
    fn globals_filter_drops_dunders_and_callables() {
        let mut globals = HashMap::new();
        globals.insert("__name__".to_string(), Value::str("m"));
        globals.insert("x".to_string(), Value::Int(1));
        let projected = project_globals(&globals);
        assert_eq!(projected, serde_json::json!({"x": 1}));
    }
}
