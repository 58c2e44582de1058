use crate::value::Value;

/// The handful of built-ins the target-language subset recognizes as bare
/// names at call sites, resolved only when the call target doesn't match
/// anything in scope. Not a general `builtins` module: no `__builtins__`
/// object, no introspection.
pub fn call(name: &str, args: &[Value]) -> Option<Result<Value, String>> {
    let result = match name {
        "len" => len(args),
        "str" => Ok(Value::str(args.first().map(Value::display).unwrap_or_default())),
        "int" => int(args),
        "float" => float(args),
        "bool" => Ok(Value::Bool(args.first().map(Value::is_truthy).unwrap_or(false))),
        "list" => Ok(Value::list(iterable(args)?)),
        "tuple" => Ok(Value::Tuple(std::rc::Rc::new(iterable(args)?))),
        "range" => range(args),
        "print" => {
            let rendered: Vec<String> = args.iter().map(Value::display).collect();
            println!("{}", rendered.join(" "));
            Ok(Value::None)
        }
        "abs" => abs(args),
        "min" => reduce(args, |a, b| cmp_lt(a, b)),
        "max" => reduce(args, |a, b| !cmp_lt(a, b)),
        "sum" => sum(args),
        _ => return None,
    };
    Some(result)
}

fn iterable(args: &[Value]) -> Result<Vec<Value>, String> {
    match args.first() {
        None => Ok(Vec::new()),
        Some(Value::List(l)) => Ok(l.borrow().clone()),
        Some(Value::Tuple(t)) => Ok((**t).clone()),
        Some(Value::Set(s)) => Ok(s.borrow().clone()),
        Some(Value::Str(s)) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
        Some(other) => Err(format!("{} is not iterable", other.type_name())),
    }
}

fn len(args: &[Value]) -> Result<Value, String> {
    let n = match args.first() {
        Some(Value::Str(s)) => s.chars().count(),
        Some(Value::List(l)) => l.borrow().len(),
        Some(Value::Tuple(t)) => t.len(),
        Some(Value::Dict(d)) => d.borrow().len(),
        Some(Value::Set(s)) => s.borrow().len(),
        Some(other) => return Err(format!("object of type '{}' has no len()", other.type_name())),
        None => return Err("len() takes exactly one argument".to_string()),
    };
    Ok(Value::Int(n as i64))
}

fn int(args: &[Value]) -> Result<Value, String> {
    match args.first() {
        Some(Value::Int(i)) => Ok(Value::Int(*i)),
        Some(Value::Float(f)) => Ok(Value::Int(*f as i64)),
        Some(Value::Bool(b)) => Ok(Value::Int(*b as i64)),
        Some(Value::Str(s)) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| format!("invalid literal for int(): '{s}'")),
        _ => Ok(Value::Int(0)),
    }
}

fn float(args: &[Value]) -> Result<Value, String> {
    match args.first() {
        Some(Value::Int(i)) => Ok(Value::Float(*i as f64)),
        Some(Value::Float(f)) => Ok(Value::Float(*f)),
        Some(Value::Str(s)) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| format!("could not convert string to float: '{s}'")),
        _ => Ok(Value::Float(0.0)),
    }
}

fn range(args: &[Value]) -> Result<Value, String> {
    let ints: Vec<i64> = args.iter().map(|v| v.as_int().ok_or_else(|| "range() arguments must be integers".to_string())).collect::<Result<_, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err("range expected 1 to 3 arguments".to_string()),
    };
    if step == 0 {
        return Err("range() arg 3 must not be zero".to_string());
    }
    let mut values = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < stop {
            values.push(Value::Int(i));
            i += step;
        }
    } else {
        while i > stop {
            values.push(Value::Int(i));
            i += step;
        }
    }
    Ok(Value::list(values))
}

fn abs(args: &[Value]) -> Result<Value, String> {
    match args.first() {
        Some(Value::Int(i)) => Ok(Value::Int(i.abs())),
        Some(Value::Float(f)) => Ok(Value::Float(f.abs())),
        _ => Err("bad operand type for abs()".to_string()),
    }
}

fn cmp_lt(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x < y,
        _ => a.display() < b.display(),
    }
}

fn reduce(args: &[Value], keep_left: impl Fn(&Value, &Value) -> bool) -> Result<Value, String> {
    let items = if args.len() == 1 { iterable(args)? } else { args.to_vec() };
    items
        .into_iter()
        .reduce(|a, b| if keep_left(&a, &b) { a } else { b })
        .ok_or_else(|| "arg is an empty sequence".to_string())
}

fn sum(args: &[Value]) -> Result<Value, String> {
    let items = iterable(args)?;
    let mut total_i = 0i64;
    let mut total_f = 0.0f64;
    let mut is_float = false;
    for item in items {
        match item {
            Value::Float(f) => {
                is_float = true;
                total_f += f;
            }
            Value::Int(i) => total_i += i,
            Value::Bool(b) => total_i += b as i64,
            other => return Err(format!("unsupported operand type(s) for +: 'int' and '{}'", other.type_name())),
        }
    }
    if is_float {
        Ok(Value::Float(total_f + total_i as f64))
    } else {
        Ok(Value::Int(total_i))
    }
}
