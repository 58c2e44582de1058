use tracer_si::Signature;

/// Result of filtering a raw args/kwargs pair against a function's
/// signature (§4.4.2): unknown keyword arguments are dropped, and
/// positional arguments are truncated to the number of parameters not
/// already supplied by a keyword. `missing_required` lists parameters
/// that ended up with neither a positional nor a keyword value and have
/// no default, purely diagnostic.
pub struct Filtered {
    pub args: Vec<serde_json::Value>,
    pub kwargs: serde_json::Map<String, serde_json::Value>,
    pub missing_required: Vec<String>,
}

pub fn filter_arguments(
    sig: &Signature,
    args: Vec<serde_json::Value>,
    kwargs: serde_json::Map<String, serde_json::Value>,
) -> Filtered {
    if sig.params.is_empty() {
        return Filtered { args, kwargs, missing_required: Vec::new() };
    }

    let mut filtered_kwargs = serde_json::Map::new();
    for (k, v) in kwargs {
        if sig.params.iter().any(|p| p == &k) {
            filtered_kwargs.insert(k, v);
        }
    }

    let positional_slots = sig.params.iter().filter(|p| !filtered_kwargs.contains_key(*p)).count();
    let mut filtered_args = args;
    if filtered_args.len() > positional_slots {
        filtered_args.truncate(positional_slots);
    }

    let mut missing_required = Vec::new();
    for (i, param) in sig.params.iter().enumerate() {
        let required = sig.param_required.get(i).copied().unwrap_or(true);
        if !required {
            continue;
        }
        let satisfied_by_kwarg = filtered_kwargs.contains_key(param);
        let satisfied_positionally = i < filtered_args.len();
        if !satisfied_by_kwarg && !satisfied_positionally {
            missing_required.push(param.clone());
        }
    }

    Filtered { args: filtered_args, kwargs: filtered_kwargs, missing_required }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: &[&str], required: &[bool]) -> Signature {
        Signature {
            params: params.iter().map(|s| s.to_string()).collect(),
            param_count: params.len(),
            param_types: vec![None; params.len()],
            param_defaults: vec![None; params.len()],
            param_required: required.to_vec(),
        }
    }

    #[test]
    fn drops_unknown_kwargs() {
        let s = sig(&["x", "y"], &[true, true]);
        let mut kwargs = serde_json::Map::new();
        kwargs.insert("z".to_string(), serde_json::json!(1));
        kwargs.insert("y".to_string(), serde_json::json!(2));
        let filtered = filter_arguments(&s, vec![serde_json::json!(1)], kwargs);
        assert!(!filtered.kwargs.contains_key("z"));
        assert!(filtered.kwargs.contains_key("y"));
    }

    #[test]
    fn truncates_positional_args_when_kwarg_covers_a_param() {
        let s = sig(&["x", "y"], &[true, true]);
        let mut kwargs = serde_json::Map::new();
        kwargs.insert("y".to_string(), serde_json::json!(2));
        let filtered = filter_arguments(&s, vec![serde_json::json!(1), serde_json::json!(99)], kwargs);
        assert_eq!(filtered.args, vec![serde_json::json!(1)]);
    }

    #[test]
    fn reports_missing_required_params() {
        let s = sig(&["x", "y"], &[true, true]);
        let filtered = filter_arguments(&s, vec![serde_json::json!(1)], serde_json::Map::new());
        assert_eq!(filtered.missing_required, vec!["y".to_string()]);
    }
}
