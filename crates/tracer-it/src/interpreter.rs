use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use tree_sitter::Node;

use crate::builtins;
use crate::env::{Bindings, Env};
use crate::errors::{RuntimeError, Signal};
use crate::frame::{CallFrame, Stack};
use crate::module;
use crate::value::{ClassValue, FunctionValue, InstanceValue, SourceModule, Value};

type EvalResult<T> = Result<T, Signal>;

/// Invoked once per executed statement, at the point a real debugger would
/// fire `user_line`. The interactive tracer's worker blocks inside this
/// callback waiting for the next step request; static modes pass a no-op.
pub trait LineHook {
    fn on_line(&mut self, stack: &Stack) -> EvalResult<()>;
}

pub struct NoopHook;

impl LineHook for NoopHook {
    fn on_line(&mut self, _stack: &Stack) -> EvalResult<()> {
        Ok(())
    }
}

fn err<T>(message: impl Into<String>) -> EvalResult<T> {
    Err(Signal::Raise(RuntimeError::new(message)))
}

/// A tree-walking evaluator over the bundled target-language subset.
/// Deliberately not full CPython: no generators, no decorators, no
/// comprehensions, no multiple inheritance, a two-level (locals/globals)
/// scope model rather than full lexical closures. See `DESIGN.md`.
pub struct Interpreter<'a> {
    pub repo_root: PathBuf,
    pub stack: Stack,
    hook: &'a mut dyn LineHook,
    module_globals: HashMap<PathBuf, Bindings>,
}

impl<'a> Interpreter<'a> {
    pub fn new(repo_root: impl Into<PathBuf>, hook: &'a mut dyn LineHook) -> Interpreter<'a> {
        Interpreter { repo_root: repo_root.into(), stack: Stack::new(), hook, module_globals: HashMap::new() }
    }

    fn globals_for(&mut self, module: &Rc<SourceModule>) -> Bindings {
        self.module_globals
            .entry(module.path.clone())
            .or_insert_with(|| Rc::new(RefCell::new(HashMap::new())))
            .clone()
    }

    fn line_of(node: Node) -> usize {
        node.start_position().row + 1
    }

    fn fire_hook(&mut self, line: usize) -> EvalResult<()> {
        if let Some(frame) = self.stack.current_mut() {
            frame.set_line(line);
        }
        self.hook.on_line(&self.stack)
    }

    pub fn run(&mut self, entry: Rc<FunctionValue>, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EvalResult<Value> {
        self.call_function(entry, args, kwargs)
    }

    /// Evaluate a single standalone expression node against a caller-built
    /// `Env`, without pushing a call frame. Used by the extract-args modes
    /// to evaluate a call's argument expressions against a captured
    /// locals/globals snapshot rather than live execution state.
    pub fn eval_in_env(&mut self, node: Node, module: &Rc<SourceModule>, env: Env) -> EvalResult<Value> {
        self.eval_expr(node, module, env)
    }

    pub fn call_function(&mut self, func: Rc<FunctionValue>, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EvalResult<Value> {
        if self.stack.depth() > 300 {
            return err("maximum recursion depth exceeded");
        }
        let module = func.module.clone();
        let globals = self.globals_for(&module);

        if func.is_module_entry {
            let env = Env::module_level(globals);
            self.stack.push(CallFrame::new("<module>", module.clone(), env));
            let result = self.exec_block(module.tree.root_node(), &module);
            self.stack.pop();
            return match result {
                Ok(()) | Err(Signal::Break) | Err(Signal::Continue) => Ok(Value::None),
                Err(Signal::Return(v)) => Ok(v),
                Err(Signal::Raise(e)) => Err(Signal::Raise(e.with_frame("<module>"))),
                Err(other) => Err(other),
            };
        }

        let node = module
            .definition_node(func.def_start, func.def_end)
            .ok_or_else(|| Signal::Raise(RuntimeError::new(format!("could not resolve body of {}", func.name))))?;
        let body = node.child_by_field_name("body").ok_or_else(|| Signal::Raise(RuntimeError::new("function has no body")))?;

        let env = Env::function_level(globals);
        self.bind_params(node.child_by_field_name("parameters"), &module, &env, args, kwargs)?;
        self.stack.push(CallFrame::new(func.name.clone(), module.clone(), env));
        let result = self.exec_block(body, &module);
        self.stack.pop();
        match result {
            Ok(()) => Ok(Value::None),
            Err(Signal::Return(v)) => Ok(v),
            Err(Signal::Raise(e)) => Err(Signal::Raise(e.with_frame(func.name.clone()))),
            Err(other) => Err(other),
        }
    }

    fn param_name<'s>(node: Node<'s>, source: &'s str) -> Option<&'s str> {
        node.child_by_field_name("name")
            .or_else(|| {
                let mut cursor = node.walk();
                node.children(&mut cursor)
                    .find(|c| matches!(c.kind(), "identifier" | "list_splat_pattern" | "dictionary_splat_pattern"))
            })
            .map(|n| &source[n.byte_range()])
    }

    fn bind_params(&mut self, params_node: Option<Node>, module: &Rc<SourceModule>, env: &Env, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EvalResult<()> {
        let Some(params_node) = params_node else { return Ok(()) };
        let source = module.source.clone();
        let mut kwargs_map: HashMap<String, Value> = kwargs.into_iter().collect();
        let mut positional = args.into_iter();
        let mut cursor = params_node.walk();

        for param in params_node.named_children(&mut cursor) {
            match param.kind() {
                "identifier" => {
                    let name = source[param.byte_range()].to_string();
                    let value = positional
                        .next()
                        .or_else(|| kwargs_map.remove(&name))
                        .ok_or_else(|| Signal::Raise(RuntimeError::new(format!("missing required argument: '{name}'"))))?;
                    env.set(name, value);
                }
                "typed_parameter" => {
                    let Some(name) = Self::param_name(param, &source) else { continue };
                    let name = name.to_string();
                    let value = positional
                        .next()
                        .or_else(|| kwargs_map.remove(&name))
                        .ok_or_else(|| Signal::Raise(RuntimeError::new(format!("missing required argument: '{name}'"))))?;
                    env.set(name, value);
                }
                "default_parameter" | "typed_default_parameter" => {
                    let Some(name) = Self::param_name(param, &source) else { continue };
                    let name = name.to_string();
                    let value = if let Some(v) = positional.next() {
                        v
                    } else if let Some(v) = kwargs_map.remove(&name) {
                        v
                    } else {
                        let default_node = param
                            .child_by_field_name("value")
                            .ok_or_else(|| Signal::Raise(RuntimeError::new(format!("parameter '{name}' has no default"))))?;
                        self.eval_expr(default_node, module, env)?
                    };
                    env.set(name, value);
                }
                "list_splat_pattern" => {
                    if let Some(name) = Self::param_name(param, &source) {
                        let rest: Vec<Value> = positional.by_ref().collect();
                        env.set(name.to_string(), Value::list(rest));
                    }
                }
                "dictionary_splat_pattern" => {
                    if let Some(name) = Self::param_name(param, &source) {
                        let rest: Vec<(Value, Value)> = kwargs_map.drain().map(|(k, v)| (Value::str(k), v)).collect();
                        env.set(name.to_string(), Value::dict(rest));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn exec_block(&mut self, block: Node, module: &Rc<SourceModule>) -> EvalResult<()> {
        let mut cursor = block.walk();
        for stmt in block.named_children(&mut cursor) {
            if matches!(stmt.kind(), "comment" | "line_continuation") {
                continue;
            }
            self.fire_hook(Self::line_of(stmt))?;
            self.exec_statement(stmt, module)?;
        }
        Ok(())
    }

    fn env(&self) -> &Env {
        &self.stack.current().expect("statement executed outside a frame").env
    }

    fn exec_statement(&mut self, node: Node, module: &Rc<SourceModule>) -> EvalResult<()> {
        match node.kind() {
            "expression_statement" => {
                if let Some(expr) = node.named_child(0) {
                    self.eval_expr(expr, module, self.env().clone_handle())?;
                }
                Ok(())
            }
            "assignment" => self.exec_assignment(node, module),
            "augmented_assignment" => self.exec_augmented_assignment(node, module),
            "if_statement" => self.exec_if(node, module),
            "while_statement" => self.exec_while(node, module),
            "for_statement" => self.exec_for(node, module),
            "return_statement" => {
                let value = match node.named_child(0) {
                    Some(expr) => self.eval_expr(expr, module, self.env().clone_handle())?,
                    None => Value::None,
                };
                Err(Signal::Return(value))
            }
            "break_statement" => Err(Signal::Break),
            "continue_statement" => Err(Signal::Continue),
            "pass_statement" => Ok(()),
            "function_definition" => {
                let name_node = node.child_by_field_name("name").ok_or_else(|| Signal::Raise(RuntimeError::new("function definition missing name")))?;
                let name = module.source[name_node.byte_range()].to_string();
                let func = Rc::new(FunctionValue {
                    name: name.clone(),
                    module: module.clone(),
                    def_start: node.start_byte(),
                    def_end: node.end_byte(),
                    is_method: false,
                    is_module_entry: false,
                });
                self.env().set(name, Value::Function(func));
                Ok(())
            }
            "class_definition" => self.exec_class_def(node, module),
            "raise_statement" => {
                let message = match node.named_child(0) {
                    Some(expr) => self.eval_expr(expr, module, self.env().clone_handle())?.display(),
                    None => "exception raised".to_string(),
                };
                Err(Signal::Raise(RuntimeError::new(message)))
            }
            "try_statement" => self.exec_try(node, module),
            "import_statement" | "import_from_statement" => self.exec_import(node, module),
            "comment" => Ok(()),
            other => err(format!("unsupported statement: {other}")),
        }
    }

    fn exec_class_def(&mut self, node: Node, module: &Rc<SourceModule>) -> EvalResult<()> {
        let name_node = node.child_by_field_name("name").ok_or_else(|| Signal::Raise(RuntimeError::new("class definition missing name")))?;
        let name = module.source[name_node.byte_range()].to_string();
        let mut methods = HashMap::new();
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for item in body.named_children(&mut cursor) {
                if item.kind() == "function_definition" {
                    if let Some(method_name_node) = item.child_by_field_name("name") {
                        let method_name = module.source[method_name_node.byte_range()].to_string();
                        methods.insert(
                            method_name.clone(),
                            Rc::new(FunctionValue {
                                name: method_name,
                                module: module.clone(),
                                def_start: item.start_byte(),
                                def_end: item.end_byte(),
                                is_method: true,
                                is_module_entry: false,
                            }),
                        );
                    }
                }
            }
        }
        let class = Rc::new(ClassValue { name: name.clone(), module: module.clone(), methods });
        self.env().set(name, Value::Class(class));
        Ok(())
    }

    fn exec_assignment(&mut self, node: Node, module: &Rc<SourceModule>) -> EvalResult<()> {
        let left = node.child_by_field_name("left").ok_or_else(|| Signal::Raise(RuntimeError::new("assignment missing target")))?;
        let right = node.child_by_field_name("right").ok_or_else(|| Signal::Raise(RuntimeError::new("assignment missing value")))?;
        let value = self.eval_expr(right, module, self.env().clone_handle())?;
        self.assign_target(left, module, value)
    }

    fn assign_target(&mut self, target: Node, module: &Rc<SourceModule>, value: Value) -> EvalResult<()> {
        match target.kind() {
            "identifier" => {
                let name = module.source[target.byte_range()].to_string();
                self.env().set(name, value);
                Ok(())
            }
            "attribute" => {
                let object_node = target.child_by_field_name("object").ok_or_else(|| Signal::Raise(RuntimeError::new("attribute target missing object")))?;
                let attr_node = target.child_by_field_name("attribute").ok_or_else(|| Signal::Raise(RuntimeError::new("attribute target missing name")))?;
                let attr = module.source[attr_node.byte_range()].to_string();
                let object = self.eval_expr(object_node, module, self.env().clone_handle())?;
                match object {
                    Value::Instance(inst) => {
                        inst.borrow_mut().attrs.insert(attr, value);
                        Ok(())
                    }
                    other => err(format!("'{}' object has no attributes to assign", other.type_name())),
                }
            }
            "subscript" => {
                let value_node = target.child_by_field_name("value").ok_or_else(|| Signal::Raise(RuntimeError::new("subscript target missing value")))?;
                let index_node = target.child_by_field_name("subscript").ok_or_else(|| Signal::Raise(RuntimeError::new("subscript target missing index")))?;
                let container = self.eval_expr(value_node, module, self.env().clone_handle())?;
                let index = self.eval_expr(index_node, module, self.env().clone_handle())?;
                match container {
                    Value::List(items) => {
                        let idx = index.as_int().ok_or_else(|| Signal::Raise(RuntimeError::new("list indices must be integers")))?;
                        let mut items = items.borrow_mut();
                        let idx = normalize_index(idx, items.len())?;
                        if idx >= items.len() {
                            return err("list assignment index out of range");
                        }
                        items[idx] = value;
                        Ok(())
                    }
                    Value::Dict(items) => {
                        let mut items = items.borrow_mut();
                        if let Some(slot) = items.iter_mut().find(|(k, _)| values_equal(k, &index)) {
                            slot.1 = value;
                        } else {
                            items.push((index, value));
                        }
                        Ok(())
                    }
                    other => err(format!("'{}' object does not support item assignment", other.type_name())),
                }
            }
            "tuple" | "pattern_list" => {
                let values = match value {
                    Value::Tuple(ref t) => (**t).clone(),
                    Value::List(ref l) => l.borrow().clone(),
                    other => return err(format!("cannot unpack non-iterable {} object", other.type_name())),
                };
                let mut cursor = target.walk();
                let targets: Vec<Node> = target.named_children(&mut cursor).collect();
                if targets.len() != values.len() {
                    return err(format!("cannot unpack {} values into {} targets", values.len(), targets.len()));
                }
                for (t, v) in targets.into_iter().zip(values.into_iter()) {
                    self.assign_target(t, module, v)?;
                }
                Ok(())
            }
            other => err(format!("unsupported assignment target: {other}")),
        }
    }

    fn exec_augmented_assignment(&mut self, node: Node, module: &Rc<SourceModule>) -> EvalResult<()> {
        let left = node.child_by_field_name("left").ok_or_else(|| Signal::Raise(RuntimeError::new("augmented assignment missing target")))?;
        let right = node.child_by_field_name("right").ok_or_else(|| Signal::Raise(RuntimeError::new("augmented assignment missing value")))?;
        let operator_node = node.child_by_field_name("operator").ok_or_else(|| Signal::Raise(RuntimeError::new("augmented assignment missing operator")))?;
        let operator = module.source[operator_node.byte_range()].trim_end_matches('=').to_string();
        let current = self.eval_expr(left, module, self.env().clone_handle())?;
        let rhs = self.eval_expr(right, module, self.env().clone_handle())?;
        let updated = apply_binary_op(&operator, &current, &rhs)?;
        self.assign_target(left, module, updated)
    }

    fn exec_if(&mut self, node: Node, module: &Rc<SourceModule>) -> EvalResult<()> {
        let condition = node.child_by_field_name("condition").ok_or_else(|| Signal::Raise(RuntimeError::new("if missing condition")))?;
        let consequence = node.child_by_field_name("consequence").ok_or_else(|| Signal::Raise(RuntimeError::new("if missing body")))?;
        if self.eval_expr(condition, module, self.env().clone_handle())?.is_truthy() {
            return self.exec_block(consequence, module);
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "elif_clause" => {
                    let cond = child.child_by_field_name("condition").ok_or_else(|| Signal::Raise(RuntimeError::new("elif missing condition")))?;
                    let body = child.child_by_field_name("consequence").ok_or_else(|| Signal::Raise(RuntimeError::new("elif missing body")))?;
                    if self.eval_expr(cond, module, self.env().clone_handle())?.is_truthy() {
                        return self.exec_block(body, module);
                    }
                }
                "else_clause" => {
                    let body = child.child_by_field_name("body").ok_or_else(|| Signal::Raise(RuntimeError::new("else missing body")))?;
                    return self.exec_block(body, module);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn exec_while(&mut self, node: Node, module: &Rc<SourceModule>) -> EvalResult<()> {
        let condition = node.child_by_field_name("condition").ok_or_else(|| Signal::Raise(RuntimeError::new("while missing condition")))?;
        let body = node.child_by_field_name("body").ok_or_else(|| Signal::Raise(RuntimeError::new("while missing body")))?;
        loop {
            if !self.eval_expr(condition, module, self.env().clone_handle())?.is_truthy() {
                break;
            }
            match self.exec_block(body, module) {
                Ok(()) => {}
                Err(Signal::Break) => break,
                Err(Signal::Continue) => continue,
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    fn exec_for(&mut self, node: Node, module: &Rc<SourceModule>) -> EvalResult<()> {
        let target = node.child_by_field_name("left").ok_or_else(|| Signal::Raise(RuntimeError::new("for missing target")))?;
        let iterable_node = node.child_by_field_name("right").ok_or_else(|| Signal::Raise(RuntimeError::new("for missing iterable")))?;
        let body = node.child_by_field_name("body").ok_or_else(|| Signal::Raise(RuntimeError::new("for missing body")))?;
        let iterable = self.eval_expr(iterable_node, module, self.env().clone_handle())?;
        let items = iterate(&iterable)?;
        for item in items {
            self.assign_target(target, module, item)?;
            match self.exec_block(body, module) {
                Ok(()) => {}
                Err(Signal::Break) => break,
                Err(Signal::Continue) => continue,
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    fn exec_try(&mut self, node: Node, module: &Rc<SourceModule>) -> EvalResult<()> {
        let body = node.child_by_field_name("body").ok_or_else(|| Signal::Raise(RuntimeError::new("try missing body")))?;
        let result = self.exec_block(body, module);
        let Err(Signal::Raise(error)) = result else { return result };

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "except_clause" {
                let handler_body = child.child_by_field_name("body").or_else(|| {
                    let mut inner = child.walk();
                    child.named_children(&mut inner).filter(|c| c.kind() == "block").last()
                });
                let Some(handler_body) = handler_body else { continue };
                if let Some(name_node) = child.child_by_field_name("name") {
                    let name = module.source[name_node.byte_range()].to_string();
                    self.env().set(name, Value::str(error.message.clone()));
                }
                return self.exec_block(handler_body, module);
            }
        }
        Err(Signal::Raise(error))
    }

    fn exec_import(&mut self, node: Node, module: &Rc<SourceModule>) -> EvalResult<()> {
        // Target-language modules are loaded lazily on attribute access
        // through `call_attribute`; a bare `import`/`from import` only
        // needs to bind a placeholder so later name lookups don't fail.
        let module_name_node = node.child_by_field_name("module_name");
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if Some(child) == module_name_node {
                continue;
            }
            if matches!(child.kind(), "dotted_name" | "aliased_import" | "identifier") {
                let bound_name = match child.kind() {
                    "aliased_import" => child.child_by_field_name("alias").map(|n| module.source[n.byte_range()].to_string()),
                    _ => {
                        let text = &module.source[child.byte_range()];
                        text.split('.').next().map(|s| s.to_string())
                    }
                };
                if let Some(name) = bound_name {
                    let rel_path = format!("{}.py", name.replace('.', "/"));
                    if module::is_importable_file(&self.repo_root, &name).is_some() {
                        if let Ok(imported) = module::import_by_path(&self.repo_root, &rel_path) {
                            self.env().set(name, Value::Module(imported));
                            continue;
                        }
                    }
                    self.env().set(name, Value::None);
                }
            }
        }
        Ok(())
    }

    fn eval_expr(&mut self, node: Node, module: &Rc<SourceModule>, env: Env) -> EvalResult<Value> {
        let source = module.source.as_str();
        match node.kind() {
            "identifier" => {
                let name = &source[node.byte_range()];
                env.get(name).ok_or_else(|| Signal::Raise(RuntimeError::new(format!("name '{name}' is not defined"))))
            }
            "integer" => source[node.byte_range()].replace('_', "").parse::<i64>().map(Value::Int).map_err(|_| Signal::Raise(RuntimeError::new("invalid integer literal"))),
            "float" => source[node.byte_range()].replace('_', "").parse::<f64>().map(Value::Float).map_err(|_| Signal::Raise(RuntimeError::new("invalid float literal"))),
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "none" => Ok(Value::None),
            "string" => Ok(Value::str(string_literal_text(node, source))),
            "parenthesized_expression" => {
                let inner = node.named_child(0).ok_or_else(|| Signal::Raise(RuntimeError::new("empty parenthesized expression")))?;
                self.eval_expr(inner, module, env)
            }
            "unary_operator" => {
                let operator = &source[node.child_by_field_name("operator").ok_or_else(|| Signal::Raise(RuntimeError::new("unary operator missing operator")))?.byte_range()];
                let argument = node.child_by_field_name("argument").ok_or_else(|| Signal::Raise(RuntimeError::new("unary operator missing argument")))?;
                let value = self.eval_expr(argument, module, env)?;
                apply_unary_op(operator, &value).map_err(|e| Signal::Raise(RuntimeError::new(e)))
            }
            "not_operator" => {
                let argument = node.child_by_field_name("argument").ok_or_else(|| Signal::Raise(RuntimeError::new("not missing argument")))?;
                let value = self.eval_expr(argument, module, env)?;
                Ok(Value::Bool(!value.is_truthy()))
            }
            "binary_operator" => {
                let operator = &source[node.child_by_field_name("operator").ok_or_else(|| Signal::Raise(RuntimeError::new("binary operator missing operator")))?.byte_range()];
                let left_node = node.child_by_field_name("left").ok_or_else(|| Signal::Raise(RuntimeError::new("binary operator missing left")))?;
                let right_node = node.child_by_field_name("right").ok_or_else(|| Signal::Raise(RuntimeError::new("binary operator missing right")))?;
                let left = self.eval_expr(left_node, module, env.clone())?;
                let right = self.eval_expr(right_node, module, env)?;
                apply_binary_op(operator, &left, &right)
            }
            "boolean_operator" => {
                let operator = &source[node.child_by_field_name("operator").ok_or_else(|| Signal::Raise(RuntimeError::new("boolean operator missing operator")))?.byte_range()];
                let left_node = node.child_by_field_name("left").ok_or_else(|| Signal::Raise(RuntimeError::new("boolean operator missing left")))?;
                let right_node = node.child_by_field_name("right").ok_or_else(|| Signal::Raise(RuntimeError::new("boolean operator missing right")))?;
                let left = self.eval_expr(left_node, module, env.clone())?;
                if operator == "and" {
                    if !left.is_truthy() {
                        return Ok(left);
                    }
                    self.eval_expr(right_node, module, env)
                } else {
                    if left.is_truthy() {
                        return Ok(left);
                    }
                    self.eval_expr(right_node, module, env)
                }
            }
            "comparison_operator" => self.eval_comparison(node, module, env),
            "conditional_expression" => {
                let mut cursor = node.walk();
                let parts: Vec<Node> = node.named_children(&mut cursor).collect();
                let [body, condition, alternative] = parts.as_slice() else {
                    return err("malformed conditional expression");
                };
                if self.eval_expr(*condition, module, env.clone())?.is_truthy() {
                    self.eval_expr(*body, module, env)
                } else {
                    self.eval_expr(*alternative, module, env)
                }
            }
            "attribute" => {
                let object_node = node.child_by_field_name("object").ok_or_else(|| Signal::Raise(RuntimeError::new("attribute missing object")))?;
                let attr_node = node.child_by_field_name("attribute").ok_or_else(|| Signal::Raise(RuntimeError::new("attribute missing name")))?;
                let object = self.eval_expr(object_node, module, env)?;
                let attr = &source[attr_node.byte_range()];
                self.get_attribute(&object, attr)
            }
            "subscript" => {
                let value_node = node.child_by_field_name("value").ok_or_else(|| Signal::Raise(RuntimeError::new("subscript missing value")))?;
                let index_node = node.child_by_field_name("subscript").ok_or_else(|| Signal::Raise(RuntimeError::new("subscript missing index")))?;
                let container = self.eval_expr(value_node, module, env.clone())?;
                let index = self.eval_expr(index_node, module, env)?;
                get_item(&container, &index)
            }
            "list" => {
                let mut cursor = node.walk();
                let mut items = Vec::new();
                for item in node.named_children(&mut cursor) {
                    items.push(self.eval_expr(item, module, env.clone())?);
                }
                Ok(Value::list(items))
            }
            "tuple" => {
                let mut cursor = node.walk();
                let mut items = Vec::new();
                for item in node.named_children(&mut cursor) {
                    items.push(self.eval_expr(item, module, env.clone())?);
                }
                Ok(Value::Tuple(Rc::new(items)))
            }
            "set" => {
                let mut cursor = node.walk();
                let mut items = Vec::new();
                for item in node.named_children(&mut cursor) {
                    items.push(self.eval_expr(item, module, env.clone())?);
                }
                Ok(Value::Set(Rc::new(RefCell::new(items))))
            }
            "dictionary" => {
                let mut cursor = node.walk();
                let mut items = Vec::new();
                for pair in node.named_children(&mut cursor) {
                    if pair.kind() != "pair" {
                        continue;
                    }
                    let key_node = pair.child_by_field_name("key").ok_or_else(|| Signal::Raise(RuntimeError::new("dict entry missing key")))?;
                    let value_node = pair.child_by_field_name("value").ok_or_else(|| Signal::Raise(RuntimeError::new("dict entry missing value")))?;
                    let key = self.eval_expr(key_node, module, env.clone())?;
                    let value = self.eval_expr(value_node, module, env.clone())?;
                    items.push((key, value));
                }
                Ok(Value::dict(items))
            }
            "call" => self.eval_call(node, module, env),
            other => err(format!("unsupported expression: {other}")),
        }
    }

    fn eval_comparison(&mut self, node: Node, module: &Rc<SourceModule>, env: Env) -> EvalResult<Value> {
        let mut cursor = node.walk();
        let mut operands = Vec::new();
        let mut operators = Vec::new();
        for child in node.children(&mut cursor) {
            if child.is_named() {
                operands.push(child);
            } else if matches!(child.kind(), "==" | "!=" | "<" | ">" | "<=" | ">=" | "in" | "not in" | "is" | "is not") {
                operators.push(child.kind().to_string());
            }
        }
        if operands.len() < 2 {
            return err("malformed comparison");
        }
        let mut left = self.eval_expr(operands[0], module, env.clone())?;
        for (i, operator) in operators.iter().enumerate() {
            let right = self.eval_expr(operands[i + 1], module, env.clone())?;
            if !compare(operator, &left, &right)? {
                return Ok(Value::Bool(false));
            }
            left = right;
        }
        Ok(Value::Bool(true))
    }

    fn get_attribute(&mut self, object: &Value, attr: &str) -> EvalResult<Value> {
        match object {
            Value::Instance(inst) => {
                let inst_ref = inst.borrow();
                if let Some(value) = inst_ref.attrs.get(attr) {
                    return Ok(value.clone());
                }
                if let Some(method) = inst_ref.class.methods.get(attr) {
                    return Ok(Value::Builtin(bound_method_placeholder(method.clone(), inst.clone())));
                }
                Err(Signal::Raise(RuntimeError::new(format!("'{}' object has no attribute '{attr}'", inst_ref.class.name))))
            }
            Value::Class(class) => class
                .methods
                .get(attr)
                .map(|m| Value::Function(m.clone()))
                .ok_or_else(|| Signal::Raise(RuntimeError::new(format!("class '{}' has no attribute '{attr}'", class.name)))),
            Value::Module(module) => {
                if let Some(found) = tracer_si::lookup::find_qualified(&module.tree, &module.source, std::slice::from_ref(&attr.to_string())) {
                    return Ok(Value::Function(Rc::new(FunctionValue {
                        name: attr.to_string(),
                        module: module.clone(),
                        def_start: found.node.start_byte(),
                        def_end: found.node.end_byte(),
                        is_method: false,
                        is_module_entry: false,
                    })));
                }
                Err(Signal::Raise(RuntimeError::new(format!("module '{}' has no attribute '{attr}'", module.dotted_name))))
            }
            other => Err(Signal::Raise(RuntimeError::new(format!("'{}' object has no attribute '{attr}'", other.type_name())))),
        }
    }

    fn eval_call(&mut self, node: Node, module: &Rc<SourceModule>, env: Env) -> EvalResult<Value> {
        let callee_node = node.child_by_field_name("function").ok_or_else(|| Signal::Raise(RuntimeError::new("call missing function")))?;
        let args_node = node.child_by_field_name("arguments").ok_or_else(|| Signal::Raise(RuntimeError::new("call missing arguments")))?;

        let (args, kwargs) = self.eval_arguments(args_node, module, env.clone())?;

        // A `obj.method(...)` call binds `obj` as an implicit leading
        // positional argument, the way a bound method does at runtime.
        if callee_node.kind() == "attribute" {
            let object_node = callee_node.child_by_field_name("object").ok_or_else(|| Signal::Raise(RuntimeError::new("attribute missing object")))?;
            let attr_node = callee_node.child_by_field_name("attribute").ok_or_else(|| Signal::Raise(RuntimeError::new("attribute missing name")))?;
            let object = self.eval_expr(object_node, module, env.clone())?;
            let attr = module.source[attr_node.byte_range()].to_string();
            if let Value::Instance(inst) = &object {
                let method = inst.borrow().class.methods.get(&attr).cloned();
                if let Some(method) = method {
                    let mut full_args = vec![object.clone()];
                    full_args.extend(args);
                    return self.call_function(method, full_args, kwargs);
                }
                if let Some(value) = inst.borrow().attrs.get(&attr).cloned() {
                    return self.call_value(value, args, kwargs);
                }
                return err(format!("'{}' object has no attribute '{attr}'", inst.borrow().class.name));
            }
            let resolved = self.get_attribute(&object, &attr)?;
            return self.call_value(resolved, args, kwargs);
        }

        // A bare name that isn't bound in scope falls through to the
        // bundled builtins table before being treated as undefined.
        if callee_node.kind() == "identifier" {
            let name = &module.source[callee_node.byte_range()];
            if env.get(name).is_none() {
                if let Some(result) = crate::builtins::call(name, &args) {
                    return result.map_err(|e| Signal::Raise(RuntimeError::new(e)));
                }
            }
        }

        let callee = self.eval_expr(callee_node, module, env)?;
        self.call_value(callee, args, kwargs)
    }

    fn call_value(&mut self, callee: Value, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> EvalResult<Value> {
        match callee {
            Value::Function(func) => self.call_function(func, args, kwargs),
            Value::Class(class) => {
                let instance = Rc::new(RefCell::new(InstanceValue { class: class.clone(), attrs: HashMap::new() }));
                if let Some(init) = class.methods.get("__init__").cloned() {
                    let mut full_args = vec![Value::Instance(instance.clone())];
                    full_args.extend(args);
                    self.call_function(init, full_args, kwargs)?;
                }
                Ok(Value::Instance(instance))
            }
            Value::Builtin(builtin) => (builtin.func)(&args).map_err(|e| Signal::Raise(RuntimeError::new(e))),
            other => err(format!("'{}' object is not callable", other.type_name())),
        }
    }

    fn eval_arguments(&mut self, args_node: Node, module: &Rc<SourceModule>, env: Env) -> EvalResult<(Vec<Value>, Vec<(String, Value)>)> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        let mut cursor = args_node.walk();
        for arg in args_node.named_children(&mut cursor) {
            if arg.kind() == "keyword_argument" {
                let name_node = arg.child_by_field_name("name").ok_or_else(|| Signal::Raise(RuntimeError::new("keyword argument missing name")))?;
                let value_node = arg.child_by_field_name("value").ok_or_else(|| Signal::Raise(RuntimeError::new("keyword argument missing value")))?;
                let name = module.source[name_node.byte_range()].to_string();
                let value = self.eval_expr(value_node, module, env.clone())?;
                kwargs.push((name, value));
            } else if matches!(arg.kind(), "list_splat" | "dictionary_splat") {
                // Splatted call arguments aren't modelled; skip them rather
                // than failing the whole call.
                continue;
            } else {
                args.push(self.eval_expr(arg, module, env.clone())?);
            }
        }
        Ok((args, kwargs))
    }
}

impl Env {
    fn clone_handle(&self) -> Env {
        self.clone()
    }
}

fn bound_method_placeholder(_method: Rc<FunctionValue>, _instance: Rc<RefCell<InstanceValue>>) -> Rc<crate::value::BuiltinFunction> {
    // Only reached for a bare (non-call) attribute access on a method, e.g.
    // `f = obj.method`. The bundled interpreter's call sites resolve bound
    // methods directly in `eval_call`, so a value reaching here can only be
    // displayed or passed around, never invoked through this placeholder.
    Rc::new(crate::value::BuiltinFunction {
        name: "bound_method".to_string(),
        func: |_args| Err("bound methods captured as values cannot be called outside a call expression".to_string()),
    })
}

fn string_literal_text(node: Node, source: &str) -> String {
    let mut cursor = node.walk();
    let content: Vec<Node> = node.children(&mut cursor).filter(|c| c.kind() == "string_content").collect();
    if content.is_empty() {
        let raw = &source[node.byte_range()];
        strip_quotes(raw)
    } else {
        content.iter().map(|c| &source[c.byte_range()]).collect::<Vec<_>>().join("")
    }
}

fn strip_quotes(raw: &str) -> String {
    for quote in ["'''", "\"\"\"", "'", "\""] {
        if let Some(prefixed) = raw.strip_prefix(quote) {
            if let Some(stripped) = prefixed.strip_suffix(quote) {
                return stripped.to_string();
            }
        }
    }
    raw.to_string()
}

fn normalize_index(idx: i64, len: usize) -> EvalResult<usize> {
    if idx < 0 {
        let adjusted = len as i64 + idx;
        if adjusted < 0 {
            return err("index out of range");
        }
        Ok(adjusted as usize)
    } else {
        Ok(idx as usize)
    }
}

fn get_item(container: &Value, index: &Value) -> EvalResult<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let idx = index.as_int().ok_or_else(|| Signal::Raise(RuntimeError::new("list indices must be integers")))?;
            let idx = normalize_index(idx, items.len())?;
            items.get(idx).cloned().ok_or_else(|| Signal::Raise(RuntimeError::new("list index out of range")))
        }
        Value::Tuple(items) => {
            let idx = index.as_int().ok_or_else(|| Signal::Raise(RuntimeError::new("tuple indices must be integers")))?;
            let idx = normalize_index(idx, items.len())?;
            items.get(idx).cloned().ok_or_else(|| Signal::Raise(RuntimeError::new("tuple index out of range")))
        }
        Value::Str(s) => {
            let idx = index.as_int().ok_or_else(|| Signal::Raise(RuntimeError::new("string indices must be integers")))?;
            let chars: Vec<char> = s.chars().collect();
            let idx = normalize_index(idx, chars.len())?;
            chars.get(idx).map(|c| Value::str(c.to_string())).ok_or_else(|| Signal::Raise(RuntimeError::new("string index out of range")))
        }
        Value::Dict(items) => items
            .borrow()
            .iter()
            .find(|(k, _)| values_equal(k, index))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| Signal::Raise(RuntimeError::new(format!("key {} not found", index.display())))),
        other => err(format!("'{}' object is not subscriptable", other.type_name())),
    }
}

fn iterate(value: &Value) -> EvalResult<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Tuple(items) => Ok((**items).clone()),
        Value::Set(items) => Ok(items.borrow().clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
        Value::Dict(items) => Ok(items.borrow().iter().map(|(k, _)| k.clone()).collect()),
        other => err(format!("'{}' object is not iterable", other.type_name())),
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => *x as f64 == *y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Tuple(x), Value::Tuple(y)) => x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b)),
        (Value::List(x), Value::List(y)) => {
            let x = x.borrow();
            let y = y.borrow();
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b))
        }
        _ => false,
    }
}

fn compare(operator: &str, left: &Value, right: &Value) -> EvalResult<bool> {
    Ok(match operator {
        "==" => values_equal(left, right),
        "!=" => !values_equal(left, right),
        "<" | ">" | "<=" | ">=" => {
            let (l, r) = match (left.as_f64(), right.as_f64()) {
                (Some(l), Some(r)) => (l, r),
                _ => {
                    return match (left, right) {
                        (Value::Str(l), Value::Str(r)) => Ok(match operator {
                            "<" => l < r,
                            ">" => l > r,
                            "<=" => l <= r,
                            ">=" => l >= r,
                            _ => unreachable!(),
                        }),
                        _ => err(format!("'{}' not supported between instances of '{}' and '{}'", operator, left.type_name(), right.type_name())),
                    };
                }
            };
            match operator {
                "<" => l < r,
                ">" => l > r,
                "<=" => l <= r,
                ">=" => l >= r,
                _ => unreachable!(),
            }
        }
        "in" => iterate(right)?.iter().any(|v| values_equal(v, left)),
        "not in" => !iterate(right)?.iter().any(|v| values_equal(v, left)),
        "is" => values_equal(left, right),
        "is not" => !values_equal(left, right),
        other => return err(format!("unsupported comparison operator: {other}")),
    })
}

fn apply_unary_op(operator: &str, value: &Value) -> Result<Value, String> {
    match operator {
        "-" => match value {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(format!("bad operand type for unary -: '{}'", other.type_name())),
        },
        "+" => match value {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Float(f) => Ok(Value::Float(*f)),
            other => Err(format!("bad operand type for unary +: '{}'", other.type_name())),
        },
        "not" => Ok(Value::Bool(!value.is_truthy())),
        other => Err(format!("unsupported unary operator: {other}")),
    }
}

fn apply_binary_op(operator: &str, left: &Value, right: &Value) -> EvalResult<Value> {
    if operator == "+" {
        if let (Value::Str(l), Value::Str(r)) = (left, right) {
            return Ok(Value::str(format!("{l}{r}")));
        }
        if let (Value::List(l), Value::List(r)) = (left, right) {
            let mut combined = l.borrow().clone();
            combined.extend(r.borrow().clone());
            return Ok(Value::list(combined));
        }
    }
    if operator == "*" {
        if let (Value::Str(s), other) = (left, right) {
            if let Some(n) = other.as_int() {
                return Ok(Value::str(s.repeat(n.max(0) as usize)));
            }
        }
    }

    let (l, r) = match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => (l, r),
        _ => return err(format!("unsupported operand type(s) for {operator}: '{}' and '{}'", left.type_name(), right.type_name())),
    };
    let both_int = matches!((left, right), (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)));

    let result = match operator {
        "+" => l + r,
        "-" => l - r,
        "*" => l * r,
        "/" => return if r == 0.0 { err("division by zero") } else { Ok(Value::Float(l / r)) },
        "//" => {
            if r == 0.0 {
                return err("integer division or modulo by zero");
            }
            (l / r).floor()
        }
        "%" => {
            if r == 0.0 {
                return err("integer division or modulo by zero");
            }
            l - r * (l / r).floor()
        }
        "**" => l.powf(r),
        other => return err(format!("unsupported binary operator: {other}")),
    };

    if both_int && matches!(operator, "+" | "-" | "*" | "//" | "%") {
        Ok(Value::Int(result as i64))
    } else {
        Ok(Value::Float(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn module_from(source: &str) -> Rc<SourceModule> {
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&tree_sitter_python::LANGUAGE.into()).unwrap();
        let tree = parser.parse(source, None).unwrap();
        Rc::new(SourceModule { dotted_name: "m".to_string(), path: PathBuf::from("m.py"), source: source.to_string(), tree })
    }

    fn run(source: &str, func_name: &str, args: Vec<Value>) -> Value {
        let module = module_from(source);
        let found = tracer_si::lookup::find_qualified(&module.tree, &module.source, &[func_name.to_string()]).unwrap();
        let func = Rc::new(FunctionValue {
            name: func_name.to_string(),
            module: module.clone(),
            def_start: found.node.start_byte(),
            def_end: found.node.end_byte(),
            is_method: false,
            is_module_entry: false,
        });
        let mut hook = NoopHook;
        let mut interp = Interpreter::new(PathBuf::from("/repo"), &mut hook);
        interp.run(func, args, Vec::new()).unwrap()
    }

    #[test]
    fn runs_arithmetic_and_return() {
        let v = run("def f(x, y):\n    return x + y * 2\n", "f", vec![Value::Int(3), Value::Int(4)]);
        assert_eq!(v.as_int(), Some(11));
    }

    #[test]
    fn runs_loop_accumulation() {
        let v = run("def f(n):\n    total = 0\n    for i in range(n):\n        total += i\n    return total\n", "f", vec![Value::Int(5)]);
        assert_eq!(v.as_int(), Some(10));
    }

    #[test]
    fn runs_conditional_branch() {
        let v = run("def f(x):\n    if x > 0:\n        return 'pos'\n    else:\n        return 'neg'\n", "f", vec![Value::Int(-1)]);
        assert_eq!(v.display(), "neg");
    }

    #[test]
    fn default_parameter_is_used_when_omitted() {
        let v = run("def f(x, y=10):\n    return x + y\n", "f", vec![Value::Int(1)]);
        assert_eq!(v.as_int(), Some(11));
    }

    #[test]
    fn class_instance_methods_see_self() {
        let v = run(
            "class Counter:\n    def __init__(self, start):\n        self.value = start\n    def bump(self):\n        self.value += 1\n        return self.value\n\ndef f(start):\n    c = Counter(start)\n    c.bump()\n    return c.bump()\n",
            "f",
            vec![Value::Int(5)],
        );
        assert_eq!(v.as_int(), Some(7));
    }
}
