// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Tree-walking evaluator for the analysis language.
//
// Every statement and loop iteration costs one step against the budget;
// the cancellation flag is polled on the same path so a timed-out run
// stops at the next statement.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::frame::{arith, ArithOp, Cell, FrameError};
use crate::lang::ast::{
    Arg, BinOp, BoolOp, CmpOp, Comprehension, Expr, FPart, ParamKind, Stmt, StmtKind, UnaryOp,
};

use super::format::format_with_spec;
use super::value::{
    check_len, range_contains, range_item, range_len, shared, Args, Dict, Exception, Function,
    FunctionBody, Res, Shared, Value, MAX_NESTING_DEPTH,
};

pub(crate) type Scope = Shared<HashMap<String, Value>>;

/// Bytes of captured output kept per stream.
const MAX_OUTPUT_BYTES: usize = 1 << 20;
const MAX_CALL_DEPTH: usize = 200;

/// Lexical environment of the code being run.
#[derive(Clone, Default)]
pub(crate) struct Env {
    /// Local scopes, innermost last. Empty at module level.
    chain: Vec<Scope>,
    globals_decl: HashSet<String>,
}

pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Resource limits for one run.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_steps: u64,
    pub allowed_modules: Vec<String>,
}

pub struct Interpreter {
    pub(crate) globals: Scope,
    stdout: String,
    stderr: String,
    truncated: bool,
    steps: u64,
    limits: Limits,
    cancel: Arc<AtomicBool>,
    depth: usize,
    /// Exceptions being handled, for bare `raise`.
    handling: Vec<Exception>,
}

impl Interpreter {
    pub fn new(limits: Limits, cancel: Arc<AtomicBool>) -> Self {
        Self {
            globals: shared(HashMap::new()),
            stdout: String::new(),
            stderr: String::new(),
            truncated: false,
            steps: 0,
            limits,
            cancel,
            depth: 0,
            handling: Vec::new(),
        }
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.borrow_mut().insert(name.to_string(), value);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }

    pub fn global_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.globals.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) fn write_stdout(&mut self, text: &str) {
        Self::append_capped(&mut self.stdout, &mut self.truncated, text);
    }

    pub(crate) fn write_stderr(&mut self, text: &str) {
        Self::append_capped(&mut self.stderr, &mut self.truncated, text);
    }

    fn append_capped(buf: &mut String, truncated: &mut bool, text: &str) {
        if buf.len() + text.len() <= MAX_OUTPUT_BYTES {
            buf.push_str(text);
        } else if !*truncated {
            *truncated = true;
            buf.push_str("\n... output truncated ...\n");
        }
    }

    pub(crate) fn tick(&mut self) -> Res<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(Exception::fatal(
                "TimeoutError",
                format!("execution step budget of {} exceeded", self.limits.max_steps),
            ));
        }
        if self.cancel.load(AtomicOrdering::Relaxed) {
            return Err(Exception::fatal("TimeoutError", "execution cancelled"));
        }
        Ok(())
    }

    pub(crate) fn module_allowed(&self, name: &str) -> bool {
        self.limits.allowed_modules.iter().any(|m| m == name)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Run a module body.
    pub fn run_module(&mut self, body: &[Stmt]) -> Res<()> {
        let mut env = Env::default();
        match self.exec_block(body, &mut env)? {
            Flow::Normal | Flow::Return(_) => Ok(()),
            Flow::Break | Flow::Continue => Err(Exception::new(
                "SyntaxError",
                "'break' or 'continue' outside loop",
            )),
        }
    }

    pub(crate) fn exec_block(&mut self, body: &[Stmt], env: &mut Env) -> Res<Flow> {
        for stmt in body {
            match self.exec(stmt, env).map_err(|e| e.with_line(stmt.line))? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, env: &mut Env) -> Res<Flow> {
        self.tick()?;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, env)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, env)?;
                for target in targets {
                    self.assign(target, value.clone(), env)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                self.aug_assign(target, *op, value, env)?;
            }
            StmtKind::AnnAssign { target, value } => {
                if let Some(value) = value {
                    let value = self.eval(value, env)?;
                    self.assign(target, value, env)?;
                }
            }
            StmtKind::If { test, body, orelse } => {
                let branch = if self.eval(test, env)?.truthy()? { body } else { orelse };
                return self.exec_block(branch, env);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let iterable = self.eval(iter, env)?;
                let items = self.iterate(&iterable)?;
                for item in items {
                    self.tick()?;
                    self.assign(target, item, env)?;
                    match self.exec_block(body, env)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Continue | Flow::Normal => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                return self.exec_block(orelse, env);
            }
            StmtKind::While { test, body, orelse } => {
                while self.eval(test, env)?.truthy()? {
                    self.tick()?;
                    match self.exec_block(body, env)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Continue | Flow::Normal => {}
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                return self.exec_block(orelse, env);
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::FunctionDef {
                name,
                params,
                body,
                decorators,
            } => {
                let mut func = Value::Function(Rc::new(Function {
                    name: name.clone(),
                    params: params.clone(),
                    defaults: self.eval_defaults(params, env)?,
                    body: FunctionBody::Block(Rc::new(body.clone())),
                    closure: env.chain.clone(),
                }));
                for decorator in decorators.iter().rev() {
                    let deco = self.eval(decorator, env)?;
                    func = self.call_value(&deco, Args::new(vec![func]))?;
                }
                self.bind(name, func, env);
            }
            StmtKind::ClassDef { name } => {
                return Err(Exception::new(
                    "NotImplementedError",
                    format!("class definitions are not available in analysis code (class {name})"),
                ));
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    let module = self.import_module(&alias.name)?;
                    match &alias.asname {
                        Some(asname) => self.bind(asname, module, env),
                        None => {
                            let top = alias.name.split('.').next().unwrap_or(&alias.name);
                            let top_value = self.import_module(top)?;
                            self.bind(top, top_value, env);
                        }
                    }
                }
            }
            StmtKind::ImportFrom { module, names } => {
                let module_value = self.import_module(module)?;
                for alias in names {
                    if alias.name == "*" {
                        return Err(Exception::new(
                            "ImportError",
                            "wildcard imports are not supported",
                        ));
                    }
                    let value = self.get_attr(&module_value, &alias.name).map_err(|_| {
                        Exception::new(
                            "ImportError",
                            format!("cannot import name '{}' from '{module}'", alias.name),
                        )
                    })?;
                    let bound = alias.asname.as_deref().unwrap_or(&alias.name);
                    self.bind(bound, value, env);
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.exec_try(body, handlers, orelse, finalbody, env),
            StmtKind::Raise(expr) => {
                let exc = match expr {
                    Some(expr) => {
                        let value = self.eval(expr, env)?;
                        self.to_exception(value)?
                    }
                    None => self.handling.last().cloned().ok_or_else(|| {
                        Exception::new("RuntimeError", "No active exception to reraise")
                    })?,
                };
                return Err(exc);
            }
            StmtKind::With { items, body } => {
                for (ctx, target) in items {
                    let value = self.eval(ctx, env)?;
                    if let Some(target) = target {
                        self.assign(target, value, env)?;
                    }
                }
                return self.exec_block(body, env);
            }
            StmtKind::Del(targets) => {
                for target in targets {
                    self.delete(target, env)?;
                }
            }
            StmtKind::Assert { test, msg } => {
                if !self.eval(test, env)?.truthy()? {
                    let message = match msg {
                        Some(m) => self.eval(m, env)?.to_str(),
                        None => String::new(),
                    };
                    return Err(Exception::new("AssertionError", message));
                }
            }
            StmtKind::Global(names) => {
                env.globals_decl.extend(names.iter().cloned());
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[crate::lang::ast::Handler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
        env: &mut Env,
    ) -> Res<Flow> {
        let outcome = match self.exec_block(body, env) {
            Ok(flow) => match flow {
                Flow::Normal => self.exec_block(orelse, env),
                other => Ok(other),
            },
            Err(exc) if exc.fatal => Err(exc),
            Err(exc) => {
                let mut handled = None;
                for handler in handlers {
                    if self.handler_matches(handler.kind.as_ref(), &exc, env)? {
                        handled = Some(handler);
                        break;
                    }
                }
                match handled {
                    Some(handler) => {
                        if let Some(name) = &handler.name {
                            self.bind(name, Value::Exception(Rc::new(exc.clone())), env);
                        }
                        self.handling.push(exc);
                        let result = self.exec_block(&handler.body, env);
                        self.handling.pop();
                        result
                    }
                    None => Err(exc),
                }
            }
        };
        if !finalbody.is_empty() {
            match self.exec_block(finalbody, env)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        outcome
    }

    fn handler_matches(&mut self, kind: Option<&Expr>, exc: &Exception, env: &mut Env) -> Res<bool> {
        let Some(kind) = kind else {
            return Ok(!exc.fatal);
        };
        let value = self.eval(kind, env)?;
        let kinds = match &value {
            Value::Tuple(items) => items.iter().cloned().collect(),
            _ => vec![value],
        };
        for k in kinds {
            match k {
                Value::ExcType(name) => {
                    if exc.matches(&name) {
                        return Ok(true);
                    }
                }
                other => {
                    return Err(Exception::type_error(format!(
                        "catching classes that do not inherit from BaseException is not allowed ({})",
                        other.type_name()
                    )))
                }
            }
        }
        Ok(false)
    }

    fn to_exception(&self, value: Value) -> Res<Exception> {
        match value {
            Value::ExcType(name) => Ok(Exception::new(&name, "")),
            Value::Exception(exc) => Ok((*exc).clone()),
            other => Err(Exception::type_error(format!(
                "exceptions must derive from BaseException, not {}",
                other.type_name()
            ))),
        }
    }

    fn eval_defaults(
        &mut self,
        params: &[crate::lang::ast::Param],
        env: &mut Env,
    ) -> Res<Vec<Option<Value>>> {
        params
            .iter()
            .map(|p| p.default.as_ref().map(|d| self.eval(d, env)).transpose())
            .collect()
    }

    fn import_module(&mut self, name: &str) -> Res<Value> {
        if !self.module_allowed(name) {
            return Err(Exception::new(
                "ImportError",
                format!("Import of '{name}' is not allowed"),
            ));
        }
        if super::builtins::is_known_module(name) {
            Ok(Value::Module(Rc::from(name)))
        } else {
            Err(Exception::new(
                "ModuleNotFoundError",
                format!("No module named '{name}'"),
            ))
        }
    }

    // ------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------

    pub(crate) fn bind(&mut self, name: &str, value: Value, env: &Env) {
        let scope = match env.chain.last() {
            Some(local) if !env.globals_decl.contains(name) => local.clone(),
            _ => self.globals.clone(),
        };
        scope.borrow_mut().insert(name.to_string(), value);
    }

    fn lookup(&self, name: &str, env: &Env) -> Res<Value> {
        if !env.globals_decl.contains(name) {
            for scope in env.chain.iter().rev() {
                if let Some(v) = scope.borrow().get(name) {
                    return Ok(v.clone());
                }
            }
        }
        if let Some(v) = self.globals.borrow().get(name) {
            return Ok(v.clone());
        }
        super::builtins::builtin_value(name).ok_or_else(|| {
            Exception::new("NameError", format!("name '{name}' is not defined"))
        })
    }

    pub(crate) fn assign(&mut self, target: &Expr, value: Value, env: &mut Env) -> Res<()> {
        match target {
            Expr::Name(name) => {
                self.bind(name, value, env);
                Ok(())
            }
            Expr::Tuple(targets) | Expr::List(targets) => {
                let items = self.iterate(&value)?;
                self.unpack(targets, items, env)
            }
            Expr::Subscript { value: obj, index } => {
                let obj = self.eval(obj, env)?;
                let index = self.eval_index(index, env)?;
                self.set_item(&obj, index, value)
            }
            Expr::Attribute { value: obj, attr } => {
                let obj = self.eval(obj, env)?;
                self.set_attr(&obj, attr, value)
            }
            other => Err(Exception::new(
                "SyntaxError",
                format!("cannot assign to {}", other.describe()),
            )),
        }
    }

    fn unpack(&mut self, targets: &[Expr], items: Vec<Value>, env: &mut Env) -> Res<()> {
        let star = targets.iter().position(|t| matches!(t, Expr::Starred(_)));
        match star {
            None => {
                if items.len() != targets.len() {
                    return Err(Exception::value_error(if items.len() > targets.len() {
                        format!("too many values to unpack (expected {})", targets.len())
                    } else {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        )
                    }));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, env)?;
                }
                Ok(())
            }
            Some(pos) => {
                let after = targets.len() - pos - 1;
                if items.len() < pos + after {
                    return Err(Exception::value_error(format!(
                        "not enough values to unpack (expected at least {}, got {})",
                        pos + after,
                        items.len()
                    )));
                }
                let mut items = items;
                let tail = items.split_off(items.len() - after);
                let middle = items.split_off(pos);
                for (target, item) in targets[..pos].iter().zip(items) {
                    self.assign(target, item, env)?;
                }
                if let Expr::Starred(inner) = &targets[pos] {
                    self.assign(inner, Value::list(middle), env)?;
                }
                for (target, item) in targets[pos + 1..].iter().zip(tail) {
                    self.assign(target, item, env)?;
                }
                Ok(())
            }
        }
    }

    fn aug_assign(&mut self, target: &Expr, op: BinOp, value: &Expr, env: &mut Env) -> Res<()> {
        match target {
            Expr::Name(name) => {
                let current = self.lookup(name, env)?;
                let rhs = self.eval(value, env)?;
                let result = self.inplace_op(op, &current, &rhs)?;
                self.bind(name, result, env);
                Ok(())
            }
            Expr::Subscript { value: obj, index } => {
                let obj = self.eval(obj, env)?;
                let index = self.eval_index(index, env)?;
                let current = self.get_item(&obj, &index)?;
                let rhs = self.eval(value, env)?;
                let result = self.inplace_op(op, &current, &rhs)?;
                self.set_item(&obj, index, result)
            }
            Expr::Attribute { value: obj, attr } => {
                let obj = self.eval(obj, env)?;
                let current = self.get_attr(&obj, attr)?;
                let rhs = self.eval(value, env)?;
                let result = self.inplace_op(op, &current, &rhs)?;
                self.set_attr(&obj, attr, result)
            }
            other => Err(Exception::new(
                "SyntaxError",
                format!("'{}' is an illegal expression for augmented assignment", other.describe()),
            )),
        }
    }

    /// `+=` on a list extends it in place; everything else rebinds.
    fn inplace_op(&mut self, op: BinOp, current: &Value, rhs: &Value) -> Res<Value> {
        if let (BinOp::Add, Value::List(list)) = (op, current) {
            let extra = self.iterate(rhs)?;
            list.borrow_mut().extend(extra);
            return Ok(current.clone());
        }
        self.binary_op(op, current, rhs)
    }

    fn delete(&mut self, target: &Expr, env: &mut Env) -> Res<()> {
        match target {
            Expr::Name(name) => {
                let scope = match env.chain.last() {
                    Some(local) if !env.globals_decl.contains(name) => local.clone(),
                    _ => self.globals.clone(),
                };
                if scope.borrow_mut().remove(name).is_none() {
                    return Err(Exception::new(
                        "NameError",
                        format!("name '{name}' is not defined"),
                    ));
                }
                Ok(())
            }
            Expr::Subscript { value, index } => {
                let obj = self.eval(value, env)?;
                let index = self.eval_index(index, env)?;
                self.del_item(&obj, &index)
            }
            Expr::Tuple(items) | Expr::List(items) => {
                for item in items {
                    self.delete(item, env)?;
                }
                Ok(())
            }
            other => Err(Exception::new(
                "SyntaxError",
                format!("cannot delete {}", other.describe()),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub(crate) fn eval(&mut self, expr: &Expr, env: &mut Env) -> Res<Value> {
        match expr {
            Expr::Name(name) => self.lookup(name, env),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::str(s)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::NoneLit | Expr::Ellipsis => Ok(Value::None),
            Expr::FString(parts) => Ok(Value::str(self.eval_fstring(parts, env)?)),
            Expr::List(items) => Ok(Value::list(self.eval_items(items, env)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_items(items, env)?)),
            Expr::Set(items) => {
                let mut set = Dict::new();
                for item in self.eval_items(items, env)? {
                    set.insert(item, Value::None)?;
                }
                Ok(Value::Set(shared(set)))
            }
            Expr::Dict(entries) => {
                let mut dict = Dict::new();
                for (key, value) in entries {
                    match key {
                        Some(key) => {
                            let k = self.eval(key, env)?;
                            let v = self.eval(value, env)?;
                            dict.insert(k, v)?;
                        }
                        None => match self.eval(value, env)? {
                            Value::Dict(other) => {
                                for (k, v) in other.borrow().entries.iter() {
                                    dict.insert(k.clone(), v.clone())?;
                                }
                            }
                            other => {
                                return Err(Exception::type_error(format!(
                                    "'{}' object is not a mapping",
                                    other.type_name()
                                )))
                            }
                        },
                    }
                }
                Ok(Value::Dict(shared(dict)))
            }
            Expr::Starred(_) => Err(Exception::new(
                "SyntaxError",
                "can't use starred expression here",
            )),
            Expr::Attribute { value, attr } => {
                let obj = self.eval(value, env)?;
                self.get_attr(&obj, attr)
            }
            Expr::Subscript { value, index } => {
                let obj = self.eval(value, env)?;
                let index = self.eval_index(index, env)?;
                self.get_item(&obj, &index)
            }
            Expr::Slice { .. } => self.eval_index(expr, env),
            Expr::Call { func, args } => self.eval_call(func, args, env),
            Expr::BinOp { left, op, right } => {
                let l = self.eval(left, env)?;
                let r = self.eval(right, env)?;
                self.binary_op(*op, &l, &r)
            }
            Expr::Unary { op, operand } => {
                let v = self.eval(operand, env)?;
                self.unary_op(*op, &v)
            }
            Expr::BoolOp { op, values } => {
                let mut last = Value::None;
                for (i, value) in values.iter().enumerate() {
                    last = self.eval(value, env)?;
                    if i + 1 == values.len() {
                        break;
                    }
                    let truth = last.truthy()?;
                    match op {
                        BoolOp::And if !truth => return Ok(last),
                        BoolOp::Or if truth => return Ok(last),
                        _ => {}
                    }
                }
                Ok(last)
            }
            Expr::Compare { left, ops } => {
                let mut lhs = self.eval(left, env)?;
                let mut result = Value::Bool(true);
                for (i, (op, right)) in ops.iter().enumerate() {
                    let rhs = self.eval(right, env)?;
                    result = self.compare_op(*op, &lhs, &rhs)?;
                    if i + 1 < ops.len() && !result.truthy()? {
                        return Ok(result);
                    }
                    lhs = rhs;
                }
                Ok(result)
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test, env)?.truthy()? {
                    self.eval(body, env)
                } else {
                    self.eval(orelse, env)
                }
            }
            Expr::Lambda { params, body } => Ok(Value::Function(Rc::new(Function {
                name: "<lambda>".to_string(),
                params: params.clone(),
                defaults: self.eval_defaults(params, env)?,
                body: FunctionBody::Expr(Rc::new((**body).clone())),
                closure: env.chain.clone(),
            }))),
            Expr::ListComp { elt, generators } | Expr::GeneratorExp { elt, generators } => {
                let mut out = Vec::new();
                self.comprehend(generators, env, &mut |interp, env| {
                    out.push(interp.eval(elt, env)?);
                    Ok(())
                })?;
                Ok(Value::list(out))
            }
            Expr::SetComp { elt, generators } => {
                let mut set = Dict::new();
                self.comprehend(generators, env, &mut |interp, env| {
                    let v = interp.eval(elt, env)?;
                    set.insert(v, Value::None)
                })?;
                Ok(Value::Set(shared(set)))
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                let mut dict = Dict::new();
                self.comprehend(generators, env, &mut |interp, env| {
                    let k = interp.eval(key, env)?;
                    let v = interp.eval(value, env)?;
                    dict.insert(k, v)
                })?;
                Ok(Value::Dict(shared(dict)))
            }
            Expr::NamedExpr { name, value } => {
                let v = self.eval(value, env)?;
                self.bind(name, v.clone(), env);
                Ok(v)
            }
            Expr::Yield(_) => Err(Exception::new(
                "NotImplementedError",
                "generators are not available in analysis code",
            )),
            Expr::Await(_) => Err(Exception::new(
                "NotImplementedError",
                "'await' is not available in analysis code",
            )),
        }
    }

    fn eval_items(&mut self, items: &[Expr], env: &mut Env) -> Res<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Expr::Starred(inner) => {
                    let v = self.eval(inner, env)?;
                    out.extend(self.iterate(&v)?);
                }
                other => out.push(self.eval(other, env)?),
            }
        }
        Ok(out)
    }

    /// Evaluate a subscript, turning slice syntax into slice values.
    fn eval_index(&mut self, index: &Expr, env: &mut Env) -> Res<Value> {
        match index {
            Expr::Slice { lower, upper, step } => {
                let mut part = |e: &Option<Box<Expr>>, interp: &mut Self| -> Res<Value> {
                    match e {
                        Some(e) => interp.eval(e, env),
                        None => Ok(Value::None),
                    }
                };
                let lo = part(lower, self)?;
                let hi = part(upper, self)?;
                let st = part(step, self)?;
                Ok(Value::Slice(Rc::new([lo, hi, st])))
            }
            Expr::Tuple(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_index(item, env)?);
                }
                Ok(Value::tuple(out))
            }
            other => self.eval(other, env),
        }
    }

    fn comprehend(
        &mut self,
        generators: &[Comprehension],
        env: &mut Env,
        body: &mut dyn FnMut(&mut Self, &mut Env) -> Res<()>,
    ) -> Res<()> {
        let mut inner = env.clone();
        inner.chain.push(shared(HashMap::new()));
        self.comprehend_level(generators, &mut inner, body)
    }

    fn comprehend_level(
        &mut self,
        generators: &[Comprehension],
        env: &mut Env,
        body: &mut dyn FnMut(&mut Self, &mut Env) -> Res<()>,
    ) -> Res<()> {
        let Some((first, rest)) = generators.split_first() else {
            return body(self, env);
        };
        let items = {
            let iterable = self.eval(&first.iter, env)?;
            self.iterate(&iterable)?
        };
        'items: for item in items {
            self.tick()?;
            self.assign(&first.target, item, env)?;
            for cond in &first.conditions {
                if !self.eval(cond, env)?.truthy()? {
                    continue 'items;
                }
            }
            self.comprehend_level(rest, env, body)?;
        }
        Ok(())
    }

    fn eval_fstring(&mut self, parts: &[FPart], env: &mut Env) -> Res<String> {
        let mut out = String::new();
        for part in parts {
            match part {
                FPart::Lit(text) => out.push_str(text),
                FPart::Expr {
                    expr,
                    conversion,
                    spec,
                    echo,
                } => {
                    let value = self.eval(expr, env)?;
                    if let Some(echo) = echo {
                        out.push_str(echo);
                    }
                    let conversion = conversion.or(if echo.is_some() && spec.is_none() {
                        Some('r')
                    } else {
                        None
                    });
                    let value = match conversion {
                        Some('r') | Some('a') => Value::str(value.repr()),
                        Some('s') => Value::str(value.to_str()),
                        _ => value,
                    };
                    let spec = match spec {
                        Some(spec_parts) => self.eval_fstring(spec_parts, env)?,
                        None => String::new(),
                    };
                    out.push_str(&format_with_spec(&value, &spec)?);
                }
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn eval_call(&mut self, func: &Expr, args: &[Arg], env: &mut Env) -> Res<Value> {
        if let Expr::Attribute { value, attr } = func {
            let receiver = self.eval(value, env)?;
            let args = self.eval_args(args, env)?;
            return match &receiver {
                Value::Module(_) | Value::Builtin(_) => {
                    let f = self.get_attr(&receiver, attr)?;
                    self.call_value(&f, args)
                }
                Value::Frame(t) if t.borrow().has_column(attr) && !super::pandas::is_frame_method(attr) => {
                    Err(Exception::type_error("'Series' object is not callable"))
                }
                _ => self.call_method(&receiver, attr, args),
            };
        }
        let f = self.eval(func, env)?;
        let args = self.eval_args(args, env)?;
        self.call_value(&f, args)
    }

    fn eval_args(&mut self, args: &[Arg], env: &mut Env) -> Res<Args> {
        let mut out = Args::default();
        for arg in args {
            match arg {
                Arg::Pos(e) => out.pos.push(self.eval(e, env)?),
                Arg::Star(e) => {
                    let v = self.eval(e, env)?;
                    out.pos.extend(self.iterate(&v)?);
                }
                Arg::Kw(name, e) => {
                    let v = self.eval(e, env)?;
                    out.kw.push((name.clone(), v));
                }
                Arg::DoubleStar(e) => match self.eval(e, env)? {
                    Value::Dict(d) => {
                        for (k, v) in d.borrow().entries.iter() {
                            let Value::Str(name) = k else {
                                return Err(Exception::type_error("keywords must be strings"));
                            };
                            out.kw.push((name.to_string(), v.clone()));
                        }
                    }
                    other => {
                        return Err(Exception::type_error(format!(
                            "argument after ** must be a mapping, not {}",
                            other.type_name()
                        )))
                    }
                },
            }
        }
        Ok(out)
    }

    /// Call any callable value.
    pub(crate) fn call_value(&mut self, func: &Value, args: Args) -> Res<Value> {
        match func {
            Value::Function(f) => self.call_function(f, args),
            Value::Builtin(b) => match &b.receiver {
                Some(receiver) => self.call_method(receiver, &b.name, args),
                None => self.call_native(&b.name, args),
            },
            Value::ExcType(kind) => {
                let message = match args.pos.as_slice() {
                    [] => String::new(),
                    [one] => one.to_str(),
                    many => Value::tuple(many.to_vec()).repr(),
                };
                Ok(Value::Exception(Rc::new(Exception::new(kind, message))))
            }
            other => Err(Exception::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Call with positional arguments only.
    pub(crate) fn call1(&mut self, func: &Value, args: Vec<Value>) -> Res<Value> {
        self.call_value(func, Args::new(args))
    }

    fn call_function(&mut self, func: &Rc<Function>, args: Args) -> Res<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Exception::new(
                "RecursionError",
                "maximum recursion depth exceeded",
            ));
        }
        self.tick()?;
        let locals = self.bind_params(func, args)?;
        let mut env = Env {
            chain: func.closure.clone(),
            globals_decl: HashSet::new(),
        };
        env.chain.push(shared(locals));

        self.depth += 1;
        let result = match &func.body {
            FunctionBody::Expr(expr) => self.eval(expr, &mut env),
            FunctionBody::Block(body) => match self.exec_block(body, &mut env) {
                Ok(Flow::Return(v)) => Ok(v),
                Ok(_) => Ok(Value::None),
                Err(e) => Err(e),
            },
        };
        self.depth -= 1;
        result
    }

    fn bind_params(&mut self, func: &Function, args: Args) -> Res<HashMap<String, Value>> {
        let mut locals = HashMap::new();
        let mut positional = args.pos.into_iter();
        let mut kwargs: Vec<(String, Value)> = args.kw;
        let mut varargs_name = None;
        let mut kwargs_name = None;

        for (param, default) in func.params.iter().zip(&func.defaults) {
            match param.kind {
                ParamKind::VarArgs => {
                    varargs_name = Some(param.name.clone());
                    continue;
                }
                ParamKind::KwArgs => {
                    kwargs_name = Some(param.name.clone());
                    continue;
                }
                ParamKind::Normal => {}
            }
            let value = if varargs_name.is_none() {
                positional.next()
            } else {
                None
            };
            let value = match value {
                Some(v) => {
                    if kwargs.iter().any(|(k, _)| *k == param.name) {
                        return Err(Exception::type_error(format!(
                            "{}() got multiple values for argument '{}'",
                            func.name, param.name
                        )));
                    }
                    v
                }
                None => match kwargs.iter().position(|(k, _)| *k == param.name) {
                    Some(pos) => kwargs.remove(pos).1,
                    None => default.clone().ok_or_else(|| {
                        Exception::type_error(format!(
                            "{}() missing 1 required positional argument: '{}'",
                            func.name, param.name
                        ))
                    })?,
                },
            };
            locals.insert(param.name.clone(), value);
        }

        let rest: Vec<Value> = positional.collect();
        match varargs_name {
            Some(name) => {
                locals.insert(name, Value::tuple(rest));
            }
            None if !rest.is_empty() => {
                let expected = func
                    .params
                    .iter()
                    .filter(|p| p.kind == ParamKind::Normal)
                    .count();
                return Err(Exception::type_error(format!(
                    "{}() takes {expected} positional arguments but {} were given",
                    func.name,
                    expected + rest.len()
                )));
            }
            None => {}
        }
        match kwargs_name {
            Some(name) => {
                let mut dict = Dict::new();
                for (k, v) in kwargs {
                    dict.insert(Value::str(k), v)?;
                }
                locals.insert(name, Value::Dict(shared(dict)));
            }
            None => {
                if let Some((k, _)) = kwargs.first() {
                    return Err(Exception::type_error(format!(
                        "{}() got an unexpected keyword argument '{k}'",
                        func.name
                    )));
                }
            }
        }
        Ok(locals)
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    pub(crate) fn binary_op(&mut self, op: BinOp, a: &Value, b: &Value) -> Res<Value> {
        if super::pandas::is_vector(a) || super::pandas::is_vector(b) {
            return super::pandas::vector_binop(self, op, a, b);
        }
        match (op, a, b) {
            (BinOp::Add, Value::List(x), Value::List(y)) => {
                check_len(x.borrow().len().saturating_add(y.borrow().len()))?;
                let mut items = x.borrow().clone();
                items.extend(y.borrow().iter().cloned());
                return Ok(Value::list(items));
            }
            (BinOp::Add, Value::Tuple(x), Value::Tuple(y)) => {
                check_len(x.len().saturating_add(y.len()))?;
                let mut items = (**x).clone();
                items.extend(y.iter().cloned());
                return Ok(Value::tuple(items));
            }
            (BinOp::Mul, Value::List(x), n) | (BinOp::Mul, n, Value::List(x))
                if n.as_int().is_some() && !matches!(n, Value::Bool(_)) =>
            {
                let times = usize::try_from(n.as_int().unwrap_or(0).max(0)).unwrap_or(usize::MAX);
                let items = x.borrow();
                let len = items.len().saturating_mul(times);
                check_len(len)?;
                let mut out = Vec::with_capacity(len);
                for _ in 0..times {
                    out.extend(items.iter().cloned());
                }
                return Ok(Value::list(out));
            }
            (BinOp::Mod, Value::Str(fmt), args) => {
                return Ok(Value::str(super::format::percent_format(fmt, args)?));
            }
            (BinOp::BitOr, Value::Dict(x), Value::Dict(y)) => {
                let mut merged = x.borrow().clone();
                for (k, v) in y.borrow().entries.iter() {
                    merged.insert(k.clone(), v.clone())?;
                }
                return Ok(Value::Dict(shared(merged)));
            }
            (BinOp::BitOr | BinOp::BitAnd | BinOp::Sub | BinOp::BitXor, Value::Set(x), Value::Set(y)) => {
                return set_op(op, &x.borrow(), &y.borrow());
            }
            (BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor, Value::Bool(x), Value::Bool(y)) => {
                return Ok(Value::Bool(match op {
                    BinOp::BitAnd => *x & *y,
                    BinOp::BitOr => *x | *y,
                    _ => *x ^ *y,
                }));
            }
            (
                BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::LShift | BinOp::RShift,
                x,
                y,
            ) => {
                if let (Some(x), Some(y)) = (x.as_int(), y.as_int()) {
                    return Ok(Value::Int(match op {
                        BinOp::BitAnd => x & y,
                        BinOp::BitOr => x | y,
                        BinOp::BitXor => x ^ y,
                        BinOp::LShift => x.checked_shl(y as u32).unwrap_or(0),
                        _ => x.checked_shr(y as u32).unwrap_or(0),
                    }));
                }
                return Err(unsupported(op, a, b));
            }
            _ => {}
        }
        scalar_arith(op, a, b)
    }

    fn unary_op(&mut self, op: UnaryOp, v: &Value) -> Res<Value> {
        if super::pandas::is_vector(v) {
            return super::pandas::vector_unary(op, v);
        }
        match op {
            UnaryOp::Not => Ok(Value::Bool(!v.truthy()?)),
            UnaryOp::Pos => match v {
                Value::Int(_) | Value::Float(_) | Value::Timedelta(_) => Ok(v.clone()),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                _ => Err(bad_operand("unary +", v)),
            },
            UnaryOp::Neg => match v {
                Value::Int(i) => Ok(i
                    .checked_neg()
                    .map(Value::Int)
                    .unwrap_or(Value::Float(-(*i as f64)))),
                Value::Bool(b) => Ok(Value::Int(-i64::from(*b))),
                Value::Float(f) => Ok(Value::Float(-f)),
                Value::Timedelta(d) => Ok(Value::Timedelta(-*d)),
                _ => Err(bad_operand("unary -", v)),
            },
            UnaryOp::Invert => match v.as_int() {
                Some(i) => Ok(Value::Int(!i)),
                None => Err(bad_operand("unary ~", v)),
            },
        }
    }

    pub(crate) fn compare_op(&mut self, op: CmpOp, a: &Value, b: &Value) -> Res<Value> {
        match op {
            CmpOp::In => return Ok(Value::Bool(self.contains(b, a)?)),
            CmpOp::NotIn => return Ok(Value::Bool(!self.contains(b, a)?)),
            CmpOp::Is => return Ok(Value::Bool(a.same_object(b))),
            CmpOp::IsNot => return Ok(Value::Bool(!a.same_object(b))),
            _ => {}
        }
        if super::pandas::is_vector(a) || super::pandas::is_vector(b) {
            return super::pandas::vector_compare(op, a, b);
        }
        let result = match op {
            CmpOp::Eq => py_eq(a, b),
            CmpOp::Ne => !py_eq(a, b),
            _ => match py_cmp(a, b)? {
                None => false,
                Some(ord) => match op {
                    CmpOp::Lt => ord == Ordering::Less,
                    CmpOp::Le => ord != Ordering::Greater,
                    CmpOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                },
            },
        };
        Ok(Value::Bool(result))
    }

    pub(crate) fn contains(&mut self, container: &Value, item: &Value) -> Res<bool> {
        Ok(match container {
            Value::Str(s) => match item {
                Value::Str(sub) => s.contains(&**sub),
                other => {
                    return Err(Exception::type_error(format!(
                        "'in <string>' requires string as left operand, not {}",
                        other.type_name()
                    )))
                }
            },
            Value::List(items) => items.borrow().iter().any(|v| py_eq(v, item)),
            Value::Tuple(items) => items.iter().any(|v| py_eq(v, item)),
            Value::Dict(d) | Value::Set(d) => d.borrow().contains(item)?,
            Value::Range(start, stop, step) => match item.as_int() {
                Some(i) => range_contains(*start, *stop, *step, i),
                None => false,
            },
            Value::Frame(t) => match item {
                Value::Str(name) => t.borrow().has_column(name),
                _ => false,
            },
            Value::Series(s) => {
                let Some(cell) = item.to_cell() else {
                    return Ok(false);
                };
                let found = s.borrow().get_label(&cell).is_some();
                found
            }
            Value::Array(cells) => {
                let Some(cell) = item.to_cell() else {
                    return Ok(false);
                };
                let found = cells.borrow().iter().any(|c| c.group_eq(&cell) && !c.is_missing());
                found
            }
            other => {
                return Err(Exception::type_error(format!(
                    "argument of type '{}' is not iterable",
                    other.type_name()
                )))
            }
        })
    }

    /// Materialize an iterable.
    pub(crate) fn iterate(&mut self, value: &Value) -> Res<Vec<Value>> {
        Ok(match value {
            Value::List(items) => items.borrow().clone(),
            Value::Tuple(items) => (**items).clone(),
            Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
            Value::Dict(d) | Value::Set(d) => d.borrow().keys(),
            Value::Range(start, stop, step) => {
                let n = range_len(*start, *stop, *step);
                if n as u64 > self.limits.max_steps {
                    return Err(Exception::fatal(
                        "TimeoutError",
                        format!("execution step budget of {} exceeded", self.limits.max_steps),
                    ));
                }
                (0..n).map(|i| Value::Int(range_item(*start, *step, i))).collect()
            }
            Value::Frame(t) => t
                .borrow()
                .column_names()
                .into_iter()
                .map(Value::str)
                .collect(),
            Value::Series(s) => s.borrow().values.iter().map(Value::from_cell).collect(),
            Value::Array(cells) => cells.borrow().iter().map(Value::from_cell).collect(),
            Value::GroupBy(g) => super::pandas::groupby_items(g)?,
            other => {
                return Err(Exception::type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )))
            }
        })
    }

    // ------------------------------------------------------------------
    // Subscripts and attributes
    // ------------------------------------------------------------------

    pub(crate) fn get_item(&mut self, obj: &Value, index: &Value) -> Res<Value> {
        match obj {
            Value::List(items) => {
                let items = items.borrow();
                match index {
                    Value::Slice(parts) => Ok(Value::list(slice_values(&items, parts)?)),
                    _ => Ok(items[seq_index(index, items.len(), "list")?].clone()),
                }
            }
            Value::Tuple(items) => match index {
                Value::Slice(parts) => Ok(Value::tuple(slice_values(items, parts)?)),
                _ => Ok(items[seq_index(index, items.len(), "tuple")?].clone()),
            },
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                match index {
                    Value::Slice(parts) => {
                        let positions = slice_positions(chars.len(), parts)?;
                        Ok(Value::str(positions.iter().map(|&p| chars[p]).collect::<String>()))
                    }
                    _ => Ok(Value::str(chars[seq_index(index, chars.len(), "string")?].to_string())),
                }
            }
            Value::Range(start, stop, step) => {
                let n = range_len(*start, *stop, *step);
                let i = seq_index(index, n, "range object")?;
                Ok(Value::Int(range_item(*start, *step, i)))
            }
            Value::Dict(d) => match d.borrow().get(index)? {
                Some(v) => Ok(v.clone()),
                None => Err(Exception::key_error(index.repr())),
            },
            Value::Frame(_) | Value::Series(_) | Value::Array(_) | Value::GroupBy(_) | Value::Accessor(_) => {
                super::pandas::get_item(self, obj, index)
            }
            other => Err(Exception::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn set_item(&mut self, obj: &Value, index: Value, value: Value) -> Res<()> {
        match obj {
            Value::List(list) => {
                let replacement = match &index {
                    Value::Slice(_) => self.iterate(&value)?,
                    _ => Vec::new(),
                };
                let mut items = list.borrow_mut();
                if let Value::Slice(parts) = &index {
                    let positions = slice_positions(items.len(), parts)?;
                    if parts[2].is_none() || parts[2].as_int() == Some(1) {
                        let start = positions.first().copied().unwrap_or_else(|| {
                            slice_start(items.len(), parts).unwrap_or(items.len())
                        });
                        let end = positions.last().map(|p| p + 1).unwrap_or(start);
                        items.splice(start..end, replacement);
                        return Ok(());
                    }
                    if positions.len() != replacement.len() {
                        return Err(Exception::value_error(format!(
                            "attempt to assign sequence of size {} to extended slice of size {}",
                            replacement.len(),
                            positions.len()
                        )));
                    }
                    for (p, v) in positions.into_iter().zip(replacement) {
                        items[p] = v;
                    }
                    return Ok(());
                }
                let i = seq_index(&index, items.len(), "list assignment")?;
                items[i] = value;
                Ok(())
            }
            Value::Dict(d) => d.borrow_mut().insert(index, value),
            Value::Frame(_) | Value::Series(_) | Value::Array(_) | Value::Accessor(_) => {
                super::pandas::set_item(self, obj, index, value)
            }
            other => Err(Exception::type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    fn del_item(&mut self, obj: &Value, index: &Value) -> Res<()> {
        match obj {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                if let Value::Slice(parts) = index {
                    let positions = slice_positions(items.len(), parts)?;
                    let drop: HashSet<usize> = positions.into_iter().collect();
                    let kept: Vec<Value> = items
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| !drop.contains(i))
                        .map(|(_, v)| v.clone())
                        .collect();
                    *items = kept;
                    return Ok(());
                }
                let i = seq_index(index, items.len(), "list assignment")?;
                items.remove(i);
                Ok(())
            }
            Value::Dict(d) => match d.borrow_mut().remove(index)? {
                Some(_) => Ok(()),
                None => Err(Exception::key_error(index.repr())),
            },
            Value::Frame(t) => {
                let Value::Str(name) = index else {
                    return Err(Exception::key_error(index.repr()));
                };
                let mut t = t.borrow_mut();
                let dropped = t.drop_columns(&[name.to_string()])?;
                *t = dropped;
                Ok(())
            }
            other => Err(Exception::type_error(format!(
                "'{}' object doesn't support item deletion",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn get_attr(&mut self, obj: &Value, attr: &str) -> Res<Value> {
        if attr.starts_with("__") {
            return Err(Exception::attribute_error(&obj.type_name(), attr));
        }
        match obj {
            Value::Module(name) => super::builtins::module_attr(name, attr),
            Value::Builtin(b) if b.receiver.is_none() => {
                super::builtins::type_attr(&b.name, attr)
            }
            Value::Frame(_) | Value::Series(_) | Value::Array(_) | Value::GroupBy(_) | Value::Accessor(_) => {
                super::pandas::get_attr(obj, attr)
            }
            Value::DateTime(_) | Value::Timedelta(_) | Value::NaT => {
                super::stdlib::temporal_attr(obj, attr)
            }
            Value::Figure(_) => super::plotly::figure_attr(obj, attr),
            Value::Exception(e) => match attr {
                "args" => Ok(Value::tuple(vec![Value::str(&e.message)])),
                _ => Err(Exception::attribute_error(&e.kind, attr)),
            },
            Value::Function(_) => Err(Exception::attribute_error("function", attr)),
            _ => Ok(Value::method(obj.clone(), attr)),
        }
    }

    fn set_attr(&mut self, obj: &Value, attr: &str, value: Value) -> Res<()> {
        match obj {
            Value::Frame(_) | Value::Series(_) => super::pandas::set_attr(self, obj, attr, value),
            other => Err(Exception::attribute_error(&other.type_name(), attr)),
        }
    }

    /// Dispatch a method call by receiver type.
    pub(crate) fn call_method(&mut self, receiver: &Value, name: &str, args: Args) -> Res<Value> {
        if name.starts_with("__") {
            return Err(Exception::attribute_error(&receiver.type_name(), name));
        }
        match receiver {
            Value::Str(_) | Value::List(_) | Value::Tuple(_) | Value::Dict(_) | Value::Set(_) => {
                super::methods::call(self, receiver, name, args)
            }
            Value::Frame(_) | Value::Series(_) | Value::Array(_) | Value::GroupBy(_) | Value::Accessor(_) => {
                super::pandas::call_method(self, receiver, name, args)
            }
            Value::Figure(_) => super::plotly::figure_method(self, receiver, name, args),
            Value::DateTime(_) | Value::Timedelta(_) | Value::NaT => {
                super::stdlib::temporal_method(receiver, name, args)
            }
            Value::Int(_) | Value::Float(_) | Value::Bool(_) => {
                super::methods::number_method(receiver, name, args)
            }
            other => Err(Exception::attribute_error(&other.type_name(), name)),
        }
    }
}

// ---------------------------------------------------------------------------
// Scalar semantics
// ---------------------------------------------------------------------------

fn unsupported(op: BinOp, a: &Value, b: &Value) -> Exception {
    Exception::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        a.type_name(),
        b.type_name()
    ))
}

fn bad_operand(op: &str, v: &Value) -> Exception {
    Exception::type_error(format!("bad operand type for {op}: '{}'", v.type_name()))
}

pub(crate) fn arith_op(op: BinOp) -> Option<ArithOp> {
    Some(match op {
        BinOp::Add => ArithOp::Add,
        BinOp::Sub => ArithOp::Sub,
        BinOp::Mul => ArithOp::Mul,
        BinOp::Div => ArithOp::Div,
        BinOp::FloorDiv => ArithOp::FloorDiv,
        BinOp::Mod => ArithOp::Mod,
        BinOp::Pow => ArithOp::Pow,
        _ => return None,
    })
}

/// Arithmetic on two scalars with Python's division-by-zero errors.
fn scalar_arith(op: BinOp, a: &Value, b: &Value) -> Res<Value> {
    let Some(aop) = arith_op(op) else {
        return Err(unsupported(op, a, b));
    };
    let (Some(x), Some(y)) = (a.to_cell(), b.to_cell()) else {
        return Err(unsupported(op, a, b));
    };
    if matches!(x, Cell::Null) || matches!(y, Cell::Null) {
        return Err(unsupported(op, a, b));
    }
    if matches!(aop, ArithOp::Div | ArithOp::FloorDiv | ArithOp::Mod) && y.is_numeric() && x.is_numeric() {
        if y.as_f64() == Some(0.0) {
            let both_int = !matches!(x, Cell::Float(_)) && !matches!(y, Cell::Float(_));
            let message = match (aop, both_int) {
                (ArithOp::Div, true) => "division by zero",
                (ArithOp::Div, false) => "float division by zero",
                (_, true) => "integer division or modulo by zero",
                (ArithOp::FloorDiv, false) => "float floor division by zero",
                _ => "float modulo",
            };
            return Err(Exception::new("ZeroDivisionError", message));
        }
    }
    if aop == ArithOp::Pow {
        if let (Some(0.0), Some(e)) = (x.as_f64(), y.as_f64()) {
            if e < 0.0 {
                return Err(Exception::new(
                    "ZeroDivisionError",
                    "0.0 cannot be raised to a negative power",
                ));
            }
        }
    }
    let cell = arith(aop, &x, &y).map_err(|e| match e {
        FrameError::MemoryError(_) => Exception::from(e),
        _ => unsupported(op, a, b),
    })?;
    Ok(Value::from_cell(&cell))
}

fn set_op(op: BinOp, x: &Dict, y: &Dict) -> Res<Value> {
    let mut out = Dict::new();
    match op {
        BinOp::BitOr => {
            for k in x.keys().into_iter().chain(y.keys()) {
                out.insert(k, Value::None)?;
            }
        }
        BinOp::BitAnd => {
            for k in x.keys() {
                if y.contains(&k)? {
                    out.insert(k, Value::None)?;
                }
            }
        }
        BinOp::Sub => {
            for k in x.keys() {
                if !y.contains(&k)? {
                    out.insert(k, Value::None)?;
                }
            }
        }
        _ => {
            for k in x.keys() {
                if !y.contains(&k)? {
                    out.insert(k, Value::None)?;
                }
            }
            for k in y.keys() {
                if !x.contains(&k)? {
                    out.insert(k, Value::None)?;
                }
            }
        }
    }
    Ok(Value::Set(shared(out)))
}

/// Value equality in the Python sense. A container is equal to itself
/// without a walk; distinct containers nested past `MAX_NESTING_DEPTH`
/// compare unequal.
pub(crate) fn py_eq(a: &Value, b: &Value) -> bool {
    eq_at(a, b, 0)
}

fn eq_at(a: &Value, b: &Value, depth: usize) -> bool {
    if a.identity().is_some() && a.same_object(b) {
        return true;
    }
    if depth > MAX_NESTING_DEPTH {
        return false;
    }
    let elem = |p: &Value, q: &Value| eq_at(p, q, depth + 1);
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| elem(p, q))
        }
        (Value::Tuple(x), Value::Tuple(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| elem(p, q))
        }
        (Value::Dict(x), Value::Dict(y)) | (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.entries.iter().all(|(k, v)| match y.get(k) {
                    Ok(Some(other)) => elem(v, other),
                    _ => false,
                })
        }
        (Value::DateTime(x), Value::DateTime(y)) => x == y,
        (Value::Timedelta(x), Value::Timedelta(y)) => x == y,
        (Value::Range(a1, b1, c1), Value::Range(a2, b2, c2)) => (a1, b1, c1) == (a2, b2, c2),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.same_object(b),
        },
    }
}

/// Ordering for `<` and friends; `None` when either side is NaN.
pub(crate) fn py_cmp(a: &Value, b: &Value) -> Res<Option<Ordering>> {
    cmp_at(a, b, 0)
}

fn cmp_at(a: &Value, b: &Value, depth: usize) -> Res<Option<Ordering>> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Exception::recursion_error());
    }
    let fail = || {
        Exception::type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))
    };
    Ok(match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        (Value::Timedelta(x), Value::Timedelta(y)) => Some(x.cmp(y)),
        (Value::List(x), Value::List(y)) => seq_cmp(&x.borrow(), &y.borrow(), depth)?,
        (Value::Tuple(x), Value::Tuple(y)) => seq_cmp(x, y, depth)?,
        (Value::NaT, _) | (_, Value::NaT) => None,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => return Err(fail()),
        },
    })
}

fn seq_cmp(x: &[Value], y: &[Value], depth: usize) -> Res<Option<Ordering>> {
    for (p, q) in x.iter().zip(y) {
        if eq_at(p, q, depth + 1) {
            continue;
        }
        return cmp_at(p, q, depth + 1);
    }
    Ok(Some(x.len().cmp(&y.len())))
}

/// Sort values, optionally by a derived key, propagating comparison errors.
pub(crate) fn sort_values(
    interp: &mut Interpreter,
    items: Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> Res<Vec<Value>> {
    let mut keyed: Vec<(Value, Value)> = Vec::with_capacity(items.len());
    for item in items {
        let k = match key {
            Some(f) if !f.is_none() => interp.call1(f, vec![item.clone()])?,
            _ => item.clone(),
        };
        keyed.push((k, item));
    }
    let mut error = None;
    keyed.sort_by(|(a, _), (b, _)| match py_cmp(a, b) {
        Ok(Some(ord)) => ord,
        Ok(None) => Ordering::Equal,
        Err(e) => {
            error.get_or_insert(e);
            Ordering::Equal
        }
    });
    if let Some(e) = error {
        return Err(e);
    }
    if reverse {
        keyed.reverse();
    }
    Ok(keyed.into_iter().map(|(_, v)| v).collect())
}

/// Resolve a possibly negative index into `0..len`.
pub(crate) fn seq_index(index: &Value, len: usize, what: &str) -> Res<usize> {
    let Some(i) = index.as_int() else {
        return Err(Exception::type_error(format!(
            "{what} indices must be integers or slices, not {}",
            index.type_name()
        )));
    };
    let len = len as i128;
    let resolved = if i < 0 { i128::from(i) + len } else { i128::from(i) };
    if resolved < 0 || resolved >= len {
        return Err(Exception::index_error(format!("{what} index out of range")));
    }
    Ok(resolved as usize)
}

fn slice_bound(v: &Value) -> Res<Option<i64>> {
    match v {
        Value::None => Ok(None),
        other => other.as_int().map(Some).ok_or_else(|| {
            Exception::type_error(
                "slice indices must be integers or None or have an __index__ method",
            )
        }),
    }
}

fn slice_start(len: usize, parts: &[Value; 3]) -> Res<usize> {
    let len = len as i64;
    let start = slice_bound(&parts[0])?.unwrap_or(0);
    let start = if start < 0 { (start + len).max(0) } else { start.min(len) };
    Ok(start as usize)
}

/// Positions selected by `[lo:hi:step]` over a sequence of length `len`.
pub(crate) fn slice_positions(len: usize, parts: &[Value; 3]) -> Res<Vec<usize>> {
    let n = len as i64;
    let step = slice_bound(&parts[2])?.unwrap_or(1);
    if step == 0 {
        return Err(Exception::value_error("slice step cannot be zero"));
    }
    let clamp = |v: i64, lo: i64, hi: i64| v.max(lo).min(hi);
    let (start, stop) = if step > 0 {
        let start = match slice_bound(&parts[0])? {
            Some(s) if s < 0 => clamp(s + n, 0, n),
            Some(s) => clamp(s, 0, n),
            None => 0,
        };
        let stop = match slice_bound(&parts[1])? {
            Some(s) if s < 0 => clamp(s + n, 0, n),
            Some(s) => clamp(s, 0, n),
            None => n,
        };
        (start, stop)
    } else {
        let start = match slice_bound(&parts[0])? {
            Some(s) if s < 0 => clamp(s + n, -1, n - 1),
            Some(s) => clamp(s, -1, n - 1),
            None => n - 1,
        };
        let stop = match slice_bound(&parts[1])? {
            Some(s) if s < 0 => clamp(s + n, -1, n - 1),
            Some(s) => clamp(s, -1, n - 1),
            None => -1,
        };
        (start, stop)
    };
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(i as usize);
        i += step;
    }
    Ok(out)
}

fn slice_values(items: &[Value], parts: &[Value; 3]) -> Res<Vec<Value>> {
    Ok(slice_positions(items.len(), parts)?
        .into_iter()
        .map(|p| items[p].clone())
        .collect())
}
