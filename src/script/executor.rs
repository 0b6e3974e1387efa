//! Script execution state and the tree-walking evaluator.
//!
//! A [`ScriptContext`] owns the globals and the compiled-function table for
//! one security principal and lives in the long-lived context cache; an
//! [`Evaluator`] borrows a context plus a [`NativeHost`] for the duration of
//! exactly one call. Native functions always receive the host explicitly —
//! there is no ambient lookup anywhere in the engine.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::PlScriptError;
use crate::script::compiler::{BinOp, Expr, FunctionDef, LogicalOp, Stmt, UnaryOp};
use crate::script::value::{FuncId, NativeTag, ScriptValue};

/// Cooperative cancellation flag, set externally and polled by the
/// evaluator at every statement and loop iteration.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns whether an interrupt was pending, clearing it.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// A compiled script function owned by a context.
#[derive(Debug, Clone)]
pub struct ScriptFunction {
    pub def: Rc<FunctionDef>,
}

const DEFAULT_STEP_LIMIT: u64 = 5_000_000;
const MAX_CALL_DEPTH: usize = 128;

/// Per-principal script execution context: globals plus the
/// compiled-function table referenced by [`FuncId`] handles.
#[derive(Debug)]
pub struct ScriptContext {
    globals: HashMap<String, ScriptValue>,
    functions: HashMap<FuncId, ScriptFunction>,
    next_func: FuncId,
    interrupt: InterruptFlag,
    step_limit: u64,
}

impl ScriptContext {
    pub fn new(interrupt: InterruptFlag) -> Self {
        Self {
            globals: HashMap::new(),
            functions: HashMap::new(),
            next_func: 1,
            interrupt,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn interrupt(&self) -> &InterruptFlag {
        &self.interrupt
    }

    pub fn set_step_limit(&mut self, limit: u64) {
        self.step_limit = limit;
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: ScriptValue) {
        self.globals.insert(name.into(), value);
    }

    pub fn global(&self, name: &str) -> Option<&ScriptValue> {
        self.globals.get(name)
    }

    pub fn register_function(&mut self, def: Rc<FunctionDef>) -> FuncId {
        let id = self.next_func;
        self.next_func += 1;
        self.functions.insert(id, ScriptFunction { def });
        id
    }

    pub fn release_function(&mut self, id: FuncId) {
        self.functions.remove(&id);
    }

    pub fn function(&self, id: FuncId) -> Option<&ScriptFunction> {
        self.functions.get(&id)
    }
}

/// Host surface reached by native functions during evaluation.
pub trait NativeHost {
    fn call_native(
        &mut self,
        ctx: &mut ScriptContext,
        tag: NativeTag,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, PlScriptError>;
}

/// Host that rejects every native call; used where script code must be pure.
pub struct NullHost;

impl NativeHost for NullHost {
    fn call_native(
        &mut self,
        _ctx: &mut ScriptContext,
        tag: NativeTag,
        _this: &ScriptValue,
        _args: &[ScriptValue],
    ) -> Result<ScriptValue, PlScriptError> {
        Err(PlScriptError::execution(format!(
            "native function {tag:?} is not available in this context"
        )))
    }
}

/// Variable scopes for one activation; lookup falls back to the context
/// globals.
#[derive(Debug, Default)]
struct Env {
    scopes: Vec<HashMap<String, ScriptValue>>,
}

impl Env {
    fn with_scope(bindings: HashMap<String, ScriptValue>) -> Self {
        Self {
            scopes: vec![bindings],
        }
    }

    fn declare(&mut self, name: String, value: ScriptValue) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, value);
        }
    }

    fn get(&self, name: &str) -> Option<&ScriptValue> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut ScriptValue> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
    }
}

enum Flow {
    Normal(ScriptValue),
    Return(ScriptValue),
    Break,
    Continue,
}

enum PathSeg {
    Prop(String),
    Idx(ScriptValue),
}

/// One call's evaluator over a borrowed context and host.
pub struct Evaluator<'a> {
    ctx: &'a mut ScriptContext,
    host: &'a mut dyn NativeHost,
    depth: usize,
    steps: u64,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a mut ScriptContext, host: &'a mut dyn NativeHost) -> Self {
        Self {
            ctx,
            host,
            depth: 0,
            steps: 0,
        }
    }

    /// Executes top-level statements; the completion value is the value of
    /// the last expression statement, so a trailing `name;` yields the
    /// declared function.
    pub fn eval_program(&mut self, stmts: &[Stmt]) -> Result<ScriptValue, PlScriptError> {
        let mut env = Env::with_scope(HashMap::new());
        let mut completion = ScriptValue::Undefined;
        for stmt in stmts {
            match self.exec_stmt(stmt, &mut env)? {
                Flow::Normal(value) => completion = value,
                Flow::Return(_) => {
                    return Err(PlScriptError::execution("return outside of function"));
                }
                Flow::Break | Flow::Continue => {
                    return Err(PlScriptError::execution(
                        "break or continue outside of loop",
                    ));
                }
            }
        }
        Ok(completion)
    }

    /// Invokes a compiled function with positional arguments.
    pub fn call(
        &mut self,
        func: FuncId,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, PlScriptError> {
        let function = self
            .ctx
            .function(func)
            .ok_or_else(|| PlScriptError::execution(format!("dangling function handle {func}")))?
            .clone();
        self.call_def(&function.def, args)
    }

    fn call_def(
        &mut self,
        def: &Rc<FunctionDef>,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, PlScriptError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(PlScriptError::execution("call stack exhausted"));
        }
        let mut bindings = HashMap::new();
        for (i, param) in def.params.iter().enumerate() {
            bindings.insert(
                param.clone(),
                args.get(i).cloned().unwrap_or(ScriptValue::Undefined),
            );
        }
        let mut env = Env::with_scope(bindings);
        self.depth += 1;
        let result = self.exec_block(&def.body, &mut env);
        self.depth -= 1;
        let frame = def.name.as_deref().unwrap_or("<anonymous>");
        match result.map_err(|e| e.with_frame(frame))? {
            Flow::Return(value) => Ok(value),
            Flow::Normal(_) => Ok(ScriptValue::Undefined),
            Flow::Break | Flow::Continue => Err(PlScriptError::execution(
                "break or continue outside of loop",
            )
            .with_frame(frame)),
        }
    }

    fn tick(&mut self) -> Result<(), PlScriptError> {
        if self.ctx.interrupt.take() {
            return Err(PlScriptError::Cancelled);
        }
        self.steps += 1;
        if self.steps > self.ctx.step_limit {
            return Err(PlScriptError::execution("script execution budget exceeded"));
        }
        Ok(())
    }

    fn exec_block(&mut self, stmts: &[Stmt], env: &mut Env) -> Result<Flow, PlScriptError> {
        for stmt in stmts {
            match self.exec_stmt(stmt, env)? {
                Flow::Normal(_) => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal(ScriptValue::Undefined))
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &mut Env) -> Result<Flow, PlScriptError> {
        self.tick()?;
        match stmt {
            Stmt::Expr(expr) => Ok(Flow::Normal(self.eval(expr, env)?)),
            Stmt::VarDecl { name, init } => {
                let value = match init {
                    Some(expr) => self.eval(expr, env)?,
                    None => ScriptValue::Undefined,
                };
                env.declare(name.clone(), value);
                Ok(Flow::Normal(ScriptValue::Undefined))
            }
            Stmt::FunctionDecl(def) => {
                let id = self.ctx.register_function(Rc::clone(def));
                let name = def
                    .name
                    .clone()
                    .expect("parser only emits named declarations");
                env.declare(name, ScriptValue::Function(id));
                Ok(Flow::Normal(ScriptValue::Undefined))
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, env)?,
                    None => ScriptValue::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval(cond, env)?.truthy() {
                    self.exec_block(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.exec_block(else_branch, env)
                } else {
                    Ok(Flow::Normal(ScriptValue::Undefined))
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond, env)?.truthy() {
                    self.tick()?;
                    match self.exec_block(body, env)? {
                        Flow::Normal(_) | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal(ScriptValue::Undefined))
            }
            Stmt::Block(stmts) => self.exec_block(stmts, env),
            Stmt::Throw(expr) => {
                let value = self.eval(expr, env)?;
                Err(PlScriptError::execution(value.display_string()))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    fn eval(&mut self, expr: &Expr, env: &mut Env) -> Result<ScriptValue, PlScriptError> {
        match expr {
            Expr::Number(n) => Ok(ScriptValue::Number(*n)),
            Expr::BigInt(n) => Ok(ScriptValue::BigInt(*n)),
            Expr::Str(s) => Ok(ScriptValue::String(s.clone())),
            Expr::Bool(b) => Ok(ScriptValue::Bool(*b)),
            Expr::Null => Ok(ScriptValue::Null),
            Expr::Undefined => Ok(ScriptValue::Undefined),
            Expr::Ident(name) => self.lookup(name, env),
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, env)?);
                }
                Ok(ScriptValue::Array(out))
            }
            Expr::Object(pairs) => {
                let mut map = std::collections::BTreeMap::new();
                for (key, value) in pairs {
                    map.insert(key.clone(), self.eval(value, env)?);
                }
                Ok(ScriptValue::Object(map))
            }
            Expr::Function(def) => {
                let id = self.ctx.register_function(Rc::clone(def));
                Ok(ScriptValue::Function(id))
            }
            Expr::Member { object, property } => {
                let value = self.eval(object, env)?;
                Ok(read_member(&value, property))
            }
            Expr::Index { object, index } => {
                let target = self.eval(object, env)?;
                let key = self.eval(index, env)?;
                read_index(&target, &key)
            }
            Expr::Call { callee, args } => self.eval_call(callee, args, env),
            Expr::New { constructor, args } => self.eval_new(constructor, args, env),
            Expr::Unary { op, expr } => {
                let value = self.eval(expr, env)?;
                match op {
                    UnaryOp::Not => Ok(ScriptValue::Bool(!value.truthy())),
                    UnaryOp::Neg => match value {
                        ScriptValue::BigInt(n) => Ok(ScriptValue::BigInt(-n)),
                        other => {
                            let n = other.as_number().ok_or_else(|| {
                                PlScriptError::execution(format!(
                                    "cannot negate a {}",
                                    other.type_name()
                                ))
                            })?;
                            Ok(ScriptValue::Number(-n))
                        }
                    },
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, env)?;
                let rhs = self.eval(rhs, env)?;
                binary_op(*op, &lhs, &rhs)
            }
            Expr::Logical { op, lhs, rhs } => {
                let lhs = self.eval(lhs, env)?;
                match op {
                    LogicalOp::And => {
                        if lhs.truthy() {
                            self.eval(rhs, env)
                        } else {
                            Ok(lhs)
                        }
                    }
                    LogicalOp::Or => {
                        if lhs.truthy() {
                            Ok(lhs)
                        } else {
                            self.eval(rhs, env)
                        }
                    }
                }
            }
            Expr::Assign { target, op, value } => {
                let mut new_value = self.eval(value, env)?;
                if let Some(op) = op {
                    let current = self.eval(target, env)?;
                    new_value = binary_op(*op, &current, &new_value)?;
                }
                self.assign(target, new_value.clone(), env)?;
                Ok(new_value)
            }
        }
    }

    fn lookup(&self, name: &str, env: &Env) -> Result<ScriptValue, PlScriptError> {
        if let Some(value) = env.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.ctx.globals.get(name) {
            return Ok(value.clone());
        }
        Err(PlScriptError::execution(format!("{name} is not defined")))
    }

    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        env: &mut Env,
    ) -> Result<ScriptValue, PlScriptError> {
        self.tick()?;
        // Method calls carry the receiver as `this` so natives bound into
        // plan/cursor/window objects can reach their own state.
        let (this, target) = match callee {
            Expr::Member { object, property } => {
                let receiver = self.eval(object, env)?;
                let member = read_member(&receiver, property);
                (receiver, member)
            }
            Expr::Index { object, index } => {
                let receiver = self.eval(object, env)?;
                let key = self.eval(index, env)?;
                let member = read_index(&receiver, &key)?;
                (receiver, member)
            }
            other => (ScriptValue::Undefined, self.eval(other, env)?),
        };

        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            arg_values.push(self.eval(arg, env)?);
        }

        match target {
            ScriptValue::Function(id) => self.call(id, &arg_values),
            ScriptValue::Native(tag) => self.host.call_native(self.ctx, tag, &this, &arg_values),
            other => Err(PlScriptError::execution(format!(
                "{} is not callable",
                other.type_name()
            ))),
        }
    }

    fn eval_new(
        &mut self,
        constructor: &str,
        args: &[Expr],
        env: &mut Env,
    ) -> Result<ScriptValue, PlScriptError> {
        match constructor {
            "Date" => {
                let first = args
                    .first()
                    .map(|arg| self.eval(arg, env))
                    .transpose()?
                    .ok_or_else(|| {
                        PlScriptError::execution(
                            "Date requires an explicit epoch-milliseconds argument",
                        )
                    })?;
                let millis = first.as_number().ok_or_else(|| {
                    PlScriptError::execution("Date argument must be a number")
                })?;
                Ok(ScriptValue::Date(millis as i64))
            }
            other => Err(PlScriptError::execution(format!(
                "unknown constructor: {other}"
            ))),
        }
    }

    fn assign(
        &mut self,
        target: &Expr,
        value: ScriptValue,
        env: &mut Env,
    ) -> Result<(), PlScriptError> {
        // Collect the access path first: index expressions must be evaluated
        // before the destination slot is mutably borrowed.
        let mut segs = Vec::new();
        let mut cursor = target;
        let root = loop {
            match cursor {
                Expr::Ident(name) => break name.clone(),
                Expr::Member { object, property } => {
                    segs.push(PathSeg::Prop(property.clone()));
                    cursor = object;
                }
                Expr::Index { object, index } => {
                    let key = self.eval(index, env)?;
                    segs.push(PathSeg::Idx(key));
                    cursor = object;
                }
                _ => return Err(PlScriptError::execution("invalid assignment target")),
            }
        };
        segs.reverse();

        let root_in_env = env.get(&root).is_some();
        let root_in_globals = !root_in_env && self.ctx.globals.contains_key(&root);
        if !root_in_env && !root_in_globals {
            if segs.is_empty() {
                env.declare(root, value);
                return Ok(());
            }
            return Err(PlScriptError::execution(format!("{root} is not defined")));
        }
        let slot = if root_in_env {
            env.get_mut(&root).expect("presence checked above")
        } else {
            self.ctx
                .globals
                .get_mut(&root)
                .expect("presence checked above")
        };

        let mut current = slot;
        for seg in &segs[..segs.len().saturating_sub(1)] {
            current = walk_path_mut(current, seg)?;
        }
        match segs.last() {
            None => *current = value,
            Some(seg) => write_path(current, seg, value)?,
        }
        Ok(())
    }
}

fn walk_path_mut<'v>(
    value: &'v mut ScriptValue,
    seg: &PathSeg,
) -> Result<&'v mut ScriptValue, PlScriptError> {
    match (value, seg) {
        (ScriptValue::Object(map), PathSeg::Prop(name)) => map
            .get_mut(name)
            .ok_or_else(|| PlScriptError::execution(format!("property {name} is undefined"))),
        (ScriptValue::Object(map), PathSeg::Idx(key)) => {
            let name = key.display_string();
            map.get_mut(&name)
                .ok_or_else(|| PlScriptError::execution(format!("property {name} is undefined")))
        }
        (ScriptValue::Array(items), PathSeg::Idx(key)) => {
            let idx = index_of(key, items.len())?;
            items
                .get_mut(idx)
                .ok_or_else(|| PlScriptError::execution(format!("index {idx} is out of range")))
        }
        (other, _) => Err(PlScriptError::execution(format!(
            "cannot index into a {}",
            other.type_name()
        ))),
    }
}

fn write_path(
    value: &mut ScriptValue,
    seg: &PathSeg,
    new_value: ScriptValue,
) -> Result<(), PlScriptError> {
    match (value, seg) {
        (ScriptValue::Object(map), PathSeg::Prop(name)) => {
            map.insert(name.clone(), new_value);
            Ok(())
        }
        (ScriptValue::Object(map), PathSeg::Idx(key)) => {
            map.insert(key.display_string(), new_value);
            Ok(())
        }
        (ScriptValue::Array(items), PathSeg::Idx(key)) => {
            let idx = index_of(key, items.len() + 1)?;
            if idx == items.len() {
                items.push(new_value);
            } else {
                items[idx] = new_value;
            }
            Ok(())
        }
        (other, _) => Err(PlScriptError::execution(format!(
            "cannot assign into a {}",
            other.type_name()
        ))),
    }
}

fn index_of(key: &ScriptValue, len: usize) -> Result<usize, PlScriptError> {
    let n = key
        .as_number()
        .ok_or_else(|| PlScriptError::execution("array index must be a number"))?;
    if n < 0.0 || n.fract() != 0.0 || n as usize >= len {
        return Err(PlScriptError::execution(format!(
            "index {n} is out of range"
        )));
    }
    Ok(n as usize)
}

fn read_member(value: &ScriptValue, property: &str) -> ScriptValue {
    match value {
        ScriptValue::Object(map) => map.get(property).cloned().unwrap_or(ScriptValue::Undefined),
        ScriptValue::Array(items) if property == "length" => {
            ScriptValue::Number(items.len() as f64)
        }
        ScriptValue::String(s) if property == "length" => {
            ScriptValue::Number(s.chars().count() as f64)
        }
        ScriptValue::Bytes(bytes) if property == "length" => {
            ScriptValue::Number(bytes.len() as f64)
        }
        ScriptValue::TypedArray { values, .. } if property == "length" => {
            ScriptValue::Number(values.len() as f64)
        }
        _ => ScriptValue::Undefined,
    }
}

fn read_index(value: &ScriptValue, key: &ScriptValue) -> Result<ScriptValue, PlScriptError> {
    match value {
        ScriptValue::Object(map) => Ok(map
            .get(&key.display_string())
            .cloned()
            .unwrap_or(ScriptValue::Undefined)),
        ScriptValue::Array(items) => {
            let Some(n) = key.as_number() else {
                return Ok(ScriptValue::Undefined);
            };
            if n < 0.0 || n.fract() != 0.0 {
                return Ok(ScriptValue::Undefined);
            }
            Ok(items
                .get(n as usize)
                .cloned()
                .unwrap_or(ScriptValue::Undefined))
        }
        ScriptValue::TypedArray { values, .. } => {
            let Some(n) = key.as_number() else {
                return Ok(ScriptValue::Undefined);
            };
            Ok(values
                .get(n as usize)
                .map(|v| ScriptValue::Number(*v as f64))
                .unwrap_or(ScriptValue::Undefined))
        }
        ScriptValue::Bytes(bytes) => {
            let Some(n) = key.as_number() else {
                return Ok(ScriptValue::Undefined);
            };
            Ok(bytes
                .get(n as usize)
                .map(|b| ScriptValue::Number(f64::from(*b)))
                .unwrap_or(ScriptValue::Undefined))
        }
        ScriptValue::String(s) => {
            let Some(n) = key.as_number() else {
                return Ok(ScriptValue::Undefined);
            };
            Ok(s.chars()
                .nth(n as usize)
                .map(|c| ScriptValue::String(c.to_string()))
                .unwrap_or(ScriptValue::Undefined))
        }
        other => Err(PlScriptError::execution(format!(
            "cannot index into a {}",
            other.type_name()
        ))),
    }
}

fn binary_op(
    op: BinOp,
    lhs: &ScriptValue,
    rhs: &ScriptValue,
) -> Result<ScriptValue, PlScriptError> {
    use ScriptValue as V;
    match op {
        BinOp::Add => {
            if matches!(lhs, V::String(_)) || matches!(rhs, V::String(_)) {
                return Ok(V::String(format!(
                    "{}{}",
                    lhs.display_string(),
                    rhs.display_string()
                )));
            }
            arithmetic(op, lhs, rhs)
        }
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => arithmetic(op, lhs, rhs),
        BinOp::Eq => Ok(V::Bool(loose_eq(lhs, rhs))),
        BinOp::NotEq => Ok(V::Bool(!loose_eq(lhs, rhs))),
        BinOp::StrictEq => Ok(V::Bool(strict_eq(lhs, rhs))),
        BinOp::StrictNotEq => Ok(V::Bool(!strict_eq(lhs, rhs))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = if let (V::String(a), V::String(b)) = (lhs, rhs) {
                a.partial_cmp(b)
            } else {
                let a = lhs.as_number().ok_or_else(|| cmp_error(lhs))?;
                let b = rhs.as_number().ok_or_else(|| cmp_error(rhs))?;
                a.partial_cmp(&b)
            };
            let Some(ordering) = ordering else {
                return Ok(V::Bool(false));
            };
            Ok(V::Bool(match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                BinOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            }))
        }
    }
}

fn cmp_error(value: &ScriptValue) -> PlScriptError {
    PlScriptError::execution(format!("cannot compare a {}", value.type_name()))
}

fn arithmetic(
    op: BinOp,
    lhs: &ScriptValue,
    rhs: &ScriptValue,
) -> Result<ScriptValue, PlScriptError> {
    use ScriptValue as V;
    match (lhs, rhs) {
        (V::BigInt(a), V::BigInt(b)) => {
            let result = match op {
                BinOp::Add => a.checked_add(*b),
                BinOp::Sub => a.checked_sub(*b),
                BinOp::Mul => a.checked_mul(*b),
                BinOp::Div => {
                    if *b == 0 {
                        return Err(PlScriptError::execution("division by zero"));
                    }
                    a.checked_div(*b)
                }
                BinOp::Rem => {
                    if *b == 0 {
                        return Err(PlScriptError::execution("division by zero"));
                    }
                    a.checked_rem(*b)
                }
                _ => unreachable!(),
            };
            result
                .map(V::BigInt)
                .ok_or_else(|| PlScriptError::execution("bigint arithmetic overflow"))
        }
        (V::BigInt(_), _) | (_, V::BigInt(_)) => Err(PlScriptError::execution(
            "cannot mix bigint and other types in arithmetic",
        )),
        _ => {
            let a = lhs.as_number().ok_or_else(|| arith_error(lhs))?;
            let b = rhs.as_number().ok_or_else(|| arith_error(rhs))?;
            Ok(V::Number(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                BinOp::Rem => a % b,
                _ => unreachable!(),
            }))
        }
    }
}

fn arith_error(value: &ScriptValue) -> PlScriptError {
    PlScriptError::execution(format!(
        "cannot use a {} in arithmetic",
        value.type_name()
    ))
}

fn strict_eq(lhs: &ScriptValue, rhs: &ScriptValue) -> bool {
    use ScriptValue as V;
    match (lhs, rhs) {
        (V::Number(a), V::Number(b)) => a == b,
        (V::Number(_), _) | (_, V::Number(_)) => false,
        _ => lhs == rhs,
    }
}

fn loose_eq(lhs: &ScriptValue, rhs: &ScriptValue) -> bool {
    use ScriptValue as V;
    if lhs.is_nullish() && rhs.is_nullish() {
        return true;
    }
    match (lhs, rhs) {
        (V::String(a), V::String(b)) => a == b,
        (V::Bool(_) | V::Number(_) | V::BigInt(_) | V::String(_) | V::Date(_), _)
            if matches!(
                rhs,
                V::Bool(_) | V::Number(_) | V::BigInt(_) | V::String(_) | V::Date(_)
            ) =>
        {
            match (lhs.as_number(), rhs.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => strict_eq(lhs, rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::compiler::parse_program;

    fn eval_source(source: &str) -> Result<ScriptValue, PlScriptError> {
        let stmts = parse_program(source)?;
        let mut ctx = ScriptContext::new(InterruptFlag::new());
        let mut host = NullHost;
        Evaluator::new(&mut ctx, &mut host).eval_program(&stmts)
    }

    #[test]
    fn trailing_reference_yields_declared_function() {
        let stmts = parse_program("function add(a, b) { return a + b; }\nadd;").unwrap();
        let mut ctx = ScriptContext::new(InterruptFlag::new());
        let mut host = NullHost;
        let value = Evaluator::new(&mut ctx, &mut host)
            .eval_program(&stmts)
            .expect("program should evaluate");
        let ScriptValue::Function(id) = value else {
            panic!("expected function handle");
        };
        let result = Evaluator::new(&mut ctx, &mut host)
            .call(id, &[ScriptValue::Number(2.0), ScriptValue::Number(3.0)])
            .expect("call should succeed");
        assert_eq!(result, ScriptValue::Number(5.0));
    }

    #[test]
    fn while_loop_with_break_and_assignment() {
        let value = eval_source(
            "var total = 0; var i = 0;\nwhile (true) { if (i >= 4) { break; } total += i; i += 1; }\ntotal;",
        )
        .expect("loop should evaluate");
        assert_eq!(value, ScriptValue::Number(6.0));
    }

    #[test]
    fn bigint_arithmetic_stays_bigint() {
        let value = eval_source("9007199254740993n - 1n;").expect("should evaluate");
        assert_eq!(value, ScriptValue::BigInt(9_007_199_254_740_992));
    }

    #[test]
    fn mixing_bigint_and_number_is_an_error() {
        let err = eval_source("1n + 1;").expect_err("mixed arithmetic should fail");
        assert!(matches!(err, PlScriptError::Execution { .. }));
    }

    #[test]
    fn member_assignment_mutates_objects_and_arrays() {
        let value = eval_source(
            "var row = { a: 1, tags: [1, 2] };\nrow.a = 5; row.tags[1] = 9; row.tags[2] = 10;\nrow.a + row.tags[1] + row.tags[2];",
        )
        .expect("should evaluate");
        assert_eq!(value, ScriptValue::Number(24.0));
    }

    #[test]
    fn throw_surfaces_as_execution_error() {
        let err = eval_source("throw 'custom failure';").expect_err("throw should fail");
        assert_eq!(
            err,
            PlScriptError::Execution {
                message: "custom failure".to_string(),
                stack: Vec::new(),
            }
        );
    }

    #[test]
    fn error_inside_function_carries_stack_frame() {
        let err = eval_source("function f() { return missing + 1; }\nf();")
            .expect_err("unknown identifier should fail");
        let PlScriptError::Execution { stack, .. } = err else {
            panic!("expected execution error");
        };
        assert_eq!(stack, vec!["f".to_string()]);
    }

    #[test]
    fn interrupt_aborts_run_and_clears_flag() {
        let stmts = parse_program("while (true) { }").unwrap();
        let mut ctx = ScriptContext::new(InterruptFlag::new());
        ctx.interrupt().raise();
        let mut host = NullHost;
        let err = Evaluator::new(&mut ctx, &mut host)
            .eval_program(&stmts)
            .expect_err("interrupt should abort");
        assert_eq!(err, PlScriptError::Cancelled);
        assert!(!ctx.interrupt().is_set());
    }

    #[test]
    fn runaway_loop_hits_step_budget() {
        let stmts = parse_program("while (true) { }").unwrap();
        let mut ctx = ScriptContext::new(InterruptFlag::new());
        ctx.set_step_limit(10_000);
        let mut host = NullHost;
        let err = Evaluator::new(&mut ctx, &mut host)
            .eval_program(&stmts)
            .expect_err("budget should abort");
        assert!(matches!(err, PlScriptError::Execution { .. }));
    }

    #[test]
    fn new_date_builds_date_value() {
        let value = eval_source("new Date(86400000);").expect("should evaluate");
        assert_eq!(value, ScriptValue::Date(86_400_000));
    }
}
