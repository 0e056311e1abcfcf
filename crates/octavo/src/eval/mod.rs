//! The tree-walking evaluator.
//!
//! One [`TreeEvaluator`] owns all interpreter state: the call stack, the
//! class registry, user functions and builtins, the event manager handle and
//! the debugger state. It is single-threaded by construction; the only
//! cross-thread channels are the interrupt flag and the event queue.
//!
//! Control flow of the interpreted program never uses Rust unwinding:
//! `break`, `continue` and `return` are cooperative counters. A `break`
//! sets the counter to the number of loop levels to unwind; each loop
//! decrements it and stops iterating while it is nonzero, `switch` passes it
//! through untouched, and a function boundary clears it. Errors are the one
//! unwinding channel (`Result`), shared by interpreter-raised and
//! user-raised errors alike.

mod call;
mod debug;

pub use call::ClassContext;
pub use debug::{DebugCommand, DebugInput};

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::AHashMap;

use crate::ast::{
    BinaryOp, ClassDef, Expr, ExprKind, FunctionDef, IndexOp, LValue, PostfixOp, ShortCircuitOp,
    Stmt, StmtKind, UnaryOp,
};
use crate::cdef::{make_meta_class, CdefManager, ResolvedIndex};
use crate::error::{ErrorId, ExecError, ExecResult};
use crate::event::EventManager;
use crate::io::{OutputWriter, StdOutput};
use crate::stack::{CallStack, FrameContext};
use crate::value::{AnonClosure, FnHandleValue, Matrix, Value};
use crate::walker::{self, TreeWalker};
use crate::{builtins, commands};

/// A host-registered builtin: `(evaluator, args, nargout) -> outputs`.
pub type Builtin = Rc<dyn Fn(&mut TreeEvaluator, &[Value], usize) -> ExecResult<Vec<Value>>>;

/// The value and position information `end` resolves against.
struct EndContext {
    value: Value,
    /// 0-based position of the index argument being evaluated.
    position: usize,
    /// Total index arguments in the enclosing list.
    count: usize,
}

const DEFAULT_MAX_RECURSION_DEPTH: usize = 256;

/// The interpreter.
pub struct TreeEvaluator {
    pub(crate) stack: CallStack,
    classes: CdefManager,
    events: Arc<EventManager>,
    functions: AHashMap<String, Rc<FunctionDef>>,
    builtins: AHashMap<String, Builtin>,
    breaking: usize,
    continuing: usize,
    returning: usize,
    end_contexts: Vec<EndContext>,
    pub(crate) class_contexts: Vec<ClassContext>,
    max_recursion_depth: usize,
    strict_construction: bool,
    pub(crate) breakpoints: AHashMap<String, ahash::AHashSet<u32>>,
    pub(crate) dbstep: bool,
    pub(crate) debug_input: Option<Box<dyn DebugInput>>,
    pub(crate) debug_depth: usize,
    interrupted: Arc<AtomicBool>,
    out: Box<dyn OutputWriter>,
}

impl Default for TreeEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeEvaluator {
    #[must_use]
    pub fn new() -> Self {
        let mut ev = Self {
            stack: CallStack::new(),
            classes: CdefManager::new(),
            events: Arc::new(EventManager::new()),
            functions: AHashMap::new(),
            builtins: AHashMap::new(),
            breaking: 0,
            continuing: 0,
            returning: 0,
            end_contexts: Vec::new(),
            class_contexts: Vec::new(),
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            strict_construction: false,
            breakpoints: AHashMap::new(),
            dbstep: false,
            debug_input: None,
            debug_depth: 0,
            interrupted: Arc::new(AtomicBool::new(false)),
            out: Box::new(StdOutput),
        };
        builtins::register_defaults(&mut ev);
        commands::register_defaults(&mut ev);
        ev
    }

    // --- configuration ------------------------------------------------------

    /// The event manager shared with front-ends and producer threads.
    #[must_use]
    pub fn events(&self) -> Arc<EventManager> {
        Arc::clone(&self.events)
    }

    /// The flag an external thread sets to interrupt execution at the next
    /// statement boundary.
    #[must_use]
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn set_output(&mut self, out: Box<dyn OutputWriter>) {
        self.out = out;
    }

    pub fn set_max_recursion_depth(&mut self, depth: usize) {
        self.max_recursion_depth = depth;
    }

    #[must_use]
    pub(crate) fn max_recursion_depth(&self) -> usize {
        self.max_recursion_depth
    }

    /// Enables the strict-construction check: property access on an object
    /// whose declaring class is still pending construction fails unless the
    /// access comes from the construction chain itself.
    pub fn set_strict_construction(&mut self, strict: bool) {
        self.strict_construction = strict;
    }

    #[must_use]
    pub fn strict_construction(&self) -> bool {
        self.strict_construction
    }

    #[must_use]
    pub fn classes(&self) -> &CdefManager {
        &self.classes
    }

    pub fn classes_mut(&mut self) -> &mut CdefManager {
        &mut self.classes
    }

    /// Registers a builtin function callable from interpreted code.
    pub fn register_builtin(
        &mut self,
        name: impl Into<String>,
        builtin: impl Fn(&mut Self, &[Value], usize) -> ExecResult<Vec<Value>> + 'static,
    ) {
        self.builtins.insert(name.into(), Rc::new(builtin));
    }

    /// Registers a user function definition.
    pub fn register_function(&mut self, function: FunctionDef) {
        self.functions
            .insert(function.name.clone(), Rc::new(function));
    }

    /// Builds and registers the class a `classdef` block defines.
    pub fn define_class(&mut self, def: &ClassDef) -> ExecResult<()> {
        let class = make_meta_class(&self.classes, def)?;
        self.classes.register_class(class);
        Ok(())
    }

    /// Reads a variable from the current workspace.
    #[must_use]
    pub fn lookup_variable(&self, name: &str) -> Option<Value> {
        self.stack.get_var(name).cloned()
    }

    /// Writes a variable into the current workspace.
    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.stack.set_var(name, value);
    }

    /// The class whose method or constructor is currently executing.
    #[must_use]
    pub fn current_class_context(&self) -> Option<crate::cdef::CdefClass> {
        self.class_contexts.last().map(|ctx| ctx.class.clone())
    }

    pub(crate) fn function(&self, name: &str) -> Option<Rc<FunctionDef>> {
        self.functions.get(name).cloned()
    }

    pub(crate) fn builtin(&self, name: &str) -> Option<Builtin> {
        self.builtins.get(name).cloned()
    }

    pub(crate) fn write_output_line(&mut self, text: &str) {
        self.out.write_line(text);
    }

    // --- statement execution ------------------------------------------------

    /// Evaluates a statement list as top-level input: runs the statements,
    /// pushes a workspace notification and drains the event queue.
    pub fn eval_statements(&mut self, stmts: &[Stmt]) -> ExecResult<()> {
        let result = self.exec_statements(stmts);
        self.notify_workspace();
        let events = Arc::clone(&self.events);
        events.process_events(self);
        result
    }

    pub(crate) fn exec_statements(&mut self, stmts: &[Stmt]) -> ExecResult<()> {
        for stmt in stmts {
            if self.interrupted.swap(false, Ordering::SeqCst) {
                self.events
                    .with_link((), |link| link.interpreter_interrupted());
                return Err(ExecError::new(ErrorId::Interrupted, "execution interrupted"));
            }
            self.stack.set_location(stmt.loc);
            self.debug_check(stmt)?;
            self.exec_stmt(stmt)?;
            if self.breaking > 0 || self.continuing > 0 || self.returning > 0 {
                break;
            }
        }
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> ExecResult<()> {
        match &stmt.kind {
            StmtKind::NoOp => Ok(()),
            StmtKind::Expression { expr, suppressed } => self.exec_expression(expr, *suppressed),
            StmtKind::Assign {
                targets,
                rhs,
                suppressed,
            } => self.exec_assign(targets, rhs, *suppressed),
            StmtKind::If { clauses, else_body } => {
                for clause in clauses {
                    if self.eval_expr(&clause.cond)?.is_truthy()? {
                        return self.exec_statements(&clause.body);
                    }
                }
                self.exec_statements(else_body)
            }
            StmtKind::Switch {
                subject,
                cases,
                otherwise,
            } => self.exec_switch(subject, cases, otherwise.as_deref()),
            StmtKind::While { cond, body } => {
                while self.eval_expr(cond)?.is_truthy()? {
                    self.exec_statements(body)?;
                    if self.loop_should_stop() {
                        break;
                    }
                }
                Ok(())
            }
            StmtKind::DoUntil { body, cond } => {
                loop {
                    self.exec_statements(body)?;
                    if self.loop_should_stop() {
                        break;
                    }
                    if self.eval_expr(cond)?.is_truthy()? {
                        break;
                    }
                }
                Ok(())
            }
            StmtKind::SimpleFor {
                var,
                iterable,
                body,
            } => {
                let items = self.eval_expr(iterable)?.iter_columns()?;
                for item in items {
                    self.stack.set_var(var, item);
                    self.exec_statements(body)?;
                    if self.loop_should_stop() {
                        break;
                    }
                }
                Ok(())
            }
            StmtKind::ComplexFor {
                vars,
                iterable,
                body,
            } => self.exec_complex_for(vars, iterable, body),
            StmtKind::Break => {
                self.breaking = 1;
                Ok(())
            }
            StmtKind::Continue => {
                self.continuing = 1;
                Ok(())
            }
            StmtKind::Return => {
                self.returning = 1;
                Ok(())
            }
            StmtKind::TryCatch {
                body,
                err_ident,
                catch_body,
            } => self.exec_try_catch(body, err_ident.as_deref(), catch_body),
            StmtKind::UnwindProtect { body, cleanup } => self.exec_unwind_protect(body, cleanup),
            StmtKind::Global { names } => {
                for name in names {
                    self.stack.link_global(name);
                }
                Ok(())
            }
            StmtKind::Persistent { names } => {
                for name in names {
                    self.stack.link_persistent(name);
                }
                Ok(())
            }
            StmtKind::Command { name, args } => {
                let args: Vec<Value> = args.iter().map(|a| Value::Str(a.clone())).collect();
                self.call_function(name, args, 0)?;
                Ok(())
            }
            StmtKind::FunctionDef(def) => {
                self.register_function(def.clone());
                Ok(())
            }
            StmtKind::ClassDef(def) => self.define_class(def),
        }
    }

    fn exec_expression(&mut self, expr: &Expr, suppressed: bool) -> ExecResult<()> {
        // a bare identifier displays the variable without touching `ans`
        if let ExprKind::Ident(name) = &expr.kind {
            if let Some(value) = self.lookup_variable(name) {
                if !suppressed {
                    let line = format!("{name} = {value}");
                    self.write_output_line(&line);
                }
                return Ok(());
            }
        }
        let mut values = self.eval_expr_multi(expr, 0)?;
        if let Some(value) = values.drain(..).next() {
            self.stack.set_var("ans", value.clone_for_assign());
            if !suppressed {
                let line = format!("ans = {value}");
                self.write_output_line(&line);
            }
        }
        Ok(())
    }

    fn exec_assign(&mut self, targets: &[LValue], rhs: &Expr, suppressed: bool) -> ExecResult<()> {
        let values = if targets.len() == 1 {
            vec![self.eval_expr(rhs)?]
        } else {
            let values = self.eval_expr_multi(rhs, targets.len())?;
            if values.len() < targets.len() {
                return Err(ExecError::new(
                    ErrorId::UsageError,
                    format!(
                        "expected {} output values, got {}",
                        targets.len(),
                        values.len()
                    ),
                ));
            }
            values
        };
        for (target, value) in targets.iter().zip(values) {
            self.assign_lvalue(target, value, suppressed)?;
        }
        Ok(())
    }

    fn exec_switch(
        &mut self,
        subject: &Expr,
        cases: &[crate::ast::SwitchCase],
        otherwise: Option<&[Stmt]>,
    ) -> ExecResult<()> {
        let subject = self.eval_expr(subject)?;
        for case in cases {
            for label in &case.labels {
                let label = self.eval_expr(label)?;
                if switch_label_matches(&subject, &label) {
                    // break inside a case propagates to the enclosing loop
                    return self.exec_statements(&case.body);
                }
            }
        }
        if let Some(body) = otherwise {
            return self.exec_statements(body);
        }
        Ok(())
    }

    fn exec_complex_for(&mut self, vars: &[String], iterable: &Expr, body: &[Stmt]) -> ExecResult<()> {
        let value = self.eval_expr(iterable)?;
        let Value::Matrix(m) = &value else {
            return Err(ExecError::new(
                ErrorId::WrongType,
                format!("multi-variable for requires a matrix, got {}", value.type_name()),
            ));
        };
        if m.rows != vars.len() {
            return Err(ExecError::new(
                ErrorId::WrongType,
                format!("expected {} rows, matrix has {}", vars.len(), m.rows),
            ));
        }
        let m = Rc::clone(m);
        for c in 0..m.cols {
            for (r, var) in vars.iter().enumerate() {
                self.stack.set_var(var, Value::Num(m.data[c * m.rows + r]));
            }
            self.exec_statements(body)?;
            if self.loop_should_stop() {
                break;
            }
        }
        Ok(())
    }

    fn exec_try_catch(
        &mut self,
        body: &[Stmt],
        err_ident: Option<&str>,
        catch_body: &[Stmt],
    ) -> ExecResult<()> {
        match self.exec_statements(body) {
            Ok(()) => Ok(()),
            // interrupts unwind past catch handlers
            Err(err) if err.is(ErrorId::Interrupted) => Err(err),
            Err(err) => {
                if let Some(ident) = err_ident {
                    self.stack.set_var(ident, Value::Exception(Rc::new(err)));
                }
                self.exec_statements(catch_body)
            }
        }
    }

    fn exec_unwind_protect(&mut self, body: &[Stmt], cleanup: &[Stmt]) -> ExecResult<()> {
        let body_result = self.exec_statements(body);
        // cleanup runs exactly once on every exit path, with pending
        // break/continue/return signals parked so it executes in full
        let saved = (self.breaking, self.continuing, self.returning);
        self.breaking = 0;
        self.continuing = 0;
        self.returning = 0;
        let cleanup_result = self.exec_statements(cleanup);
        self.breaking += saved.0;
        self.continuing += saved.1;
        self.returning += saved.2;
        match (body_result, cleanup_result) {
            (Err(err), _) | (Ok(()), Err(err)) => Err(err),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// Loop epilogue for the cooperative signal counters. Returns true when
    /// the loop must stop iterating.
    fn loop_should_stop(&mut self) -> bool {
        if self.breaking > 0 {
            self.breaking -= 1;
            return true;
        }
        if self.continuing > 0 {
            self.continuing -= 1;
            return false;
        }
        self.returning > 0
    }

    pub(crate) fn clear_signals(&mut self) {
        self.breaking = 0;
        self.continuing = 0;
        self.returning = 0;
    }

    fn notify_workspace(&mut self) {
        let top_level = self.stack.depth() == 0;
        self.events.with_link((), |link| {
            let variables: Vec<(String, String, String)> = self
                .stack
                .workspace()
                .map(|(name, value)| (name.clone(), value.type_name(), value.to_string()))
                .collect();
            link.set_workspace(top_level, &variables);
        });
    }

    // --- assignment ---------------------------------------------------------

    fn assign_lvalue(&mut self, target: &LValue, value: Value, suppressed: bool) -> ExecResult<()> {
        let LValue::Var { name, index } = target else {
            return Ok(());
        };
        if index.is_empty() {
            self.stack.set_var(name, value.clone_for_assign());
        } else {
            let current = self.lookup_variable(name).unwrap_or_default();
            let ops = self.resolve_ops_against(Some(current.clone()), index)?;
            let updated = self.assign_into_value(current, &ops, value)?;
            self.stack.set_var(name, updated);
        }
        if !suppressed {
            if let Some(stored) = self.lookup_variable(name) {
                let line = format!("{name} = {stored}");
                self.write_output_line(&line);
            }
        }
        Ok(())
    }

    /// Applies an index-assignment chain to a value, returning the value to
    /// rebind. Out-of-bound paren assignment grows the container.
    pub(crate) fn assign_into_value(
        &mut self,
        current: Value,
        ops: &[ResolvedIndex],
        rhs: Value,
    ) -> ExecResult<Value> {
        let Some(first) = ops.first() else {
            return Ok(rhs);
        };
        match current {
            Value::Object(obj) => {
                let updated = obj.subsasgn(self, ops, rhs, true)?;
                Ok(Value::Object(updated))
            }
            Value::Cell(cell) => {
                let ResolvedIndex::Brace(indices) = first else {
                    return Err(ExecError::new(
                        ErrorId::BadOperation,
                        format!("unsupported '{}' assignment on a cell", first.tag()),
                    ));
                };
                let i = scalar_index(indices)?;
                let mut elems = (*cell).clone();
                if i > elems.len() {
                    elems.resize(i, Value::Empty);
                }
                let inner = std::mem::take(&mut elems[i - 1]);
                elems[i - 1] = self.assign_into_value(inner, &ops[1..], rhs)?;
                Ok(Value::Cell(Rc::new(elems)))
            }
            current => {
                if ops.len() > 1 {
                    return Err(ExecError::new(
                        ErrorId::BadOperation,
                        format!("cannot chain indexing through a {}", current.type_name()),
                    ));
                }
                let ResolvedIndex::Paren(indices) = first else {
                    return Err(ExecError::new(
                        ErrorId::BadOperation,
                        format!(
                            "unsupported '{}' assignment on a {}",
                            first.tag(),
                            current.type_name()
                        ),
                    ));
                };
                assign_numeric_element(&current, indices, &rhs)
            }
        }
    }

    // --- expression evaluation ----------------------------------------------

    pub(crate) fn eval_expr(&mut self, expr: &Expr) -> ExecResult<Value> {
        let mut values = self.eval_expr_multi(expr, 1)?;
        if values.is_empty() {
            return Err(ExecError::new(
                ErrorId::UsageError,
                "expression produced no value",
            ));
        }
        Ok(values.swap_remove(0))
    }

    /// Evaluates an expression in a scratch frame, so classdef property
    /// defaults and constant values cannot disturb the caller's workspace.
    pub(crate) fn eval_expr_isolated(&mut self, expr: &Expr) -> ExecResult<Value> {
        self.stack.push("classdef expression", FrameContext::Function);
        let result = self.eval_expr(expr);
        self.stack.pop();
        result
    }

    pub(crate) fn eval_expr_multi(&mut self, expr: &Expr, nargout: usize) -> ExecResult<Vec<Value>> {
        let value = match &expr.kind {
            ExprKind::Num(n) => Value::Num(*n),
            ExprKind::Int(i) => Value::Int(*i),
            ExprKind::Str(s) => Value::Str(s.clone()),
            ExprKind::Bool(b) => Value::Bool(*b),
            ExprKind::Colon => Value::Str(":".to_owned()),
            ExprKind::End => self.evaluate_end_expression()?,
            ExprKind::Ident(name) => return self.eval_ident(name, nargout),
            ExprKind::Range { start, step, stop } => {
                let start = self.eval_expr(start)?.as_num()?;
                let step = match step {
                    Some(step) => self.eval_expr(step)?.as_num()?,
                    None => 1.0,
                };
                let stop = self.eval_expr(stop)?.as_num()?;
                Value::Range { start, step, stop }
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.eval_expr(operand)?;
                self.eval_unary(*op, operand)?
            }
            ExprKind::Postfix { op, operand } => {
                let operand = self.eval_expr(operand)?;
                self.eval_postfix(*op, operand)?
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.eval_expr(lhs)?;
                let rhs = self.eval_expr(rhs)?;
                self.eval_binary(*op, lhs, rhs)?
            }
            ExprKind::ShortCircuit { op, lhs, rhs } => {
                let lhs = self.eval_expr(lhs)?.is_truthy()?;
                match (op, lhs) {
                    (ShortCircuitOp::AndAnd, false) => Value::Bool(false),
                    (ShortCircuitOp::OrOr, true) => Value::Bool(true),
                    _ => Value::Bool(self.eval_expr(rhs)?.is_truthy()?),
                }
            }
            ExprKind::Index { base, ops } => return self.eval_index_expr(base, ops, nargout),
            ExprKind::Matrix { rows } => self.eval_matrix(rows)?,
            ExprKind::Cell { rows } => {
                let mut elems = Vec::new();
                for row in rows {
                    for elem in row {
                        elems.push(self.eval_expr(elem)?);
                    }
                }
                Value::Cell(Rc::new(elems))
            }
            ExprKind::FnHandle(name) => Value::FnHandle(FnHandleValue::Named(name.clone())),
            ExprKind::AnonFn { params, body } => self.eval_anon_fn(params, body),
            ExprKind::Superclass { ident, class, args } => {
                return self.eval_superclass_ref(ident, class, args, nargout);
            }
            ExprKind::Metaclass(name) => {
                let class = self.classes.find_class(name).ok_or_else(|| {
                    ExecError::new(
                        ErrorId::UndefinedMember,
                        format!("class '{name}' is undefined"),
                    )
                })?;
                Value::Object(class.meta_object())
            }
        };
        Ok(vec![value])
    }

    /// Resolution order for a bare name: variable, then user function, then
    /// builtin, then class (a bare class name is a zero-argument
    /// constructor call).
    fn eval_ident(&mut self, name: &str, nargout: usize) -> ExecResult<Vec<Value>> {
        if let Some(value) = self.lookup_variable(name) {
            return Ok(vec![value]);
        }
        if self.functions.contains_key(name) || self.builtins.contains_key(name) {
            return self.call_function(name, Vec::new(), nargout);
        }
        if let Some(class) = self.classes.find_class(name) {
            let obj = class.construct_object(self, &[])?;
            return Ok(vec![Value::Object(obj)]);
        }
        Err(ExecError::new(
            ErrorId::UndefinedVariable,
            format!("'{name}' undefined"),
        ))
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: Value) -> ExecResult<Value> {
        if let Value::Object(_) = &operand {
            let name = match op {
                UnaryOp::Plus => "uplus",
                UnaryOp::Minus => "uminus",
                UnaryOp::Not => "not",
            };
            return self.dispatch_operator(name, vec![operand]);
        }
        match op {
            UnaryOp::Plus => Ok(operand),
            UnaryOp::Minus => match operand {
                Value::Int(i) => Ok(Value::Int(-i)),
                other => Ok(Value::Num(-other.as_num()?)),
            },
            UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy()?)),
        }
    }

    fn eval_postfix(&mut self, op: PostfixOp, operand: Value) -> ExecResult<Value> {
        match op {
            PostfixOp::Transpose => match operand {
                Value::Object(_) => self.dispatch_operator("ctranspose", vec![operand]),
                Value::Matrix(m) => {
                    let mut data = vec![0.0; m.numel()];
                    for r in 0..m.rows {
                        for c in 0..m.cols {
                            data[r * m.cols + c] = m.data[c * m.rows + r];
                        }
                    }
                    Ok(Value::Matrix(Rc::new(Matrix {
                        rows: m.cols,
                        cols: m.rows,
                        data,
                    })))
                }
                scalar => Ok(scalar),
            },
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> ExecResult<Value> {
        if matches!(lhs, Value::Object(_)) || matches!(rhs, Value::Object(_)) {
            return self.dispatch_operator(operator_method(op), vec![lhs, rhs]);
        }
        if let (Value::Str(a), Value::Str(b)) = (&lhs, &rhs) {
            match op {
                BinaryOp::Eq => return Ok(Value::Bool(a == b)),
                BinaryOp::Ne => return Ok(Value::Bool(a != b)),
                _ => {}
            }
        }
        if let (Value::Int(a), Value::Int(b)) = (&lhs, &rhs) {
            match op {
                BinaryOp::Add => return Ok(Value::Int(a + b)),
                BinaryOp::Sub => return Ok(Value::Int(a - b)),
                BinaryOp::Mul => return Ok(Value::Int(a * b)),
                _ => {}
            }
        }
        let a = lhs.as_num()?;
        let b = rhs.as_num()?;
        let value = match op {
            BinaryOp::Add => Value::Num(a + b),
            BinaryOp::Sub => Value::Num(a - b),
            BinaryOp::Mul => Value::Num(a * b),
            BinaryOp::Div => Value::Num(a / b),
            BinaryOp::Pow => Value::Num(a.powf(b)),
            BinaryOp::Lt => Value::Bool(a < b),
            BinaryOp::Le => Value::Bool(a <= b),
            BinaryOp::Gt => Value::Bool(a > b),
            BinaryOp::Ge => Value::Bool(a >= b),
            BinaryOp::Eq => Value::Bool(a == b),
            BinaryOp::Ne => Value::Bool(a != b),
            BinaryOp::And => Value::Bool(a != 0.0 && b != 0.0),
            BinaryOp::Or => Value::Bool(a != 0.0 || b != 0.0),
        };
        Ok(value)
    }

    /// Operator overloading on objects resolves through the class's method
    /// table, like any other method dispatch.
    fn dispatch_operator(&mut self, name: &str, args: Vec<Value>) -> ExecResult<Value> {
        let method = args.iter().find_map(|arg| match arg {
            Value::Object(obj) => obj
                .class()
                .and_then(|class| class.find_method(name, false)),
            _ => None,
        });
        let Some(method) = method else {
            let types: Vec<String> = args.iter().map(Value::type_name).collect();
            return Err(ExecError::new(
                ErrorId::BadOperation,
                format!("operator '{name}' undefined for {}", types.join(", ")),
            ));
        };
        let mut values = self.call_cdef_method(&method, args, 1)?;
        let value = values.drain(..).next().ok_or_else(|| {
            ExecError::new(ErrorId::BadOperation, format!("'{name}' returned no value"))
        })?;
        Ok(value)
    }

    fn eval_matrix(&mut self, rows: &[Vec<Expr>]) -> ExecResult<Value> {
        let mut numeric_rows: Vec<Vec<f64>> = Vec::new();
        for row in rows {
            let mut out_row = Vec::new();
            for elem in row {
                let value = self.eval_expr(elem)?;
                match value {
                    Value::Range { .. } | Value::Matrix(_) => {
                        for item in value.iter_columns()? {
                            out_row.push(item.as_num()?);
                        }
                    }
                    scalar => out_row.push(scalar.as_num()?),
                }
            }
            if !out_row.is_empty() {
                numeric_rows.push(out_row);
            }
        }
        if numeric_rows.is_empty() {
            return Ok(Value::Empty);
        }
        let cols = numeric_rows[0].len();
        if numeric_rows.iter().any(|row| row.len() != cols) {
            return Err(ExecError::new(
                ErrorId::BadOperation,
                "matrix rows must have equal length",
            ));
        }
        let rows_n = numeric_rows.len();
        if rows_n == 1 && cols == 1 {
            return Ok(Value::Num(numeric_rows[0][0]));
        }
        let mut data = vec![0.0; rows_n * cols];
        for (r, row) in numeric_rows.iter().enumerate() {
            for (c, x) in row.iter().enumerate() {
                data[c * rows_n + r] = *x;
            }
        }
        Ok(Value::Matrix(Rc::new(Matrix {
            rows: rows_n,
            cols,
            data,
        })))
    }

    fn eval_anon_fn(&mut self, params: &[String], body: &Expr) -> Value {
        // capture the referenced free variables by value at definition time
        struct FreeVars<'a> {
            params: &'a [String],
            found: Vec<String>,
        }
        impl TreeWalker for FreeVars<'_> {
            fn visit_expr(&mut self, expr: &Expr) {
                if let ExprKind::Ident(name) = &expr.kind {
                    if !self.params.contains(name) && !self.found.contains(name) {
                        self.found.push(name.clone());
                    }
                }
                walker::walk_expr(self, expr);
            }
        }
        let mut free = FreeVars {
            params,
            found: Vec::new(),
        };
        free.visit_expr(body);

        let mut captures = indexmap::IndexMap::new();
        for name in free.found {
            if let Some(value) = self.lookup_variable(&name) {
                captures.insert(name, value);
            }
        }
        Value::FnHandle(FnHandleValue::Anon(Rc::new(AnonClosure {
            params: params.to_vec(),
            body: body.clone(),
            captures,
        })))
    }

    fn eval_superclass_ref(
        &mut self,
        ident: &str,
        class_name: &str,
        args: &[Expr],
        nargout: usize,
    ) -> ExecResult<Vec<Value>> {
        let class = self.classes.find_class(class_name).ok_or_else(|| {
            ExecError::new(
                ErrorId::UndefinedMember,
                format!("superclass '{class_name}' is undefined"),
            )
        })?;
        let args: Vec<Value> = args
            .iter()
            .map(|arg| self.eval_expr(arg))
            .collect::<ExecResult<_>>()?;

        let in_ctor_for = self
            .class_contexts
            .last()
            .and_then(|ctx| ctx.ctor_output.clone())
            .is_some_and(|output| output == ident);
        if in_ctor_for {
            // superclass constructor chaining: run the named superclass
            // constructor against the object bound to the output variable
            let Some(Value::Object(mut obj)) = self.lookup_variable(ident) else {
                return Err(ExecError::new(
                    ErrorId::BadConstructor,
                    format!("'{ident}' is not the object under construction"),
                ));
            };
            class.run_constructor(self, &mut obj, &args)?;
            let value = Value::Object(obj);
            self.stack.set_var(ident, value.clone());
            return Ok(vec![value]);
        }

        // superclass method call: `name@Class(args)`
        let method = class.find_method(ident, false).ok_or_else(|| {
            ExecError::new(
                ErrorId::UndefinedMember,
                format!("class '{class_name}' has no method '{ident}'"),
            )
        })?;
        self.call_cdef_method(&method, args, nargout)
    }

    // --- index chains -------------------------------------------------------

    fn eval_index_expr(
        &mut self,
        base: &Expr,
        ops: &[IndexOp],
        nargout: usize,
    ) -> ExecResult<Vec<Value>> {
        if let ExprKind::Ident(name) = &base.kind {
            if let Some(value) = self.lookup_variable(name) {
                return self.apply_index_chain(value, ops, nargout);
            }
            if self.functions.contains_key(name) || self.builtins.contains_key(name) {
                let (args, consumed) = match ops.first() {
                    Some(IndexOp::Paren(args)) => (self.eval_call_args(args)?, 1),
                    _ => (Vec::new(), 0),
                };
                let tail_nargout = if ops.len() > consumed { 1 } else { nargout };
                let mut values = self.call_function(name, args, tail_nargout)?;
                if ops.len() > consumed {
                    let value = values.drain(..).next().unwrap_or_default();
                    return self.apply_index_chain(value, &ops[consumed..], nargout);
                }
                return Ok(values);
            }
            if let Some(class) = self.classes.find_class(name) {
                let resolved = self.resolve_ops_against(None, ops)?;
                let (mut values, consumed) = class.meta_subsref(self, &resolved, nargout)?;
                if consumed < ops.len() {
                    let value = values.drain(..).next().unwrap_or_default();
                    return self.apply_index_chain(value, &ops[consumed..], nargout);
                }
                return Ok(values);
            }
            return Err(ExecError::new(
                ErrorId::UndefinedFunction,
                format!("'{name}' undefined"),
            ));
        }
        let value = self.eval_expr(base)?;
        self.apply_index_chain(value, ops, nargout)
    }

    fn apply_index_chain(
        &mut self,
        mut value: Value,
        ops: &[IndexOp],
        nargout: usize,
    ) -> ExecResult<Vec<Value>> {
        let mut k = 0;
        while k < ops.len() {
            let last = k + 1 == ops.len();
            let step_nargout = if last { nargout } else { 1 };

            // method dispatch: obj.name(args) where name resolves to a method
            let dot_method = match (&value, &ops[k]) {
                (Value::Object(obj), IndexOp::Dot(member)) => obj
                    .class()
                    .and_then(|class| {
                        if class.find_property(member).is_some() {
                            None
                        } else {
                            class.find_method(member, false)
                        }
                    })
                    .map(|method| (obj.clone(), method)),
                _ => None,
            };
            if let Some((obj, method)) = dot_method {
                let (args, consumed) = match ops.get(k + 1) {
                    Some(IndexOp::Paren(args)) => (self.eval_call_args(args)?, 2),
                    _ => (Vec::new(), 1),
                };
                let call_last = k + consumed == ops.len();
                let call_nargout = if call_last { nargout } else { 1 };
                let mut values = self.call_cdef_method_on(&method, &obj, &args, call_nargout)?;
                if call_last {
                    return Ok(values);
                }
                value = values.drain(..).next().unwrap_or_default();
                k += consumed;
                continue;
            }

            let resolved = self.resolve_index_op(&ops[k], Some(&value))?;
            let mut values = self.index_value(&value, &resolved, step_nargout)?;
            if last {
                return Ok(values);
            }
            value = values.drain(..).next().unwrap_or_default();
            k += 1;
        }
        Ok(vec![value])
    }

    /// Applies one resolved index operation to a value.
    fn index_value(
        &mut self,
        value: &Value,
        op: &ResolvedIndex,
        nargout: usize,
    ) -> ExecResult<Vec<Value>> {
        match (value, op) {
            (Value::Object(obj), op) => obj.subsref(self, op, nargout),
            (Value::FnHandle(handle), ResolvedIndex::Paren(args)) => {
                self.call_fn_handle(handle, args.clone(), nargout)
            }
            (Value::Exception(err), ResolvedIndex::Dot(field)) => {
                let value = match field.as_str() {
                    "identifier" => Value::Str(err.identifier.clone()),
                    "message" => Value::Str(err.message.clone()),
                    "stack" => Value::Cell(Rc::new(
                        err.stack
                            .iter()
                            .map(|entry| Value::Str(format!("{} (line {})", entry.name, entry.loc.line)))
                            .collect(),
                    )),
                    other => {
                        return Err(ExecError::new(
                            ErrorId::UndefinedMember,
                            format!("exception objects have no field '{other}'"),
                        ));
                    }
                };
                Ok(vec![value])
            }
            (Value::Cell(cell), ResolvedIndex::Brace(indices)) => {
                let i = checked_scalar_index(indices, cell.len())?;
                Ok(vec![cell[i - 1].clone()])
            }
            (Value::Cell(cell), ResolvedIndex::Paren(indices)) => {
                if is_colon(indices) {
                    return Ok(vec![value.clone()]);
                }
                let i = checked_scalar_index(indices, cell.len())?;
                Ok(vec![Value::Cell(Rc::new(vec![cell[i - 1].clone()]))])
            }
            (Value::Str(s), ResolvedIndex::Paren(indices)) => {
                let chars: Vec<char> = s.chars().collect();
                if is_colon(indices) {
                    return Ok(vec![value.clone()]);
                }
                let i = checked_scalar_index(indices, chars.len())?;
                Ok(vec![Value::Str(chars[i - 1].to_string())])
            }
            (Value::Matrix(m), ResolvedIndex::Paren(indices)) => {
                if is_colon(indices) {
                    return Ok(vec![value.clone()]);
                }
                match indices.as_slice() {
                    [index] => {
                        let i = checked_scalar_index(std::slice::from_ref(index), m.numel())?;
                        Ok(vec![Value::Num(m.get_linear(i)?)])
                    }
                    [row, col] => {
                        let r = checked_scalar_index(std::slice::from_ref(row), m.rows)?;
                        let c = checked_scalar_index(std::slice::from_ref(col), m.cols)?;
                        Ok(vec![Value::Num(m.data[(c - 1) * m.rows + (r - 1)])])
                    }
                    _ => Err(ExecError::new(
                        ErrorId::BadIndex,
                        "matrices support at most two subscripts",
                    )),
                }
            }
            (Value::Range { start, step, .. }, ResolvedIndex::Paren(indices)) => {
                if is_colon(indices) {
                    return Ok(vec![value.clone()]);
                }
                let i = checked_scalar_index(indices, value.numel())?;
                Ok(vec![Value::Num(start + step * (i as f64 - 1.0))])
            }
            (
                Value::Bool(_) | Value::Int(_) | Value::Num(_),
                ResolvedIndex::Paren(indices),
            ) => {
                if indices.is_empty() || is_colon(indices) {
                    return Ok(vec![value.clone()]);
                }
                checked_scalar_index(indices, 1)?;
                Ok(vec![value.clone()])
            }
            (Value::Empty, ResolvedIndex::Paren(_)) => Err(ExecError::new(
                ErrorId::BadIndex,
                "index out of bound; value is empty",
            )),
            (value, op) => Err(ExecError::new(
                ErrorId::BadOperation,
                format!(
                    "'{}' indexing is undefined for {} values",
                    op.tag(),
                    value.type_name()
                ),
            )),
        }
    }

    /// Evaluates call arguments (no `end` context: a call argument list has
    /// no enclosing indexed value).
    fn eval_call_args(&mut self, args: &[Expr]) -> ExecResult<Vec<Value>> {
        args.iter().map(|arg| self.eval_expr(arg)).collect()
    }

    /// Resolves one index operation against the value being indexed,
    /// providing the `end` context per argument position.
    fn resolve_index_op(&mut self, op: &IndexOp, target: Option<&Value>) -> ExecResult<ResolvedIndex> {
        match op {
            IndexOp::Dot(name) => Ok(ResolvedIndex::Dot(name.clone())),
            IndexOp::DynDot(expr) => {
                let name = self.eval_expr(expr)?;
                Ok(ResolvedIndex::Dot(name.as_str()?.to_owned()))
            }
            IndexOp::Paren(args) | IndexOp::Brace(args) => {
                let count = args.len();
                let mut resolved = Vec::with_capacity(count);
                for (position, arg) in args.iter().enumerate() {
                    let pushed = if let Some(value) = target {
                        self.end_contexts.push(EndContext {
                            value: value.clone(),
                            position,
                            count,
                        });
                        true
                    } else {
                        false
                    };
                    let result = self.eval_expr(arg);
                    if pushed {
                        self.end_contexts.pop();
                    }
                    resolved.push(result?);
                }
                Ok(match op {
                    IndexOp::Paren(_) => ResolvedIndex::Paren(resolved),
                    _ => ResolvedIndex::Brace(resolved),
                })
            }
        }
    }

    /// Resolves a whole chain for assignment, threading the intermediate
    /// value forward where it can be read without side effects.
    fn resolve_ops_against(
        &mut self,
        mut target: Option<Value>,
        ops: &[IndexOp],
    ) -> ExecResult<Vec<ResolvedIndex>> {
        let mut resolved = Vec::with_capacity(ops.len());
        for op in ops {
            let r = self.resolve_index_op(op, target.as_ref())?;
            target = target.and_then(|value| peek_step(&value, &r));
            resolved.push(r);
        }
        Ok(resolved)
    }

    /// `end` resolves against the innermost indexing context: the whole
    /// element count for a single subscript, the bound of the matching
    /// dimension otherwise.
    fn evaluate_end_expression(&self) -> ExecResult<Value> {
        let ctx = self.end_contexts.last().ok_or_else(|| {
            ExecError::new(
                ErrorId::BadOperation,
                "'end' used outside an indexing context",
            )
        })?;
        let bound = if ctx.count == 1 {
            ctx.value.numel()
        } else {
            ctx.value.dim_len(ctx.position + 1)
        };
        Ok(Value::Int(bound as i64))
    }
}

/// Side-effect-free step through a value for chained-assignment resolution.
fn peek_step(value: &Value, op: &ResolvedIndex) -> Option<Value> {
    match (value, op) {
        (Value::Cell(cell), ResolvedIndex::Brace(indices)) => {
            let i = scalar_index(indices).ok()?;
            cell.get(i - 1).cloned()
        }
        (Value::Object(obj), ResolvedIndex::Dot(name)) => obj.get(name).ok(),
        _ => None,
    }
}

fn operator_method(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "plus",
        BinaryOp::Sub => "minus",
        BinaryOp::Mul => "mtimes",
        BinaryOp::Div => "mrdivide",
        BinaryOp::Pow => "mpower",
        BinaryOp::Lt => "lt",
        BinaryOp::Le => "le",
        BinaryOp::Gt => "gt",
        BinaryOp::Ge => "ge",
        BinaryOp::Eq => "eq",
        BinaryOp::Ne => "ne",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
    }
}

fn switch_label_matches(subject: &Value, label: &Value) -> bool {
    match label {
        // a cell label matches if any element matches
        Value::Cell(alternatives) => alternatives
            .iter()
            .any(|alt| switch_label_matches(subject, alt)),
        other => subject == other,
    }
}

fn is_colon(indices: &[Value]) -> bool {
    matches!(indices, [Value::Str(s)] if s == ":")
}

fn scalar_index(indices: &[Value]) -> ExecResult<usize> {
    let [index] = indices else {
        return Err(ExecError::new(
            ErrorId::BadIndex,
            "expected a single linear index",
        ));
    };
    let n = index.as_num()?;
    if n < 1.0 || n.fract() != 0.0 {
        return Err(ExecError::new(
            ErrorId::BadIndex,
            format!("'{n}' is not a valid index"),
        ));
    }
    Ok(n as usize)
}

fn checked_scalar_index(indices: &[Value], len: usize) -> ExecResult<usize> {
    let i = scalar_index(indices)?;
    if i > len {
        return Err(ExecError::new(
            ErrorId::BadIndex,
            format!("index {i} out of bound {len}"),
        ));
    }
    Ok(i)
}

fn assign_numeric_element(current: &Value, indices: &[Value], rhs: &Value) -> ExecResult<Value> {
    let i = scalar_index(indices)?;
    let rhs = rhs.as_num()?;
    let mut data: Vec<f64> = match current {
        Value::Empty => Vec::new(),
        Value::Matrix(m) => m.data.clone(),
        scalar => vec![scalar.as_num()?],
    };
    if i > data.len() {
        data.resize(i, 0.0);
    }
    data[i - 1] = rhs;
    if data.len() == 1 {
        return Ok(Value::Num(data[0]));
    }
    Ok(Value::Matrix(Rc::new(Matrix::row(data))))
}
