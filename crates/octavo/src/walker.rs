//! Generic traversal over parsed trees.
//!
//! [`TreeWalker`] gives one overridable hook per node kind; the default
//! implementation of each hook recurses into children via [`walk_stmt`] /
//! [`walk_expr`]. Implementors override only the kinds they care about and
//! call the `walk_*` functions to keep descending.

use crate::ast::{Expr, ExprKind, FunctionDef, IndexOp, LValue, Stmt, StmtKind};

/// A read-only visitor over statements and expressions.
pub trait TreeWalker {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    /// Hook for nested function definitions. Default does not descend into
    /// the nested body, which is the right behavior for scans that reason
    /// about a single function scope.
    fn visit_function_def(&mut self, def: &FunctionDef) {
        let _ = def;
    }
}

/// Descends into all child statements and expressions of `stmt`.
pub fn walk_stmt<W: TreeWalker + ?Sized>(walker: &mut W, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Expression { expr, .. } => walker.visit_expr(expr),
        StmtKind::Assign { targets, rhs, .. } => {
            for target in targets {
                if let LValue::Var { index, .. } = target {
                    walk_index_ops(walker, index);
                }
            }
            walker.visit_expr(rhs);
        }
        StmtKind::If { clauses, else_body } => {
            for clause in clauses {
                walker.visit_expr(&clause.cond);
                walk_body(walker, &clause.body);
            }
            walk_body(walker, else_body);
        }
        StmtKind::Switch {
            subject,
            cases,
            otherwise,
        } => {
            walker.visit_expr(subject);
            for case in cases {
                for label in &case.labels {
                    walker.visit_expr(label);
                }
                walk_body(walker, &case.body);
            }
            if let Some(body) = otherwise {
                walk_body(walker, body);
            }
        }
        StmtKind::While { cond, body } | StmtKind::DoUntil { body, cond } => {
            walker.visit_expr(cond);
            walk_body(walker, body);
        }
        StmtKind::SimpleFor { iterable, body, .. }
        | StmtKind::ComplexFor { iterable, body, .. } => {
            walker.visit_expr(iterable);
            walk_body(walker, body);
        }
        StmtKind::TryCatch {
            body, catch_body, ..
        } => {
            walk_body(walker, body);
            walk_body(walker, catch_body);
        }
        StmtKind::UnwindProtect { body, cleanup } => {
            walk_body(walker, body);
            walk_body(walker, cleanup);
        }
        StmtKind::FunctionDef(def) => walker.visit_function_def(def),
        StmtKind::ClassDef(def) => {
            for (_, method) in def.methods_list() {
                walker.visit_function_def(method);
            }
        }
        StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Return
        | StmtKind::Global { .. }
        | StmtKind::Persistent { .. }
        | StmtKind::Command { .. }
        | StmtKind::NoOp => {}
    }
}

/// Descends into all child expressions of `expr`.
pub fn walk_expr<W: TreeWalker + ?Sized>(walker: &mut W, expr: &Expr) {
    match &expr.kind {
        ExprKind::Range { start, step, stop } => {
            walker.visit_expr(start);
            if let Some(step) = step {
                walker.visit_expr(step);
            }
            walker.visit_expr(stop);
        }
        ExprKind::Unary { operand, .. } | ExprKind::Postfix { operand, .. } => {
            walker.visit_expr(operand);
        }
        ExprKind::Binary { lhs, rhs, .. } | ExprKind::ShortCircuit { lhs, rhs, .. } => {
            walker.visit_expr(lhs);
            walker.visit_expr(rhs);
        }
        ExprKind::Index { base, ops } => {
            walker.visit_expr(base);
            walk_index_ops(walker, ops);
        }
        ExprKind::Matrix { rows } | ExprKind::Cell { rows } => {
            for row in rows {
                for elem in row {
                    walker.visit_expr(elem);
                }
            }
        }
        ExprKind::AnonFn { body, .. } => walker.visit_expr(body),
        ExprKind::Superclass { args, .. } => {
            for arg in args {
                walker.visit_expr(arg);
            }
        }
        ExprKind::Num(_)
        | ExprKind::Int(_)
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::Ident(_)
        | ExprKind::Colon
        | ExprKind::End
        | ExprKind::FnHandle(_)
        | ExprKind::Metaclass(_) => {}
    }
}

fn walk_body<W: TreeWalker + ?Sized>(walker: &mut W, body: &[Stmt]) {
    for stmt in body {
        walker.visit_stmt(stmt);
    }
}

fn walk_index_ops<W: TreeWalker + ?Sized>(walker: &mut W, ops: &[IndexOp]) {
    for op in ops {
        match op {
            IndexOp::Paren(args) | IndexOp::Brace(args) => {
                for arg in args {
                    walker.visit_expr(arg);
                }
            }
            IndexOp::DynDot(expr) => walker.visit_expr(expr),
            IndexOp::Dot(_) => {}
        }
    }
}
