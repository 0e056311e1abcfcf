//! End-to-end evaluator tests: control flow, scoping, error handling.
//!
//! Trees are built with the `ast` construction helpers since octavo ships no
//! parser; each test mirrors the MATLAB source given in its doc comment.

use pretty_assertions::assert_eq;

use octavo::ast::{
    BinaryOp, Expr, ExprKind, FunctionDef, IfClause, IndexOp, LValue, ShortCircuitOp, Stmt,
    StmtKind, SwitchCase,
};
use octavo::{ErrorId, NoOutput, TreeEvaluator, Value};

fn ev() -> TreeEvaluator {
    let mut ev = TreeEvaluator::new();
    ev.set_output(Box::new(NoOutput));
    ev
}

fn if_then(cond: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::If {
        clauses: vec![IfClause { cond, body }],
        else_body: Vec::new(),
    })
}

fn add_one(name: &str) -> Stmt {
    Stmt::assign(
        name,
        Expr::binary(BinaryOp::Add, Expr::ident(name), Expr::int(1)),
    )
}

fn eq(lhs: Expr, rhs: Expr) -> Expr {
    Expr::binary(BinaryOp::Eq, lhs, rhs)
}

fn row(values: &[i64]) -> Expr {
    Expr::new(ExprKind::Matrix {
        rows: vec![values.iter().copied().map(Expr::int).collect()],
    })
}

/// `x = 41; x + 1` binds `ans`.
#[test]
fn expression_statement_binds_ans() {
    let mut ev = ev();
    ev.eval_statements(&[
        Stmt::assign("x", Expr::int(41)),
        Stmt::expression(Expr::binary(BinaryOp::Add, Expr::ident("x"), Expr::int(1))),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("ans"), Some(Value::Int(42)));
}

/// `break` leaves the innermost loop only; the outer loop keeps iterating.
#[test]
fn break_exits_innermost_loop_only() {
    let mut ev = ev();
    let inner = Stmt::new(StmtKind::SimpleFor {
        var: "j".to_owned(),
        iterable: Expr::range(Expr::int(1), Expr::int(5)),
        body: vec![
            if_then(
                eq(Expr::ident("j"), Expr::int(3)),
                vec![Stmt::new(StmtKind::Break)],
            ),
            add_one("n"),
        ],
    });
    let outer = Stmt::new(StmtKind::SimpleFor {
        var: "i".to_owned(),
        iterable: Expr::range(Expr::int(1), Expr::int(3)),
        body: vec![inner],
    });
    ev.eval_statements(&[Stmt::assign("n", Expr::int(0)), outer])
        .unwrap();
    // two increments per outer iteration, three outer iterations
    assert_eq!(ev.lookup_variable("n"), Some(Value::Int(6)));
}

/// `continue` skips the rest of the body but keeps the loop going.
#[test]
fn continue_skips_to_next_iteration() {
    let mut ev = ev();
    let skip = Expr::new(ExprKind::ShortCircuit {
        op: ShortCircuitOp::OrOr,
        lhs: Box::new(eq(Expr::ident("i"), Expr::int(2))),
        rhs: Box::new(eq(Expr::ident("i"), Expr::int(4))),
    });
    let body = vec![
        if_then(skip, vec![Stmt::new(StmtKind::Continue)]),
        add_one("n"),
    ];
    ev.eval_statements(&[
        Stmt::assign("n", Expr::int(0)),
        Stmt::new(StmtKind::SimpleFor {
            var: "i".to_owned(),
            iterable: Expr::range(Expr::int(1), Expr::int(5)),
            body,
        }),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("n"), Some(Value::Int(3)));
}

/// A `break` inside a `switch` arm exits the enclosing loop; `switch` itself
/// is not a loop and never consumes the signal.
#[test]
fn break_inside_switch_exits_enclosing_loop() {
    let mut ev = ev();
    let switch = Stmt::new(StmtKind::Switch {
        subject: Expr::ident("x"),
        cases: vec![SwitchCase {
            labels: vec![Expr::int(1)],
            body: vec![Stmt::new(StmtKind::Break)],
        }],
        otherwise: None,
    });
    let body = vec![switch, Stmt::assign("after_switch", Expr::int(1))];
    ev.eval_statements(&[
        Stmt::assign("x", Expr::int(1)),
        Stmt::new(StmtKind::While {
            cond: Expr::bool(true),
            body,
        }),
        Stmt::assign("after_loop", Expr::int(1)),
    ])
    .unwrap();
    // nothing after the break ran inside the loop body
    assert_eq!(ev.lookup_variable("after_switch"), None);
    assert_eq!(ev.lookup_variable("after_loop"), Some(Value::Int(1)));
}

/// A cell case label matches if any of its alternatives match.
#[test]
fn switch_cell_label_matches_any_alternative() {
    let mut ev = ev();
    let switch = Stmt::new(StmtKind::Switch {
        subject: Expr::ident("x"),
        cases: vec![SwitchCase {
            labels: vec![Expr::new(ExprKind::Cell {
                rows: vec![vec![Expr::str("a"), Expr::str("b")]],
            })],
            body: vec![Stmt::assign("hit", Expr::int(1))],
        }],
        otherwise: Some(vec![Stmt::assign("hit", Expr::int(2))]),
    });
    ev.eval_statements(&[Stmt::assign("x", Expr::str("b")), switch])
        .unwrap();
    assert_eq!(ev.lookup_variable("hit"), Some(Value::Int(1)));
}

/// `do ... until` runs its body at least once even when the condition is
/// already satisfied.
#[test]
fn do_until_runs_at_least_once() {
    let mut ev = ev();
    ev.eval_statements(&[
        Stmt::assign("n", Expr::int(10)),
        Stmt::new(StmtKind::DoUntil {
            body: vec![add_one("n")],
            cond: Expr::binary(BinaryOp::Ge, Expr::ident("n"), Expr::int(3)),
        }),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("n"), Some(Value::Int(11)));
}

/// `return` unwinds to the function boundary; statements after it never run.
#[test]
fn return_stops_function_body() {
    let mut ev = ev();
    ev.register_function(FunctionDef {
        name: "pick".to_owned(),
        params: Vec::new(),
        outputs: vec!["x".to_owned()],
        body: vec![
            Stmt::assign("x", Expr::int(1)),
            Stmt::new(StmtKind::Return),
            Stmt::assign("x", Expr::int(2)),
        ],
        is_script: false,
    });
    ev.eval_statements(&[Stmt::expression(Expr::call("pick", Vec::new()))])
        .unwrap();
    assert_eq!(ev.lookup_variable("ans"), Some(Value::Int(1)));
}

/// `return` from inside a loop also stops the loop.
#[test]
fn return_unwinds_through_loops() {
    let mut ev = ev();
    ev.register_function(FunctionDef {
        name: "first_over".to_owned(),
        params: Vec::new(),
        outputs: vec!["x".to_owned()],
        body: vec![Stmt::new(StmtKind::SimpleFor {
            var: "i".to_owned(),
            iterable: Expr::range(Expr::int(1), Expr::int(100)),
            body: vec![if_then(
                Expr::binary(BinaryOp::Gt, Expr::ident("i"), Expr::int(3)),
                vec![
                    Stmt::assign("x", Expr::ident("i")),
                    Stmt::new(StmtKind::Return),
                ],
            )],
        })],
        is_script: false,
    });
    ev.eval_statements(&[Stmt::expression(Expr::call("first_over", Vec::new()))])
        .unwrap();
    assert_eq!(ev.lookup_variable("ans"), Some(Value::Num(4.0)));
}

/// `try`/`catch` binds the caught error as an exception value with
/// `identifier` and `message` fields.
#[test]
fn try_catch_binds_exception_value() {
    let mut ev = ev();
    ev.eval_statements(&[Stmt::new(StmtKind::TryCatch {
        body: vec![Stmt::expression_suppressed(Expr::call(
            "error",
            vec![Expr::str("my:id"), Expr::str("boom")],
        ))],
        err_ident: Some("err".to_owned()),
        catch_body: vec![
            Stmt::assign("msg", Expr::field(Expr::ident("err"), "message")),
            Stmt::assign("id", Expr::field(Expr::ident("err"), "identifier")),
        ],
    })])
    .unwrap();
    assert_eq!(ev.lookup_variable("msg"), Some(Value::Str("boom".to_owned())));
    assert_eq!(ev.lookup_variable("id"), Some(Value::Str("my:id".to_owned())));
}

/// An uncaught error surfaces from `eval_statements` with its message intact.
#[test]
fn uncaught_error_propagates() {
    let mut ev = ev();
    let err = ev
        .eval_statements(&[Stmt::expression_suppressed(Expr::call(
            "error",
            vec![Expr::str("unhandled")],
        ))])
        .unwrap_err();
    assert_eq!(err.message, "unhandled");
}

/// Cleanup of `unwind_protect` runs exactly once on the normal path.
#[test]
fn unwind_protect_runs_cleanup_on_normal_exit() {
    let mut ev = ev();
    ev.eval_statements(&[
        Stmt::assign("n", Expr::int(0)),
        Stmt::new(StmtKind::UnwindProtect {
            body: vec![Stmt::assign("x", Expr::int(1))],
            cleanup: vec![add_one("n")],
        }),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("n"), Some(Value::Int(1)));
    assert_eq!(ev.lookup_variable("x"), Some(Value::Int(1)));
}

/// Cleanup runs when a `break` unwinds through the protected body, and the
/// break still reaches the enclosing loop afterwards.
#[test]
fn unwind_protect_preserves_break_through_cleanup() {
    let mut ev = ev();
    let protected = Stmt::new(StmtKind::UnwindProtect {
        body: vec![Stmt::new(StmtKind::Break)],
        cleanup: vec![add_one("n")],
    });
    ev.eval_statements(&[
        Stmt::assign("n", Expr::int(0)),
        Stmt::new(StmtKind::While {
            cond: Expr::bool(true),
            body: vec![protected],
        }),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("n"), Some(Value::Int(1)));
}

/// Cleanup runs while an error unwinds; the body's error is the one the
/// enclosing `catch` sees even if cleanup itself errors.
#[test]
fn unwind_protect_body_error_wins_over_cleanup_error() {
    let mut ev = ev();
    ev.eval_statements(&[Stmt::new(StmtKind::TryCatch {
        body: vec![Stmt::new(StmtKind::UnwindProtect {
            body: vec![Stmt::expression_suppressed(Expr::call(
                "error",
                vec![Expr::str("from body")],
            ))],
            cleanup: vec![Stmt::expression_suppressed(Expr::call(
                "error",
                vec![Expr::str("from cleanup")],
            ))],
        })],
        err_ident: Some("err".to_owned()),
        catch_body: vec![Stmt::assign(
            "msg",
            Expr::field(Expr::ident("err"), "message"),
        )],
    })])
    .unwrap();
    assert_eq!(
        ev.lookup_variable("msg"),
        Some(Value::Str("from body".to_owned()))
    );
}

/// Cleanup runs exactly once when `return` exits the protected body, and
/// statements after the protected block are still skipped.
#[test]
fn unwind_protect_runs_cleanup_on_return() {
    let mut ev = ev();
    ev.register_function(FunctionDef {
        name: "bail".to_owned(),
        params: Vec::new(),
        outputs: Vec::new(),
        body: vec![
            Stmt::new(StmtKind::Global {
                names: vec!["n".to_owned()],
            }),
            Stmt::new(StmtKind::UnwindProtect {
                body: vec![Stmt::new(StmtKind::Return)],
                cleanup: vec![add_one("n")],
            }),
            // skipped: the return is still in flight after cleanup
            add_one("n"),
        ],
        is_script: false,
    });
    ev.eval_statements(&[
        Stmt::new(StmtKind::Global {
            names: vec!["n".to_owned()],
        }),
        Stmt::assign("n", Expr::int(0)),
        Stmt::expression_suppressed(Expr::call("bail", Vec::new())),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("n"), Some(Value::Int(1)));
}

/// `&&` does not evaluate its right operand when the left is false.
#[test]
fn short_circuit_and_skips_rhs() {
    let mut ev = ev();
    ev.eval_statements(&[Stmt::assign(
        "x",
        Expr::new(ExprKind::ShortCircuit {
            op: ShortCircuitOp::AndAnd,
            lhs: Box::new(Expr::bool(false)),
            rhs: Box::new(Expr::call("error", vec![Expr::str("must not run")])),
        }),
    )])
    .unwrap();
    assert_eq!(ev.lookup_variable("x"), Some(Value::Bool(false)));
}

/// `end` resolves to the extent of the value being indexed.
#[test]
fn end_resolves_against_indexed_value() {
    let mut ev = ev();
    ev.eval_statements(&[
        Stmt::assign("x", row(&[4, 5, 6])),
        Stmt::assign(
            "last",
            Expr::new(ExprKind::Index {
                base: Box::new(Expr::ident("x")),
                ops: vec![IndexOp::Paren(vec![Expr::new(ExprKind::End)])],
            }),
        ),
        Stmt::assign(
            "second",
            Expr::new(ExprKind::Index {
                base: Box::new(Expr::ident("x")),
                ops: vec![IndexOp::Paren(vec![Expr::binary(
                    BinaryOp::Sub,
                    Expr::new(ExprKind::End),
                    Expr::int(1),
                )])],
            }),
        ),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("last"), Some(Value::Num(6.0)));
    assert_eq!(ev.lookup_variable("second"), Some(Value::Num(5.0)));
}

/// `global` links a name to the shared workspace across function frames.
#[test]
fn global_variables_shared_across_functions() {
    let mut ev = ev();
    ev.register_function(FunctionDef {
        name: "bump".to_owned(),
        params: Vec::new(),
        outputs: Vec::new(),
        body: vec![
            Stmt::new(StmtKind::Global {
                names: vec!["count".to_owned()],
            }),
            add_one("count"),
        ],
        is_script: false,
    });
    ev.eval_statements(&[
        Stmt::new(StmtKind::Global {
            names: vec!["count".to_owned()],
        }),
        Stmt::assign("count", Expr::int(0)),
        Stmt::expression_suppressed(Expr::call("bump", Vec::new())),
        Stmt::expression_suppressed(Expr::call("bump", Vec::new())),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("count"), Some(Value::Int(2)));
}

/// `persistent` state survives between calls to the same function.
#[test]
fn persistent_variable_survives_calls() {
    let mut ev = ev();
    ev.register_function(FunctionDef {
        name: "tick".to_owned(),
        params: Vec::new(),
        outputs: vec!["out".to_owned()],
        body: vec![
            Stmt::new(StmtKind::Persistent {
                names: vec!["n".to_owned()],
            }),
            if_then(
                eq(Expr::call("numel", vec![Expr::ident("n")]), Expr::int(0)),
                vec![Stmt::assign("n", Expr::int(0))],
            ),
            add_one("n"),
            Stmt::assign("out", Expr::ident("n")),
        ],
        is_script: false,
    });
    ev.eval_statements(&[Stmt::expression_suppressed(Expr::call("tick", Vec::new()))])
        .unwrap();
    ev.eval_statements(&[Stmt::expression(Expr::call("tick", Vec::new()))])
        .unwrap();
    assert_eq!(ev.lookup_variable("ans"), Some(Value::Int(2)));
}

/// Arguments past the fixed parameters collect into `varargin`, and
/// `varargout` expands into a multi-output assignment:
/// `[a, b] = pass(0, 10, 20)`.
#[test]
fn varargin_overflow_expands_through_varargout() {
    fn nth_vararg(i: i64) -> Expr {
        Expr::new(ExprKind::Index {
            base: Box::new(Expr::ident("varargin")),
            ops: vec![IndexOp::Brace(vec![Expr::int(i)])],
        })
    }
    fn plain(name: &str) -> LValue {
        LValue::Var {
            name: name.to_owned(),
            index: Vec::new(),
        }
    }

    let mut ev = ev();
    ev.register_function(FunctionDef {
        name: "pass".to_owned(),
        params: vec!["first".to_owned(), "varargin".to_owned()],
        outputs: vec!["varargout".to_owned()],
        body: vec![Stmt::new(StmtKind::Assign {
            targets: vec![plain("varargout")],
            rhs: Expr::new(ExprKind::Cell {
                rows: vec![vec![nth_vararg(1), nth_vararg(2)]],
            }),
            suppressed: true,
        })],
        is_script: false,
    });
    ev.eval_statements(&[Stmt::new(StmtKind::Assign {
        targets: vec![plain("a"), plain("b")],
        rhs: Expr::call("pass", vec![Expr::int(0), Expr::int(10), Expr::int(20)]),
        suppressed: true,
    })])
    .unwrap();
    assert_eq!(ev.lookup_variable("a"), Some(Value::Int(10)));
    assert_eq!(ev.lookup_variable("b"), Some(Value::Int(20)));
}

/// Anonymous functions capture free variables by value at definition time.
#[test]
fn anonymous_function_captures_by_value() {
    let mut ev = ev();
    ev.eval_statements(&[
        Stmt::assign("b", Expr::int(10)),
        Stmt::assign(
            "f",
            Expr::new(ExprKind::AnonFn {
                params: vec!["a".to_owned()],
                body: Box::new(Expr::binary(BinaryOp::Add, Expr::ident("a"), Expr::ident("b"))),
            }),
        ),
        Stmt::assign("b", Expr::int(0)),
        Stmt::assign("y", Expr::call("f", vec![Expr::int(5)])),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("y"), Some(Value::Int(15)));
}

/// A named function handle forwards to the function it names.
#[test]
fn named_function_handle_calls_through() {
    let mut ev = ev();
    ev.eval_statements(&[
        Stmt::assign("g", Expr::new(ExprKind::FnHandle("numel".to_owned()))),
        Stmt::assign("n", Expr::call("g", vec![row(&[1, 2, 3])])),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("n"), Some(Value::Int(3)));
}

/// Multi-variable `for` binds one variable per matrix row each column step.
#[test]
fn complex_for_binds_rows_per_column() {
    let mut ev = ev();
    let matrix = Expr::new(ExprKind::Matrix {
        rows: vec![
            vec![Expr::int(1), Expr::int(2)],
            vec![Expr::int(10), Expr::int(20)],
        ],
    });
    ev.eval_statements(&[
        Stmt::assign("s", Expr::int(0)),
        Stmt::new(StmtKind::ComplexFor {
            vars: vec!["a".to_owned(), "b".to_owned()],
            iterable: matrix,
            body: vec![Stmt::assign(
                "s",
                Expr::binary(
                    BinaryOp::Add,
                    Expr::ident("s"),
                    Expr::binary(BinaryOp::Add, Expr::ident("a"), Expr::ident("b")),
                ),
            )],
        }),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("s"), Some(Value::Num(33.0)));
}

/// Self-recursion without a base case trips the recursion depth guard
/// instead of overflowing the native stack.
#[test]
fn runaway_recursion_hits_depth_limit() {
    let mut ev = ev();
    ev.set_max_recursion_depth(20);
    ev.register_function(FunctionDef {
        name: "spin".to_owned(),
        params: Vec::new(),
        outputs: Vec::new(),
        body: vec![Stmt::expression_suppressed(Expr::call("spin", Vec::new()))],
        is_script: false,
    });
    let err = ev
        .eval_statements(&[Stmt::expression_suppressed(Expr::call("spin", Vec::new()))])
        .unwrap_err();
    assert!(err.is(ErrorId::MaxRecursionDepth), "got {err}");
}

/// An error unwinding out of a function carries its call stack.
#[test]
fn error_stack_names_the_failing_function() {
    let mut ev = ev();
    ev.register_function(FunctionDef {
        name: "faulty".to_owned(),
        params: Vec::new(),
        outputs: Vec::new(),
        body: vec![Stmt::expression_suppressed(Expr::call(
            "error",
            vec![Expr::str("inner failure")],
        ))
        .at(3)],
        is_script: false,
    });
    let err = ev
        .eval_statements(&[Stmt::expression_suppressed(Expr::call("faulty", Vec::new()))])
        .unwrap_err();
    assert_eq!(err.stack.first().map(|e| e.name.as_str()), Some("faulty"));
}

/// A raised interrupt aborts at the next statement boundary and is not
/// catchable by `try`/`catch`.
#[test]
fn interrupt_unwinds_past_catch() {
    let mut ev = ev();
    let flag = ev.interrupt_flag();
    flag.store(true, std::sync::atomic::Ordering::SeqCst);
    let err = ev
        .eval_statements(&[Stmt::new(StmtKind::TryCatch {
            body: vec![Stmt::assign("x", Expr::int(1))],
            err_ident: None,
            catch_body: vec![Stmt::assign("caught", Expr::int(1))],
        })])
        .unwrap_err();
    assert!(err.is(ErrorId::Interrupted), "got {err}");
    assert_eq!(ev.lookup_variable("caught"), None);
}

/// Undefined names report as undefined variables or functions depending on
/// how they are used.
#[test]
fn undefined_names_are_reported() {
    let mut ev = ev();
    let err = ev
        .eval_statements(&[Stmt::assign("y", Expr::ident("nope"))])
        .unwrap_err();
    assert!(err.is(ErrorId::UndefinedVariable), "got {err}");

    let err = ev
        .eval_statements(&[Stmt::assign("y", Expr::call("nope", vec![Expr::int(1)]))])
        .unwrap_err();
    assert!(err.is(ErrorId::UndefinedFunction), "got {err}");
}
