//! Debugger hook tests: breakpoints, stepping, evaluation in the paused
//! frame, and aborting.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use octavo::ast::{BinaryOp, Expr, FunctionDef, Stmt, StmtKind};
use octavo::{DebugCommand, DebugInput, ErrorId, NoOutput, TreeEvaluator, Value};

/// Scripted debugger input: answers pauses from a queue (then continues)
/// and records every pause location it was asked at.
struct Scripted {
    commands: VecDeque<DebugCommand>,
    stops: Rc<RefCell<Vec<(String, u32)>>>,
}

impl DebugInput for Scripted {
    fn read_command(&mut self, function: &str, line: u32) -> DebugCommand {
        self.stops.borrow_mut().push((function.to_owned(), line));
        self.commands.pop_front().unwrap_or(DebugCommand::Continue)
    }
}

fn ev() -> TreeEvaluator {
    let mut ev = TreeEvaluator::new();
    ev.set_output(Box::new(NoOutput));
    ev
}

/// `function y = compute()` with line-tagged statements.
fn compute_fn() -> FunctionDef {
    FunctionDef {
        name: "compute".to_owned(),
        params: Vec::new(),
        outputs: vec!["y".to_owned()],
        body: vec![
            Stmt::assign("x", Expr::int(5)).at(1),
            Stmt::assign(
                "y",
                Expr::binary(BinaryOp::Add, Expr::ident("x"), Expr::int(1)),
            )
            .at(2),
        ],
        is_script: false,
    }
}

fn global_stmt(name: &str) -> Stmt {
    Stmt::new(StmtKind::Global {
        names: vec![name.to_owned()],
    })
}

/// A breakpoint pauses before its statement runs; debugger commands
/// evaluate in the paused frame's workspace.
#[test]
fn breakpoint_pauses_and_evaluates_in_frame() {
    let mut ev = ev();
    ev.register_function(compute_fn());
    ev.set_breakpoint("compute", 2);

    let stops = Rc::new(RefCell::new(Vec::new()));
    ev.set_debug_input(Box::new(Scripted {
        commands: VecDeque::from([DebugCommand::Eval(vec![
            global_stmt("probe"),
            Stmt::assign("probe", Expr::ident("x")),
        ])]),
        stops: Rc::clone(&stops),
    }));

    ev.eval_statements(&[
        global_stmt("probe"),
        Stmt::assign("probe", Expr::int(0)),
        Stmt::expression(Expr::call("compute", Vec::new())),
    ])
    .unwrap();

    assert_eq!(ev.lookup_variable("ans"), Some(Value::Int(6)));
    // the Eval command read x from compute's own frame
    assert_eq!(ev.lookup_variable("probe"), Some(Value::Int(5)));
    assert_eq!(stops.borrow().first(), Some(&("compute".to_owned(), 2)));
}

/// `Step` resumes for exactly one statement, then pauses again.
#[test]
fn step_pauses_at_the_next_statement() {
    let mut ev = ev();
    ev.register_function(compute_fn());
    ev.set_breakpoint("compute", 1);

    let stops = Rc::new(RefCell::new(Vec::new()));
    ev.set_debug_input(Box::new(Scripted {
        commands: VecDeque::from([DebugCommand::Step, DebugCommand::Continue]),
        stops: Rc::clone(&stops),
    }));

    ev.eval_statements(&[Stmt::expression(Expr::call("compute", Vec::new()))])
        .unwrap();
    assert_eq!(
        *stops.borrow(),
        vec![("compute".to_owned(), 1), ("compute".to_owned(), 2)]
    );
    assert_eq!(ev.lookup_variable("ans"), Some(Value::Int(6)));
}

/// `Quit` aborts the paused evaluation.
#[test]
fn quit_aborts_paused_evaluation() {
    let mut ev = ev();
    ev.register_function(compute_fn());
    ev.set_breakpoint("compute", 1);
    ev.set_debug_input(Box::new(Scripted {
        commands: VecDeque::from([DebugCommand::Quit]),
        stops: Rc::new(RefCell::new(Vec::new())),
    }));

    let err = ev
        .eval_statements(&[Stmt::expression(Expr::call("compute", Vec::new()))])
        .unwrap_err();
    assert!(err.is(ErrorId::Interrupted), "got {err}");
}

/// Without an attached input source, breakpoints are inert.
#[test]
fn breakpoints_are_inert_without_debug_input() {
    let mut ev = ev();
    ev.register_function(compute_fn());
    ev.set_breakpoint("compute", 1);
    ev.eval_statements(&[Stmt::expression(Expr::call("compute", Vec::new()))])
        .unwrap();
    assert_eq!(ev.lookup_variable("ans"), Some(Value::Int(6)));
}

/// Clearing a breakpoint stops it from firing.
#[test]
fn cleared_breakpoint_no_longer_fires() {
    let mut ev = ev();
    ev.register_function(compute_fn());
    ev.set_breakpoint("compute", 1);
    ev.clear_breakpoint("compute", 1);

    let stops = Rc::new(RefCell::new(Vec::new()));
    ev.set_debug_input(Box::new(Scripted {
        commands: VecDeque::new(),
        stops: Rc::clone(&stops),
    }));
    ev.eval_statements(&[Stmt::expression(Expr::call("compute", Vec::new()))])
        .unwrap();
    assert!(stops.borrow().is_empty());
}
