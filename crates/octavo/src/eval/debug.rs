//! Debugger integration.
//!
//! Every statement boundary is a cooperative suspension point: it checks the
//! breakpoint table and the single-step flag. When either fires and a
//! [`DebugInput`] source is attached, the evaluator enters a nested
//! read-eval loop that re-uses the normal evaluation path against the
//! paused frame's workspace. Debugger activations stack, so a breakpoint
//! hit while evaluating a debugger command nests correctly.

use crate::ast::Stmt;
use crate::error::{ErrorId, ExecError, ExecResult};
use crate::eval::TreeEvaluator;

/// One debugger interaction.
#[derive(Debug)]
pub enum DebugCommand {
    /// Evaluate statements in the paused frame; errors print, never unwind.
    Eval(Vec<Stmt>),
    /// Resume until the next statement boundary (`dbstep`).
    Step,
    /// Resume normally (`dbcont`).
    Continue,
    /// Abort the paused evaluation (`dbquit`).
    Quit,
}

/// Source of debugger commands — a prompt, a script, or a test fixture.
pub trait DebugInput {
    fn read_command(&mut self, function: &str, line: u32) -> DebugCommand;
}

impl TreeEvaluator {
    pub fn set_debug_input(&mut self, input: Box<dyn DebugInput>) {
        self.debug_input = Some(input);
    }

    pub fn clear_debug_input(&mut self) {
        self.debug_input = None;
    }

    /// Number of nested debugger activations currently live.
    #[must_use]
    pub fn debug_depth(&self) -> usize {
        self.debug_depth
    }

    pub fn set_breakpoint(&mut self, function: &str, line: u32) {
        self.breakpoints
            .entry(function.to_owned())
            .or_default()
            .insert(line);
        self.events()
            .with_link((), |link| link.update_breakpoint(true, function, line));
    }

    pub fn clear_breakpoint(&mut self, function: &str, line: u32) {
        if let Some(lines) = self.breakpoints.get_mut(function) {
            lines.remove(&line);
        }
        self.events()
            .with_link((), |link| link.update_breakpoint(false, function, line));
    }

    /// Statement-boundary check: stops when stepping or when a breakpoint in
    /// the current frame matches the statement's line.
    pub(crate) fn debug_check(&mut self, stmt: &Stmt) -> ExecResult<()> {
        let line = stmt.loc.line;
        let hit_breakpoint = line != 0
            && self
                .breakpoints
                .get(&self.stack.current().name)
                .is_some_and(|lines| lines.contains(&line));
        if self.dbstep || hit_breakpoint {
            self.dbstep = false;
            return self.enter_debugger(line);
        }
        Ok(())
    }

    /// The nested debugger read-eval loop. Without an attached input source
    /// this is a no-op, so breakpoints are harmless in headless runs.
    fn enter_debugger(&mut self, line: u32) -> ExecResult<()> {
        if self.debug_input.is_none() {
            return Ok(());
        }
        let function = self.stack.current().name.clone();
        self.events()
            .with_link((), |link| link.enter_debugger_event(&function, line));
        self.debug_depth += 1;

        let result = loop {
            let Some(mut input) = self.debug_input.take() else {
                break Ok(());
            };
            let command = input.read_command(&function, line);
            self.debug_input = Some(input);
            match command {
                DebugCommand::Eval(stmts) => {
                    if let Err(err) = self.exec_statements(&stmts) {
                        let text = err.to_string();
                        self.write_output_line(&text);
                    }
                }
                DebugCommand::Step => {
                    self.dbstep = true;
                    break Ok(());
                }
                DebugCommand::Continue => break Ok(()),
                DebugCommand::Quit => {
                    break Err(ExecError::new(ErrorId::Interrupted, "quit debug mode"));
                }
            }
        };

        self.debug_depth -= 1;
        self.events().with_link((), |link| link.exit_debugger_event());
        result
    }
}
