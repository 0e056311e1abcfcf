//! A headless console front-end for the octavo interpreter.
//!
//! [`ConsoleLink`] implements [`EventLink`] without any GUI: dialog requests
//! are answered from a scripted queue, and notifications are kept as
//! inspectable state (history, workspace snapshot, an event log). It is the
//! reference consumer for embedders and doubles as a fixture for driving the
//! interpreter in tests and batch runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use octavo::{EventLink, FocusTarget};

/// Console-side state mirrored from interpreter notifications.
///
/// Dialog requests pop answers pushed with [`ConsoleLink::push_answer`]; when
/// the queue is empty they fall back to the cancelled/default behavior, so an
/// unscripted link never blocks a batch run.
#[derive(Debug, Default)]
pub struct ConsoleLink {
    answers: Mutex<VecDeque<String>>,
    history: Mutex<Vec<String>>,
    workspace: Mutex<Vec<(String, String, String)>>,
    log: Mutex<Vec<String>>,
}

impl ConsoleLink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for the next dialog request.
    pub fn push_answer(&self, answer: impl Into<String>) {
        self.lock_answers().push_back(answer.into());
    }

    /// The command history as last set by the interpreter.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.history.lock().expect("history lock poisoned").clone()
    }

    /// The latest workspace snapshot: `(name, class, display)` per variable.
    #[must_use]
    pub fn workspace(&self) -> Vec<(String, String, String)> {
        self.workspace
            .lock()
            .expect("workspace lock poisoned")
            .clone()
    }

    /// Everything notified so far, one line per event, oldest first.
    #[must_use]
    pub fn log(&self) -> Vec<String> {
        self.log.lock().expect("log lock poisoned").clone()
    }

    fn lock_answers(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.answers.lock().expect("answer lock poisoned")
    }

    fn record(&self, line: String) {
        self.log.lock().expect("log lock poisoned").push(line);
    }
}

impl EventLink for ConsoleLink {
    fn question_dialog(
        &self,
        message: &str,
        _title: &str,
        _buttons: &[String],
        default: &str,
    ) -> String {
        self.record(format!("question: {message}"));
        self.lock_answers()
            .pop_front()
            .unwrap_or_else(|| default.to_owned())
    }

    fn file_dialog(&self, _filters: &[String], title: &str, _multi: bool) -> Vec<String> {
        self.record(format!("file dialog: {title}"));
        match self.lock_answers().pop_front() {
            Some(path) => vec![path],
            None => Vec::new(),
        }
    }

    fn input_dialog(&self, prompts: &[String], _title: &str) -> Vec<String> {
        self.record(format!("input dialog: {} prompt(s)", prompts.len()));
        let mut answers = self.lock_answers();
        if answers.len() < prompts.len() {
            return Vec::new();
        }
        prompts
            .iter()
            .map(|_| answers.pop_front().unwrap_or_default())
            .collect()
    }

    fn edit_variable(&self, name: &str, value: &str) {
        self.record(format!("openvar {name} = {value}"));
    }

    fn directory_changed(&self, path: &str) {
        self.record(format!("cwd: {path}"));
    }

    fn set_history(&self, commands: &[String]) {
        *self.history.lock().expect("history lock poisoned") = commands.to_vec();
    }

    fn append_history(&self, command: &str) {
        self.history
            .lock()
            .expect("history lock poisoned")
            .push(command.to_owned());
    }

    fn clear_history(&self) {
        self.history.lock().expect("history lock poisoned").clear();
    }

    fn set_workspace(&self, _top_level: bool, variables: &[(String, String, String)]) {
        *self.workspace.lock().expect("workspace lock poisoned") = variables.to_vec();
    }

    fn clear_workspace(&self) {
        self.workspace.lock().expect("workspace lock poisoned").clear();
    }

    fn enter_debugger_event(&self, function: &str, line: u32) {
        self.record(format!("stopped in {function} at line {line}"));
    }

    fn exit_debugger_event(&self) {
        self.record("debugger resumed".to_owned());
    }

    fn update_breakpoint(&self, inserted: bool, function: &str, line: u32) {
        let verb = if inserted { "set" } else { "cleared" };
        self.record(format!("breakpoint {verb}: {function}:{line}"));
    }

    fn focus_window(&self, target: FocusTarget) {
        self.record(format!("focus: {target:?}"));
    }

    fn interpreter_interrupted(&self) {
        self.record("interrupted".to_owned());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use octavo::ast::{Expr, Stmt, StmtKind};
    use octavo::TreeEvaluator;

    use super::*;

    fn command(name: &str) -> Stmt {
        Stmt::new(StmtKind::Command {
            name: name.to_owned(),
            args: Vec::new(),
        })
    }

    #[test]
    fn scripted_answers_feed_dialogs() {
        let link = ConsoleLink::new();
        link.push_answer("Yes");
        let answer = link.question_dialog("save?", "editor", &[], "No");
        assert_eq!(answer, "Yes");
        // queue exhausted, falls back to the default button
        let answer = link.question_dialog("save?", "editor", &[], "No");
        assert_eq!(answer, "No");
    }

    #[test]
    fn input_dialog_cancels_when_underscripted() {
        let link = ConsoleLink::new();
        link.push_answer("only one");
        let prompts = vec!["a".to_owned(), "b".to_owned()];
        assert_eq!(link.input_dialog(&prompts, "two prompts"), Vec::<String>::new());
    }

    #[test]
    fn focus_commands_reach_the_link() {
        let link = Arc::new(ConsoleLink::new());
        let mut ev = TreeEvaluator::new();
        ev.events().connect_link(Some(link.clone()));
        ev.eval_statements(&[command("workspace"), command("commandhistory")])
            .unwrap();
        let log = link.log();
        assert!(log.contains(&"focus: Workspace".to_owned()));
        assert!(log.contains(&"focus: CommandHistory".to_owned()));
    }

    #[test]
    fn openvar_reports_the_variable() {
        let link = Arc::new(ConsoleLink::new());
        let mut ev = TreeEvaluator::new();
        ev.events().connect_link(Some(link.clone()));
        ev.eval_statements(&[
            Stmt::assign("speed", Expr::int(88)),
            Stmt::new(StmtKind::Command {
                name: "openvar".to_owned(),
                args: vec!["speed".to_owned()],
            }),
        ])
        .unwrap();
        assert!(link.log().contains(&"openvar speed = 88".to_owned()));
    }

    #[test]
    fn workspace_snapshot_tracks_assignments() {
        let link = Arc::new(ConsoleLink::new());
        let mut ev = TreeEvaluator::new();
        ev.events().connect_link(Some(link.clone()));
        ev.eval_statements(&[Stmt::assign("n", Expr::int(3))]).unwrap();
        let names: Vec<String> = link.workspace().into_iter().map(|(n, _, _)| n).collect();
        assert!(names.contains(&"n".to_owned()));
    }
}
