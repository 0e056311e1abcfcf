//! Front-end decoupling: the event link and the event manager.
//!
//! The interpreter never talks to a GUI (or console, or test harness)
//! directly. Front-ends implement [`EventLink`]; the interpreter calls
//! through [`EventManager`], which is a transparent no-op whenever disabled
//! or unconnected. Request-style calls return neutral defaults in that case,
//! so interpreter code needs no "is a front-end attached" branches.
//!
//! The manager also carries a queue of deferred actions: any thread may
//! [`EventManager::post_event`] a closure, and the interpreter drains the
//! queue at safe points on its own thread via
//! [`EventManager::process_events`]. Octavo evaluator state is single
//! threaded; the queue is the only supported way into it from outside.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::eval::TreeEvaluator;

/// UI surfaces the interpreter can ask a front-end to focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusTarget {
    CommandWindow,
    CommandHistory,
    FileBrowser,
    Workspace,
}

/// A deferred action run on the interpreter thread.
pub type PostedEvent = Box<dyn FnOnce(&mut TreeEvaluator) + Send>;

/// The consumer side of the interpreter's event interface.
///
/// Every method has a default implementation, so a front-end implements only
/// what it supports. Request methods (dialogs) block the interpreter until
/// they return; their defaults are the values a front-end-less interpreter
/// should behave as if the user had answered.
#[expect(unused_variables, reason = "default impls ignore their arguments")]
pub trait EventLink: Send + Sync {
    // --- requests: the interpreter blocks on the answer --------------------

    /// Ask a question with up to three buttons; returns the chosen button
    /// label, or `""` for "no answer".
    fn question_dialog(&self, message: &str, title: &str, buttons: &[String], default: &str) -> String {
        String::new()
    }

    /// Ask the user to pick file paths. Empty means cancelled.
    fn file_dialog(&self, filters: &[String], title: &str, multi: bool) -> Vec<String> {
        Vec::new()
    }

    /// Ask the user to pick items from a list; returns selected indices and
    /// whether OK was pressed.
    fn list_dialog(&self, items: &[String], title: &str) -> (Vec<usize>, bool) {
        (Vec::new(), false)
    }

    /// Ask for one free-form line per prompt. Empty means cancelled.
    fn input_dialog(&self, prompts: &[String], title: &str) -> Vec<String> {
        Vec::new()
    }

    /// Open a variable editor for `name` showing `value`.
    fn edit_variable(&self, name: &str, value: &str) {}

    // --- notifications: fire and forget ------------------------------------

    fn directory_changed(&self, path: &str) {}

    /// Replace the whole command history.
    fn set_history(&self, commands: &[String]) {}
    fn append_history(&self, command: &str) {}
    fn clear_history(&self) {}

    /// Full workspace snapshot: `(name, class, display)` per variable.
    fn set_workspace(&self, top_level: bool, variables: &[(String, String, String)]) {}
    fn clear_workspace(&self) {}

    fn enter_debugger_event(&self, function: &str, line: u32) {}
    fn exit_debugger_event(&self) {}
    fn update_breakpoint(&self, inserted: bool, function: &str, line: u32) {}

    fn focus_window(&self, target: FocusTarget) {}

    fn show_doc(&self, name: &str) {}
    fn register_doc(&self, path: &str) {}
    fn unregister_doc(&self, path: &str) {}

    /// The interpreter observed an interrupt request at a statement boundary.
    fn interpreter_interrupted(&self) {}
}

/// Owns the link to the front-end and the deferred-event queue.
///
/// Shared as `Arc<EventManager>` between the interpreter and any producer
/// threads. All methods take `&self`.
pub struct EventManager {
    enabled: AtomicBool,
    link: Mutex<Option<Arc<dyn EventLink>>>,
    queue: Mutex<VecDeque<PostedEvent>>,
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventManager")
            .field("enabled", &self.enabled())
            .field("connected", &self.link.lock().is_ok_and(|l| l.is_some()))
            .finish_non_exhaustive()
    }
}

impl EventManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            link: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Connects a front-end and enables delivery. Passing `None` disconnects
    /// and disables.
    pub fn connect_link(&self, link: Option<Arc<dyn EventLink>>) {
        let enable = link.is_some();
        *self.link.lock().expect("event link lock poisoned") = link;
        self.enabled.store(enable, Ordering::SeqCst);
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Runs `f` against the link if enabled and connected; otherwise returns
    /// `default`. All delivery funnels through here so the disabled path is
    /// uniform.
    pub fn with_link<R>(&self, default: R, f: impl FnOnce(&dyn EventLink) -> R) -> R {
        if !self.enabled() {
            return default;
        }
        let guard = self.link.lock().expect("event link lock poisoned");
        match guard.as_deref() {
            Some(link) => f(link),
            None => default,
        }
    }

    /// Queues a deferred action for the interpreter thread. Safe to call
    /// from any thread, at any time.
    pub fn post_event(&self, event: PostedEvent) {
        self.queue
            .lock()
            .expect("event queue lock poisoned")
            .push_back(event);
    }

    /// Number of queued, not-yet-processed events.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.queue.lock().expect("event queue lock poisoned").len()
    }

    /// Drains the queue and runs each action, oldest first, against `ev`.
    /// The queue lock is released before any action runs, so actions may
    /// post further events (which wait for the next call).
    pub fn process_events(&self, ev: &mut TreeEvaluator) {
        let drained: Vec<PostedEvent> = self
            .queue
            .lock()
            .expect("event queue lock poisoned")
            .drain(..)
            .collect();
        for event in drained {
            event(ev);
        }
    }

    /// Drops all queued events without running them.
    pub fn discard_events(&self) {
        self.queue.lock().expect("event queue lock poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AnswerYes;

    impl EventLink for AnswerYes {
        fn question_dialog(&self, _: &str, _: &str, _: &[String], _: &str) -> String {
            "Yes".to_owned()
        }
    }

    #[test]
    fn disabled_manager_returns_defaults() {
        let events = EventManager::new();
        events.connect_link(Some(Arc::new(AnswerYes)));
        events.disable();
        let answer = events.with_link(String::new(), |link| {
            link.question_dialog("continue?", "test", &[], "")
        });
        assert_eq!(answer, "");
    }

    #[test]
    fn connected_manager_delivers() {
        let events = EventManager::new();
        events.connect_link(Some(Arc::new(AnswerYes)));
        assert!(events.enabled());
        let answer = events.with_link(String::new(), |link| {
            link.question_dialog("continue?", "test", &[], "")
        });
        assert_eq!(answer, "Yes");
    }

    #[test]
    fn disconnecting_disables() {
        let events = EventManager::new();
        events.connect_link(Some(Arc::new(AnswerYes)));
        events.connect_link(None);
        assert!(!events.enabled());
    }

    #[test]
    fn discard_drops_queued_events() {
        let events = EventManager::new();
        events.post_event(Box::new(|_| {}));
        events.post_event(Box::new(|_| {}));
        assert_eq!(events.pending_events(), 2);
        events.discard_events();
        assert_eq!(events.pending_events(), 0);
    }
}
