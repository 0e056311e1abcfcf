//! Call-stack frames and variable storage.
//!
//! Workspaces are insertion-ordered (`IndexMap`) so `who`-style listings and
//! workspace notifications come out in assignment order. Globals and
//! persistents live beside the stack; a frame links to a global or
//! persistent slot by name and reads/writes pass through transparently.

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::ast::CodeLoc;
use crate::error::StackEntry;
use crate::value::Value;

/// What kind of execution context a frame represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameContext {
    /// The interactive base workspace. Always present, never popped.
    TopLevel,
    /// A script: shares echo behavior with the top level but traces as a
    /// named unit.
    Script,
    /// A function call with its own workspace.
    Function,
    /// A debugger prompt stacked on top of a paused frame.
    Debugger,
}

/// One stack frame: a named workspace plus the source position currently
/// executing in it.
#[derive(Debug)]
pub struct Frame {
    pub name: String,
    pub context: FrameContext,
    pub locals: IndexMap<String, Value>,
    pub loc: CodeLoc,
    /// Local names declared `global` in this frame.
    global_links: AHashSet<String>,
    /// Local names declared `persistent` in this frame.
    persistent_links: AHashSet<String>,
}

impl Frame {
    fn new(name: String, context: FrameContext) -> Self {
        Self {
            name,
            context,
            locals: IndexMap::new(),
            loc: CodeLoc::default(),
            global_links: AHashSet::new(),
            persistent_links: AHashSet::new(),
        }
    }
}

/// The interpreter call stack.
///
/// The base frame is created at construction and survives for the stack's
/// lifetime, so `current` accessors never fail.
#[derive(Debug)]
pub struct CallStack {
    frames: Vec<Frame>,
    globals: AHashMap<String, Value>,
    /// Persistent variables, keyed `"function:variable"`.
    persistents: AHashMap<String, Value>,
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

impl CallStack {
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new("top level".to_owned(), FrameContext::TopLevel)],
            globals: AHashMap::new(),
            persistents: AHashMap::new(),
        }
    }

    /// Number of frames above the base frame.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn push(&mut self, name: impl Into<String>, context: FrameContext) {
        self.frames.push(Frame::new(name.into(), context));
    }

    /// Pops the innermost frame. The base frame is never popped.
    pub fn pop(&mut self) {
        debug_assert!(self.frames.len() > 1, "attempted to pop the base frame");
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    #[must_use]
    pub fn current(&self) -> &Frame {
        self.frames.last().unwrap_or_else(|| unreachable!())
    }

    pub fn current_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().unwrap_or_else(|| unreachable!())
    }

    /// Records the source position the current frame is executing.
    pub fn set_location(&mut self, loc: CodeLoc) {
        self.current_mut().loc = loc;
    }

    /// Reads a variable from the current frame, following global and
    /// persistent links.
    #[must_use]
    pub fn get_var(&self, name: &str) -> Option<&Value> {
        let frame = self.current();
        if frame.global_links.contains(name) {
            self.globals.get(name)
        } else if frame.persistent_links.contains(name) {
            self.persistents.get(&self.persistent_key(name))
        } else {
            frame.locals.get(name)
        }
    }

    /// Writes a variable into the current frame, following global and
    /// persistent links.
    pub fn set_var(&mut self, name: &str, value: Value) {
        if self.current().global_links.contains(name) {
            self.globals.insert(name.to_owned(), value);
        } else if self.current().persistent_links.contains(name) {
            let key = self.persistent_key(name);
            self.persistents.insert(key, value);
        } else {
            self.current_mut().locals.insert(name.to_owned(), value);
        }
    }

    pub fn remove_var(&mut self, name: &str) -> Option<Value> {
        if self.current().global_links.contains(name) {
            self.globals.remove(name)
        } else if self.current().persistent_links.contains(name) {
            let key = self.persistent_key(name);
            self.persistents.remove(&key)
        } else {
            self.current_mut().locals.shift_remove(name)
        }
    }

    /// Declares `name` global in the current frame. The global itself is
    /// created empty on first declaration.
    pub fn link_global(&mut self, name: &str) {
        self.globals.entry(name.to_owned()).or_default();
        self.current_mut().global_links.insert(name.to_owned());
    }

    /// Declares `name` persistent in the current (function) frame, binding
    /// it to a slot keyed by the frame name. The slot is created empty on
    /// first declaration; later reads and writes of `name` in this frame
    /// pass through to it. Returns the stored value.
    pub fn link_persistent(&mut self, name: &str) -> Value {
        let key = self.persistent_key(name);
        let stored = self.persistents.entry(key).or_default().clone();
        self.current_mut().persistent_links.insert(name.to_owned());
        stored
    }

    fn persistent_key(&self, name: &str) -> String {
        format!("{}:{name}", self.current().name)
    }

    /// Names and values of the current workspace, in assignment order.
    pub fn workspace(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.current().locals.iter()
    }

    /// Stack trace snapshot, innermost frame first, base frame excluded.
    #[must_use]
    pub fn backtrace(&self) -> Vec<StackEntry> {
        self.frames
            .iter()
            .skip(1)
            .rev()
            .map(|frame| StackEntry {
                name: frame.name.clone(),
                loc: frame.loc,
            })
            .collect()
    }
}
