//! Interpreter error values.
//!
//! Every "hard" interpreter error travels through the same channel as a
//! user-raised `error()` call: an [`ExecError`] propagated via `Result`.
//! Cooperative control-flow signals (`break`/`continue`/`return`) are NOT
//! errors and never appear here; they live as counters on the evaluator.

use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::ast::CodeLoc;

/// Result type alias for operations that can produce a runtime error.
pub type ExecResult<T> = Result<T, ExecError>;

/// Identifiers for errors raised by the interpreter itself.
///
/// Uses strum derives so the wire identifier (e.g.
/// `"Octavo:undefined-function"`) stays in one place. User code can raise
/// errors with arbitrary identifiers through the `error` builtin; those do
/// not pass through this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorId {
    /// A name was used as a function/class but nothing with that name exists.
    #[strum(serialize = "Octavo:undefined-function")]
    UndefinedFunction,
    /// A name was read as a variable but is not bound in scope.
    #[strum(serialize = "Octavo:undefined-variable")]
    UndefinedVariable,
    /// An indexing operation was malformed or out of range.
    #[strum(serialize = "Octavo:index-out-of-bounds")]
    BadIndex,
    /// An operation was applied to values of the wrong type.
    #[strum(serialize = "Octavo:wrong-type-argument")]
    WrongType,
    /// An operation is not defined for its operands.
    #[strum(serialize = "Octavo:undefined-operation")]
    BadOperation,
    /// Any member access on a default-constructed (never initialized) object.
    #[strum(serialize = "Octavo:invalid-object")]
    InvalidObject,
    /// Attempt to instantiate a class marked Abstract.
    #[strum(serialize = "Octavo:abstract-instantiation")]
    AbstractInstantiation,
    /// A constructor declared something other than exactly one output.
    #[strum(serialize = "Octavo:bad-constructor")]
    BadConstructor,
    /// `Class.member` access on a member not flagged Static.
    #[strum(serialize = "Octavo:static-access")]
    StaticAccess,
    /// `Class.prop` access on a property not flagged Constant.
    #[strum(serialize = "Octavo:constant-access")]
    ConstantAccess,
    /// Member access violated a Private/Protected access attribute.
    #[strum(serialize = "Octavo:private-access")]
    PrivateAccess,
    /// Property access on an object still pending construction.
    #[strum(serialize = "Octavo:partial-construction")]
    PartialConstruction,
    /// A class, property or method name did not resolve.
    #[strum(serialize = "Octavo:undefined-member")]
    UndefinedMember,
    /// Function call nesting exceeded the configured maximum.
    #[strum(serialize = "Octavo:max-recursion-depth")]
    MaxRecursionDepth,
    /// Interpreter-level command called with a bad argument list.
    #[strum(serialize = "Octavo:invalid-usage")]
    UsageError,
    /// Execution was interrupted at a statement boundary.
    #[strum(serialize = "Octavo:interrupted")]
    Interrupted,
    /// A class definition was malformed.
    #[strum(serialize = "Octavo:bad-classdef")]
    BadClassDef,
}

/// One entry of the interpreter-level stack trace attached to an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEntry {
    /// Function/script name, or `"top level"` for the base frame.
    pub name: String,
    /// Source position the frame was executing when the error was raised.
    pub loc: CodeLoc,
}

/// A runtime error: identifier, human message and interpreter stack trace.
///
/// Interpreter-raised and user-raised errors share this representation so a
/// single `try`/`catch` mechanism handles both (there is no separate
/// fatal-vs-recoverable split; the only truly fatal condition is an uncaught
/// error at the top level).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecError {
    /// Error identifier, `component:mnemonic` form.
    pub identifier: String,
    /// Human-readable message.
    pub message: String,
    /// Call-stack trace, innermost frame first. Filled in by the evaluator
    /// as the error unwinds.
    pub stack: Vec<StackEntry>,
}

impl ExecError {
    /// Creates an interpreter-raised error with a well-known identifier.
    #[must_use]
    pub fn new(id: ErrorId, message: impl Into<String>) -> Self {
        Self {
            identifier: id.to_string(),
            message: message.into(),
            stack: Vec::new(),
        }
    }

    /// Creates a user-raised error (the `error` builtin) with a free-form
    /// identifier. An empty identifier is allowed, matching `error("msg")`.
    #[must_use]
    pub fn user(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            message: message.into(),
            stack: Vec::new(),
        }
    }

    /// Returns true if this error carries the given well-known identifier.
    #[must_use]
    pub fn is(&self, id: ErrorId) -> bool {
        self.identifier == id.to_string()
    }

    /// Appends a stack entry as the error unwinds through a frame.
    pub(crate) fn push_frame(&mut self, name: &str, loc: CodeLoc) {
        self.stack.push(StackEntry {
            name: name.to_owned(),
            loc,
        });
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.identifier.is_empty() {
            write!(f, "error: {}", self.message)?;
        } else {
            write!(f, "error: {} ({})", self.message, self.identifier)?;
        }
        for entry in &self.stack {
            f.write_char('\n')?;
            write!(f, "    in {} (line {})", entry.name, entry.loc.line)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecError {}
