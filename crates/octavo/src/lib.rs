#![doc = include_str!("../../../README.md")]

pub mod ast;
mod builtins;
pub mod cdef;
mod commands;
pub mod error;
pub mod eval;
pub mod event;
pub mod io;
pub mod stack;
pub mod value;
pub mod walker;

pub use cdef::{CdefClass, CdefManager, CdefObject};
pub use error::{ErrorId, ExecError, ExecResult, StackEntry};
pub use eval::{Builtin, DebugCommand, DebugInput, TreeEvaluator};
pub use event::{EventLink, EventManager, FocusTarget, PostedEvent};
pub use io::{CollectOutput, NoOutput, OutputWriter, StdOutput};
pub use value::Value;
