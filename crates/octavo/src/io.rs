//! Interpreter output.
//!
//! Display of unsuppressed results and `disp` output go through one trait so
//! embedders can capture or silence them without touching process stdout.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

/// Sink for interpreter-produced text.
pub trait OutputWriter {
    fn write(&mut self, text: &str);

    fn write_line(&mut self, text: &str) {
        self.write(text);
        self.write("\n");
    }
}

/// Writes to process stdout.
#[derive(Debug, Default)]
pub struct StdOutput;

impl OutputWriter for StdOutput {
    fn write(&mut self, text: &str) {
        print!("{text}");
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NoOutput;

impl OutputWriter for NoOutput {
    fn write(&mut self, _text: &str) {}
}

/// Collects output into a shared buffer, for tests and embedders.
#[derive(Debug, Default)]
pub struct CollectOutput {
    buffer: Rc<RefCell<String>>,
}

impl CollectOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that observes everything written after this call.
    #[must_use]
    pub fn buffer(&self) -> Rc<RefCell<String>> {
        Rc::clone(&self.buffer)
    }
}

impl OutputWriter for CollectOutput {
    fn write(&mut self, text: &str) {
        let _ = write!(self.buffer.borrow_mut(), "{text}");
    }
}
