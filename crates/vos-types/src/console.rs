//! Character-stream console collaborator.
//!
//! The shell never touches a terminal directly: it writes text, clears the
//! screen, manages the window title, and awaits input lines through this
//! trait. Adapters (pipes, redirections) wrap one console in another.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::LocalFuture;
use crate::error::Result;

/// A text console. All methods take `&self`; implementations use interior
/// mutability so a console can be shared between nested instructions.
pub trait TextConsole {
    /// Write text verbatim.
    fn write_text(&self, text: &str);

    /// Clear the visible screen.
    fn clear_screen(&self);

    /// Current window title.
    fn window_title(&self) -> String;

    /// Replace the window title.
    fn set_window_title(&self, title: &str);

    /// Wait for one line of input, without its trailing newline.
    /// `None` signals end of input.
    fn read_line(&self) -> LocalFuture<'_, Option<String>>;

    /// Push buffered output to its destination.
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Write `text` followed by a newline.
    fn write_line(&self, text: &str) {
        self.write_text(text);
        self.write_text("\n");
    }
}

/// In-memory console with scripted input. Used by tests and headless runs.
#[derive(Debug, Default)]
pub struct BufferConsole {
    output: RefCell<String>,
    input: RefCell<VecDeque<String>>,
    title: RefCell<String>,
    clears: Cell<usize>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// A console whose input yields `lines` in order, then end of input.
    pub fn with_input<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let console = Self::new();
        for line in lines {
            console.push_input(line);
        }
        console
    }

    pub fn push_input(&self, line: impl Into<String>) {
        self.input.borrow_mut().push_back(line.into());
    }

    /// Everything written so far.
    pub fn output(&self) -> String {
        self.output.borrow().clone()
    }

    /// Drain everything written so far.
    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.output.borrow_mut())
    }

    /// Number of `clear_screen` calls.
    pub fn clear_count(&self) -> usize {
        self.clears.get()
    }
}

impl TextConsole for BufferConsole {
    fn write_text(&self, text: &str) {
        self.output.borrow_mut().push_str(text);
    }

    fn clear_screen(&self) {
        self.output.borrow_mut().clear();
        self.clears.set(self.clears.get() + 1);
    }

    fn window_title(&self) -> String {
        self.title.borrow().clone()
    }

    fn set_window_title(&self, title: &str) {
        *self.title.borrow_mut() = title.to_string();
    }

    fn read_line(&self) -> LocalFuture<'_, Option<String>> {
        let line = self.input.borrow_mut().pop_front();
        Box::pin(async move { line })
    }
}
