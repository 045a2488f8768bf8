//! Console adapters for pipes and redirection.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::rc::Rc;

use vos_kernel::vfs::FileWriter;
use vos_types::LocalFuture;
use vos_types::console::TextConsole;
use vos_types::error::Result;

/// Captures output for the next stage of a pipeline.
pub struct PipeConsole {
    parent: Rc<dyn TextConsole>,
    buffer: RefCell<String>,
}

impl PipeConsole {
    pub fn new(parent: Rc<dyn TextConsole>) -> Self {
        Self {
            parent,
            buffer: RefCell::new(String::new()),
        }
    }

    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.buffer.borrow_mut())
    }
}

impl TextConsole for PipeConsole {
    fn write_text(&self, text: &str) {
        self.buffer.borrow_mut().push_str(text);
    }

    fn clear_screen(&self) {}

    fn window_title(&self) -> String {
        self.parent.window_title()
    }

    fn set_window_title(&self, title: &str) {
        self.parent.set_window_title(title);
    }

    fn read_line(&self) -> LocalFuture<'_, Option<String>> {
        self.parent.read_line()
    }
}

/// Feeds fixed text as input; output still reaches the parent.
pub struct InputConsole {
    parent: Rc<dyn TextConsole>,
    lines: RefCell<VecDeque<String>>,
}

impl InputConsole {
    pub fn new(parent: Rc<dyn TextConsole>, text: &str) -> Self {
        Self {
            parent,
            lines: RefCell::new(text.lines().map(String::from).collect()),
        }
    }
}

impl TextConsole for InputConsole {
    fn write_text(&self, text: &str) {
        self.parent.write_text(text);
    }

    fn clear_screen(&self) {
        self.parent.clear_screen();
    }

    fn window_title(&self) -> String {
        self.parent.window_title()
    }

    fn set_window_title(&self, title: &str) {
        self.parent.set_window_title(title);
    }

    fn read_line(&self) -> LocalFuture<'_, Option<String>> {
        let line = self.lines.borrow_mut().pop_front();
        Box::pin(async move { line })
    }

    fn flush(&self) -> Result<()> {
        self.parent.flush()
    }
}

/// Sends output to a file; input and title still come from the parent.
pub struct FileOutputConsole {
    parent: Rc<dyn TextConsole>,
    writer: RefCell<FileWriter>,
}

impl FileOutputConsole {
    pub fn new(parent: Rc<dyn TextConsole>, writer: FileWriter) -> Self {
        Self {
            parent,
            writer: RefCell::new(writer),
        }
    }
}

impl TextConsole for FileOutputConsole {
    fn write_text(&self, text: &str) {
        let mut writer = self.writer.borrow_mut();
        if let Err(e) = writer.write_all(text.as_bytes()) {
            log::warn!("Write to {} failed: {e}", writer.path());
        }
    }

    fn clear_screen(&self) {}

    fn window_title(&self) -> String {
        self.parent.window_title()
    }

    fn set_window_title(&self, title: &str) {
        self.parent.set_window_title(title);
    }

    fn read_line(&self) -> LocalFuture<'_, Option<String>> {
        self.parent.read_line()
    }

    fn flush(&self) -> Result<()> {
        self.writer.borrow_mut().flush()?;
        Ok(())
    }
}
