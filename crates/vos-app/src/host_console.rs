//! Console over the host terminal.

use std::cell::RefCell;
use std::io::{self, BufRead, Write};

use vos_types::LocalFuture;
use vos_types::console::TextConsole;
use vos_types::error::Result;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// A console reading lines from `R` and writing to `W`. Titles are sent as
/// xterm OSC sequences.
pub struct HostConsole<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
    title: RefCell<String>,
}

impl HostConsole<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> HostConsole<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
            title: RefCell::new(String::new()),
        }
    }

    fn emit(&self, text: &str) {
        let mut out = self.output.borrow_mut();
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
            log::warn!("Console write failed: {e}");
        }
    }

    #[cfg(test)]
    fn into_output(self) -> W {
        self.output.into_inner()
    }
}

impl<R: BufRead, W: Write> TextConsole for HostConsole<R, W> {
    fn write_text(&self, text: &str) {
        self.emit(text);
    }

    fn clear_screen(&self) {
        self.emit(CLEAR_SCREEN);
    }

    fn window_title(&self) -> String {
        self.title.borrow().clone()
    }

    fn set_window_title(&self, title: &str) {
        *self.title.borrow_mut() = title.to_string();
        self.emit(&format!("\x1b]0;{title}\x07"));
    }

    fn read_line(&self) -> LocalFuture<'_, Option<String>> {
        Box::pin(async move {
            let mut line = String::new();
            match self.input.borrow_mut().read_line(&mut line) {
                Ok(0) => None,
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\n', '\r']).len();
                    line.truncate(trimmed);
                    Some(line)
                },
                Err(e) => {
                    log::warn!("Console read failed: {e}");
                    None
                },
            }
        })
    }

    fn flush(&self) -> Result<()> {
        self.output.borrow_mut().flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::block_on;
    use std::io::Cursor;

    #[test]
    fn reads_lines_without_terminators() {
        let console = HostConsole::new(Cursor::new("one\r\ntwo\nthree"), Vec::new());
        assert_eq!(block_on(console.read_line()).as_deref(), Some("one"));
        assert_eq!(block_on(console.read_line()).as_deref(), Some("two"));
        assert_eq!(block_on(console.read_line()).as_deref(), Some("three"));
        assert_eq!(block_on(console.read_line()), None);
    }

    #[test]
    fn title_and_clear_emit_escape_sequences() {
        let console = HostConsole::new(Cursor::new(""), Vec::new());
        console.write_line("hi");
        console.set_window_title("Terminal");
        console.clear_screen();
        assert_eq!(console.window_title(), "Terminal");
        let out = String::from_utf8(console.into_output()).unwrap();
        assert_eq!(out, "hi\n\x1b]0;Terminal\x07\x1b[2J\x1b[H");
    }
}
