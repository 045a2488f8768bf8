//! Interactive shell: the read, parse, execute loop and the built-ins.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use vos_kernel::{FileSystem, VirtualFileSystem};
use vos_types::config::ShellConfig;
use vos_types::console::TextConsole;
use vos_types::error::{Result, VosError};
use vos_types::{LocalFuture, path};

use crate::context::{Scope, ScriptContext, invoke_function};
use crate::instruction::{Instruction, RedirectMode};
use crate::parser;
use crate::tester;
use crate::tokenizer::{self, ParseOptions};

const BUILTINS: &[&str] = &["cd", "clear", "echo", "exit", "return", "test", "title"];

/// What the shell is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    /// Waiting for input.
    Idle,
    /// Running queued instructions.
    Executing,
}

/// A shell session over a host context.
///
/// Functions declared at the prompt live in the session; variables are
/// handed to the host.
pub struct InteractiveShell<'h> {
    host: &'h dyn ScriptContext,
    console: Rc<dyn TextConsole>,
    config: ShellConfig,
    options: ParseOptions,
    graceful: bool,
    title: RefCell<String>,
    scope: Scope,
    pending: RefCell<VecDeque<Instruction>>,
    state: Cell<ShellState>,
}

impl<'h> InteractiveShell<'h> {
    pub fn new(host: &'h dyn ScriptContext, console: Rc<dyn TextConsole>, config: ShellConfig) -> Self {
        Self {
            host,
            console,
            graceful: config.graceful_errors,
            title: RefCell::new(config.default_title.clone()),
            config,
            options: ParseOptions::default(),
            scope: Scope::new(),
            pending: RefCell::new(VecDeque::new()),
            state: Cell::new(ShellState::Idle),
        }
    }

    /// Let every fault propagate to the caller.
    pub fn strict(mut self) -> Self {
        self.graceful = false;
        self
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> ShellState {
        self.state.get()
    }

    pub fn is_graceful(&self) -> bool {
        self.graceful
    }

    fn update_title(&self, console: &dyn TextConsole) {
        console.set_window_title(&format!("{} ({})", self.title.borrow(), self.host.title()));
    }

    /// Report a fault on the console in graceful mode, otherwise return it.
    fn fault(&self, e: VosError) -> Result<()> {
        if !self.graceful {
            return Err(e);
        }
        log::error!("Uncaught shell fault: {e:?}");
        self.console.write_line(&format!("-sh: {e}"));
        Ok(())
    }

    /// Read one logical line, prompting for continuation while a quote or
    /// escape is open. `None` at end of input.
    async fn read_logical_line(&self) -> Option<String> {
        let mut buffer = String::new();
        loop {
            let line = self.console.read_line().await?;
            buffer.push_str(&line);
            if tokenizer::resolve_quoting(&buffer).is_complete() {
                return Some(buffer);
            }
            buffer.push('\n');
            self.console.write_text(&self.config.continuation_prompt);
        }
    }

    /// One prompt cycle: read a line, then run it.
    ///
    /// `exit` and end of input come back as [`VosError::ScriptEnd`].
    pub async fn run(&self) -> Result<()> {
        self.update_title(&*self.console);
        let prompt = self
            .host
            .prompt()
            .unwrap_or_else(|| self.config.prompt.clone());
        self.console.write_text(&prompt);

        let Some(line) = self.read_logical_line().await else {
            return Err(VosError::exit(0));
        };
        if line.trim().is_empty() {
            return Ok(());
        }
        match parser::parse_script(&line, self.options, false) {
            Ok(tree) => self.pending.borrow_mut().push_back(tree),
            Err(e) => return self.fault(e),
        }
        self.state.set(ShellState::Executing);
        let result = self.drain().await;
        self.state.set(ShellState::Idle);
        result
    }

    async fn drain(&self) -> Result<()> {
        loop {
            let Some(next) = self.pending.borrow_mut().pop_front() else {
                return Ok(());
            };
            match next.run(Rc::clone(&self.console), self).await {
                Ok(_) => {},
                Err(VosError::ScriptEnd {
                    local_scope: true, ..
                }) => {
                    self.console.write_line(
                        "-sh: return: can only `return' from a function or sourced script",
                    );
                },
                Err(e @ VosError::ScriptEnd { .. }) => {
                    self.pending.borrow_mut().clear();
                    return Err(e);
                },
                Err(e) => {
                    self.pending.borrow_mut().clear();
                    self.fault(e)?;
                },
            }
        }
    }

    /// Run script text non-interactively in its own local scope.
    ///
    /// `exit` and `return` both end the script with their code.
    pub async fn run_script(&self, text: &str) -> Result<i32> {
        let tree = match parser::parse_script(text, self.options, true) {
            Ok(tree) => tree,
            Err(e) => {
                self.fault(e)?;
                return Ok(2);
            },
        };
        self.state.set(ShellState::Executing);
        let result = tree.run(Rc::clone(&self.console), self).await;
        self.state.set(ShellState::Idle);
        match result {
            Ok(code) | Err(VosError::ScriptEnd { exit_code: code, .. }) => Ok(code),
            Err(e) => {
                self.fault(e)?;
                Ok(1)
            },
        }
    }

    /// Completion candidates for the identifier ending at `cursor`.
    ///
    /// Returns the byte offset where the identifier starts and the sorted
    /// candidates.
    pub fn completions(&self, line: &str, cursor: usize) -> (usize, Vec<String>) {
        let before = line.get(..cursor).unwrap_or(line);
        let start = before
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
            .last()
            .map_or(before.len(), |(i, _)| i);
        let prefix = &before[start..];
        if prefix.is_empty() {
            return (start, Vec::new());
        }
        let mut names: Vec<String> = BUILTINS
            .iter()
            .map(|s| s.to_string())
            .chain(self.command_names())
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        names.dedup();
        (start, names)
    }

    fn change_directory(&self, console: &dyn TextConsole, args: &[String]) -> i32 {
        let home = self.host.home_directory();
        let target = match args.first() {
            None => home,
            Some(dir) => path::make_absolute(&self.host.working_directory(), dir, &home),
        };
        let exists = self
            .host
            .file_system()
            .is_none_or(|fs| fs.directory_exists(&target));
        if !exists {
            console.write_line(&format!("sh: cd: {target}: Directory not found."));
            return 1;
        }
        self.host.set_working_directory(&target);
        0
    }

    fn builtin(&self, console: &dyn TextConsole, name: &str, args: &[String]) -> Result<Option<i32>> {
        let code = match name {
            "title" => {
                let text = args.join(" ");
                *self.title.borrow_mut() = if text.trim().is_empty() {
                    self.config.default_title.clone()
                } else {
                    text
                };
                self.update_title(console);
                0
            },
            "test" | "[" | "[[" => tester::evaluate(self, console, name, args),
            "exit" | "return" => {
                let code = match args.first() {
                    None => 0,
                    Some(arg) => arg.parse().unwrap_or_else(|_| {
                        console.write_line(&format!("sh: {name}: {arg}: numeric argument required"));
                        2
                    }),
                };
                return Err(if name == "exit" {
                    VosError::exit(code)
                } else {
                    VosError::return_from(code)
                });
            },
            "clear" => {
                console.clear_screen();
                0
            },
            "echo" => {
                let (newline, words) = match args.split_first() {
                    Some((flag, rest)) if flag == "-n" => (false, rest),
                    _ => (true, args),
                };
                console.write_text(&words.join(" "));
                if newline {
                    console.write_text("\n");
                }
                0
            },
            "cd" => self.change_directory(console, args),
            _ => return Ok(None),
        };
        Ok(Some(code))
    }
}

impl ScriptContext for InteractiveShell<'_> {
    fn title(&self) -> String {
        self.host.title()
    }

    fn variable(&self, name: &str) -> Option<String> {
        self.scope.variable(name).or_else(|| self.host.variable(name))
    }

    fn set_variable(&self, name: &str, value: String) {
        self.host.set_variable(name, value);
    }

    fn declare_function(&self, name: &str, body: Rc<Instruction>) {
        self.scope.declare_function(name, body);
    }

    fn try_execute_command<'a>(
        &'a self,
        console: Rc<dyn TextConsole>,
        name: &'a str,
        args: &'a [String],
    ) -> LocalFuture<'a, Result<Option<i32>>> {
        Box::pin(async move {
            if let Some(body) = self.scope.function(name) {
                let code = invoke_function(self, &self.scope, &body, console, name, args).await?;
                return Ok(Some(code));
            }
            if let Some(code) = self
                .host
                .try_execute_command(Rc::clone(&console), name, args)
                .await?
            {
                return Ok(Some(code));
            }
            self.builtin(&*console, name, args)
        })
    }

    fn handle_command_not_found<'a>(
        &'a self,
        console: Rc<dyn TextConsole>,
        name: &'a str,
        args: &'a [String],
    ) -> LocalFuture<'a, Result<i32>> {
        self.host.handle_command_not_found(console, name, args)
    }

    fn working_directory(&self) -> String {
        self.host.working_directory()
    }

    fn set_working_directory(&self, path: &str) {
        self.host.set_working_directory(path);
    }

    fn home_directory(&self) -> String {
        self.host.home_directory()
    }

    fn file_system(&self) -> Option<VirtualFileSystem> {
        self.host.file_system()
    }

    fn prompt(&self) -> Option<String> {
        self.host.prompt()
    }

    fn command_names(&self) -> Vec<String> {
        let mut names = self.scope.function_names();
        names.extend(self.host.command_names());
        names
    }

    fn open_file_console(
        &self,
        console: Rc<dyn TextConsole>,
        path: &str,
        mode: RedirectMode,
    ) -> Result<Rc<dyn TextConsole>> {
        self.host.open_file_console(console, path, mode)
    }
}
