//! Execution context chain.
//!
//! A [`ScriptContext`] resolves variables, functions, and commands while an
//! instruction tree runs. Contexts nest: a [`LocalScriptExecutionContext`]
//! keeps its own bindings and hands anything it cannot resolve to the
//! context that encloses it, up to the interactive shell and finally the
//! host (a process, or a [`StandaloneContext`] when there is none).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use vos_kernel::VirtualFileSystem;
use vos_types::console::TextConsole;
use vos_types::error::{Result, VosError};
use vos_types::{LocalFuture, path};

use crate::consoles::{FileOutputConsole, InputConsole};
use crate::instruction::{Instruction, RedirectMode};

/// Name resolution and host services for running instructions.
pub trait ScriptContext {
    /// Name of whatever hosts the script, shown in the window title.
    fn title(&self) -> String;

    fn variable(&self, name: &str) -> Option<String>;

    fn set_variable(&self, name: &str, value: String);

    fn declare_function(&self, name: &str, body: Rc<Instruction>);

    /// Run `name` if this context (or one it encloses) knows it.
    ///
    /// `Ok(None)` means the name was not found here.
    fn try_execute_command<'a>(
        &'a self,
        console: Rc<dyn TextConsole>,
        name: &'a str,
        args: &'a [String],
    ) -> LocalFuture<'a, Result<Option<i32>>>;

    /// Last resort for a name nobody resolved.
    fn handle_command_not_found<'a>(
        &'a self,
        console: Rc<dyn TextConsole>,
        name: &'a str,
        args: &'a [String],
    ) -> LocalFuture<'a, Result<i32>>;

    fn working_directory(&self) -> String;

    fn set_working_directory(&self, path: &str);

    fn home_directory(&self) -> String;

    /// The file system scripts see, if the host has one.
    fn file_system(&self) -> Option<VirtualFileSystem>;

    /// Interactive prompt supplied by the host.
    fn prompt(&self) -> Option<String> {
        None
    }

    /// Names offered for completion.
    fn command_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Wrap `console` so that it reads from or writes to `path`.
    fn open_file_console(
        &self,
        console: Rc<dyn TextConsole>,
        path: &str,
        mode: RedirectMode,
    ) -> Result<Rc<dyn TextConsole>> {
        let Some(fs) = self.file_system() else {
            return Err(VosError::NotFound(path.to_string()));
        };
        let path = path::make_absolute(&self.working_directory(), path, &self.home_directory());
        let writer = match mode {
            RedirectMode::Input => {
                let text = fs.read_to_string(&path)?;
                return Ok(Rc::new(InputConsole::new(console, &text)));
            },
            RedirectMode::Overwrite => fs.open_write(&path)?,
            RedirectMode::Append => fs.open_write_append(&path)?,
        };
        Ok(Rc::new(FileOutputConsole::new(console, writer)))
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Positional bindings for one function call.
#[derive(Debug)]
struct Frame {
    id: u64,
    name: String,
    args: Vec<String>,
}

/// Variable, function, and frame storage for one context.
#[derive(Debug, Default)]
pub struct Scope {
    variables: RefCell<HashMap<String, String>>,
    functions: RefCell<HashMap<String, Rc<Instruction>>>,
    frames: RefCell<Vec<Frame>>,
    next_frame: Cell<u64>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A positional lookup against the innermost frame.
    ///
    /// Inside a call every numeric name resolves, to empty past the last
    /// argument.
    fn frame_variable(&self, name: &str) -> Option<String> {
        let frames = self.frames.borrow();
        let frame = frames.last()?;
        match name {
            "0" => Some(frame.name.clone()),
            "#" => Some(frame.args.len().to_string()),
            "@" => Some(frame.args.join(" ")),
            _ => {
                let index = name.parse::<usize>().ok()?.checked_sub(1)?;
                Some(frame.args.get(index).cloned().unwrap_or_default())
            },
        }
    }

    /// Frame first, then local bindings.
    pub fn variable(&self, name: &str) -> Option<String> {
        self.frame_variable(name)
            .or_else(|| self.variables.borrow().get(name).cloned())
    }

    pub fn set_variable(&self, name: &str, value: String) {
        self.variables.borrow_mut().insert(name.to_string(), value);
    }

    pub fn declare_function(&self, name: &str, body: Rc<Instruction>) {
        self.functions.borrow_mut().insert(name.to_string(), body);
    }

    pub fn function(&self, name: &str) -> Option<Rc<Instruction>> {
        self.functions.borrow().get(name).cloned()
    }

    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a function call is in progress.
    pub fn in_function(&self) -> bool {
        !self.frames.borrow().is_empty()
    }

    /// Bind `$0..$n` until the guard drops.
    pub fn push_frame(&self, name: &str, args: &[String]) -> FrameGuard<'_> {
        let id = self.next_frame.get();
        self.next_frame.set(id + 1);
        self.frames.borrow_mut().push(Frame {
            id,
            name: name.to_string(),
            args: args.to_vec(),
        });
        FrameGuard { scope: self, id }
    }
}

/// Pops its frame on drop, including when the call fails.
pub struct FrameGuard<'s> {
    scope: &'s Scope,
    id: u64,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        let mut frames = self.scope.frames.borrow_mut();
        if let Some(pos) = frames.iter().rposition(|f| f.id == self.id) {
            frames.remove(pos);
        }
    }
}

/// Call a declared function with a fresh frame in `scope`.
///
/// `return` ends the call with its code instead of propagating.
pub async fn invoke_function(
    ctx: &dyn ScriptContext,
    scope: &Scope,
    body: &Instruction,
    console: Rc<dyn TextConsole>,
    name: &str,
    args: &[String],
) -> Result<i32> {
    let _frame = scope.push_frame(name, args);
    match body.run(console, ctx).await {
        Err(VosError::ScriptEnd {
            exit_code,
            local_scope: true,
        }) => Ok(exit_code),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// LocalScriptExecutionContext
// ---------------------------------------------------------------------------

/// Copy-on-write scope over an enclosing context.
///
/// Reads fall through to the parent; writes and declarations stay here.
pub struct LocalScriptExecutionContext<'p> {
    parent: &'p dyn ScriptContext,
    scope: Scope,
}

impl<'p> LocalScriptExecutionContext<'p> {
    pub fn new(parent: &'p dyn ScriptContext) -> Self {
        Self {
            parent,
            scope: Scope::new(),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl ScriptContext for LocalScriptExecutionContext<'_> {
    fn title(&self) -> String {
        self.parent.title()
    }

    fn variable(&self, name: &str) -> Option<String> {
        self.scope.variable(name).or_else(|| self.parent.variable(name))
    }

    fn set_variable(&self, name: &str, value: String) {
        self.scope.set_variable(name, value);
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
            self.parent.try_execute_command(console, name, args).await
        })
    }

    fn handle_command_not_found<'a>(
        &'a self,
        console: Rc<dyn TextConsole>,
        name: &'a str,
        args: &'a [String],
    ) -> LocalFuture<'a, Result<i32>> {
        self.parent.handle_command_not_found(console, name, args)
    }

    fn working_directory(&self) -> String {
        self.parent.working_directory()
    }

    fn set_working_directory(&self, path: &str) {
        self.parent.set_working_directory(path);
    }

    fn home_directory(&self) -> String {
        self.parent.home_directory()
    }

    fn file_system(&self) -> Option<VirtualFileSystem> {
        self.parent.file_system()
    }

    fn prompt(&self) -> Option<String> {
        self.parent.prompt()
    }

    fn command_names(&self) -> Vec<String> {
        let mut names = self.scope.function_names();
        names.extend(self.parent.command_names());
        names
    }

    fn open_file_console(
        &self,
        console: Rc<dyn TextConsole>,
        path: &str,
        mode: RedirectMode,
    ) -> Result<Rc<dyn TextConsole>> {
        self.parent.open_file_console(console, path, mode)
    }
}

// ---------------------------------------------------------------------------
// StandaloneContext
// ---------------------------------------------------------------------------

/// Outermost context for scripts that run without a process or file system.
pub struct StandaloneContext {
    title: String,
    scope: Scope,
    working_directory: RefCell<String>,
}

impl StandaloneContext {
    pub fn new() -> Self {
        Self::with_title("script")
    }

    pub fn with_title(title: &str) -> Self {
        Self {
            title: title.to_string(),
            scope: Scope::new(),
            working_directory: RefCell::new("/".to_string()),
        }
    }
}

impl Default for StandaloneContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptContext for StandaloneContext {
    fn title(&self) -> String {
        self.title.clone()
    }

    fn variable(&self, name: &str) -> Option<String> {
        self.scope.variable(name)
    }

    fn set_variable(&self, name: &str, value: String) {
        self.scope.set_variable(name, value);
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
            match self.scope.function(name) {
                Some(body) => invoke_function(self, &self.scope, &body, console, name, args)
                    .await
                    .map(Some),
                None => Ok(None),
            }
        })
    }

    fn handle_command_not_found<'a>(
        &'a self,
        console: Rc<dyn TextConsole>,
        name: &'a str,
        _args: &'a [String],
    ) -> LocalFuture<'a, Result<i32>> {
        Box::pin(async move {
            console.write_line(&format!("sh: {name}: command not found"));
            Ok(127)
        })
    }

    fn working_directory(&self) -> String {
        self.working_directory.borrow().clone()
    }

    fn set_working_directory(&self, path: &str) {
        *self.working_directory.borrow_mut() = path.to_string();
    }

    fn home_directory(&self) -> String {
        self.variable("HOME").unwrap_or_else(|| "/".to_string())
    }

    fn file_system(&self) -> Option<VirtualFileSystem> {
        None
    }

    fn command_names(&self) -> Vec<String> {
        self.scope.function_names()
    }
}
