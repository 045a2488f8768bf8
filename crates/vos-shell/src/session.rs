//! Shells backed by real processes: the host context, the script-file
//! runner, and the terminal session loop.

use std::rc::Rc;

use vos_kernel::{Computer, Process, ProgramContext, ScriptRunner, User, VirtualFileSystem};
use vos_types::config::ShellConfig;
use vos_types::console::TextConsole;
use vos_types::error::{Result, VosError};
use vos_types::{LocalFuture, path};

use crate::context::{Scope, ScriptContext, invoke_function};
use crate::instruction::Instruction;
use crate::repl::InteractiveShell;

/// Host context for a shell running as `process` on `computer`.
///
/// Variables already in the process environment are updated there; new ones
/// stay in the shell.
pub struct ProcessShellContext<'c> {
    process: Process,
    computer: &'c Computer,
    config: &'c ShellConfig,
    scope: Scope,
}

impl<'c> ProcessShellContext<'c> {
    pub fn new(process: Process, computer: &'c Computer, config: &'c ShellConfig) -> Self {
        Self {
            process,
            computer,
            config,
            scope: Scope::new(),
        }
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    /// Bind `$0`, `$1..$n`, `$#`, and `$@` for a script run.
    pub fn set_positionals(&self, script: &str, args: &[String]) {
        self.scope.set_variable("0", script.to_string());
        for (i, arg) in args.iter().enumerate() {
            self.scope.set_variable(&(i + 1).to_string(), arg.clone());
        }
        self.scope.set_variable("#", args.len().to_string());
        self.scope.set_variable("@", args.join(" "));
    }
}

impl ScriptContext for ProcessShellContext<'_> {
    fn title(&self) -> String {
        format!("{}@{}", self.process.user().name, self.computer.hostname())
    }

    fn variable(&self, name: &str) -> Option<String> {
        if name == "$" {
            return Some(self.process.id().to_string());
        }
        self.scope
            .variable(name)
            .or_else(|| self.process.env_var(name))
    }

    fn set_variable(&self, name: &str, value: String) {
        if self.process.env_var(name).is_some() {
            self.process.set_env_var(name, &value);
        } else {
            self.scope.set_variable(name, value);
        }
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
        args: &'a [String],
    ) -> LocalFuture<'a, Result<i32>> {
        Box::pin(async move {
            let runner = ShellScriptRunner::new(self.config.clone());
            let executed = self
                .computer
                .execute_program(&self.process, Rc::clone(&console), name, args, Some(&runner))
                .await?;
            Ok(executed.unwrap_or_else(|| {
                console.write_line(&format!("sh: {name}: command not found"));
                127
            }))
        })
    }

    fn working_directory(&self) -> String {
        self.process.working_directory()
    }

    fn set_working_directory(&self, path: &str) {
        self.process.set_working_directory(path);
    }

    fn home_directory(&self) -> String {
        self.process
            .env_var("HOME")
            .unwrap_or_else(|| self.process.user().home.clone())
    }

    fn file_system(&self) -> Option<VirtualFileSystem> {
        Some(self.computer.file_system(self.process.user()))
    }

    /// `user@host:cwd$ `, with `~` for the home directory and `#` for root.
    fn prompt(&self) -> Option<String> {
        let user = self.process.user();
        let cwd = self.process.working_directory();
        let home = self.home_directory();
        let shown = match path::strip_prefix(&cwd, &home) {
            Some(rest) if home != "/" => {
                if rest == "/" {
                    "~".to_string()
                } else {
                    format!("~{rest}")
                }
            },
            _ => cwd,
        };
        let sigil = if user.is_super_user() { '#' } else { '$' };
        Some(format!("{}@{}:{shown}{sigil} ", user.name, self.computer.hostname()))
    }

    fn command_names(&self) -> Vec<String> {
        let mut names = self.scope.function_names();
        names.extend(self.computer.command_names(&self.process));
        names
    }
}

// ---------------------------------------------------------------------------
// Script files
// ---------------------------------------------------------------------------

/// Runs executable text files in a nested strict shell.
pub struct ShellScriptRunner {
    config: ShellConfig,
}

impl ShellScriptRunner {
    pub fn new(config: ShellConfig) -> Self {
        Self { config }
    }
}

impl ScriptRunner for ShellScriptRunner {
    fn run_script<'a>(
        &'a self,
        ctx: ProgramContext<'a>,
        path: &'a str,
        source: String,
    ) -> LocalFuture<'a, Result<i32>> {
        Box::pin(async move {
            let host = ProcessShellContext::new(ctx.process.clone(), ctx.computer, &self.config);
            host.set_positionals(path, ctx.args);
            let shell = InteractiveShell::new(&host, ctx.console, self.config.clone()).strict();
            shell.run_script(&source).await
        })
    }
}

// ---------------------------------------------------------------------------
// TerminalSession
// ---------------------------------------------------------------------------

/// An interactive login on one console.
pub struct TerminalSession {
    computer: Rc<Computer>,
    console: Rc<dyn TextConsole>,
    config: ShellConfig,
}

impl TerminalSession {
    pub fn new(computer: Rc<Computer>, console: Rc<dyn TextConsole>, config: ShellConfig) -> Self {
        Self {
            computer,
            console,
            config,
        }
    }

    /// Log `user` in and run prompt cycles until the shell process dies.
    ///
    /// Returns the shell's exit code. The login process dies with it.
    pub async fn run(&self, user: Rc<User>) -> Result<i32> {
        let login = self.computer.create_login_process(user)?;
        let process = login.fork()?;
        process.set_name("sh");
        self.console.set_window_title(&self.config.default_title);
        log::info!(
            "Session started for {} as pid {}",
            process.user().name,
            process.id()
        );

        let host = ProcessShellContext::new(process.clone(), &self.computer, &self.config);
        let shell = InteractiveShell::new(&host, Rc::clone(&self.console), self.config.clone());
        while process.is_alive() {
            match shell.run().await {
                Ok(()) => {},
                Err(VosError::ScriptEnd { exit_code, .. }) => process.kill(exit_code),
                Err(e) => {
                    log::error!("Shell pid {} failed: {e}", process.id());
                    self.console.write_line(&format!("-sh: {e}"));
                    process.kill(1);
                },
            }
        }

        let code = process.exit_code();
        login.kill(code);
        log::info!("Session ended with exit code {code}");
        Ok(code)
    }
}
