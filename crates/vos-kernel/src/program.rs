//! Executable programs and how commands find them.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use vos_types::LocalFuture;
use vos_types::console::TextConsole;
use vos_types::error::Result;

use crate::computer::Computer;
use crate::process::Process;

/// Everything a running program can reach.
pub struct ProgramContext<'a> {
    /// The process forked for this run.
    pub process: &'a Process,
    pub computer: &'a Computer,
    pub console: Rc<dyn TextConsole>,
    /// Arguments, excluding the program name.
    pub args: &'a [String],
}

/// A native program.
pub trait Program {
    /// The command name (what the user types).
    fn name(&self) -> &str;

    /// One-line description.
    fn description(&self) -> &str {
        ""
    }

    /// Run to completion and return the exit code.
    fn run<'a>(&'a self, ctx: ProgramContext<'a>) -> LocalFuture<'a, Result<i32>>;
}

/// Content lookup for programs that live outside the file system.
pub trait ProgramResolver {
    fn resolve(&self, name: &str) -> Option<Rc<dyn Program>>;

    /// Names offered for completion.
    fn names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Runs shell-script executables. Implemented by the shell crate.
pub trait ScriptRunner {
    fn run_script<'a>(
        &'a self,
        ctx: ProgramContext<'a>,
        path: &'a str,
        source: String,
    ) -> LocalFuture<'a, Result<i32>>;
}

/// What an executable file system entry runs as.
#[derive(Clone)]
pub enum Executable {
    Native(Rc<dyn Program>),
    /// Source text of an executable script file.
    Script(String),
}

impl fmt::Debug for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(p) => f.debug_tuple("Native").field(&p.name()).finish(),
            Self::Script(s) => f.debug_tuple("Script").field(&s.len()).finish(),
        }
    }
}

/// A name-keyed registry of native programs.
#[derive(Default)]
pub struct ProgramCatalog {
    programs: BTreeMap<String, Rc<dyn Program>>,
}

impl ProgramCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a program. Replaces any existing program with the same name.
    pub fn register(&mut self, program: Rc<dyn Program>) {
        self.programs.insert(program.name().to_string(), program);
    }

    /// Iterate over registered programs in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<dyn Program>> {
        self.programs.values()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl ProgramResolver for ProgramCatalog {
    fn resolve(&self, name: &str) -> Option<Rc<dyn Program>> {
        self.programs.get(name).map(Rc::clone)
    }

    fn names(&self) -> Vec<String> {
        self.programs.keys().cloned().collect()
    }
}
