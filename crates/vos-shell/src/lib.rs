//! Shell language engine for VOS.
//!
//! Input flows through three stages. The tokenizer resolves quoting and
//! classifies text into tokens, the parser builds an [`Instruction`] tree,
//! and instructions run against a [`ScriptContext`] that supplies variables,
//! functions, and command dispatch. [`InteractiveShell`] drives the
//! prompt cycle and [`TerminalSession`] ties it to a process on a computer.

pub mod consoles;
pub mod context;
pub mod coreutils;
mod cursor;
pub mod instruction;
pub mod parser;
pub mod repl;
pub mod session;
mod tester;
pub mod token;
pub mod tokenizer;

/// Console adapters used by pipes and redirections.
pub use consoles::{FileOutputConsole, InputConsole, PipeConsole};
/// Execution environments for instructions.
pub use context::{LocalScriptExecutionContext, Scope, ScriptContext, StandaloneContext};
/// Executable instruction tree.
pub use instruction::{Instruction, Logic, RedirectMode, Word, WordPart};
/// Parse source text into an instruction tree.
pub use parser::{parse, parse_script};
/// The prompt-cycle driver.
pub use repl::{InteractiveShell, ShellState};
/// Process-backed shells.
pub use session::{ProcessShellContext, ShellScriptRunner, TerminalSession};
/// Lexical tokens.
pub use token::{ShellToken, ShellTokenKind};
/// Tokenizer entry points.
pub use tokenizer::{ParseOptions, Scan, tokenize};
