//! Parsed instruction tree and its execution.
//!
//! Instructions are immutable once parsed. Running one never mutates the
//! tree, so the same tree can be executed any number of times against
//! different contexts.

use std::rc::Rc;

use futures_lite::future;
use vos_types::LocalFuture;
use vos_types::console::TextConsole;
use vos_types::error::Result;
use vos_types::path;

use crate::consoles::{InputConsole, PipeConsole};
use crate::context::{LocalScriptExecutionContext, ScriptContext};

/// How a redirection target is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// `<`
    Input,
    /// `>`
    Overwrite,
    /// `>>`
    Append,
}

/// `&&` or `||`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
}

/// One piece of a word before expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordPart {
    Literal(String),
    Variable(String),
}

/// A command-line word built from adjacent tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Word {
    pub parts: Vec<WordPart>,
    /// Any part came from quotes, so the word survives expanding to empty.
    pub quoted: bool,
}

impl Word {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            parts: vec![WordPart::Literal(text.into())],
            quoted: false,
        }
    }

    /// The word's text when it has no variable parts.
    pub fn as_literal(&self) -> Option<String> {
        self.parts
            .iter()
            .map(|p| match p {
                WordPart::Literal(s) => Some(s.as_str()),
                WordPart::Variable(_) => None,
            })
            .collect()
    }

    /// Substitute variables and a leading `~`.
    pub fn expand(&self, ctx: &dyn ScriptContext) -> String {
        let mut out = String::new();
        for (i, part) in self.parts.iter().enumerate() {
            match part {
                WordPart::Literal(text) if i == 0 && !self.quoted => {
                    if text == "~" {
                        out.push_str(&ctx.home_directory());
                    } else if let Some(rest) = text.strip_prefix("~/") {
                        out.push_str(&path::combine(&ctx.home_directory(), rest));
                    } else {
                        out.push_str(text);
                    }
                },
                WordPart::Literal(text) => out.push_str(text),
                WordPart::Variable(name) => {
                    out.push_str(&ctx.variable(name).unwrap_or_default());
                },
            }
        }
        out
    }
}

/// Expand a word list, dropping unquoted words that expand to nothing.
pub fn expand_words(words: &[Word], ctx: &dyn ScriptContext) -> Vec<String> {
    words
        .iter()
        .filter_map(|w| {
            let text = w.expand(ctx);
            (w.quoted || !text.is_empty()).then_some(text)
        })
        .collect()
}

/// A node of the parsed script.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Empty,
    /// `NAME=value ... word ...`
    Command {
        assignments: Vec<(String, Word)>,
        words: Vec<Word>,
    },
    /// `left | right`
    Pipe(Box<Instruction>, Box<Instruction>),
    /// `first ; next`
    Sequential(Box<Instruction>, Box<Instruction>),
    /// `first & next`
    Parallel(Box<Instruction>, Box<Instruction>),
    /// `left && right`, `left || right`
    Conditional {
        logic: Logic,
        left: Box<Instruction>,
        right: Box<Instruction>,
    },
    Redirect {
        inner: Box<Instruction>,
        target: Word,
        mode: RedirectMode,
    },
    FunctionDeclaration {
        name: String,
        body: Rc<Instruction>,
    },
    /// Runs in a fresh local context so nothing it declares leaks out.
    Scoped(Box<Instruction>),
}

impl Instruction {
    /// Execute against `ctx`, writing to `console`. Returns the exit status.
    pub fn run<'a>(
        &'a self,
        console: Rc<dyn TextConsole>,
        ctx: &'a dyn ScriptContext,
    ) -> LocalFuture<'a, Result<i32>> {
        Box::pin(async move {
            match self {
                Self::Empty => Ok(0),
                Self::Command { assignments, words } => {
                    let mut argv = expand_words(words, ctx);
                    for (name, value) in assignments {
                        ctx.set_variable(name, value.expand(ctx));
                    }
                    if argv.is_empty() {
                        ctx.set_variable("?", "0".to_string());
                        return Ok(0);
                    }
                    let name = argv.remove(0);
                    let code = match ctx
                        .try_execute_command(Rc::clone(&console), &name, &argv)
                        .await?
                    {
                        Some(code) => code,
                        None => ctx.handle_command_not_found(console, &name, &argv).await?,
                    };
                    ctx.set_variable("?", code.to_string());
                    Ok(code)
                },
                Self::Pipe(left, right) => {
                    let pipe = Rc::new(PipeConsole::new(Rc::clone(&console)));
                    left.run(Rc::clone(&pipe) as Rc<dyn TextConsole>, ctx).await?;
                    let input = InputConsole::new(console, &pipe.take_output());
                    right.run(Rc::new(input), ctx).await
                },
                Self::Sequential(first, next) => {
                    first.run(Rc::clone(&console), ctx).await?;
                    next.run(console, ctx).await
                },
                Self::Parallel(first, next) => {
                    let (a, b) = future::zip(
                        first.run(Rc::clone(&console), ctx),
                        next.run(console, ctx),
                    )
                    .await;
                    match (a, b) {
                        (Err(e), _) | (Ok(_), Err(e)) => Err(e),
                        (Ok(_), Ok(code)) => Ok(code),
                    }
                },
                Self::Conditional { logic, left, right } => {
                    let code = left.run(Rc::clone(&console), ctx).await?;
                    let proceed = match logic {
                        Logic::And => code == 0,
                        Logic::Or => code != 0,
                    };
                    if proceed {
                        right.run(console, ctx).await
                    } else {
                        Ok(code)
                    }
                },
                Self::Redirect {
                    inner,
                    target,
                    mode,
                } => {
                    let path = target.expand(ctx);
                    let redirected = ctx.open_file_console(console, &path, *mode)?;
                    let result = inner.run(Rc::clone(&redirected), ctx).await;
                    let flushed = redirected.flush();
                    let code = result?;
                    flushed?;
                    Ok(code)
                },
                Self::FunctionDeclaration { name, body } => {
                    ctx.declare_function(name, Rc::clone(body));
                    Ok(0)
                },
                Self::Scoped(inner) => {
                    let local = LocalScriptExecutionContext::new(ctx);
                    inner.run(console, &local).await
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StandaloneContext;
    use futures_lite::future::block_on;
    use vos_types::VosError;
    use vos_types::console::BufferConsole;

    fn command(words: &[&str]) -> Instruction {
        Instruction::Command {
            assignments: Vec::new(),
            words: words.iter().map(|w| Word::literal(*w)).collect(),
        }
    }

    fn run(instr: &Instruction, ctx: &StandaloneContext) -> (Result<i32>, String) {
        let console = Rc::new(BufferConsole::new());
        let result = block_on(instr.run(Rc::clone(&console) as Rc<dyn TextConsole>, ctx));
        (result, console.output())
    }

    #[test]
    fn empty_succeeds() {
        let ctx = StandaloneContext::new();
        assert_eq!(run(&Instruction::Empty, &ctx).0.unwrap(), 0);
    }

    #[test]
    fn unknown_command_is_127() {
        let ctx = StandaloneContext::new();
        let (result, out) = run(&command(&["nope"]), &ctx);
        assert_eq!(result.unwrap(), 127);
        assert_eq!(out, "sh: nope: command not found\n");
        assert_eq!(ctx.variable("?").as_deref(), Some("127"));
    }

    #[test]
    fn bare_assignment_sets_variable() {
        let ctx = StandaloneContext::new();
        let instr = Instruction::Command {
            assignments: vec![("X".into(), Word::literal("1"))],
            words: Vec::new(),
        };
        run(&instr, &ctx).0.unwrap();
        assert_eq!(ctx.variable("X").as_deref(), Some("1"));
    }

    #[test]
    fn unquoted_empty_words_are_dropped() {
        let ctx = StandaloneContext::new();
        let words = vec![
            Word {
                parts: vec![WordPart::Variable("missing".into())],
                quoted: false,
            },
            Word {
                parts: vec![WordPart::Variable("missing".into())],
                quoted: true,
            },
        ];
        assert_eq!(expand_words(&words, &ctx), vec![String::new()]);
    }

    #[test]
    fn tilde_expands_unquoted_only() {
        let ctx = StandaloneContext::new();
        ctx.set_variable("HOME", "/home/ann".into());
        assert_eq!(Word::literal("~/x").expand(&ctx), "/home/ann/x");
        assert_eq!(Word::literal("a~").expand(&ctx), "a~");
        let quoted = Word {
            parts: vec![WordPart::Literal("~".into())],
            quoted: true,
        };
        assert_eq!(quoted.expand(&ctx), "~");
    }

    #[test]
    fn as_literal_rejects_variables() {
        let word = Word {
            parts: vec![
                WordPart::Literal("a".into()),
                WordPart::Variable("b".into()),
            ],
            quoted: false,
        };
        assert_eq!(word.as_literal(), None);
        assert_eq!(Word::literal("ab").as_literal().as_deref(), Some("ab"));
    }

    #[test]
    fn conditional_short_circuits() {
        let ctx = StandaloneContext::new();
        let instr = Instruction::Conditional {
            logic: Logic::And,
            left: Box::new(command(&["nope"])),
            right: Box::new(command(&["other"])),
        };
        let (result, out) = run(&instr, &ctx);
        assert_eq!(result.unwrap(), 127);
        assert!(!out.contains("other"));

        let instr = Instruction::Conditional {
            logic: Logic::Or,
            left: Box::new(command(&["nope"])),
            right: Box::new(command(&["other"])),
        };
        let (_, out) = run(&instr, &ctx);
        assert!(out.contains("other"));
    }

    #[test]
    fn parallel_returns_right_status() {
        let ctx = StandaloneContext::new();
        let instr = Instruction::Parallel(
            Box::new(command(&["nope"])),
            Box::new(Instruction::Empty),
        );
        let (result, out) = run(&instr, &ctx);
        assert_eq!(result.unwrap(), 0);
        assert!(out.contains("nope"));
    }

    #[test]
    fn parallel_fault_surfaces_after_both_ran() {
        let ctx = StandaloneContext::new();
        let failing = Instruction::Redirect {
            inner: Box::new(Instruction::Empty),
            target: Word::literal("/out"),
            mode: RedirectMode::Input,
        };
        let instr = Instruction::Parallel(Box::new(failing), Box::new(command(&["other"])));
        let (result, out) = run(&instr, &ctx);
        assert!(matches!(result, Err(VosError::NotFound(_))));
        assert!(out.contains("other"));
    }

    #[test]
    fn scoped_declarations_do_not_leak() {
        let ctx = StandaloneContext::new();
        let instr = Instruction::Scoped(Box::new(Instruction::Command {
            assignments: vec![("Y".into(), Word::literal("2"))],
            words: Vec::new(),
        }));
        run(&instr, &ctx).0.unwrap();
        assert_eq!(ctx.variable("Y"), None);
    }

    #[test]
    fn redirect_without_file_system_fails() {
        let ctx = StandaloneContext::new();
        let instr = Instruction::Redirect {
            inner: Box::new(Instruction::Empty),
            target: Word::literal("/tmp/out"),
            mode: RedirectMode::Overwrite,
        };
        assert!(matches!(run(&instr, &ctx).0, Err(VosError::NotFound(_))));
    }
}
