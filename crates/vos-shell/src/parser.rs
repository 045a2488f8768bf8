//! Recursive-descent script parser.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! list      := and_or ((';' | '&' | newline) and_or)*
//! and_or    := pipeline (('&&' | '||') pipeline)*
//! pipeline  := command ('|' command)*
//! command   := '{' list '}' redirect*
//!            | '(' list ')' redirect*
//!            | NAME '(' ')' command
//!            | (NAME '=' word)* (word | redirect)*
//! redirect  := ('>' | '>>' | '<') word
//! ```

use std::rc::Rc;

use vos_types::error::{Result, VosError};

use crate::cursor::SliceCursor;
use crate::instruction::{Instruction, Logic, RedirectMode, Word, WordPart};
use crate::token::{ShellToken, ShellTokenKind as K};
use crate::tokenizer::{self, ParseOptions, Scan};

fn unexpected(token: Option<&ShellToken>) -> VosError {
    match token {
        None => VosError::Syntax("unexpected end of file".into()),
        Some(t) if t.is(K::Newline) => {
            VosError::Syntax("near unexpected token `newline'".into())
        },
        Some(t) => VosError::Syntax(format!("near unexpected token `{}'", t.text)),
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn push_literal(parts: &mut Vec<WordPart>, text: &str) {
    if let Some(WordPart::Literal(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(WordPart::Literal(text.to_string()));
    }
}

/// Split the raw body of a double-quoted string into literal and variable
/// parts, resolving the escapes that are special inside double quotes.
fn expansion_parts(text: &str) -> Vec<WordPart> {
    let chars: Vec<char> = text.chars().collect();
    let mut cursor = SliceCursor::new(&chars);
    let mut parts = Vec::new();
    while let Some(&ch) = cursor.current() {
        match ch {
            '\\' => {
                cursor.take();
                match cursor.take() {
                    Some(&c @ ('$' | '"' | '\\' | '`')) => push_literal(&mut parts, &c.to_string()),
                    Some('\n') => {},
                    Some(&c) => push_literal(&mut parts, &format!("\\{c}")),
                    None => push_literal(&mut parts, "\\"),
                }
            },
            '$' => match tokenizer::variable_at(cursor.rest()) {
                Some((len, name)) => {
                    parts.push(WordPart::Variable(name));
                    for _ in 0..len {
                        cursor.take();
                    }
                },
                None => {
                    push_literal(&mut parts, "$");
                    cursor.take();
                },
            },
            _ => {
                push_literal(&mut parts, &ch.to_string());
                cursor.take();
            },
        }
    }
    parts
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Separator {
    Sequential,
    Parallel,
}

struct Parser<'t> {
    cursor: SliceCursor<'t, ShellToken>,
    /// Open `{` / `(` nesting.
    depth: usize,
}

impl<'t> Parser<'t> {
    fn current(&self) -> Option<&'t ShellToken> {
        self.cursor.current()
    }

    fn at(&self, kind: K) -> bool {
        self.current().is_some_and(|t| t.is(kind))
    }

    fn skip_whitespace(&mut self) {
        while self.at(K::Whitespace) {
            self.cursor.take();
        }
    }

    /// Whitespace and newlines.
    fn skip_blank(&mut self) {
        while self.at(K::Whitespace) || self.at(K::Newline) {
            self.cursor.take();
        }
    }

    fn at_list_end(&self) -> bool {
        match self.current() {
            None => true,
            Some(t) => self.depth > 0 && (t.is(K::CloseBrace) || t.is(K::CloseParen)),
        }
    }

    fn expect(&mut self, kind: K) -> Result<()> {
        self.skip_blank();
        if self.at(kind) {
            self.cursor.take();
            Ok(())
        } else {
            Err(unexpected(self.current()))
        }
    }

    fn list(&mut self) -> Result<Instruction> {
        self.skip_blank();
        if self.at_list_end() {
            return Ok(Instruction::Empty);
        }
        let first = self.and_or()?;
        self.skip_whitespace();
        let separator = match self.current().map(|t| t.kind) {
            Some(K::Sequential | K::Newline) => Separator::Sequential,
            Some(K::Parallel) => Separator::Parallel,
            _ => return Ok(first),
        };
        self.cursor.take();
        self.skip_blank();
        if self.at_list_end() {
            return Ok(first);
        }
        let rest = self.list()?;
        Ok(match separator {
            Separator::Sequential => Instruction::Sequential(Box::new(first), Box::new(rest)),
            Separator::Parallel => Instruction::Parallel(Box::new(first), Box::new(rest)),
        })
    }

    fn and_or(&mut self) -> Result<Instruction> {
        let mut left = self.pipeline()?;
        loop {
            self.skip_whitespace();
            let logic = match self.current().map(|t| t.kind) {
                Some(K::LogicalAnd) => Logic::And,
                Some(K::LogicalOr) => Logic::Or,
                _ => return Ok(left),
            };
            self.cursor.take();
            self.skip_blank();
            let right = self.pipeline()?;
            left = Instruction::Conditional {
                logic,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn pipeline(&mut self) -> Result<Instruction> {
        let mut left = self.command()?;
        loop {
            self.skip_whitespace();
            if !self.at(K::Pipe) {
                return Ok(left);
            }
            self.cursor.take();
            self.skip_blank();
            let right = self.command()?;
            left = Instruction::Pipe(Box::new(left), Box::new(right));
        }
    }

    fn command(&mut self) -> Result<Instruction> {
        self.skip_whitespace();
        match self.current().map(|t| t.kind) {
            Some(K::OpenBrace) => {
                self.cursor.take();
                let body = self.nested(K::CloseBrace)?;
                self.redirects(body)
            },
            Some(K::OpenParen) => {
                self.cursor.take();
                let body = self.nested(K::CloseParen)?;
                self.redirects(Instruction::Scoped(Box::new(body)))
            },
            Some(K::Text) => match self.function_header() {
                Some(name) => {
                    self.skip_blank();
                    let body = self.command()?;
                    Ok(Instruction::FunctionDeclaration {
                        name,
                        body: Rc::new(body),
                    })
                },
                None => self.simple_command(),
            },
            _ => self.simple_command(),
        }
    }

    fn nested(&mut self, close: K) -> Result<Instruction> {
        self.depth += 1;
        let body = self.list();
        self.depth -= 1;
        let body = body?;
        self.expect(close)?;
        Ok(body)
    }

    /// Consume `NAME ( )` if that is what comes next.
    fn function_header(&mut self) -> Option<String> {
        let mut ahead = self.cursor;
        let name = ahead.take()?;
        if !is_identifier(&name.text) {
            return None;
        }
        let mut expect = |kind: K| {
            while ahead.current().is_some_and(|t| t.is(K::Whitespace)) {
                ahead.take();
            }
            ahead.take().is_some_and(|t| t.is(kind))
        };
        if !(expect(K::OpenParen) && expect(K::CloseParen)) {
            return None;
        }
        self.cursor = ahead;
        Some(name.text.clone())
    }

    fn word(&mut self) -> Option<Word> {
        let mut word = Word::default();
        let mut any = false;
        while let Some(token) = self.current().filter(|t| t.is_word_part()) {
            any = true;
            match token.kind {
                K::VariableAccess => word.parts.push(WordPart::Variable(token.text.clone())),
                K::ExpansionString => {
                    word.quoted = true;
                    for part in expansion_parts(&token.text) {
                        match part {
                            WordPart::Literal(text) => push_literal(&mut word.parts, &text),
                            variable => word.parts.push(variable),
                        }
                    }
                },
                // Only a quoted segment can produce empty text.
                K::Text if token.text.is_empty() => word.quoted = true,
                _ => push_literal(&mut word.parts, &token.text),
            }
            self.cursor.take();
        }
        any.then_some(word)
    }

    /// `NAME=` at the current position, consumed.
    fn assignment_name(&mut self) -> Option<String> {
        let name = self.current()?;
        if !name.is(K::Text) || !is_identifier(&name.text) {
            return None;
        }
        if !self.cursor.peek_next().is_some_and(|t| t.is(K::Assignment)) {
            return None;
        }
        self.cursor.take();
        self.cursor.take();
        Some(name.text.clone())
    }

    fn redirect_mode(&self) -> Option<RedirectMode> {
        match self.current()?.kind {
            K::FileInput => Some(RedirectMode::Input),
            K::Overwrite => Some(RedirectMode::Overwrite),
            K::Append => Some(RedirectMode::Append),
            _ => None,
        }
    }

    fn redirect_target(&mut self) -> Result<Word> {
        self.cursor.take();
        self.skip_whitespace();
        self.word().ok_or_else(|| unexpected(self.current()))
    }

    fn redirects(&mut self, inner: Instruction) -> Result<Instruction> {
        let mut redirects = Vec::new();
        loop {
            self.skip_whitespace();
            let Some(mode) = self.redirect_mode() else {
                return Ok(wrap_redirects(inner, redirects));
            };
            redirects.push((self.redirect_target()?, mode));
        }
    }

    fn simple_command(&mut self) -> Result<Instruction> {
        let mut assignments = Vec::new();
        let mut words = Vec::new();
        let mut redirects = Vec::new();
        loop {
            self.skip_whitespace();
            let Some(token) = self.current() else {
                break;
            };
            if self.depth > 0 && token.is(K::CloseBrace) {
                break;
            }
            if let Some(mode) = self.redirect_mode() {
                redirects.push((self.redirect_target()?, mode));
                continue;
            }
            if !token.is_word_part() {
                break;
            }
            if words.is_empty()
                && let Some(name) = self.assignment_name()
            {
                let value = self.word().unwrap_or_default();
                assignments.push((name, value));
                continue;
            }
            if let Some(word) = self.word() {
                words.push(word);
            }
        }

        if assignments.is_empty() && words.is_empty() && redirects.is_empty() {
            return Err(unexpected(self.current()));
        }
        Ok(wrap_redirects(
            Instruction::Command { assignments, words },
            redirects,
        ))
    }
}

/// Nest redirections so the last one written is innermost and receives the
/// output; earlier targets are still opened.
fn wrap_redirects(inner: Instruction, redirects: Vec<(Word, RedirectMode)>) -> Instruction {
    redirects
        .into_iter()
        .rev()
        .fold(inner, |inner, (target, mode)| Instruction::Redirect {
            inner: Box::new(inner),
            target,
            mode,
        })
}

/// Parse a token stream into an instruction tree.
///
/// With `local_context` the whole tree runs in its own scope, so functions
/// and variables it declares are discarded when it finishes.
pub fn parse(tokens: &[ShellToken], local_context: bool) -> Result<Instruction> {
    let mut parser = Parser {
        cursor: SliceCursor::new(tokens),
        depth: 0,
    };
    let tree = parser.list()?;
    parser.skip_blank();
    if parser.current().is_some() {
        return Err(unexpected(parser.current()));
    }
    Ok(if local_context {
        Instruction::Scoped(Box::new(tree))
    } else {
        tree
    })
}

/// Strip comments, tokenize, and parse complete script text.
pub fn parse_script(text: &str, options: ParseOptions, local_context: bool) -> Result<Instruction> {
    match tokenizer::tokenize(&tokenizer::strip_comments(text), options) {
        Scan::Complete(tokens) => parse(&tokens, local_context),
        Scan::Incomplete => Err(unexpected(None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(text: &str) -> Instruction {
        parse_script(text, ParseOptions::default(), false).unwrap()
    }

    fn cmd(words: &[&str]) -> Instruction {
        Instruction::Command {
            assignments: Vec::new(),
            words: words.iter().map(|w| Word::literal(*w)).collect(),
        }
    }

    fn boxed(i: Instruction) -> Box<Instruction> {
        Box::new(i)
    }

    #[test]
    fn simple_command() {
        assert_eq!(p("echo hello"), cmd(&["echo", "hello"]));
        assert_eq!(p("  echo   hello  "), cmd(&["echo", "hello"]));
    }

    #[test]
    fn empty_input() {
        assert_eq!(p(""), Instruction::Empty);
        assert_eq!(p("# only a comment\n\n"), Instruction::Empty);
    }

    #[test]
    fn lists_are_right_nested() {
        assert_eq!(
            p("a; b & c"),
            Instruction::Sequential(
                boxed(cmd(&["a"])),
                boxed(Instruction::Parallel(boxed(cmd(&["b"])), boxed(cmd(&["c"]))))
            )
        );
        assert_eq!(
            p("a\nb\n"),
            Instruction::Sequential(boxed(cmd(&["a"])), boxed(cmd(&["b"])))
        );
        assert_eq!(p("a;"), cmd(&["a"]));
    }

    #[test]
    fn pipes_are_left_nested() {
        assert_eq!(
            p("a | b | c"),
            Instruction::Pipe(
                boxed(Instruction::Pipe(boxed(cmd(&["a"])), boxed(cmd(&["b"])))),
                boxed(cmd(&["c"]))
            )
        );
    }

    #[test]
    fn logic_binds_tighter_than_lists() {
        assert_eq!(
            p("a && b || c; d"),
            Instruction::Sequential(
                boxed(Instruction::Conditional {
                    logic: Logic::Or,
                    left: boxed(Instruction::Conditional {
                        logic: Logic::And,
                        left: boxed(cmd(&["a"])),
                        right: boxed(cmd(&["b"])),
                    }),
                    right: boxed(cmd(&["c"])),
                }),
                boxed(cmd(&["d"]))
            )
        );
    }

    #[test]
    fn redirects_wrap_the_command() {
        assert_eq!(
            p("echo hi > out >> log"),
            Instruction::Redirect {
                inner: boxed(Instruction::Redirect {
                    inner: boxed(cmd(&["echo", "hi"])),
                    target: Word::literal("log"),
                    mode: RedirectMode::Append,
                }),
                target: Word::literal("out"),
                mode: RedirectMode::Overwrite,
            }
        );
        assert_eq!(
            p("cat<in"),
            Instruction::Redirect {
                inner: boxed(cmd(&["cat"])),
                target: Word::literal("in"),
                mode: RedirectMode::Input,
            }
        );
    }

    #[test]
    fn function_declaration() {
        let Instruction::FunctionDeclaration { name, body } = p("greet() { echo $1; }") else {
            panic!("expected a function");
        };
        assert_eq!(name, "greet");
        assert_eq!(
            *body,
            Instruction::Command {
                assignments: Vec::new(),
                words: vec![
                    Word::literal("echo"),
                    Word {
                        parts: vec![WordPart::Variable("1".into())],
                        quoted: false,
                    }
                ],
            }
        );
        assert!(matches!(
            p("f () {\n  a\n  b\n}"),
            Instruction::FunctionDeclaration { .. }
        ));
    }

    #[test]
    fn brace_group_without_semicolon() {
        assert_eq!(p("{ echo a }"), cmd(&["echo", "a"]));
        assert_eq!(p("echo }"), cmd(&["echo", "}"]));
    }

    #[test]
    fn subshell_is_scoped() {
        assert_eq!(
            p("( a ) > out"),
            Instruction::Redirect {
                inner: boxed(Instruction::Scoped(boxed(cmd(&["a"])))),
                target: Word::literal("out"),
                mode: RedirectMode::Overwrite,
            }
        );
    }

    #[test]
    fn prefix_assignments() {
        let Instruction::Command { assignments, words } = p("X=1 Y=$Z EMPTY= cmd a=b") else {
            panic!("expected a command");
        };
        assert_eq!(assignments.len(), 3);
        assert_eq!(assignments[0], ("X".to_string(), Word::literal("1")));
        assert_eq!(assignments[1].1.parts, vec![WordPart::Variable("Z".into())]);
        assert_eq!(assignments[2].1, Word::default());
        assert_eq!(words, vec![Word::literal("cmd"), Word::literal("a=b")]);
    }

    #[test]
    fn expansion_strings() {
        let Instruction::Command { words, .. } = p("echo \"a $b \\$c\" x\"y\"z ''") else {
            panic!("expected a command");
        };
        assert_eq!(
            words[1],
            Word {
                parts: vec![
                    WordPart::Literal("a ".into()),
                    WordPart::Variable("b".into()),
                    WordPart::Literal(" $c".into()),
                ],
                quoted: true,
            }
        );
        assert_eq!(
            words[2],
            Word {
                parts: vec![WordPart::Literal("xyz".into())],
                quoted: true,
            }
        );
        assert_eq!(words[3], Word { parts: Vec::new(), quoted: true });
    }

    #[test]
    fn test_brackets_are_words() {
        assert_eq!(p("[ -f x ]"), cmd(&["[", "-f", "x", "]"]));
        assert_eq!(p("[[ a == b ]]"), cmd(&["[[", "a", "==", "b", "]]"]));
    }

    #[test]
    fn local_context_wraps_in_scope() {
        let tree = parse_script("a", ParseOptions::default(), true).unwrap();
        assert_eq!(tree, Instruction::Scoped(boxed(cmd(&["a"]))));
    }

    #[test]
    fn syntax_errors() {
        let opts = ParseOptions::default();
        for text in ["| a", "a |", "{ echo", "echo >", "a )", "a ;;", "f() ", "'open"] {
            assert!(
                matches!(parse_script(text, opts, false), Err(VosError::Syntax(_))),
                "{text:?} should not parse"
            );
        }
    }

    #[test]
    fn error_names_the_token() {
        let err = parse_script("a && | b", ParseOptions::default(), false).unwrap_err();
        assert_eq!(err.to_string(), "syntax error: near unexpected token `|'");
    }
}
