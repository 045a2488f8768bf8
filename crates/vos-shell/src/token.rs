//! Shell token types.

/// Syntax-free classification of a span of shell text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellTokenKind {
    /// Literal text: unquoted words, single-quoted strings, escaped chars.
    Text,
    Whitespace,
    Newline,
    /// `|`
    Pipe,
    /// `>`
    Overwrite,
    /// `>>`
    Append,
    /// `<`
    FileInput,
    /// `&`
    Parallel,
    /// `;`
    Sequential,
    /// `&&`
    LogicalAnd,
    /// `||`
    LogicalOr,
    /// `$name`, `${name}`, `$?`, `$1`; the text is the variable name.
    VariableAccess,
    /// `=`
    Assignment,
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    /// Contents of a double-quoted string, still subject to `$` expansion.
    ExpansionString,
}

/// A classified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellToken {
    pub kind: ShellTokenKind,
    pub text: String,
    /// Character offset in the comment-stripped input.
    pub position: usize,
}

impl ShellToken {
    pub fn new(kind: ShellTokenKind, text: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }

    pub fn is(&self, kind: ShellTokenKind) -> bool {
        self.kind == kind
    }

    /// Tokens that contribute to a word when adjacent to each other.
    pub fn is_word_part(&self) -> bool {
        matches!(
            self.kind,
            ShellTokenKind::Text
                | ShellTokenKind::VariableAccess
                | ShellTokenKind::ExpansionString
                | ShellTokenKind::Assignment
                | ShellTokenKind::OpenBracket
                | ShellTokenKind::CloseBracket
                | ShellTokenKind::OpenBrace
                | ShellTokenKind::CloseBrace
        )
    }
}
