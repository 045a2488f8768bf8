//! Shell tokenizer.
//!
//! Input is comment-stripped, then tokenized in two passes. Pass one
//! ([`resolve_quoting`]) only resolves quotes and escapes, and reports
//! [`Scan::Incomplete`] when one is left open so the caller can read another
//! line. Pass two ([`identify_tokens`]) classifies the unquoted text into
//! shell punctuation, variables, whitespace, and literals without knowing
//! the grammar.

use crate::cursor::SliceCursor;
use crate::token::{ShellToken, ShellTokenKind};

/// Result of scanning text that may end mid-construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan<T> {
    Complete(T),
    /// A quote or escape is still open.
    Incomplete,
}

impl<T> Scan<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Scan<U> {
        match self {
            Self::Complete(v) => Scan::Complete(f(v)),
            Self::Incomplete => Scan::Incomplete,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// Which punctuation the classifier recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Double-quoted strings become [`ShellTokenKind::ExpansionString`].
    pub expansion_strings: bool,
    /// `>`, `>>`, and `<` are operators.
    pub redirection: bool,
    /// `|` is an operator.
    pub pipes: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            expansion_strings: true,
            redirection: true,
            pipes: true,
        }
    }
}

/// How a segment of input was quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    None,
    /// A single backslash-escaped character.
    Escaped,
    Single,
    /// Double-quoted; backslash escapes are kept for expansion.
    Double,
}

/// A run of input with uniform quoting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub quoting: Quoting,
    pub text: String,
    pub position: usize,
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

fn starts_word(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, ';' | '&' | '|' | '(' | ')'),
    }
}

/// Remove `#` comments line by line and drop blank lines.
///
/// A `#` only starts a comment at the beginning of a word and outside
/// quotes. Lines inside an open quote are kept verbatim.
pub fn strip_comments(text: &str) -> String {
    let mut lines = Vec::new();
    let mut quote: Option<char> = None;
    for line in text.lines() {
        let quoted_at_start = quote.is_some();
        let mut kept = String::with_capacity(line.len());
        let mut prev: Option<char> = None;
        let mut escaped = false;
        for ch in line.chars() {
            if escaped {
                escaped = false;
            } else {
                match quote {
                    Some(q) if ch == q => quote = None,
                    Some('"') if ch == '\\' => escaped = true,
                    Some(_) => {},
                    None => match ch {
                        '\'' | '"' => quote = Some(ch),
                        '\\' => escaped = true,
                        '#' if starts_word(prev) => break,
                        _ => {},
                    },
                }
            }
            kept.push(ch);
            prev = Some(ch);
        }
        if quoted_at_start || quote.is_some() {
            lines.push(kept);
        } else {
            let trimmed = kept.trim_end();
            if !trimmed.trim_start().is_empty() {
                lines.push(trimmed.to_string());
            }
        }
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Pass one: quoting
// ---------------------------------------------------------------------------

/// Split input into quoted and unquoted segments.
///
/// Backslash-newline is a line continuation and disappears.
pub fn resolve_quoting(text: &str) -> Scan<Vec<Segment>> {
    let chars: Vec<char> = text.chars().collect();
    let mut cursor = SliceCursor::new(&chars);
    let mut segments = Vec::new();
    let mut plain = String::new();
    let mut plain_start = 0;

    fn flush(segments: &mut Vec<Segment>, plain: &mut String, start: usize) {
        if !plain.is_empty() {
            segments.push(Segment {
                quoting: Quoting::None,
                text: std::mem::take(plain),
                position: start,
            });
        }
    }

    while let Some(&ch) = cursor.current() {
        let pos = cursor.index();
        match ch {
            '\\' => {
                flush(&mut segments, &mut plain, plain_start);
                cursor.take();
                match cursor.take() {
                    None => return Scan::Incomplete,
                    Some('\n') => {},
                    Some(&next) => segments.push(Segment {
                        quoting: Quoting::Escaped,
                        text: next.to_string(),
                        position: pos,
                    }),
                }
            },
            '\'' | '"' => {
                flush(&mut segments, &mut plain, plain_start);
                cursor.take();
                let mut body = String::new();
                loop {
                    match cursor.take() {
                        None => return Scan::Incomplete,
                        Some(&c) if c == ch => break,
                        Some('\\') if ch == '"' => match cursor.take() {
                            None => return Scan::Incomplete,
                            Some(&escaped) => {
                                body.push('\\');
                                body.push(escaped);
                            },
                        },
                        Some(&c) => body.push(c),
                    }
                }
                segments.push(Segment {
                    quoting: if ch == '\'' {
                        Quoting::Single
                    } else {
                        Quoting::Double
                    },
                    text: body,
                    position: pos,
                });
            },
            _ => {
                if plain.is_empty() {
                    plain_start = pos;
                }
                plain.push(ch);
                cursor.take();
            },
        }
    }
    flush(&mut segments, &mut plain, plain_start);
    Scan::Complete(segments)
}

// ---------------------------------------------------------------------------
// Pass two: classification
// ---------------------------------------------------------------------------

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Length and name of a variable reference starting at a `$`, if any.
pub(crate) fn variable_at(chars: &[char]) -> Option<(usize, String)> {
    match chars.get(1).copied() {
        Some('{') => {
            let close = chars.iter().position(|&c| c == '}')?;
            let name: String = chars[2..close].iter().collect();
            if name.is_empty() {
                return None;
            }
            Some((close + 1, name))
        },
        Some(c) if is_name_start(c) => {
            let len = chars[1..].iter().take_while(|&&c| is_name_char(c)).count();
            Some((len + 1, chars[1..=len].iter().collect()))
        },
        Some(c) if c.is_ascii_digit() || matches!(c, '?' | '#' | '@' | '$' | '!') => {
            Some((2, c.to_string()))
        },
        _ => None,
    }
}

fn classify_plain(text: &str, base: usize, options: ParseOptions, out: &mut Vec<ShellToken>) {
    use ShellTokenKind as K;

    let chars: Vec<char> = text.chars().collect();
    let mut cursor = SliceCursor::new(&chars);
    let mut word = String::new();
    let mut word_start = 0;

    while let Some(&ch) = cursor.current() {
        let index = cursor.index();
        let next = cursor.peek_next().copied();
        let op = match (ch, next) {
            (' ' | '\t' | '\r', _) => {
                let len = cursor
                    .rest()
                    .iter()
                    .take_while(|c| matches!(c, ' ' | '\t' | '\r'))
                    .count();
                Some((K::Whitespace, len, None))
            },
            ('\n', _) => Some((K::Newline, 1, None)),
            ('|', Some('|')) => Some((K::LogicalOr, 2, None)),
            ('|', _) if options.pipes => Some((K::Pipe, 1, None)),
            ('&', Some('&')) => Some((K::LogicalAnd, 2, None)),
            ('&', _) => Some((K::Parallel, 1, None)),
            (';', _) => Some((K::Sequential, 1, None)),
            ('>', Some('>')) if options.redirection => Some((K::Append, 2, None)),
            ('>', _) if options.redirection => Some((K::Overwrite, 1, None)),
            ('<', _) if options.redirection => Some((K::FileInput, 1, None)),
            ('(', _) => Some((K::OpenParen, 1, None)),
            (')', _) => Some((K::CloseParen, 1, None)),
            ('{', _) => Some((K::OpenBrace, 1, None)),
            ('}', _) => Some((K::CloseBrace, 1, None)),
            ('[', _) => Some((K::OpenBracket, 1, None)),
            (']', _) => Some((K::CloseBracket, 1, None)),
            ('=', _) => Some((K::Assignment, 1, None)),
            ('$', _) => variable_at(cursor.rest())
                .map(|(len, name)| (K::VariableAccess, len, Some(name))),
            _ => None,
        };

        let Some((kind, len, name)) = op else {
            if word.is_empty() {
                word_start = index;
            }
            word.push(ch);
            cursor.take();
            continue;
        };

        if !word.is_empty() {
            out.push(ShellToken::new(K::Text, std::mem::take(&mut word), base + word_start));
        }
        let text = name.unwrap_or_else(|| chars[index..index + len].iter().collect());
        out.push(ShellToken::new(kind, text, base + index));
        for _ in 0..len {
            cursor.take();
        }
    }
    if !word.is_empty() {
        out.push(ShellToken::new(K::Text, word, base + word_start));
    }
}

/// Classify quoted segments into typed tokens.
pub fn identify_tokens(segments: &[Segment], options: ParseOptions) -> Vec<ShellToken> {
    let mut tokens = Vec::new();
    for seg in segments {
        match seg.quoting {
            Quoting::None => classify_plain(&seg.text, seg.position, options, &mut tokens),
            Quoting::Double if options.expansion_strings => tokens.push(ShellToken::new(
                ShellTokenKind::ExpansionString,
                seg.text.clone(),
                seg.position,
            )),
            Quoting::Escaped | Quoting::Single | Quoting::Double => tokens.push(
                ShellToken::new(ShellTokenKind::Text, seg.text.clone(), seg.position),
            ),
        }
    }
    tokens
}

/// Both passes over already comment-stripped text.
pub fn tokenize(text: &str, options: ParseOptions) -> Scan<Vec<ShellToken>> {
    resolve_quoting(text).map(|segments| identify_tokens(&segments, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ShellTokenKind as K;

    fn kinds(text: &str) -> Vec<K> {
        match tokenize(text, ParseOptions::default()) {
            Scan::Complete(tokens) => tokens.into_iter().map(|t| t.kind).collect(),
            Scan::Incomplete => panic!("incomplete: {text}"),
        }
    }

    fn texts(text: &str) -> Vec<String> {
        match tokenize(text, ParseOptions::default()) {
            Scan::Complete(tokens) => tokens.into_iter().map(|t| t.text).collect(),
            Scan::Incomplete => panic!("incomplete: {text}"),
        }
    }

    #[test]
    fn strip_trailing_comment() {
        assert_eq!(strip_comments("echo hi # greet"), "echo hi");
    }

    #[test]
    fn strip_drops_comment_and_blank_lines() {
        assert_eq!(strip_comments("# header\n\n   \necho a\n"), "echo a");
    }

    #[test]
    fn hash_inside_word_or_quotes_is_kept() {
        assert_eq!(strip_comments("echo a#b"), "echo a#b");
        assert_eq!(strip_comments("echo '# not a comment'"), "echo '# not a comment'");
        assert_eq!(strip_comments("echo $#"), "echo $#");
        assert_eq!(strip_comments("echo a;# c"), "echo a;");
    }

    #[test]
    fn multiline_quote_is_kept_verbatim() {
        assert_eq!(strip_comments("echo 'a\n\n# b'"), "echo 'a\n\n# b'");
    }

    #[test]
    fn open_quotes_are_incomplete() {
        assert_eq!(resolve_quoting("echo 'abc"), Scan::Incomplete);
        assert_eq!(resolve_quoting("echo \"abc"), Scan::Incomplete);
        assert_eq!(resolve_quoting("echo abc\\"), Scan::Incomplete);
        assert_eq!(resolve_quoting("echo \"a\\"), Scan::Incomplete);
    }

    #[test]
    fn completed_quote_resolves() {
        let Scan::Complete(segs) = resolve_quoting("echo 'a\nb'") else {
            panic!("expected complete");
        };
        assert_eq!(segs[1].quoting, Quoting::Single);
        assert_eq!(segs[1].text, "a\nb");
    }

    #[test]
    fn line_continuation_disappears() {
        assert_eq!(texts("echo a\\\nb"), vec!["echo", " ", "a", "b"]);
    }

    #[test]
    fn escaped_operator_is_text() {
        assert_eq!(kinds("echo \\|"), vec![K::Text, K::Whitespace, K::Text]);
        assert_eq!(texts("echo \\|")[2], "|");
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("a|b||c&&d&e;f"),
            vec![
                K::Text,
                K::Pipe,
                K::Text,
                K::LogicalOr,
                K::Text,
                K::LogicalAnd,
                K::Text,
                K::Parallel,
                K::Text,
                K::Sequential,
                K::Text
            ]
        );
    }

    #[test]
    fn redirections() {
        assert_eq!(
            kinds("a>b>>c<d"),
            vec![
                K::Text,
                K::Overwrite,
                K::Text,
                K::Append,
                K::Text,
                K::FileInput,
                K::Text
            ]
        );
    }

    #[test]
    fn brackets_and_newlines() {
        assert_eq!(
            kinds("f(){ [ x ] }\n"),
            vec![
                K::Text,
                K::OpenParen,
                K::CloseParen,
                K::OpenBrace,
                K::Whitespace,
                K::OpenBracket,
                K::Whitespace,
                K::Text,
                K::Whitespace,
                K::CloseBracket,
                K::Whitespace,
                K::CloseBrace,
                K::Newline
            ]
        );
    }

    #[test]
    fn variables() {
        let Scan::Complete(tokens) = tokenize("$HOME ${USER}x $? $1 $", ParseOptions::default())
        else {
            panic!("expected complete");
        };
        let vars: Vec<&str> = tokens
            .iter()
            .filter(|t| t.is(K::VariableAccess))
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(vars, vec!["HOME", "USER", "?", "1"]);
        assert_eq!(tokens.last().unwrap().text, "$");
        assert_eq!(tokens.last().unwrap().kind, K::Text);
    }

    #[test]
    fn quoting_kinds() {
        assert_eq!(
            kinds("'a $b' \"c $d\""),
            vec![K::Text, K::Whitespace, K::ExpansionString]
        );
        assert_eq!(texts("\"say \\\"hi\\\"\""), vec!["say \\\"hi\\\""]);
    }

    #[test]
    fn assignment_is_its_own_token() {
        assert_eq!(kinds("x=1"), vec![K::Text, K::Assignment, K::Text]);
    }

    #[test]
    fn options_disable_operators() {
        let opts = ParseOptions {
            expansion_strings: false,
            redirection: false,
            pipes: false,
        };
        let Scan::Complete(tokens) = tokenize("a|b>c \"$x\"", opts) else {
            panic!("expected complete");
        };
        assert!(tokens.iter().all(|t| matches!(t.kind, K::Text | K::Whitespace)));
    }

    #[test]
    fn positions_track_input() {
        let Scan::Complete(tokens) = tokenize("ab  'c'", ParseOptions::default()) else {
            panic!("expected complete");
        };
        let positions: Vec<usize> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 2, 4]);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn unbalanced_single_quote_is_incomplete(a in "[a-z |;&$]{0,20}", b in "[a-z |;&$\"]{0,20}") {
                let text = format!("{a}'{b}");
                prop_assert_eq!(resolve_quoting(&text), Scan::Incomplete);
            }

            #[test]
            fn trailing_backslash_is_incomplete(a in "[a-z ]{0,20}") {
                let text = format!("{a}\\");
                prop_assert_eq!(resolve_quoting(&text), Scan::Incomplete);
            }

            #[test]
            fn tokenize_never_panics(text in "\\PC{0,40}") {
                let _ = tokenize(&strip_comments(&text), ParseOptions::default());
            }

            #[test]
            fn plain_words_roundtrip(words in proptest::collection::vec("[a-z0-9]{1,8}", 1..6)) {
                let text = words.join(" ");
                let Scan::Complete(tokens) = tokenize(&text, ParseOptions::default()) else {
                    return Err(TestCaseError::fail("incomplete"));
                };
                let got: Vec<String> = tokens
                    .into_iter()
                    .filter(|t| t.is(K::Text))
                    .map(|t| t.text)
                    .collect();
                prop_assert_eq!(got, words);
            }
        }
    }
}
