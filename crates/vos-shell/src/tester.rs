//! The `test`, `[`, and `[[` built-ins.

use vos_kernel::FileSystem;
use vos_types::console::TextConsole;
use vos_types::path;

use crate::context::ScriptContext;

/// Evaluate a test expression and return its exit status: 0 true, 1 false,
/// 2 for a malformed expression (after writing a diagnostic).
pub fn evaluate(
    ctx: &dyn ScriptContext,
    console: &dyn TextConsole,
    command: &str,
    args: &[String],
) -> i32 {
    let closing = match command {
        "[" => Some("]"),
        "[[" => Some("]]"),
        _ => None,
    };
    let args = match closing {
        None => args,
        Some(close) => match args.split_last() {
            Some((last, rest)) if last == close => rest,
            _ => {
                console.write_line(&format!("sh: {command}: missing `{close}'"));
                return 2;
            },
        },
    };
    match expression(ctx, args) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(message) => {
            console.write_line(&format!("sh: {command}: {message}"));
            2
        },
    }
}

fn is_binary(op: &str) -> bool {
    matches!(
        op,
        "=" | "==" | "!=" | "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge"
    )
}

fn expression(ctx: &dyn ScriptContext, args: &[String]) -> Result<bool, String> {
    match args {
        [] => Ok(false),
        [single] => Ok(!single.is_empty()),
        [bang, operand] if bang == "!" => Ok(operand.is_empty()),
        [op, operand] => unary(ctx, op, operand),
        [lhs, op, rhs] if is_binary(op) => binary(lhs, op, rhs),
        [bang, rest @ ..] if bang == "!" => expression(ctx, rest).map(|b| !b),
        [_, op, _] => Err(format!("{op}: binary operator expected")),
        _ => Err("too many arguments".into()),
    }
}

fn unary(ctx: &dyn ScriptContext, op: &str, operand: &str) -> Result<bool, String> {
    let file_test = |check: fn(&dyn FileSystem, &str) -> bool| {
        let target =
            path::make_absolute(&ctx.working_directory(), operand, &ctx.home_directory());
        ctx.file_system()
            .is_some_and(|fs| check(&fs, &target))
    };
    match op {
        "-n" => Ok(!operand.is_empty()),
        "-z" => Ok(operand.is_empty()),
        "-e" => Ok(file_test(|fs, p| fs.file_exists(p) || fs.directory_exists(p))),
        "-f" => Ok(file_test(|fs, p| fs.file_exists(p))),
        "-d" => Ok(file_test(|fs, p| fs.directory_exists(p))),
        _ => Err(format!("{op}: unary operator expected")),
    }
}

fn integer(text: &str) -> Result<i64, String> {
    text.trim()
        .parse()
        .map_err(|_| format!("{text}: integer expression expected"))
}

fn binary(lhs: &str, op: &str, rhs: &str) -> Result<bool, String> {
    Ok(match op {
        "=" | "==" => lhs == rhs,
        "!=" => lhs != rhs,
        _ => {
            let (a, b) = (integer(lhs)?, integer(rhs)?);
            match op {
                "-eq" => a == b,
                "-ne" => a != b,
                "-lt" => a < b,
                "-le" => a <= b,
                "-gt" => a > b,
                _ => a >= b,
            }
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StandaloneContext;
    use vos_types::console::BufferConsole;

    fn run(command: &str, args: &[&str]) -> (i32, String) {
        let ctx = StandaloneContext::new();
        let console = BufferConsole::new();
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let code = evaluate(&ctx, &console, command, &args);
        (code, console.output())
    }

    #[test]
    fn strings() {
        assert_eq!(run("test", &["a", "=", "a"]).0, 0);
        assert_eq!(run("test", &["a", "==", "b"]).0, 1);
        assert_eq!(run("test", &["a", "!=", "b"]).0, 0);
        assert_eq!(run("test", &["-n", ""]).0, 1);
        assert_eq!(run("test", &["-z", ""]).0, 0);
        assert_eq!(run("test", &["word"]).0, 0);
        assert_eq!(run("test", &[""]).0, 1);
        assert_eq!(run("test", &[]).0, 1);
    }

    #[test]
    fn integers() {
        assert_eq!(run("test", &["3", "-lt", "10"]).0, 0);
        assert_eq!(run("test", &["3", "-ge", "10"]).0, 1);
        assert_eq!(run("test", &["-2", "-eq", "-2"]).0, 0);
        let (code, out) = run("test", &["x", "-gt", "1"]);
        assert_eq!(code, 2);
        assert_eq!(out, "sh: test: x: integer expression expected\n");
    }

    #[test]
    fn negation() {
        assert_eq!(run("test", &["!", "a", "=", "a"]).0, 1);
        assert_eq!(run("test", &["!", ""]).0, 0);
        assert_eq!(run("test", &["!", "-z", "x"]).0, 0);
    }

    #[test]
    fn brackets_need_closing() {
        assert_eq!(run("[", &["a", "=", "a", "]"]).0, 0);
        assert_eq!(run("[[", &["a", "=", "b", "]]"]).0, 1);
        let (code, out) = run("[", &["a", "=", "a"]);
        assert_eq!(code, 2);
        assert_eq!(out, "sh: [: missing `]'\n");
        assert_eq!(run("[[", &["a", "]"]).0, 2);
    }

    #[test]
    fn malformed() {
        assert_eq!(run("test", &["-q", "x"]).0, 2);
        assert_eq!(run("test", &["a", "b", "c"]).0, 2);
        assert_eq!(run("test", &["a", "b", "c", "d"]).0, 2);
    }

    #[test]
    fn file_tests_without_file_system_are_false() {
        assert_eq!(run("test", &["-e", "/"]).0, 1);
        assert_eq!(run("test", &["-d", "/"]).0, 1);
    }
}
