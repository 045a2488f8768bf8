//! POSIX-style path helpers.
//!
//! Every VOS path is absolute and `/`-separated. Helpers here assume their
//! inputs came through [`normalize`] unless stated otherwise.

use std::borrow::Cow;

/// Check whether a path is already in normal form: leading `/`, no empty,
/// `.` or `..` components, no trailing `/` unless root.
fn is_normalized(path: &str) -> bool {
    if !path.starts_with('/') {
        return false;
    }
    if path == "/" {
        return true;
    }
    if path.ends_with('/') {
        return false;
    }
    path[1..]
        .split('/')
        .all(|seg| !seg.is_empty() && seg != "." && seg != "..")
}

/// Normalize a path: ensure leading `/`, collapse `//`, drop `.`, resolve
/// `..` (clamped at root), strip trailing `/`. Returns the input unchanged
/// when already in normal form.
pub fn normalize(path: &str) -> Cow<'_, str> {
    if is_normalized(path) {
        return Cow::Borrowed(path);
    }
    let mut stack: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {},
            ".." => {
                stack.pop();
            },
            s => stack.push(s),
        }
    }
    if stack.is_empty() {
        return Cow::Borrowed("/");
    }
    let mut result = String::with_capacity(path.len());
    for seg in stack {
        result.push('/');
        result.push_str(seg);
    }
    Cow::Owned(result)
}

/// Return the parent of a normalized path.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

/// Last component of a normalized path; empty for root.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Resolve `rel` against `base`. Absolute `rel` ignores `base`.
pub fn combine(base: &str, rel: &str) -> String {
    if rel.starts_with('/') {
        normalize(rel).into_owned()
    } else {
        normalize(&format!("{base}/{rel}")).into_owned()
    }
}

/// Resolve user input against a working directory, expanding a leading `~`
/// to `home`.
pub fn make_absolute(cwd: &str, input: &str, home: &str) -> String {
    if input == "~" {
        return normalize(home).into_owned();
    }
    if let Some(rest) = input.strip_prefix("~/") {
        return combine(home, rest);
    }
    combine(cwd, input)
}

/// Whether `path` equals `prefix` or lies below it, comparing whole
/// components.
pub fn is_within(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

/// The part of `path` below `prefix`, rooted at `/`.
pub fn strip_prefix(path: &str, prefix: &str) -> Option<String> {
    if !is_within(path, prefix) {
        return None;
    }
    if prefix == "/" {
        return Some(path.to_string());
    }
    let rest = &path[prefix.len()..];
    Some(if rest.is_empty() { "/".to_string() } else { rest.to_string() })
}

/// Place an absolute `inner` path under `prefix`. Inverse of [`strip_prefix`].
pub fn rebase(prefix: &str, inner: &str) -> String {
    match (prefix, inner) {
        ("/", _) => inner.to_string(),
        (_, "/") => prefix.to_string(),
        _ => format!("{prefix}{inner}"),
    }
}
