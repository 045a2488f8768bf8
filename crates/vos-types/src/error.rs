//! Error types for VOS.

use std::io;

/// Errors produced by the VOS crates.
///
/// `ScriptEnd` is not a fault: it is the unwinding signal raised by `exit`
/// and `return`, and it is intercepted at function, script, and process
/// boundaries.
#[derive(Debug, thiserror::Error)]
pub enum VosError {
    #[error("config error: {0}")]
    Config(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}: No such file or directory")]
    NotFound(String),

    #[error("{0}: Read-only file system")]
    ReadOnly(String),

    #[error("{0}: Not a directory")]
    NotADirectory(String),

    #[error("{0}: Is a directory")]
    IsADirectory(String),

    #[error("{0}: Directory not empty")]
    DirectoryNotEmpty(String),

    #[error("{0}: File exists")]
    AlreadyExists(String),

    #[error("{0}: Device or resource busy")]
    Busy(String),

    #[error("{0}: Permission denied")]
    PermissionDenied(String),

    #[error("{0}: Not executable")]
    NotExecutable(String),

    #[error("process {0} is not alive")]
    ProcessDead(u32),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("{0}")]
    Command(String),

    #[error("script ended with exit code {exit_code}")]
    ScriptEnd { exit_code: i32, local_scope: bool },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl VosError {
    /// The signal raised by `exit`: unwinds to the owning process.
    pub fn exit(exit_code: i32) -> Self {
        Self::ScriptEnd {
            exit_code,
            local_scope: false,
        }
    }

    /// The signal raised by `return`: unwinds to the enclosing function or
    /// sourced script only.
    pub fn return_from(exit_code: i32) -> Self {
        Self::ScriptEnd {
            exit_code,
            local_scope: true,
        }
    }

    /// Rewrite the path carried by a file-system error. Other errors pass
    /// through unchanged.
    pub fn map_path(self, f: impl FnOnce(&str) -> String) -> Self {
        match self {
            Self::NotFound(p) => Self::NotFound(f(&p)),
            Self::ReadOnly(p) => Self::ReadOnly(f(&p)),
            Self::NotADirectory(p) => Self::NotADirectory(f(&p)),
            Self::IsADirectory(p) => Self::IsADirectory(f(&p)),
            Self::DirectoryNotEmpty(p) => Self::DirectoryNotEmpty(f(&p)),
            Self::AlreadyExists(p) => Self::AlreadyExists(f(&p)),
            Self::Busy(p) => Self::Busy(f(&p)),
            Self::PermissionDenied(p) => Self::PermissionDenied(f(&p)),
            Self::NotExecutable(p) => Self::NotExecutable(f(&p)),
            other => other,
        }
    }

    /// Convert into an `io::Error` for use behind `std::io` traits.
    pub fn into_io(self) -> io::Error {
        match self {
            Self::Io(e) => e,
            Self::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, self.to_string()),
            Self::PermissionDenied(_) | Self::ReadOnly(_) => {
                io::Error::new(io::ErrorKind::PermissionDenied, self.to_string())
            },
            other => io::Error::other(other.to_string()),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, VosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let e = VosError::Config("missing root user".into());
        assert_eq!(format!("{e}"), "config error: missing root user");
    }

    #[test]
    fn not_found_display_reads_like_posix() {
        let e = VosError::NotFound("/etc/motd".into());
        assert_eq!(format!("{e}"), "/etc/motd: No such file or directory");
    }

    #[test]
    fn read_only_display() {
        let e = VosError::ReadOnly("/".into());
        assert_eq!(format!("{e}"), "/: Read-only file system");
    }

    #[test]
    fn exit_and_return_carry_scope() {
        assert!(matches!(
            VosError::exit(7),
            VosError::ScriptEnd {
                exit_code: 7,
                local_scope: false
            }
        ));
        assert!(matches!(
            VosError::return_from(3),
            VosError::ScriptEnd {
                exit_code: 3,
                local_scope: true
            }
        ));
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let e: VosError = io_err.into();
        let msg = format!("{e}");
        assert!(msg.contains("I/O error"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn toml_error_from_conversion() {
        let toml_err = toml::from_str::<toml::Value>("this is [[[not valid toml").unwrap_err();
        let e: VosError = toml_err.into();
        assert!(format!("{e}").contains("TOML parse error"));
    }

    #[test]
    fn map_path_rewrites_fs_errors_only() {
        let e = VosError::NotFound("/foo".into()).map_path(|p| format!("/etc{p}"));
        assert_eq!(format!("{e}"), "/etc/foo: No such file or directory");
        let e = VosError::Syntax("x".into()).map_path(|p| format!("/etc{p}"));
        assert!(matches!(e, VosError::Syntax(_)));
    }

    #[test]
    fn into_io_keeps_kind() {
        let e = VosError::NotFound("/x".into()).into_io();
        assert_eq!(e.kind(), io::ErrorKind::NotFound);
        let e = VosError::ReadOnly("/x".into()).into_io();
        assert_eq!(e.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn result_alias_err() {
        let r: Result<i32> = Err(VosError::Syntax("oops".into()));
        assert!(r.is_err());
    }
}
