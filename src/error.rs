//! Structured error model (component A, spec §3 "Value & Error model").
//!
//! Every error carries the raising site (file/line/function) and a
//! message, and is wrapped with context as it propagates (spec §7).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ParseError,
    InvalidArgument,
    InvalidState,
    Timeout,
    IoError,
    ProcessError,
    HashMismatch,
    TypeMismatch,
    UnknownName,
    ProtocolError,
    UserError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ParseError => "ParseError",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::InvalidState => "InvalidState",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::IoError => "IOError",
            ErrorKind::ProcessError => "ProcessError",
            ErrorKind::HashMismatch => "HashMismatch",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::UnknownName => "UnknownName",
            ErrorKind::ProtocolError => "ProtocolError",
            ErrorKind::UserError => "UserError",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub file: &'static str,
    pub line: u32,
    pub function: &'static str,
    /// Chain of context added by statements as the error propagates upward.
    pub context: Vec<String>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({}:{} in {})", self.kind, self.message, self.file, self.line, self.function)?;
        for ctx in &self.context {
            write!(f, "\n  while {}", ctx)?;
        }
        Ok(())
    }
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>, file: &'static str, line: u32, function: &'static str) -> Self {
        Error { kind, message: message.into(), file, line, function, context: Vec::new() }
    }

    /// Wraps the error with a description of the statement that observed it,
    /// per spec §7 "statements wrap errors with their own ToString() before
    /// propagating".
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }
}

/// Captures the call site automatically, mirroring the teacher's
/// `ControlFlowError`-style "errors carry their own provenance" idiom.
#[macro_export]
macro_rules! rerr {
    ($kind:expr, $($arg:tt)*) => {
        $crate::error::Error::new($kind, format!($($arg)*), file!(), line!(), module_path!())
    };
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        rerr!(ErrorKind::IoError, "{}", e)
    }
}

impl From<std::num::ParseFloatError> for Error {
    fn from(e: std::num::ParseFloatError) -> Self {
        rerr!(ErrorKind::InvalidArgument, "{}", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_site() {
        let e = rerr!(ErrorKind::Timeout, "waited {}s", 5);
        let s = e.to_string();
        assert!(s.starts_with("Timeout: waited 5s"));
    }

    #[test]
    fn context_chain_is_appended() {
        let e = rerr!(ErrorKind::UnknownName, "x").with_context("evaluating check x == 1");
        assert!(e.to_string().contains("while evaluating check"));
    }
}
