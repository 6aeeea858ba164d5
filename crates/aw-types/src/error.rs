//! Structured error kinds and the canonical diagnostic rendering.
//!
//! Every error the compiler or audit engine can raise is one variant of
//! [`AwError`], carrying an optional [`Location`] so the CLI/MCP shells can
//! print `<file>:<line>:<col>: <severity>: <kind>: <message>` without each
//! call site hand-rolling that format.

use std::fmt;
use std::path::PathBuf;

/// A position within a source file. `line`/`column` are 1-indexed and
/// `None` when the error applies to the whole file (e.g. a missing file).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub file: PathBuf,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl Location {
    pub fn file(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            line: None,
            column: None,
        }
    }

    pub fn at(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line: Some(line),
            column: Some(column),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file.display())?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
            if let Some(col) = self.column {
                write!(f, ":{col}")?;
            }
        }
        Ok(())
    }
}

/// Severity of a diagnostic, used both for display and for computing the
/// process exit code of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// The eight structured error kinds named in the specification, modeled as
/// one tagged enum per the "polymorphism by variant" design note rather
/// than a class hierarchy.
#[derive(Debug, thiserror::Error)]
pub enum AwError {
    #[error("{location}: malformed source: {message}")]
    Parse {
        location: Location,
        message: String,
    },

    #[error("{location}: import error: {message}")]
    Resolve {
        location: Location,
        message: String,
    },

    #[error("{location}: {message}")]
    Validation {
        location: Location,
        message: String,
    },

    #[error("action pin error for {reference}: {message}")]
    Pin { reference: String, message: String },

    #[error("failed to write lock file {path}: {message}")]
    Emit { path: PathBuf, message: String },

    #[error("artifact error: {message}")]
    Artifact { message: String },

    #[error("external dependency error: {message}")]
    External { message: String },

    #[error("tool gateway error for {server}: {message}")]
    Tool { server: String, message: String },
}

impl AwError {
    /// Stable kind tag, independent of the rendered message, for callers
    /// that need to match on error category (CLI exit-code mapping, MCP
    /// structured responses).
    pub fn kind(&self) -> &'static str {
        match self {
            AwError::Parse { .. } => "ParseError",
            AwError::Resolve { .. } => "ResolveError",
            AwError::Validation { .. } => "ValidationError",
            AwError::Pin { .. } => "PinError",
            AwError::Emit { .. } => "EmitError",
            AwError::Artifact { .. } => "ArtifactError",
            AwError::External { .. } => "ExternalError",
            AwError::Tool { .. } => "ToolError",
        }
    }

    /// Location, when this error kind carries one.
    pub fn location(&self) -> Option<&Location> {
        match self {
            AwError::Parse { location, .. }
            | AwError::Resolve { location, .. }
            | AwError::Validation { location, .. } => Some(location),
            _ => None,
        }
    }
}

/// A single user-facing diagnostic: an error/warning/info with its own
/// location, independent of whether it halted compilation. The exit-code
/// mapping and batch summary line are both derived from a
/// `Vec<Diagnostic>`.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub location: Location,
    pub severity: Severity,
    pub kind: &'static str,
    pub message: String,
}

impl Diagnostic {
    pub fn error(location: Location, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            location,
            severity: Severity::Error,
            kind,
            message: message.into(),
        }
    }

    pub fn warning(location: Location, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            location,
            severity: Severity::Warning,
            kind,
            message: message.into(),
        }
    }

    pub fn info(location: Location, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            location,
            severity: Severity::Info,
            kind,
            message: message.into(),
        }
    }

    pub fn from_error(err: &AwError, fallback_file: &std::path::Path) -> Self {
        let location = err
            .location()
            .cloned()
            .unwrap_or_else(|| Location::file(fallback_file));
        Self {
            location,
            severity: Severity::Error,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}: {}: {}",
            self.location, self.severity, self.kind, self.message
        )
    }
}

/// Process exit code, computed from the worst severity seen in a batch.
/// `3` (external-dependency error) is reserved for [`AwError::External`]
/// and [`AwError::Tool`] regardless of ordering against other errors,
/// since those indicate the compiler itself could not proceed rather than
/// a problem with the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    UserError = 1,
    ValidationError = 2,
    ExternalError = 3,
}

impl ExitCode {
    pub fn from_diagnostics(diags: &[Diagnostic]) -> Self {
        let mut worst = ExitCode::Success;
        for d in diags {
            if d.severity != Severity::Error {
                continue;
            }
            let candidate = match d.kind {
                "ExternalError" | "ToolError" => ExitCode::ExternalError,
                "ValidationError" | "PinError" => ExitCode::ValidationError,
                _ => ExitCode::UserError,
            };
            if candidate as u8 > worst as u8 {
                worst = candidate;
            }
        }
        worst
    }
}
