//! Diagnostic collection and reporting.
//!
//! Phases report location-annotated errors and warnings to a shared
//! [`Handler`]; the driver renders them at the end of the run in
//! `file:line:col: level: message` form. Reporting never unwinds: lexical
//! and conversion errors are local, and the session decides whether to keep
//! going based on [`Handler::has_errors`].
//!
//! The [`Fatal`] error type is reserved for conditions that abort a session
//! outright (I/O failure on a source file, resource exhaustion); queued
//! diagnostics are still rendered before the process exits.

use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use thiserror::Error;

use crate::span::Span;

/// Diagnostic severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    /// Prevents output from being written.
    Error,
    /// Reported, does not fail the session.
    Warning,
    /// Additional context attached by a phase.
    Note,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => f.write_str("error"),
            Level::Warning => f.write_str("warning"),
            Level::Note => f.write_str("note"),
        }
    }
}

/// A single reported diagnostic.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Severity.
    pub level: Level,
    /// Human-readable message.
    pub message: String,
    /// Where the problem was detected.
    pub span: Span,
}

impl Diagnostic {
    /// Create a diagnostic.
    pub fn new(level: Level, message: impl Into<String>, span: Span) -> Self {
        Self {
            level,
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for Diagnostic {
    /// The `file:line:col: level: message` form written to stderr.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.span, self.level, self.message)
    }
}

/// Collects diagnostics for one toolchain invocation.
///
/// Methods take `&self`; the handler is shared by reference between the
/// phases of a session.
///
/// # Examples
///
/// ```
/// use cinder_util::{Handler, Span};
///
/// let handler = Handler::new();
/// handler.error("unexpected token", Span::DUMMY);
/// assert!(handler.has_errors());
/// assert_eq!(handler.error_count(), 1);
/// ```
#[derive(Default)]
pub struct Handler {
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl Handler {
    /// Create an empty handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report an error.
    pub fn error(&self, message: impl Into<String>, span: Span) {
        self.emit(Diagnostic::new(Level::Error, message, span));
    }

    /// Report a warning.
    pub fn warning(&self, message: impl Into<String>, span: Span) {
        self.emit(Diagnostic::new(Level::Warning, message, span));
    }

    /// Report a note.
    pub fn note(&self, message: impl Into<String>, span: Span) {
        self.emit(Diagnostic::new(Level::Note, message, span));
    }

    /// Record a pre-built diagnostic.
    pub fn emit(&self, diagnostic: Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    /// True if any error-level diagnostic has been reported.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .borrow()
            .iter()
            .any(|d| d.level == Level::Error)
    }

    /// Number of error-level diagnostics.
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.level == Level::Error)
            .count()
    }

    /// Number of warning-level diagnostics.
    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .borrow()
            .iter()
            .filter(|d| d.level == Level::Warning)
            .count()
    }

    /// Snapshot of everything reported so far, in report order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.borrow().clone()
    }

    /// Render all diagnostics, one per line.
    pub fn render_to(&self, out: &mut dyn Write) -> io::Result<()> {
        for diagnostic in self.diagnostics.borrow().iter() {
            writeln!(out, "{diagnostic}")?;
        }
        Ok(())
    }
}

/// Conditions that abort a session after queued diagnostics are flushed.
#[derive(Debug, Error)]
pub enum Fatal {
    /// A source or include file could not be read.
    #[error("cannot read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The output file could not be written.
    #[error("cannot write `{path}`: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
