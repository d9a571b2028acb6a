//! Diagnostics for C5 compilation.
//!
//! Every user-facing failure from the lexer, parser, or semantic analyser is
//! a [`Diagnostic`]: a stable code (`spec.md` §6), a severity, a source
//! location, and a single-line message. Diagnostics are batched per
//! compilation unit and printed in source order; codegen only runs once a
//! unit has accumulated zero `Severity::Error` diagnostics.
//!
//! Infrastructure failures (file not found, subprocess failure) are not
//! diagnostics - they short-circuit immediately as `Result<_, String>` and
//! map to exit code 2, never 1.

use crate::ast::SourceLocation;
use std::fmt;

/// Severity of a diagnostic. Only `Error` blocks codegen and contributes to
/// exit code 1; `Warning` is cosmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A single diagnostic: stable code, severity, location, message.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: &'static str,
    pub severity: Severity,
    pub location: SourceLocation,
    pub message: String,
}

impl Diagnostic {
    pub fn error(code: &'static str, location: SourceLocation, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            severity: Severity::Error,
            location,
            message: message.into(),
        }
    }

    pub fn warning(code: &'static str, location: SourceLocation, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            severity: Severity::Warning,
            location,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}: [{}] {}",
            self.location, self.severity, self.code, self.message
        )
    }
}

/// Accumulates diagnostics for one compilation unit in source order.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        DiagnosticBag::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Sort diagnostics into source order (file, then line, then column).
    /// Parsing and sema append diagnostics roughly in order already; this
    /// makes the guarantee explicit for callers that merge multiple passes.
    pub fn sort_in_source_order(&mut self) {
        self.diagnostics.sort_by(|a, b| {
            (&a.location.file, a.location.line, a.location.column).cmp(&(
                &b.location.file,
                b.location.line,
                b.location.column,
            ))
        });
    }
}

impl IntoIterator for DiagnosticBag {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn loc(line: usize, column: usize) -> SourceLocation {
        SourceLocation {
            file: PathBuf::from("t.c5"),
            line,
            column,
            offset: 0,
            len: 1,
        }
    }

    #[test]
    fn bag_reports_errors_only_from_error_severity() {
        let mut bag = DiagnosticBag::new();
        bag.push(Diagnostic::warning("W006", loc(1, 1), "narrowing"));
        assert!(!bag.has_errors());
        bag.push(Diagnostic::error("E023", loc(2, 1), "out of range"));
        assert!(bag.has_errors());
    }

    #[test]
    fn sort_in_source_order_orders_by_line_then_column() {
        let mut bag = DiagnosticBag::new();
        bag.push(Diagnostic::error("E002", loc(5, 1), "second"));
        bag.push(Diagnostic::error("E002", loc(1, 3), "first"));
        bag.sort_in_source_order();
        let msgs: Vec<_> = bag.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(msgs, vec!["first", "second"]);
    }
}
