//! Diagnostics sink interface.
//!
//! The core never formats or prints a diagnostic message; it hands a
//! `(kind, source range, arguments)` triple to whatever the caller passed
//! in and moves on. There is no logging crate in play here because there's
//! nothing to log to — diagnostics are data, routed by the front end.

use std::fmt;

/// A half-open byte range into whatever source text produced an
/// expression or value, carried purely so a front end can underline it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Default)]
pub struct SourceRange {
    pub start: u32,
    pub end: u32,
}

impl SourceRange {
    pub fn new(start: u32, end: u32) -> Self {
        SourceRange { start, end }
    }

    /// A range carrying no location information, used for diagnostics
    /// raised deep inside arithmetic where no source range is threaded
    /// through (e.g. a folded constant sub-expression).
    pub fn unknown() -> Self {
        SourceRange::default()
    }
}

/// The fixed set of diagnostic kinds the core can raise.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DiagnosticKind {
    ErrDivideByZero,
    ErrFloatInvalidOp,
    WarnFloatOverflow,
    WarnFloatUnderflow,
    WarnFloatInexact,
    ErrTooComplexExpression,
    WarnValueOverflow,
    WarnValueDoesNotFit,
    WarnMisalignedValue,
}

impl DiagnosticKind {
    /// True for kinds that should mark the enclosing statement as failed
    /// rather than merely being surfaced to the user.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            DiagnosticKind::ErrDivideByZero
                | DiagnosticKind::ErrFloatInvalidOp
                | DiagnosticKind::ErrTooComplexExpression
        )
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            DiagnosticKind::ErrDivideByZero => "divide by zero",
            DiagnosticKind::ErrFloatInvalidOp => "invalid floating point operation",
            DiagnosticKind::WarnFloatOverflow => "floating point overflow",
            DiagnosticKind::WarnFloatUnderflow => "floating point underflow",
            DiagnosticKind::WarnFloatInexact => "floating point value inexact",
            DiagnosticKind::ErrTooComplexExpression => "expression too complex",
            DiagnosticKind::WarnValueOverflow => "value does not fit in field",
            DiagnosticKind::WarnValueDoesNotFit => "value magnitude exceeds field",
            DiagnosticKind::WarnMisalignedValue => "misaligned value truncated on right shift",
        };
        f.write_str(msg)
    }
}

/// A single diagnostic: a kind, the source range it applies to, and
/// whatever arguments the kind's message template wants (rendered by the
/// front end, never by the core).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub source: SourceRange,
    pub args: Vec<String>,
}

/// Receiver for diagnostics raised while simplifying expressions or
/// finalizing values. Implemented by the front end; the core only calls
/// [`DiagnosticSink::report`].
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// A `DiagnosticSink` that just accumulates, useful for tests and for the
/// demo binary.
#[derive(Clone, Debug, Default)]
pub struct VecDiagnosticSink {
    pub diagnostics: Vec<Diagnostic>,
}

impl VecDiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.kind.is_error())
    }
}

impl DiagnosticSink for VecDiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_tracks_errors_separately_from_warnings() {
        let mut sink = VecDiagnosticSink::new();
        sink.report(Diagnostic {
            kind: DiagnosticKind::WarnFloatInexact,
            source: SourceRange::unknown(),
            args: vec![],
        });
        assert!(!sink.has_errors());
        sink.report(Diagnostic {
            kind: DiagnosticKind::ErrDivideByZero,
            source: SourceRange::unknown(),
            args: vec![],
        });
        assert!(sink.has_errors());
        assert_eq!(sink.diagnostics.len(), 2);
    }
}
