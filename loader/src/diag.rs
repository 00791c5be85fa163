// diag.rs — Unified diagnostics model
//
// Shared diagnostic types produced by parsing, validation, evaluation and
// the multi-pass decode driver. Diagnostics are only ever collected; once
// created they are never mutated.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::Serialize;

use crate::ast::SourceRange;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`, `W0001`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code keeps its meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // Syntax
    pub const E0010: DiagCode = DiagCode("E0010"); // syntax error

    // Block validation
    pub const E0001: DiagCode = DiagCode("E0001"); // invalid name
    pub const E0002: DiagCode = DiagCode("E0002"); // missing name label
    pub const E0003: DiagCode = DiagCode("E0003"); // unsupported argument
    pub const E0004: DiagCode = DiagCode("E0004"); // missing required argument
    pub const E0005: DiagCode = DiagCode("E0005"); // unsupported nested block type
    pub const E0006: DiagCode = DiagCode("E0006"); // extraneous label
    pub const E0007: DiagCode = DiagCode("E0007"); // attribute redefined

    // Evaluation
    pub const E0100: DiagCode = DiagCode("E0100"); // unknown variable (deferral)
    pub const E0101: DiagCode = DiagCode("E0101"); // unsupported attribute (deferral)
    pub const E0102: DiagCode = DiagCode("E0102"); // missing map element (deferral)
    pub const E0103: DiagCode = DiagCode("E0103"); // invalid index
    pub const E0104: DiagCode = DiagCode("E0104"); // unsupported attribute access on non-object
    pub const E0105: DiagCode = DiagCode("E0105"); // call to unknown function
    pub const E0106: DiagCode = DiagCode("E0106"); // invalid function argument
    pub const E0107: DiagCode = DiagCode("E0107"); // variables not allowed
    pub const E0110: DiagCode = DiagCode("E0110"); // incorrect attribute value type
    pub const E0111: DiagCode = DiagCode("E0111"); // variable type / value problem

    // Resource-specific validation
    pub const E0200: DiagCode = DiagCode("E0200"); // both sql and query set
    pub const E0201: DiagCode = DiagCode("E0201"); // param block with query set
    pub const E0202: DiagCode = DiagCode("E0202"); // neither sql nor query set
    pub const E0203: DiagCode = DiagCode("E0203"); // invalid args shape
    pub const E0204: DiagCode = DiagCode("E0204"); // invalid parameter config
    pub const E0205: DiagCode = DiagCode("E0205"); // invalid benchmark child

    // Tree building
    pub const E0300: DiagCode = DiagCode("E0300"); // name collision
    pub const E0301: DiagCode = DiagCode("E0301"); // duplicate mod block

    // Fixpoint
    pub const E0400: DiagCode = DiagCode("E0400"); // unresolved after fixpoint

    // Warnings
    pub const W0001: DiagCode = DiagCode("W0001"); // unknown top-level block type
    pub const W0002: DiagCode = DiagCode("W0002"); // value for undeclared variable
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Error class ──────────────────────────────────────────────────────────

/// Taxonomy of load failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagClass {
    Syntax,
    Validation,
    /// A non-deferral evaluation failure.
    Evaluation,
    /// Deferral retained for reporting (never a final error by itself).
    Deferral,
    NameCollision,
    UnresolvedAfterFixpoint,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub class: DiagClass,
    pub summary: String,
    pub detail: Option<String>,
    #[serde(skip)]
    pub subject: Option<SourceRange>,
}

impl Diagnostic {
    pub fn new(level: DiagLevel, class: DiagClass, summary: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            class,
            summary: summary.into(),
            detail: None,
            subject: None,
        }
    }

    /// Shorthand for an error-level diagnostic.
    pub fn error(class: DiagClass, summary: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, class, summary)
    }

    /// Shorthand for a warning-level diagnostic.
    pub fn warning(class: DiagClass, summary: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, class, summary)
    }

    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_subject(mut self, subject: SourceRange) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.summary)?;
        } else {
            write!(f, "{}: {}", level, self.summary)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "; {}", detail)?;
        }
        Ok(())
    }
}

/// Count the error-level diagnostics in a list.
pub fn error_count(diags: &[Diagnostic]) -> usize {
    diags.iter().filter(|d| d.is_error()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_code() {
        let d = Diagnostic::error(DiagClass::Validation, "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code_and_detail() {
        let d = Diagnostic::warning(DiagClass::Validation, "unknown block type")
            .with_code(codes::W0001)
            .with_detail("'foo' is ignored");
        assert_eq!(
            format!("{d}"),
            "warning[W0001]: unknown block type; 'foo' is ignored"
        );
    }

    #[test]
    fn builder_chain() {
        let range = SourceRange::new(crate::ast::FileId(2), (3..9).into());
        let d = Diagnostic::error(DiagClass::NameCollision, "duplicate")
            .with_code(codes::E0300)
            .with_subject(range);
        assert_eq!(d.code, Some(codes::E0300));
        assert_eq!(d.subject, Some(range));
        assert!(d.is_error());
    }

    #[test]
    fn equality_covers_every_field() {
        let base = Diagnostic::error(DiagClass::Evaluation, "bad").with_code(codes::E0100);
        assert_eq!(base.clone(), base);
        assert_ne!(base.clone().with_detail("more"), base);
    }

    #[test]
    fn error_count_ignores_warnings() {
        let diags = vec![
            Diagnostic::error(DiagClass::Syntax, "a"),
            Diagnostic::warning(DiagClass::Validation, "b"),
            Diagnostic::error(DiagClass::Evaluation, "c"),
        ];
        assert_eq!(error_count(&diags), 2);
    }
}
