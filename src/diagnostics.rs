//! Unified Diagnostics Module
//!
//! Single diagnostic type used for declaration-shape, binding and planning
//! problems. Each diagnostic is scoped to one mapping declaration.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PlanError;

/// Diagnostic severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Hint,
    Info,
}

/// Diagnostic codes for categorizing issues
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // =========================================================================
    // Declaration shape
    // =========================================================================
    InvalidDeclarationShape,
    InsufficientParameters,
    DuplicateContextType,

    // =========================================================================
    // Binding
    // =========================================================================
    NoMatchingSignature,
    MethodNotFound,
    ReturnTypeMismatch,
    NoMapperShape,

    // =========================================================================
    // Planning
    // =========================================================================
    UnknownMember,
    MemberNotWritable,
    MemberNotReadable,
    UnknownType,
    InvalidConstant,
    ConflictingRules,

    // =========================================================================
    // Batch
    // =========================================================================
    Cancelled,
}

impl DiagnosticCode {
    /// Stable short identifier, e.g. `MG0004`.
    pub fn id(self) -> &'static str {
        match self {
            DiagnosticCode::InvalidDeclarationShape => "MG0001",
            DiagnosticCode::InsufficientParameters => "MG0002",
            DiagnosticCode::DuplicateContextType => "MG0003",
            DiagnosticCode::NoMatchingSignature => "MG0004",
            DiagnosticCode::MethodNotFound => "MG0005",
            DiagnosticCode::ReturnTypeMismatch => "MG0006",
            DiagnosticCode::NoMapperShape => "MG0007",
            DiagnosticCode::UnknownMember => "MG0008",
            DiagnosticCode::MemberNotWritable => "MG0009",
            DiagnosticCode::UnknownType => "MG0010",
            DiagnosticCode::ConflictingRules => "MG0011",
            DiagnosticCode::Cancelled => "MG0012",
            DiagnosticCode::MemberNotReadable => "MG0013",
            DiagnosticCode::InvalidConstant => "MG0014",
        }
    }
}

/// Where a diagnostic applies: containing unit and declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticLocation {
    pub unit: String,
    pub declaration: String,
}

impl DiagnosticLocation {
    pub fn new(unit: impl Into<String>, declaration: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            declaration: declaration.into(),
        }
    }
}

impl fmt::Display for DiagnosticLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.unit, self.declaration)
    }
}

/// A diagnostic message with location, severity, and optional suggestion
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub location: Option<DiagnosticLocation>,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            location: None,
            suggestion: None,
        }
    }

    /// Create a warning diagnostic
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message)
        }
    }

    /// Create an info diagnostic
    pub fn info(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            ..Self::error(code, message)
        }
    }

    /// Attach location
    pub fn at(mut self, location: DiagnosticLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Attach a "did you mean" suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl From<&PlanError> for Diagnostic {
    fn from(err: &PlanError) -> Self {
        let diagnostic = Diagnostic::error(err.code(), err.to_string());
        match err.suggestion() {
            Some(s) => diagnostic.with_suggestion(s),
            None => diagnostic,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Hint => "hint",
            Severity::Info => "info",
        };
        write!(f, "{}[{}]", level, self.code.id())?;
        if let Some(location) = &self.location {
            write!(f, " {}", location)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (did you mean `{}`?)", suggestion)?;
        }
        Ok(())
    }
}

/// Closest candidate name to `wanted`, when one is close enough.
pub fn suggest<'a>(wanted: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<String> {
    candidates
        .into_iter()
        .filter(|c| *c != wanted)
        .map(|c| (strsim::jaro_winkler(wanted, c), c))
        .filter(|(score, _)| *score >= 0.8)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c.to_string())
}
