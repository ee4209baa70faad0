//! Error types.

use thiserror::Error;

use crate::diagnostics::DiagnosticCode;
use crate::types::TypeParseError;

/// Failures scoped to one mapping declaration.
///
/// A failing declaration produces a diagnostic and no code; the rest of the
/// batch is unaffected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    /// Not eligible to be a mapping entry point.
    #[error("`{method}` is not a valid mapping declaration: {reason}")]
    InvalidDeclarationShape { method: String, reason: String },

    /// Too few parameters for the chosen void/factory shape.
    #[error("`{method}` has {found} parameter(s), the {shape} form needs at least {required}")]
    InsufficientParameters {
        method: String,
        shape: String,
        found: usize,
        required: usize,
    },

    /// Two extra context parameters share one type.
    #[error("`{method}` declares context parameter type `{ty}` more than once")]
    DuplicateContextType { method: String, ty: String },

    /// Candidates exist, none has an accepted parameter list.
    #[error("no overload of {kind} method `{method}` matches {expected}")]
    NoMatchingSignature {
        kind: String,
        method: String,
        expected: String,
        suggestion: Option<String>,
    },

    /// No candidate with that name at all.
    #[error("{kind} method `{method}` not found")]
    MethodNotFound {
        kind: String,
        method: String,
        suggestion: Option<String>,
    },

    /// Right parameters, wrong return type.
    #[error("{kind} method `{method}` returns `{found}`, which is not assignable to `{expected}`")]
    ReturnTypeMismatch {
        kind: String,
        method: String,
        found: String,
        expected: String,
    },

    /// No collection/nested mapper with a usable shape.
    #[error(
        "no {kind} mapper `{method}` with shape ({from}) -> {to} or ({from}, {to}) -> void"
    )]
    NoMapperShape {
        kind: String,
        method: String,
        from: String,
        to: String,
        suggestion: Option<String>,
    },

    #[error("member `{path}` not found on `{ty}`")]
    UnknownMember { path: String, ty: String },

    #[error("member `{path}` on `{ty}` is not writable")]
    MemberNotWritable { path: String, ty: String },

    #[error("member `{path}` on `{ty}` is not readable")]
    MemberNotReadable { path: String, ty: String },

    #[error("member path `{path}` on `{ty}` has an empty segment")]
    MalformedPath { path: String, ty: String },

    /// A constant with no literal form in the destination type.
    #[error("constant {value} cannot be assigned to `{target}` of type `{ty}`")]
    InvalidConstant {
        target: String,
        value: String,
        ty: String,
    },

    #[error("member `{path}` of type `{ty}` is not a collection")]
    NotACollection { path: String, ty: String },

    #[error("unknown type: {0}")]
    UnknownType(#[from] TypeParseError),
}

impl PlanError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            PlanError::InvalidDeclarationShape { .. } => DiagnosticCode::InvalidDeclarationShape,
            PlanError::InsufficientParameters { .. } => DiagnosticCode::InsufficientParameters,
            PlanError::DuplicateContextType { .. } => DiagnosticCode::DuplicateContextType,
            PlanError::NoMatchingSignature { .. } => DiagnosticCode::NoMatchingSignature,
            PlanError::MethodNotFound { .. } => DiagnosticCode::MethodNotFound,
            PlanError::ReturnTypeMismatch { .. } => DiagnosticCode::ReturnTypeMismatch,
            PlanError::NoMapperShape { .. } => DiagnosticCode::NoMapperShape,
            PlanError::UnknownMember { .. }
            | PlanError::NotACollection { .. }
            | PlanError::MalformedPath { .. } => DiagnosticCode::UnknownMember,
            PlanError::MemberNotWritable { .. } => DiagnosticCode::MemberNotWritable,
            PlanError::MemberNotReadable { .. } => DiagnosticCode::MemberNotReadable,
            PlanError::InvalidConstant { .. } => DiagnosticCode::InvalidConstant,
            PlanError::UnknownType(_) => DiagnosticCode::UnknownType,
        }
    }

    /// Failures of the delegate/method binder, as opposed to shape or
    /// member-resolution failures.
    pub fn is_binding_failure(&self) -> bool {
        matches!(
            self,
            PlanError::NoMatchingSignature { .. }
                | PlanError::MethodNotFound { .. }
                | PlanError::ReturnTypeMismatch { .. }
                | PlanError::NoMapperShape { .. }
        )
    }

    pub fn suggestion(&self) -> Option<&str> {
        match self {
            PlanError::NoMatchingSignature { suggestion, .. }
            | PlanError::MethodNotFound { suggestion, .. }
            | PlanError::NoMapperShape { suggestion, .. } => suggestion.as_deref(),
            _ => None,
        }
    }
}

/// Failures while resolving input files into registry shapes and units.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("type expression `{expr}` in {context}: {error}")]
    Type {
        context: String,
        expr: String,
        error: TypeParseError,
    },

    #[error("type shape `{0}` declared more than once")]
    DuplicateShape(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
