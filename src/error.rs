//! Error types for tibero_fdw.
//!
//! All errors that can occur while classifying or deparsing are represented
//! by [`FdwError`]. Errors are propagated via `Result<T, FdwError>` and, when
//! running inside PostgreSQL, converted to PostgreSQL errors at the callback
//! boundary using `pgrx::error!()`.
//!
//! A condition that merely cannot be shipped is *not* an error: the
//! classifier answers `false` and the condition is evaluated locally.
//!
//! # Error Classification
//!
//! - **Option**: invalid or missing FDW options. Reported to the user at DDL time.
//! - **DataValue**: a constant the remote engine has no representation for
//!   (infinite dates, intervals). The user can rewrite the query.
//! - **Internal**: catalog inconsistencies and rendering invariants. Bugs.

use std::fmt;

/// Primary error type for the extension.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FdwError {
    // ── Option errors ────────────────────────────────────────────────────
    /// An option that is not valid for the object it was set on.
    #[error("invalid option \"{option}\" (valid options in this context are: {valid})")]
    InvalidOption { option: String, valid: String },

    /// One or more required options were not configured.
    #[error("insufficient options: the following required options are missing: {}", .0.join(", "))]
    MissingOptions(Vec<String>),

    /// An option value failed validation.
    #[error("invalid value for option \"{option}\": {reason}")]
    InvalidOptionValue { option: String, reason: String },

    // ── Data value errors ────────────────────────────────────────────────
    /// A constant cannot be expressed in the remote engine's SQL dialect.
    #[error("value cannot be sent to the remote server: {0}")]
    UnrepresentableValue(String),

    // ── Internal errors (should not happen) ──────────────────────────────
    /// A catalog object the caller referenced could not be found.
    #[error("cache lookup failed for {kind} {oid}")]
    CatalogLookup { kind: &'static str, oid: u32 },

    /// An operator's catalog entry disagrees with its operand count.
    #[error("operator {oid} expects {expected} argument(s) but was given {actual}")]
    ArityMismatch {
        oid: u32,
        expected: usize,
        actual: usize,
    },

    /// A node kind reached the deparser that it has no rendering for.
    #[error("unsupported expression type for deparse: {0}")]
    UnsupportedExpression(String),

    /// Rendering finished with open parentheses.
    #[error("unbalanced parentheses in deparsed SQL (depth {0})")]
    UnbalancedParentheses(i32),

    /// An unexpected internal error. Indicates a bug.
    #[error("internal error: {0}")]
    InternalError(String),
}

/// Classification of error kind for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdwErrorKind {
    Option,
    DataValue,
    Internal,
}

impl fmt::Display for FdwErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FdwErrorKind::Option => write!(f, "OPTION"),
            FdwErrorKind::DataValue => write!(f, "DATA_VALUE"),
            FdwErrorKind::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl FdwError {
    /// Classify the error.
    pub fn kind(&self) -> FdwErrorKind {
        match self {
            FdwError::InvalidOption { .. }
            | FdwError::MissingOptions(_)
            | FdwError::InvalidOptionValue { .. } => FdwErrorKind::Option,

            FdwError::UnrepresentableValue(_) => FdwErrorKind::DataValue,

            FdwError::CatalogLookup { .. }
            | FdwError::ArityMismatch { .. }
            | FdwError::UnsupportedExpression(_)
            | FdwError::UnbalancedParentheses(_)
            | FdwError::InternalError(_) => FdwErrorKind::Internal,
        }
    }

    /// Whether the error comes from a constant's value rather than a bug.
    ///
    /// The scan planner demotes conditions that fail this way to local
    /// evaluation instead of failing the query.
    pub fn is_data_value_error(&self) -> bool {
        self.kind() == FdwErrorKind::DataValue
    }

    /// Whether a condition that failed to render with this error can still
    /// be evaluated locally.
    pub fn is_recoverable_by_local_eval(&self) -> bool {
        matches!(
            self,
            FdwError::UnrepresentableValue(_) | FdwError::UnsupportedExpression(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(
            FdwError::MissingOptions(vec!["host".into()]).kind(),
            FdwErrorKind::Option
        );
        assert_eq!(
            FdwError::UnrepresentableValue("infinity".into()).kind(),
            FdwErrorKind::DataValue
        );
        assert_eq!(
            FdwError::CatalogLookup {
                kind: "operator",
                oid: 1
            }
            .kind(),
            FdwErrorKind::Internal
        );
        assert_eq!(
            FdwError::UnbalancedParentheses(1).kind(),
            FdwErrorKind::Internal
        );
    }

    #[test]
    fn test_data_value_errors() {
        assert!(FdwError::UnrepresentableValue("x".into()).is_data_value_error());
        assert!(!FdwError::InternalError("x".into()).is_data_value_error());
    }

    #[test]
    fn test_recoverable_by_local_eval() {
        assert!(FdwError::UnrepresentableValue("x".into()).is_recoverable_by_local_eval());
        assert!(FdwError::UnsupportedExpression("ArrayExpr".into()).is_recoverable_by_local_eval());
        assert!(!FdwError::UnbalancedParentheses(2).is_recoverable_by_local_eval());
        assert!(
            !FdwError::ArityMismatch {
                oid: 96,
                expected: 2,
                actual: 1
            }
            .is_recoverable_by_local_eval()
        );
    }

    #[test]
    fn test_error_messages() {
        let err = FdwError::MissingOptions(vec!["host".into(), "port".into()]);
        assert_eq!(
            err.to_string(),
            "insufficient options: the following required options are missing: host, port"
        );
        let err = FdwError::CatalogLookup {
            kind: "operator",
            oid: 42,
        };
        assert_eq!(err.to_string(), "cache lookup failed for operator 42");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(FdwErrorKind::DataValue.to_string(), "DATA_VALUE");
        assert_eq!(FdwErrorKind::Internal.to_string(), "INTERNAL");
    }
}
