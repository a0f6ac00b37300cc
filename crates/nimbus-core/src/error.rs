//! Error taxonomy surfaced at the command boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized cause of a failed infrastructure call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The addressed resource (or a resource it references) does not exist.
    NotFound,
    /// The platform refused the request (conflict, quota, invalid state).
    Rejected,
    /// The platform could not be reached or its storage failed.
    Unavailable,
    /// Anything the gateway could not classify.
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::NotFound => "not_found",
            FailureKind::Rejected => "rejected",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Every failure the core can report to a caller.
///
/// `Validation` never leaves the completion loop: it is turned into another
/// `missing_parameters` prompt. The other variants become `error` responses.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    /// The understanding engine returned output that could not be parsed, or failed outright.
    #[error("could not interpret the request: {0}")]
    Interpretation(String),

    /// A supplied parameter value failed type or constraint coercion.
    #[error("invalid value for '{parameter}': {reason}")]
    Validation { parameter: String, reason: String },

    /// Confirmation input did not match the live token of this conversation.
    #[error("{0}")]
    StaleConfirmation(String),

    /// The engine named an operation that is not in the catalog.
    #[error("operation '{0}' is not supported")]
    UnknownOperation(String),

    /// The infrastructure call failed; the underlying message is preserved.
    #[error("{operation} failed ({kind}): {message}")]
    Execution {
        operation: String,
        kind: FailureKind,
        message: String,
    },
}

impl CommandError {
    /// Stable machine-oriented code for the `error` field of a response.
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::Interpretation(_) => "interpretation_error",
            CommandError::Validation { .. } => "validation_error",
            CommandError::StaleConfirmation(_) => "stale_confirmation",
            CommandError::UnknownOperation(_) => "unknown_operation",
            CommandError::Execution { .. } => "execution_error",
        }
    }

    pub fn validation(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        CommandError::Validation {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}

/// Typed failure raised by infrastructure backends. The resource gateway downcasts
/// handler errors to this to pick a [`FailureKind`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct CloudError {
    pub kind: FailureKind,
    pub message: String,
}

impl CloudError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Rejected, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unavailable, message)
    }
}
