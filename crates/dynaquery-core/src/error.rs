//! Error taxonomy of the data layer.
//!
//! Caller mistakes (bad definitions, missing fields, unknown indexes) are
//! detected before any store call and reported as validation errors;
//! store failures are passed through so callers can decide whether to retry.

use dynaquery_model::StoreError;

use crate::expression::ExpressionError;
use crate::pagination::CursorError;

/// Errors returned by the pagination engine and the repository.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// The query definition could not be compiled.
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// Input failed a structural check.
    #[error("{message}")]
    Validation {
        /// Human-readable reason.
        message: String,
    },

    /// A field listed as required is absent.
    #[error("Required field NOT defined: {field}")]
    RequiredField {
        /// The missing field.
        field: String,
    },

    /// The record an operation needs does not exist.
    #[error("{message}")]
    NotFound {
        /// Human-readable reason.
        message: String,
    },

    /// A secondary-index query does not match the declared indexes.
    #[error("{message}")]
    IndexMisconfigured {
        /// Human-readable reason.
        message: String,
    },

    /// A cursor token could not be decoded and lenient decoding is off.
    #[error("Invalid cursor: {0}")]
    InvalidCursor(#[from] CursorError),

    /// The schema validator rejected a record.
    #[error("{message}")]
    Schema {
        /// Summary.
        message: String,
        /// One entry per violation.
        details: Vec<String>,
    },

    /// The store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DataError {
    /// Creates a [`DataError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a [`DataError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a [`DataError::IndexMisconfigured`].
    pub fn index(message: impl Into<String>) -> Self {
        Self::IndexMisconfigured {
            message: message.into(),
        }
    }

    /// Returns `true` for caller errors that retrying cannot fix.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::NotFound { .. })
    }

    /// Returns `true` for transient store failures worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_retryable())
    }
}
