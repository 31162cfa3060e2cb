//! # Error Types
//!
//! Domain-specific error types for depot-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  depot-core errors (this file)                                          │
//! │  ├── ValidationError  - A single field rule violation                   │
//! │  └── LifecycleError   - Illegal delete-lifecycle transition             │
//! │                                                                         │
//! │  depot-core outcome (outcome.rs)                                        │
//! │  └── Failure          - Classified failure crossing the service boundary│
//! │                                                                         │
//! │  depot-db errors (separate crate)                                       │
//! │  └── DbError          - Store/driver failures, mapped into Failure      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::outcome::{ErrorCode, Failure};

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// One value per violated field rule. Field-level validation aggregates these
/// into [`crate::validation::Violations`] instead of stopping at the first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., malformed email, bad SKU characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A reference id that cannot point at a stored row.
    #[error("{field} must reference an existing record")]
    InvalidReference { field: String },
}

impl ValidationError {
    /// The field this error is about.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::InvalidReference { field } => field,
        }
    }
}

// =============================================================================
// Lifecycle Error
// =============================================================================

/// Errors raised by the delete-lifecycle state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The event is not allowed from the current state.
    #[error("Cannot {event} an entity that is {from}")]
    IllegalTransition {
        from: &'static str,
        event: &'static str,
    },

    /// Persisted flag and timestamp disagree.
    #[error("Inconsistent delete columns: is_deleted={is_deleted}, deleted_at set={has_deleted_at}")]
    InconsistentColumns {
        is_deleted: bool,
        has_deleted_at: bool,
    },

    /// A purged entity has no persisted representation.
    #[error("Entity has been purged")]
    Purged,
}

impl From<LifecycleError> for Failure {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::IllegalTransition { .. } => {
                Failure::new(ErrorCode::ValidationFailed, err.to_string())
            }
            LifecycleError::InconsistentColumns { .. } | LifecycleError::Purged => {
                Failure::new(ErrorCode::Unknown, "Stored record is in an inconsistent state")
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "name".to_string(),
        };
        assert_eq!(err.to_string(), "name is required");
        assert_eq!(err.field(), "name");

        let err = ValidationError::TooLong {
            field: "name".to_string(),
            max: 100,
        };
        assert_eq!(err.to_string(), "name must be at most 100 characters");
    }

    #[test]
    fn test_lifecycle_error_maps_to_validation_failed() {
        let err = LifecycleError::IllegalTransition {
            from: "active",
            event: "restore",
        };
        let failure: Failure = err.into();
        assert_eq!(failure.code(), ErrorCode::ValidationFailed);
    }

    #[test]
    fn test_inconsistent_columns_do_not_leak_details() {
        let failure: Failure = LifecycleError::InconsistentColumns {
            is_deleted: true,
            has_deleted_at: false,
        }
        .into();
        assert_eq!(failure.code(), ErrorCode::Unknown);
        assert!(!failure.message().contains("is_deleted"));
    }
}
