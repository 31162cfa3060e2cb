//! # Outcome Envelope
//!
//! The uniform success/failure result returned by every data-access and
//! service call.
//!
//! ## Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Outcome Envelope                                  │
//! │                                                                         │
//! │  In Rust code                          On the wire (serde, camelCase)   │
//! │  ────────────                          ──────────────────────────────   │
//! │  DatabaseResult<T>                     Envelope<T>                      │
//! │  = Result<T, Failure>                  {                                │
//! │                                          "isSuccess": true,            │
//! │  Ok(value)        ───────────────►       "value": { ... },             │
//! │                                          "errorMessage": null,         │
//! │  Err(Failure {    ───────────────►       "errorCode": "NONE"           │
//! │    code,                               }                                │
//! │    message,                                                             │
//! │  })                                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Expected failure modes (not found, duplicate names, illegal lifecycle
//! transitions, transient store outages) always travel as `Err(Failure)`.
//! Only programming errors are allowed to panic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Code
// =============================================================================

/// Classification carried by every failure.
///
/// `Timeout` and `ConnectionFailure` are the transient classes: the retry
/// policy may re-attempt them. Everything else surfaces on first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No error (successful outcome).
    #[default]
    None,
    /// The requested entity does not exist.
    NotFound,
    /// A uniqueness rule was violated.
    Duplicate,
    /// A lifecycle or business precondition failed.
    ValidationFailed,
    /// The store could not be reached.
    ConnectionFailure,
    /// The store did not answer in time (or was busy).
    Timeout,
    /// The entity changed since the caller read it.
    Conflict,
    /// The write committed but the read cache could not be refreshed.
    StaleCache,
    /// The caller abandoned the operation.
    Cancelled,
    /// Anything not covered above.
    Unknown,
}

impl ErrorCode {
    /// Returns true for failure classes that retrying may fix.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorCode::Timeout | ErrorCode::ConnectionFailure)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::None => "none",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Duplicate => "duplicate",
            ErrorCode::ValidationFailed => "validation_failed",
            ErrorCode::ConnectionFailure => "connection_failure",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Conflict => "conflict",
            ErrorCode::StaleCache => "stale_cache",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Failure
// =============================================================================

/// A classified, user-presentable failure.
///
/// The message never contains raw driver text; `depot-db` maps store errors to
/// a category message before constructing one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct Failure {
    code: ErrorCode,
    message: String,
}

impl Failure {
    /// Creates a failure with an explicit code.
    ///
    /// `ErrorCode::None` is not a failure class; it is coerced to `Unknown`.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let code = if code == ErrorCode::None {
            ErrorCode::Unknown
        } else {
            code
        };
        Failure {
            code,
            message: message.into(),
        }
    }

    /// `{entity} {id} was not found`.
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Failure::new(ErrorCode::NotFound, format!("{} {} was not found", entity, id))
    }

    /// A uniqueness violation on `field`.
    pub fn duplicate(entity: &str, field: &str, value: &str) -> Self {
        Failure::new(
            ErrorCode::Duplicate,
            format!("A {} with {} '{}' already exists", entity.to_lowercase(), field, value),
        )
    }

    /// A failed lifecycle or business precondition.
    pub fn validation(message: impl Into<String>) -> Self {
        Failure::new(ErrorCode::ValidationFailed, message)
    }

    /// The caller's copy is out of date.
    pub fn conflict(entity: &str, id: i64) -> Self {
        Failure::new(
            ErrorCode::Conflict,
            format!("{} {} was changed by someone else; reload and try again", entity, id),
        )
    }

    /// The mutation committed, but readers may still see the previous state.
    pub fn stale_cache(entity: &str, id: i64) -> Self {
        Failure::new(
            ErrorCode::StaleCache,
            format!(
                "{} {} was saved, but the cached view could not be refreshed; it will reload on next read",
                entity, id
            ),
        )
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True when the failure means the store already holds the change.
    pub fn is_committed(&self) -> bool {
        self.code == ErrorCode::StaleCache
    }
}

/// Result of every data-access and service call.
pub type DatabaseResult<T> = Result<T, Failure>;

// =============================================================================
// Envelope (wire form)
// =============================================================================

/// Serializable form of a [`DatabaseResult`] for presentation layers.
///
/// ## Serialization
/// ```json
/// { "isSuccess": false, "value": null,
///   "errorMessage": "Location 7 was not found", "errorCode": "NOT_FOUND" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    is_success: bool,
    value: Option<T>,
    error_message: Option<String>,
    error_code: ErrorCode,
}

impl<T> Envelope<T> {
    pub fn success(value: T) -> Self {
        Envelope {
            is_success: true,
            value: Some(value),
            error_message: None,
            error_code: ErrorCode::None,
        }
    }

    pub fn failure(message: impl Into<String>, code: ErrorCode) -> Self {
        let failure = Failure::new(code, message);
        Envelope {
            is_success: false,
            value: None,
            error_message: Some(failure.message),
            error_code: failure.code,
        }
    }

    pub fn is_success(&self) -> bool {
        self.is_success
    }

    /// The success value; `None` on failure.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn error_code(&self) -> ErrorCode {
        self.error_code
    }

    /// Converts back into a [`DatabaseResult`].
    ///
    /// A deserialized envelope claiming success without a value is reported
    /// as an `Unknown` failure rather than trusted.
    pub fn into_result(self) -> DatabaseResult<T> {
        match (self.is_success, self.value) {
            (true, Some(value)) => Ok(value),
            (true, None) => Err(Failure::new(
                ErrorCode::Unknown,
                "Successful envelope carried no value",
            )),
            (false, _) => Err(Failure::new(
                self.error_code,
                self.error_message.unwrap_or_default(),
            )),
        }
    }
}

impl Envelope<()> {
    /// `Success()` with no payload.
    pub fn success_unit() -> Self {
        Envelope::success(())
    }
}

impl<T> From<DatabaseResult<T>> for Envelope<T> {
    fn from(result: DatabaseResult<T>) -> Self {
        match result {
            Ok(value) => Envelope::success(value),
            Err(failure) => Envelope {
                is_success: false,
                value: None,
                error_message: Some(failure.message),
                error_code: failure.code,
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
