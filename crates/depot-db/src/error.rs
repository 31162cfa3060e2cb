//! # Database Error Types
//!
//! Driver-facing errors for the data layer, and their classification into the
//! [`ErrorCode`] taxonomy services report through.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← raw driver text kept for logs                  │
//! │       │                                                                 │
//! │       ├── error_code() → Timeout / ConnectionFailure ──► RetryPolicy    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Failure (depot-core) ← category message only, raw text logged          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Envelope<T> rendered by the presentation layer                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Classification
//! ```text
//! pool acquire timed out           → Timeout
//! SQLITE_BUSY / SQLITE_LOCKED      → Timeout
//! per-attempt deadline expired     → Timeout
//! pool closed / I/O / TLS / proto  → ConnectionFailure
//! UNIQUE constraint                → Duplicate
//! FOREIGN KEY / CHECK / NOT NULL   → ValidationFailed
//! row not found                    → NotFound
//! everything else                  → Unknown
//! ```

use std::time::Duration;

use depot_core::{ErrorCode, Failure, LifecycleError};
use sqlx::error::ErrorKind;
use thiserror::Error;
use tracing::{debug, error};

/// SQLite primary result codes that mean "try again later".
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Database operation errors.
///
/// Variants wrapping driver output keep the raw text for logging; it never
/// reaches a user-visible message (see `From<DbError> for Failure`).
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} {id} was not found")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Two active rows with the same name
    /// - Duplicate product SKU
    #[error("Duplicate {field}: {detail}")]
    UniqueViolation { field: String, detail: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK / NOT NULL constraint violation.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The row is not in the state the operation requires.
    #[error("{0}")]
    InvalidState(String),

    /// The row is still referenced by other rows.
    #[error("{entity} {id} is still referenced by {count} record(s)")]
    HasDependents { entity: String, id: i64, count: i64 },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be opened or created
    /// - Pool was closed
    /// - I/O error talking to the file
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// SQLite reported SQLITE_BUSY or SQLITE_LOCKED.
    #[error("Database busy: {0}")]
    Busy(String),

    /// Pool exhausted (no connection became free within the acquire timeout).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A single attempt exceeded its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The caller abandoned the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction begin/commit failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Config file could not be read, parsed or written.
    #[error("Failed to load configuration: {0}")]
    ConfigLoadFailed(String),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Maps this error onto the shared failure taxonomy.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            DbError::NotFound { .. } => ErrorCode::NotFound,
            DbError::UniqueViolation { .. } => ErrorCode::Duplicate,
            DbError::ForeignKeyViolation { .. }
            | DbError::ConstraintViolation(_)
            | DbError::InvalidState(_)
            | DbError::HasDependents { .. } => ErrorCode::ValidationFailed,
            DbError::ConnectionFailed(_) => ErrorCode::ConnectionFailure,
            DbError::Busy(_) | DbError::PoolExhausted | DbError::Timeout(_) => ErrorCode::Timeout,
            DbError::Cancelled => ErrorCode::Cancelled,
            DbError::MigrationFailed(_)
            | DbError::QueryFailed(_)
            | DbError::TransactionFailed(_)
            | DbError::InvalidConfig(_)
            | DbError::ConfigLoadFailed(_)
            | DbError::Internal(_) => ErrorCode::Unknown,
        }
    }

    /// Returns true if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        self.error_code().is_transient()
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(self, DbError::InvalidConfig(_) | DbError::ConfigLoadFailed(_))
    }

    /// Message safe to show a user.
    ///
    /// Errors produced by this crate's own checks already carry readable
    /// text. Anything that came out of the driver collapses to a category.
    pub fn user_message(&self) -> String {
        match self {
            DbError::NotFound { .. } | DbError::InvalidState(_) | DbError::HasDependents { .. } => {
                self.to_string()
            }
            DbError::UniqueViolation { field, .. } => {
                format!("A record with the same {} already exists", field)
            }
            DbError::ForeignKeyViolation { .. } => {
                "The change refers to a record that does not exist or is still in use".to_string()
            }
            DbError::ConstraintViolation(_) => "The change breaks a data rule".to_string(),
            DbError::ConnectionFailed(_) => "The data store is unreachable".to_string(),
            DbError::Busy(_) | DbError::PoolExhausted | DbError::Timeout(_) => {
                "The data store did not respond in time".to_string()
            }
            DbError::Cancelled => "The operation was cancelled".to_string(),
            DbError::InvalidConfig(_) | DbError::ConfigLoadFailed(_) => {
                "The data store is not configured correctly".to_string()
            }
            DbError::MigrationFailed(_)
            | DbError::QueryFailed(_)
            | DbError::TransactionFailed(_)
            | DbError::Internal(_) => "An unexpected data store error occurred".to_string(),
        }
    }
}

/// Extracts the column list from `UNIQUE constraint failed: t.col, t.col2`.
fn unique_field(message: &str) -> String {
    message
        .split("constraint failed: ")
        .nth(1)
        .map(|cols| {
            cols.split(',')
                .map(|c| c.trim().rsplit('.').next().unwrap_or(c).to_string())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|f| !f.is_empty() && !f.starts_with("index"))
        .unwrap_or_else(|| "value".to_string())
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → constraint kind, or BUSY/LOCKED result code
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// sqlx::Error::PoolClosed/Io  → DbError::ConnectionFailed
/// Other                       → DbError::QueryFailed / Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message().to_string();

                match db_err.kind() {
                    ErrorKind::UniqueViolation => DbError::UniqueViolation {
                        field: unique_field(&msg),
                        detail: msg,
                    },
                    ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation { message: msg },
                    ErrorKind::NotNullViolation | ErrorKind::CheckViolation => {
                        DbError::ConstraintViolation(msg)
                    }
                    _ => {
                        // Extended result codes carry the primary code in the low byte
                        let primary = db_err
                            .code()
                            .and_then(|code| code.parse::<i32>().ok())
                            .map(|code| code & 0xff);

                        match primary {
                            Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => DbError::Busy(msg),
                            _ => DbError::QueryFailed(msg),
                        }
                    }
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            sqlx::Error::Io(e) => DbError::ConnectionFailed(e.to_string()),

            sqlx::Error::Tls(e) => DbError::ConnectionFailed(e.to_string()),

            sqlx::Error::Protocol(msg) => DbError::ConnectionFailed(msg),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<LifecycleError> for DbError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::IllegalTransition { .. } => DbError::InvalidState(err.to_string()),
            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for DbError {
    fn from(err: toml::de::Error) -> Self {
        DbError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for DbError {
    fn from(err: toml::ser::Error) -> Self {
        DbError::ConfigLoadFailed(err.to_string())
    }
}

/// Service boundary conversion.
///
/// The raw error is logged here; the returned failure only carries
/// [`DbError::user_message`].
impl From<DbError> for Failure {
    fn from(err: DbError) -> Self {
        let code = err.error_code();

        match code {
            ErrorCode::Unknown | ErrorCode::ConnectionFailure | ErrorCode::Timeout => {
                error!(error = %err, code = %code, "Data store operation failed");
            }
            _ => {
                debug!(error = %err, code = %code, "Data store operation rejected");
            }
        }

        Failure::new(code, err.user_message())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Unit Tests
// =============================================================================
