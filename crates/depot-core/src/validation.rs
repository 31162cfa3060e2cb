//! # Validation Module
//!
//! Field-level validation for drafts before they reach the write services.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Field rules (THIS MODULE)                                     │
//! │  ├── Plain functions over field values                                  │
//! │  └── Aggregates EVERY violation into one Violations report              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: ValidationGate (depot-db)                                     │
//! │  ├── Existence, name uniqueness, lifecycle state, dependents            │
//! │  └── First failure wins                                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── CHECK / partial UNIQUE constraints                                 │
//! │  └── Foreign key constraints                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use depot_core::validation::{self, Violations};
//!
//! let report = Violations::new()
//!     .check(validation::name("name", "Main Warehouse", validation::MAX_NAME_LEN))
//!     .check(validation::email("contact_email", Some("not-an-email")))
//!     .into_result();
//!
//! assert_eq!(report.unwrap_err().len(), 1);
//! ```

use crate::error::ValidationError;
use crate::outcome::Failure;

/// Result type for a single field rule.
pub type ValidationResult<T> = Result<T, ValidationError>;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_TEXT_LEN: usize = 500;
pub const MAX_SKU_LEN: usize = 50;

// =============================================================================
// String Validators
// =============================================================================

/// The value must not be blank.
pub fn required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// The trimmed value must not exceed `max` characters.
pub fn max_len(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.trim().chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

/// A required display name.
///
/// ## Example
/// ```rust
/// use depot_core::validation::{name, MAX_NAME_LEN};
///
/// assert!(name("name", "Main Warehouse", MAX_NAME_LEN).is_ok());
/// assert!(name("name", "   ", MAX_NAME_LEN).is_err());
/// ```
pub fn name(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    required(field, value)?;
    max_len(field, value, max)
}

/// Optional free text; only the length is checked.
pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> ValidationResult<()> {
    match value {
        Some(text) => max_len(field, text, max),
        None => Ok(()),
    }
}

/// Optional email address in `local@domain.tld` form.
pub fn email(field: &str, value: Option<&str>) -> ValidationResult<()> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(());
    };

    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be an email address".to_string(),
        });
    }
    Ok(())
}

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only alphanumeric characters, hyphens, underscores
pub fn sku(field: &str, value: &str) -> ValidationResult<()> {
    required(field, value)?;
    max_len(field, value, MAX_SKU_LEN)?;

    if !value
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// The value must be zero or greater.
pub fn non_negative(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// An optional foreign key; when present it must be a positive id.
pub fn reference(field: &str, id: Option<i64>) -> ValidationResult<()> {
    match id {
        Some(id) if id <= 0 => Err(ValidationError::InvalidReference {
            field: field.to_string(),
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Aggregation
// =============================================================================

/// Collects every failed field rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations {
    errors: Vec<ValidationError>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the rule outcome and keeps going.
    pub fn check(mut self, result: ValidationResult<()>) -> Self {
        if let Err(err) = result {
            self.errors.push(err);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// `Ok(())` when no rule failed.
    pub fn into_result(self) -> Result<(), Violations> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for Violations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        f.write_str(&messages.join("; "))
    }
}

impl std::error::Error for Violations {}

impl From<Violations> for Failure {
    fn from(violations: Violations) -> Self {
        Failure::validation(violations.to_string())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
