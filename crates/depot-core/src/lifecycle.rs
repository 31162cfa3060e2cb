//! # Delete Lifecycle
//!
//! The soft-delete / restore / hard-delete state machine shared by every
//! entity kind.
//!
//! ## States and Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   create ──► ┌────────┐  SoftDelete   ┌─────────────┐  HardDelete       │
//! │              │ Active │ ────────────► │ SoftDeleted │ ──────────► Purged│
//! │              └────────┘ ◄──────────── └─────────────┘           (final) │
//! │                           Restore                                       │
//! │                                                                         │
//! │  Persisted as two columns that must agree:                              │
//! │    Active       ⇔ is_deleted = 0, deleted_at IS NULL                    │
//! │    SoftDeleted  ⇔ is_deleted = 1, deleted_at = <timestamp>              │
//! │    Purged       ⇔ row no longer exists                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

/// Lifecycle state of a persisted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Active,
    SoftDeleted {
        deleted_at: DateTime<Utc>,
    },
    /// Terminal. Never loaded from the store, only produced by a transition.
    Purged,
}

/// Lifecycle events accepted by [`Lifecycle::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    SoftDelete { at: DateTime<Utc> },
    Restore,
    HardDelete,
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::SoftDelete { .. } => "soft delete",
            LifecycleEvent::Restore => "restore",
            LifecycleEvent::HardDelete => "hard delete",
        }
    }
}

impl Lifecycle {
    /// The single authoritative transition function.
    pub fn apply(self, event: LifecycleEvent) -> Result<Lifecycle, LifecycleError> {
        match (self, event) {
            (Lifecycle::Active, LifecycleEvent::SoftDelete { at }) => {
                Ok(Lifecycle::SoftDeleted { deleted_at: at })
            }
            (Lifecycle::SoftDeleted { .. }, LifecycleEvent::Restore) => Ok(Lifecycle::Active),
            (Lifecycle::SoftDeleted { .. }, LifecycleEvent::HardDelete) => Ok(Lifecycle::Purged),
            (from, event) => Err(LifecycleError::IllegalTransition {
                from: from.name(),
                event: event.name(),
            }),
        }
    }

    /// Rebuilds the state from its persisted column pair.
    ///
    /// Rejects rows where the flag and the timestamp disagree.
    pub fn from_columns(
        is_deleted: bool,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Result<Lifecycle, LifecycleError> {
        match (is_deleted, deleted_at) {
            (false, None) => Ok(Lifecycle::Active),
            (true, Some(deleted_at)) => Ok(Lifecycle::SoftDeleted { deleted_at }),
            (is_deleted, deleted_at) => Err(LifecycleError::InconsistentColumns {
                is_deleted,
                has_deleted_at: deleted_at.is_some(),
            }),
        }
    }

    /// The persisted column pair `(is_deleted, deleted_at)`.
    ///
    /// `Purged` has no row; asking for its columns is an error.
    pub fn to_columns(&self) -> Result<(bool, Option<DateTime<Utc>>), LifecycleError> {
        match self {
            Lifecycle::Active => Ok((false, None)),
            Lifecycle::SoftDeleted { deleted_at } => Ok((true, Some(*deleted_at))),
            Lifecycle::Purged => Err(LifecycleError::Purged),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Lifecycle::SoftDeleted { .. })
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Lifecycle::SoftDeleted { deleted_at } => Some(*deleted_at),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Lifecycle::Active => "active",
            Lifecycle::SoftDeleted { .. } => "soft-deleted",
            Lifecycle::Purged => "purged",
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_soft_delete_then_restore_round_trip() {
        let deleted = Lifecycle::Active
            .apply(LifecycleEvent::SoftDelete { at: at() })
            .unwrap();
        assert_eq!(deleted.to_columns().unwrap(), (true, Some(at())));

        let restored = deleted.apply(LifecycleEvent::Restore).unwrap();
        assert_eq!(restored, Lifecycle::Active);
        assert_eq!(restored.to_columns().unwrap(), (false, None));
    }

    #[test]
    fn test_hard_delete_only_from_soft_deleted() {
        assert!(Lifecycle::Active.apply(LifecycleEvent::HardDelete).is_err());

        let deleted = Lifecycle::SoftDeleted { deleted_at: at() };
        assert_eq!(deleted.apply(LifecycleEvent::HardDelete).unwrap(), Lifecycle::Purged);
    }

    #[test]
    fn test_illegal_transitions() {
        let deleted = Lifecycle::SoftDeleted { deleted_at: at() };
        assert!(Lifecycle::Active.apply(LifecycleEvent::Restore).is_err());
        assert!(deleted.apply(LifecycleEvent::SoftDelete { at: at() }).is_err());

        for event in [
            LifecycleEvent::SoftDelete { at: at() },
            LifecycleEvent::Restore,
            LifecycleEvent::HardDelete,
        ] {
            assert!(Lifecycle::Purged.apply(event).is_err());
        }
    }

    #[test]
    fn test_flag_and_timestamp_agree() {
        // is_deleted == (deleted_at is set), both directions
        for state in [Lifecycle::Active, Lifecycle::SoftDeleted { deleted_at: at() }] {
            let (is_deleted, deleted_at) = state.to_columns().unwrap();
            assert_eq!(is_deleted, deleted_at.is_some());
            assert_eq!(Lifecycle::from_columns(is_deleted, deleted_at).unwrap(), state);
        }

        assert!(Lifecycle::from_columns(true, None).is_err());
        assert!(Lifecycle::from_columns(false, Some(at())).is_err());
    }

    #[test]
    fn test_purged_has_no_columns() {
        assert!(matches!(Lifecycle::Purged.to_columns(), Err(LifecycleError::Purged)));
    }

    #[test]
    fn test_error_message_names_states() {
        let err = Lifecycle::Active.apply(LifecycleEvent::Restore).unwrap_err();
        assert_eq!(err.to_string(), "Cannot restore an entity that is active");
    }
}
