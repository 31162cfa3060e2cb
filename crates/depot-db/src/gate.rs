//! # Validation Gate
//!
//! Lifecycle and uniqueness preconditions checked before every mutation.
//!
//! ## Rule Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      validate_for_*(id)                                 │
//! │                                                                         │
//! │  1. existence     row missing            ──► NotFound                   │
//! │  2. state         wrong delete state     ──► ValidationFailed           │
//! │  3. dependents    referencing rows       ──► ValidationFailed           │
//! │  4. uniqueness    (restore only)         ──► Duplicate                  │
//! │                                                                         │
//! │  The first failing rule wins. On success the record that passed is      │
//! │  returned so the caller acts on exactly that state.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The gate reads the store through the repository, never the cache.

use depot_core::{DatabaseResult, Draft, Failure, Record};

use crate::repository::{Entity, Repository};

/// Precondition checks for one entity kind.
#[derive(Debug)]
pub struct ValidationGate<E> {
    repository: Repository<E>,
    /// Whether soft-deleted records keep their name reserved.
    reserve_deleted_names: bool,
}

impl<E> Clone for ValidationGate<E> {
    fn clone(&self) -> Self {
        ValidationGate {
            repository: self.repository.clone(),
            reserve_deleted_names: self.reserve_deleted_names,
        }
    }
}

impl<E: Entity> ValidationGate<E> {
    pub fn new(repository: Repository<E>, reserve_deleted_names: bool) -> Self {
        ValidationGate {
            repository,
            reserve_deleted_names,
        }
    }

    pub fn reserves_deleted_names(&self) -> bool {
        self.reserve_deleted_names
    }

    pub async fn exists(&self, id: i64, include_deleted: bool) -> DatabaseResult<bool> {
        Ok(self.repository.get(id, include_deleted).await?.is_some())
    }

    /// True when no other record uses `name`.
    ///
    /// `exclude_id` skips the record being edited. Soft-deleted records
    /// count only when `include_deleted` is set.
    pub async fn name_unique(
        &self,
        name: &str,
        exclude_id: Option<i64>,
        include_deleted: bool,
    ) -> DatabaseResult<bool> {
        let taken = self
            .repository
            .name_taken(name, exclude_id, include_deleted)
            .await?;
        Ok(!taken)
    }

    pub async fn validate_for_create(&self, draft: &E::Draft) -> DatabaseResult<()> {
        self.require_unique(draft.name(), None).await
    }

    /// The record must be active, and its (possibly renamed) name free.
    pub async fn validate_for_update(&self, record: &E) -> DatabaseResult<E> {
        let current = self.load(record.id()).await?;
        if current.is_deleted() {
            return Err(Failure::validation(format!(
                "{} {} is deleted and cannot be edited",
                E::ENTITY,
                record.id()
            )));
        }
        self.require_unique(record.name(), Some(record.id())).await?;
        Ok(current)
    }

    /// The record must be active with no active records referencing it.
    pub async fn validate_for_deletion(&self, id: i64) -> DatabaseResult<E> {
        let current = self.load(id).await?;
        if current.is_deleted() {
            return Err(Failure::validation(format!(
                "{} {} is already deleted",
                E::ENTITY,
                id
            )));
        }
        self.require_no_dependents(id, true).await?;
        Ok(current)
    }

    /// The record must be soft-deleted with no records at all referencing it.
    pub async fn validate_for_hard_deletion(&self, id: i64) -> DatabaseResult<E> {
        let current = self.load(id).await?;
        if !current.is_deleted() {
            return Err(Failure::validation(format!(
                "{} {} must be deleted before it can be permanently removed",
                E::ENTITY,
                id
            )));
        }
        self.require_no_dependents(id, false).await?;
        Ok(current)
    }

    /// The record must be soft-deleted and its name not taken by an active
    /// record in the meantime.
    pub async fn validate_for_restore(&self, id: i64) -> DatabaseResult<E> {
        let current = self.load(id).await?;
        if !current.is_deleted() {
            return Err(Failure::validation(format!(
                "{} {} is not deleted",
                E::ENTITY,
                id
            )));
        }
        if !self.name_unique(current.name(), Some(id), false).await? {
            return Err(Failure::duplicate(
                E::ENTITY,
                E::kind().name_column,
                current.name(),
            ));
        }
        Ok(current)
    }

    // =========================================================================
    // Rules
    // =========================================================================

    async fn load(&self, id: i64) -> DatabaseResult<E> {
        self.repository
            .get(id, true)
            .await?
            .ok_or_else(|| Failure::not_found(E::ENTITY, id))
    }

    async fn require_unique(&self, name: &str, exclude_id: Option<i64>) -> DatabaseResult<()> {
        if self
            .name_unique(name, exclude_id, self.reserve_deleted_names)
            .await?
        {
            Ok(())
        } else {
            Err(Failure::duplicate(E::ENTITY, E::kind().name_column, name.trim()))
        }
    }

    async fn require_no_dependents(&self, id: i64, active_only: bool) -> DatabaseResult<()> {
        let count = self.repository.count_dependents(id, active_only).await?;
        if count > 0 {
            return Err(Failure::validation(format!(
                "{} {} is still referenced by {} other record(s)",
                E::ENTITY,
                id,
                count
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::tests::executor;
    use chrono::Utc;
    use depot_core::{
        ErrorCode, Lifecycle, LifecycleEvent, Location, LocationDraft, LocationKind, Product,
        ProductDraft,
    };

    async fn gate(reserve: bool) -> (Repository<Location>, ValidationGate<Location>) {
        let repo = Repository::<Location>::new(executor().await);
        (repo.clone(), ValidationGate::new(repo, reserve))
    }

    async fn insert(repo: &Repository<Location>, name: &str) -> i64 {
        repo.insert(&LocationDraft::new(name, LocationKind::Warehouse), Utc::now())
            .await
            .unwrap()
    }

    async fn soft_delete(repo: &Repository<Location>, id: i64) {
        let now = Utc::now();
        let next = Lifecycle::Active
            .apply(LifecycleEvent::SoftDelete { at: now })
            .unwrap();
        assert!(repo.transition(id, &Lifecycle::Active, &next, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_exists() {
        let (repo, gate) = gate(false).await;
        let id = insert(&repo, "Dock").await;
        assert!(gate.exists(id, false).await.unwrap());

        soft_delete(&repo, id).await;
        assert!(!gate.exists(id, false).await.unwrap());
        assert!(gate.exists(id, true).await.unwrap());
        assert!(!gate.exists(999, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_name_unique() {
        let (repo, gate) = gate(false).await;
        let id = insert(&repo, "Main Warehouse").await;

        assert!(!gate.name_unique("Main Warehouse", None, false).await.unwrap());
        assert!(!gate.name_unique(" main warehouse ", None, false).await.unwrap());
        assert!(gate.name_unique("Main Warehouse", Some(id), false).await.unwrap());

        soft_delete(&repo, id).await;
        assert!(gate.name_unique("Main Warehouse", None, false).await.unwrap());
        assert!(!gate.name_unique("Main Warehouse", None, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_respects_reserved_names() {
        let (repo, open) = gate(false).await;
        let id = insert(&repo, "Main Warehouse").await;
        let draft = LocationDraft::new("Main Warehouse", LocationKind::Store);

        let err = open.validate_for_create(&draft).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Duplicate);

        soft_delete(&repo, id).await;
        assert!(open.validate_for_create(&draft).await.is_ok());

        let reserving = ValidationGate::new(repo, true);
        let err = reserving.validate_for_create(&draft).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Duplicate);
    }

    #[tokio::test]
    async fn test_update_rules() {
        let (repo, gate) = gate(false).await;
        let a = insert(&repo, "North").await;
        insert(&repo, "South").await;

        let mut record = repo.get(a, false).await.unwrap().unwrap();
        assert_eq!(gate.validate_for_update(&record).await.unwrap().id, a);

        record.name = "South".into();
        let err = gate.validate_for_update(&record).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Duplicate);

        soft_delete(&repo, a).await;
        record.name = "North".into();
        let err = gate.validate_for_update(&record).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn test_deletion_rules() {
        let (repo, gate) = gate(false).await;
        let id = insert(&repo, "Dock").await;

        assert_eq!(
            gate.validate_for_deletion(42).await.unwrap_err().code(),
            ErrorCode::NotFound
        );
        assert_eq!(gate.validate_for_deletion(id).await.unwrap().id, id);

        soft_delete(&repo, id).await;
        assert_eq!(
            gate.validate_for_deletion(id).await.unwrap_err().code(),
            ErrorCode::ValidationFailed
        );
    }

    #[tokio::test]
    async fn test_active_dependents_block_deletion() {
        let (repo, gate) = gate(false).await;
        let location = insert(&repo, "Dock").await;

        let products = Repository::<Product>::new(repo.executor().clone());
        let product = products
            .insert(
                &ProductDraft {
                    sku: "BOLT-01".into(),
                    name: "Bolt".into(),
                    location_id: Some(location),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();

        let err = gate.validate_for_deletion(location).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);

        // A soft-deleted product no longer blocks the soft delete...
        let now = Utc::now();
        products
            .transition(product, &Lifecycle::Active, &Lifecycle::SoftDeleted { deleted_at: now }, now)
            .await
            .unwrap();
        assert!(gate.validate_for_deletion(location).await.is_ok());

        // ...but still blocks the physical delete
        soft_delete(&repo, location).await;
        let err = gate.validate_for_hard_deletion(location).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn test_hard_deletion_requires_soft_delete() {
        let (repo, gate) = gate(false).await;
        let id = insert(&repo, "Dock").await;

        let err = gate.validate_for_hard_deletion(id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);

        soft_delete(&repo, id).await;
        let passed = gate.validate_for_hard_deletion(id).await.unwrap();
        assert!(passed.lifecycle.is_deleted());
    }

    #[tokio::test]
    async fn test_restore_rules() {
        let (repo, gate) = gate(false).await;
        let id = insert(&repo, "Main Warehouse").await;

        let err = gate.validate_for_restore(id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);

        soft_delete(&repo, id).await;
        assert!(gate.validate_for_restore(id).await.is_ok());

        // Someone reused the released name
        insert(&repo, "main warehouse").await;
        let err = gate.validate_for_restore(id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Duplicate);

        assert_eq!(
            gate.validate_for_restore(999).await.unwrap_err().code(),
            ErrorCode::NotFound
        );
    }
}
