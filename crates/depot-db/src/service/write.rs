//! Gated mutations for one entity kind.

use std::sync::Arc;

use chrono::Utc;
use depot_core::{DatabaseResult, Draft, Failure, LifecycleEvent, Record};
use tracing::{info, warn};

use super::{BulkReport, WriteOptions};
use crate::cache::EntityCache;
use crate::gate::ValidationGate;
use crate::repository::{Entity, Repository};

/// Write API for one entity kind.
///
/// Every successful mutation refreshes the cache before returning, so the
/// change is visible to the next read. When that refresh fails the change is
/// still committed; the call reports `StaleCache` and the cache reloads on
/// its next read.
#[derive(Debug)]
pub struct WriteService<E: Entity> {
    repository: Repository<E>,
    cache: Arc<EntityCache<E>>,
    gate: ValidationGate<E>,
    options: WriteOptions,
}

impl<E: Entity> Clone for WriteService<E> {
    fn clone(&self) -> Self {
        WriteService {
            repository: self.repository.clone(),
            cache: self.cache.clone(),
            gate: self.gate.clone(),
            options: self.options,
        }
    }
}

impl<E: Entity> WriteService<E> {
    pub fn new(repository: Repository<E>, cache: Arc<EntityCache<E>>, options: WriteOptions) -> Self {
        let gate = ValidationGate::new(repository.clone(), options.reserve_deleted_names);
        WriteService {
            repository,
            cache,
            gate,
            options,
        }
    }

    /// The precondition checks this service runs, for callers that want to
    /// ask before acting.
    pub fn gate(&self) -> &ValidationGate<E> {
        &self.gate
    }

    pub fn options(&self) -> WriteOptions {
        self.options
    }

    // =========================================================================
    // Single-record operations
    // =========================================================================

    /// Inserts a new record and returns it with its store-assigned id.
    pub async fn create(&self, draft: E::Draft) -> DatabaseResult<E> {
        draft.validate()?;
        self.gate.validate_for_create(&draft).await?;

        let id = self.repository.insert(&draft, Utc::now()).await?;
        self.sync_cache(id).await?;
        self.load(id).await
    }

    /// Saves the business fields of `record`.
    ///
    /// `record.version()` must still match the stored row; otherwise someone
    /// else saved first and the call fails with `Conflict`.
    pub async fn update(&self, record: E) -> DatabaseResult<E> {
        let id = record.id();
        record.to_draft().validate()?;

        let current = self.gate.validate_for_update(&record).await?;
        if current.version() != record.version() {
            return Err(Failure::conflict(E::ENTITY, id));
        }
        if !self.repository.update(&record, Utc::now()).await? {
            return Err(Failure::conflict(E::ENTITY, id));
        }

        self.sync_cache(id).await?;
        self.load(id).await
    }

    /// Moves an active record to the recycle bin.
    pub async fn soft_delete(&self, id: i64) -> DatabaseResult<E> {
        self.soft_delete_one(id).await?;
        self.sync_cache(id).await?;
        self.load(id).await
    }

    /// Brings a soft-deleted record back.
    pub async fn restore(&self, id: i64) -> DatabaseResult<E> {
        self.restore_one(id).await?;
        self.sync_cache(id).await?;
        self.load(id).await
    }

    /// Physically removes a soft-deleted record. Terminal.
    pub async fn hard_delete(&self, id: i64) -> DatabaseResult<()> {
        self.hard_delete_one(id).await?;
        self.sync_cache(id).await
    }

    // =========================================================================
    // Bulk operations
    // =========================================================================

    /// Soft-deletes every id it can; one cache refresh at the end.
    pub async fn bulk_soft_delete(&self, ids: &[i64]) -> BulkReport {
        let mut report = BulkReport::default();
        for &id in ids {
            report.record(id, self.soft_delete_one(id).await);
        }
        self.finish_bulk("soft delete", report).await
    }

    pub async fn bulk_restore(&self, ids: &[i64]) -> BulkReport {
        let mut report = BulkReport::default();
        for &id in ids {
            report.record(id, self.restore_one(id).await);
        }
        self.finish_bulk("restore", report).await
    }

    pub async fn bulk_hard_delete(&self, ids: &[i64]) -> BulkReport {
        let mut report = BulkReport::default();
        for &id in ids {
            report.record(id, self.hard_delete_one(id).await);
        }
        self.finish_bulk("hard delete", report).await
    }

    async fn finish_bulk(&self, operation: &str, mut report: BulkReport) -> BulkReport {
        if !report.succeeded.is_empty() {
            report.cache_stale = self.cache_refresh_failed().await;
        }
        info!(
            entity = E::ENTITY,
            operation,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Bulk operation finished"
        );
        report
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn soft_delete_one(&self, id: i64) -> DatabaseResult<()> {
        let current = self.gate.validate_for_deletion(id).await?;
        let now = Utc::now();
        let from = *current.lifecycle();
        let to = from.apply(LifecycleEvent::SoftDelete { at: now })?;

        if !self.repository.transition(id, &from, &to, now).await? {
            return Err(Failure::conflict(E::ENTITY, id));
        }
        Ok(())
    }

    async fn restore_one(&self, id: i64) -> DatabaseResult<()> {
        let current = self.gate.validate_for_restore(id).await?;
        let from = *current.lifecycle();
        let to = from.apply(LifecycleEvent::Restore)?;

        if !self.repository.transition(id, &from, &to, Utc::now()).await? {
            return Err(Failure::conflict(E::ENTITY, id));
        }
        Ok(())
    }

    async fn hard_delete_one(&self, id: i64) -> DatabaseResult<()> {
        let current = self.gate.validate_for_hard_deletion(id).await?;
        current.lifecycle().apply(LifecycleEvent::HardDelete)?;

        // The purge transaction re-checks state and dependents
        self.repository.purge(id).await?;
        Ok(())
    }

    /// Reads back a record this service just wrote.
    async fn load(&self, id: i64) -> DatabaseResult<E> {
        if let Some(record) = self.cache.by_id(id).await {
            return Ok(record);
        }
        self.repository
            .get(id, true)
            .await?
            .ok_or_else(|| Failure::not_found(E::ENTITY, id))
    }

    async fn sync_cache(&self, id: i64) -> DatabaseResult<()> {
        if self.cache_refresh_failed().await {
            return Err(Failure::stale_cache(E::ENTITY, id));
        }
        Ok(())
    }

    async fn cache_refresh_failed(&self) -> bool {
        match self.cache.refresh().await {
            Ok(_) => false,
            Err(err) => {
                self.cache.invalidate();
                warn!(entity = E::ENTITY, error = %err, "Write committed but cache refresh failed");
                true
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
    use crate::executor::TransactionalExecutor;
    use crate::pool::{Database, DbConfig};
    use crate::retry::RetryPolicy;
    use crate::service::ReadService;
    use depot_core::{
        ErrorCode, Location, LocationDraft, LocationKind, Product, ProductDraft, Supplier,
        SupplierDraft,
    };

    struct Fixture {
        db: Database,
        reads: ReadService<Location>,
        writes: WriteService<Location>,
        cache: Arc<EntityCache<Location>>,
    }

    async fn fixture(options: WriteOptions) -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = Repository::<Location>::new(TransactionalExecutor::new(&db, RetryPolicy::no_retry()));
        let cache = Arc::new(EntityCache::new(repo.clone()));
        Fixture {
            reads: ReadService::new(cache.clone(), repo.clone()),
            writes: WriteService::new(repo, cache.clone(), options),
            cache,
            db,
        }
    }

    fn warehouse(name: &str) -> LocationDraft {
        LocationDraft::new(name, LocationKind::Warehouse)
    }

    #[tokio::test]
    async fn test_create_is_visible_immediately() {
        let f = fixture(WriteOptions::default()).await;
        let created = f.writes.create(warehouse("Main Warehouse")).await.unwrap();

        assert!(created.id > 0);
        assert_eq!(created.version, 1);
        // Cache already holds the new id, no refresh needed
        assert!(!f.cache.needs_refresh());
        assert_eq!(f.cache.by_id(created.id).await.unwrap().name, "Main Warehouse");
        assert_eq!(f.reads.get_by_id(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_fields_and_duplicates() {
        let f = fixture(WriteOptions::default()).await;

        let err = f.writes.create(warehouse("   ")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);

        f.writes.create(warehouse("Main Warehouse")).await.unwrap();
        let err = f.writes.create(warehouse("MAIN WAREHOUSE")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Duplicate);
    }

    #[tokio::test]
    async fn test_update_and_conflict() {
        let f = fixture(WriteOptions::default()).await;
        let created = f.writes.create(warehouse("Dock")).await.unwrap();

        let mut edit = created.clone();
        edit.address = Some("Pier 9".into());
        let saved = f.writes.update(edit).await.unwrap();
        assert_eq!(saved.version, 2);
        assert_eq!(saved.address.as_deref(), Some("Pier 9"));

        // A second editor still holding version 1
        let mut stale = created;
        stale.address = Some("Pier 10".into());
        let err = f.writes.update(stale).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);

        let stored = f.reads.get_by_id(saved.id).await.unwrap();
        assert_eq!(stored.address.as_deref(), Some("Pier 9"));
    }

    #[tokio::test]
    async fn test_soft_delete_restore_round_trip() {
        let f = fixture(WriteOptions::default()).await;
        let id = f.writes.create(warehouse("Dock")).await.unwrap().id;

        let deleted = f.writes.soft_delete(id).await.unwrap();
        assert!(deleted.lifecycle.is_deleted());
        assert!(deleted.lifecycle.deleted_at().is_some());
        assert_eq!(f.reads.get_by_id(id).await.unwrap_err().code(), ErrorCode::NotFound);

        let err = f.writes.soft_delete(id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);

        let restored = f.writes.restore(id).await.unwrap();
        assert!(restored.lifecycle.is_active());
        assert!(restored.lifecycle.deleted_at().is_none());
        assert_eq!(restored.version, 3);

        let err = f.writes.restore(id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn test_hard_delete_only_after_soft_delete() {
        let f = fixture(WriteOptions::default()).await;
        let id = f.writes.create(warehouse("Dock")).await.unwrap().id;

        let err = f.writes.hard_delete(id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);

        f.writes.soft_delete(id).await.unwrap();
        f.writes.hard_delete(id).await.unwrap();

        let err = f.reads.get_by_id_including_deleted(id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(f.writes.hard_delete(id).await.unwrap_err().code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_reserved_names_block_reuse() {
        let f = fixture(WriteOptions {
            reserve_deleted_names: true,
        })
        .await;
        let id = f.writes.create(warehouse("Main Warehouse")).await.unwrap().id;
        f.writes.soft_delete(id).await.unwrap();

        let err = f.writes.create(warehouse("Main Warehouse")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Duplicate);

        let open = fixture(WriteOptions::default()).await;
        let id = open.writes.create(warehouse("Main Warehouse")).await.unwrap().id;
        open.writes.soft_delete(id).await.unwrap();
        assert!(open.writes.create(warehouse("Main Warehouse")).await.is_ok());

        // The original can't come back while its name is in use
        let err = open.writes.restore(id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Duplicate);
    }

    #[tokio::test]
    async fn test_product_sku_is_unique() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = Repository::<Product>::new(TransactionalExecutor::new(&db, RetryPolicy::no_retry()));
        let writes = WriteService::new(repo.clone(), Arc::new(EntityCache::new(repo)), WriteOptions::default());

        let draft = |sku: &str, name: &str| ProductDraft {
            sku: sku.into(),
            name: name.into(),
            unit_price_cents: 99,
            quantity: 1,
            ..Default::default()
        };
        writes.create(draft("BOLT-M8", "M8 bolt")).await.unwrap();

        // Enforced by the partial unique index
        let err = writes.create(draft("BOLT-M8", "Another bolt")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Duplicate);
    }

    #[tokio::test]
    async fn test_bulk_is_best_effort() {
        let f = fixture(WriteOptions::default()).await;
        let a = f.writes.create(warehouse("A")).await.unwrap().id;
        let b = f.writes.create(warehouse("B")).await.unwrap().id;
        f.writes.soft_delete(b).await.unwrap();
        let generation = f.cache.generation();

        let report = f.writes.bulk_soft_delete(&[a, b, 404]).await;
        assert_eq!(report.succeeded, vec![a]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].0, b);
        assert_eq!(report.failed[0].1.code(), ErrorCode::ValidationFailed);
        assert_eq!(report.failed[1].1.code(), ErrorCode::NotFound);
        assert!(!report.cache_stale);
        assert!(!report.is_complete());
        // One refresh for the whole batch
        assert_eq!(f.cache.generation(), generation + 1);

        let report = f.writes.bulk_hard_delete(&[a, b]).await;
        assert!(report.is_complete());
        assert!(f.reads.list_deleted().await.unwrap().is_empty());

        let report = f.writes.bulk_restore(&[a]).await;
        assert_eq!(report.failed[0].1.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_dependents_block_supplier_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let executor = TransactionalExecutor::new(&db, RetryPolicy::no_retry());
        let suppliers = Repository::<Supplier>::new(executor.clone());
        let products = Repository::<Product>::new(executor);
        let supplier_writes =
            WriteService::new(suppliers.clone(), Arc::new(EntityCache::new(suppliers)), WriteOptions::default());
        let product_writes =
            WriteService::new(products.clone(), Arc::new(EntityCache::new(products)), WriteOptions::default());

        let acme = supplier_writes
            .create(SupplierDraft {
                name: "Acme".into(),
                contact_email: Some("sales@acme.test".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let bolt = product_writes
            .create(ProductDraft {
                sku: "BOLT-M8".into(),
                name: "M8 bolt".into(),
                supplier_id: Some(acme.id),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = supplier_writes.soft_delete(acme.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);

        product_writes.soft_delete(bolt.id).await.unwrap();
        supplier_writes.soft_delete(acme.id).await.unwrap();

        // The soft-deleted product still references the supplier
        let err = supplier_writes.hard_delete(acme.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);

        product_writes.hard_delete(bolt.id).await.unwrap();
        supplier_writes.hard_delete(acme.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_refresh_reports_stale_cache_and_heals() {
        let f = fixture(WriteOptions::default()).await;
        let dock = f.writes.create(warehouse("Dock")).await.unwrap().id;
        let yard = f.writes.create(warehouse("Yard")).await.unwrap().id;

        // A row the cache can no longer decode
        sqlx::query("UPDATE locations SET created_at = 'garbage' WHERE id = ?1")
            .bind(yard)
            .execute(f.db.pool())
            .await
            .unwrap();

        let err = f.writes.soft_delete(dock).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::StaleCache);
        assert!(err.is_committed());
        assert!(f.cache.is_stale());

        // The store has the change even though the cache missed it
        let stored: Option<bool> = sqlx::query_scalar("SELECT is_deleted FROM locations WHERE id = ?1")
            .bind(dock)
            .fetch_optional(f.db.pool())
            .await
            .unwrap();
        assert_eq!(stored, Some(true));

        sqlx::query("UPDATE locations SET created_at = updated_at WHERE id = ?1")
            .bind(yard)
            .execute(f.db.pool())
            .await
            .unwrap();

        // Next read self-heals
        let active = f.reads.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, yard);
        assert!(!f.cache.needs_refresh());
    }
}
