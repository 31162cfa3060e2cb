//! Cache-backed reads for one entity kind.

use std::collections::BTreeMap;
use std::sync::Arc;

use depot_core::{DatabaseResult, Failure, Order, Product, Record};
use tracing::debug;

use crate::cache::EntityCache;
use crate::repository::{Entity, Page, PageRequest, Repository};

/// Read API for one entity kind.
///
/// Lookups are served from the [`EntityCache`]; paging and counting go to
/// the store.
#[derive(Debug)]
pub struct ReadService<E: Entity> {
    cache: Arc<EntityCache<E>>,
    repository: Repository<E>,
}

impl<E: Entity> Clone for ReadService<E> {
    fn clone(&self) -> Self {
        ReadService {
            cache: self.cache.clone(),
            repository: self.repository.clone(),
        }
    }
}

impl<E: Entity> ReadService<E> {
    pub fn new(cache: Arc<EntityCache<E>>, repository: Repository<E>) -> Self {
        ReadService { cache, repository }
    }

    /// Refreshes an unloaded or stale cache before it is read.
    async fn ensure_fresh(&self) -> DatabaseResult<()> {
        if self.cache.needs_refresh() {
            debug!(entity = E::ENTITY, "Refreshing cache before read");
            self.cache.refresh().await?;
        }
        Ok(())
    }

    /// The active record with this id.
    ///
    /// A cache miss falls through to the store; a hit there means the cache
    /// is behind, so it is marked stale for the next read.
    pub async fn get_by_id(&self, id: i64) -> DatabaseResult<E> {
        self.ensure_fresh().await?;
        if let Some(record) = self.cache.by_id(id).await {
            return if record.is_deleted() {
                Err(Failure::not_found(E::ENTITY, id))
            } else {
                Ok(record)
            };
        }

        match self.repository.get(id, false).await? {
            Some(record) => {
                self.cache.invalidate();
                Ok(record)
            }
            None => Err(Failure::not_found(E::ENTITY, id)),
        }
    }

    /// Like [`get_by_id`](Self::get_by_id), but soft-deleted records are
    /// returned too.
    pub async fn get_by_id_including_deleted(&self, id: i64) -> DatabaseResult<E> {
        self.ensure_fresh().await?;
        if let Some(record) = self.cache.by_id(id).await {
            return Ok(record);
        }

        match self.repository.get(id, true).await? {
            Some(record) => {
                self.cache.invalidate();
                Ok(record)
            }
            None => Err(Failure::not_found(E::ENTITY, id)),
        }
    }

    /// The active record with this name (trimmed, ASCII case-insensitive).
    pub async fn get_by_name(&self, name: &str) -> DatabaseResult<E> {
        self.ensure_fresh().await?;
        self.cache
            .by_name(name)
            .await
            .ok_or_else(|| Failure::not_found(E::ENTITY, format!("'{}'", name.trim())))
    }

    pub async fn list_active(&self) -> DatabaseResult<Vec<E>> {
        self.ensure_fresh().await?;
        Ok(self.cache.all_active().await)
    }

    /// Soft-deleted records, oldest id first.
    pub async fn list_deleted(&self) -> DatabaseResult<Vec<E>> {
        self.ensure_fresh().await?;
        Ok(self.cache.all_deleted().await)
    }

    pub async fn list_by_category(&self, key: &str) -> DatabaseResult<Vec<E>> {
        self.ensure_fresh().await?;
        Ok(self.cache.by_category(key).await)
    }

    /// Substring search over name and description of active records.
    pub async fn search(&self, term: &str, category: Option<&str>) -> DatabaseResult<Vec<E>> {
        self.ensure_fresh().await?;
        Ok(self.cache.search(term, category).await)
    }

    pub async fn count_by_category(&self) -> DatabaseResult<BTreeMap<String, usize>> {
        self.ensure_fresh().await?;
        Ok(self.cache.count_by_category().await)
    }

    /// One page straight from the store.
    pub async fn page(&self, request: &PageRequest) -> DatabaseResult<Page<E>> {
        Ok(self.repository.page(request).await?)
    }

    pub async fn count(&self, include_deleted: bool) -> DatabaseResult<i64> {
        Ok(self.repository.count(include_deleted).await?)
    }

    /// Explicit reload. Returns the number of cached records.
    pub async fn refresh(&self) -> DatabaseResult<usize> {
        Ok(self.cache.refresh().await?)
    }
}

impl ReadService<Product> {
    /// The active product with this SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DatabaseResult<Product> {
        self.repository
            .find_by_sku(sku)
            .await?
            .ok_or_else(|| Failure::not_found(Product::ENTITY, format!("with SKU '{}'", sku.trim())))
    }
}

impl ReadService<Order> {
    /// Active orders from one supplier, newest first.
    pub async fn list_for_supplier(&self, supplier_id: i64) -> DatabaseResult<Vec<Order>> {
        Ok(self.repository.list_for_supplier(supplier_id).await?)
    }

    /// Placed orders still waiting to be received, oldest first.
    pub async fn list_open(&self) -> DatabaseResult<Vec<Order>> {
        Ok(self.repository.list_open().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::tests::executor;
    use chrono::Utc;
    use depot_core::{ErrorCode, Lifecycle, Location, LocationDraft, LocationKind, ProductDraft};

    async fn service() -> (Repository<Location>, ReadService<Location>) {
        let repo = Repository::<Location>::new(executor().await);
        for (name, kind) in [
            ("Main Warehouse", LocationKind::Warehouse),
            ("Harbour Store", LocationKind::Store),
        ] {
            repo.insert(&LocationDraft::new(name, kind), Utc::now()).await.unwrap();
        }
        let cache = Arc::new(EntityCache::new(repo.clone()));
        (repo.clone(), ReadService::new(cache, repo))
    }

    #[tokio::test]
    async fn test_first_read_loads_cache() {
        let (_repo, reads) = service().await;
        let all = reads.list_active().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(reads.get_by_name("harbour store").await.unwrap().kind, LocationKind::Store);
        assert_eq!(reads.list_by_category("warehouse").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_records_are_not_found() {
        let (_repo, reads) = service().await;
        let err = reads.get_by_id(77).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(err.message(), "Location 77 was not found");

        let err = reads.get_by_name("Nowhere").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_deleted_records_only_via_including_deleted() {
        let (repo, reads) = service().await;
        let now = Utc::now();
        repo.transition(1, &Lifecycle::Active, &Lifecycle::SoftDeleted { deleted_at: now }, now)
            .await
            .unwrap();
        reads.refresh().await.unwrap();

        assert_eq!(reads.get_by_id(1).await.unwrap_err().code(), ErrorCode::NotFound);
        assert!(reads.get_by_id_including_deleted(1).await.unwrap().lifecycle.is_deleted());
        assert_eq!(reads.list_deleted().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_miss_falls_through_to_store() {
        let (repo, reads) = service().await;
        reads.list_active().await.unwrap();

        // Written behind the service's back
        let id = repo
            .insert(&LocationDraft::new("Dock", LocationKind::Transit), Utc::now())
            .await
            .unwrap();

        assert_eq!(reads.get_by_id(id).await.unwrap().name, "Dock");
        // The miss marked the cache stale; the next read reloads it
        assert_eq!(reads.search("dock", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deleted_cache_miss_falls_through_to_store() {
        let (repo, reads) = service().await;
        reads.list_active().await.unwrap();

        let id = repo
            .insert(&LocationDraft::new("Dock", LocationKind::Transit), Utc::now())
            .await
            .unwrap();
        let now = Utc::now();
        repo.transition(id, &Lifecycle::Active, &Lifecycle::SoftDeleted { deleted_at: now }, now)
            .await
            .unwrap();

        let found = reads.get_by_id_including_deleted(id).await.unwrap();
        assert!(found.lifecycle.is_deleted());
        assert_eq!(reads.list_deleted().await.unwrap().len(), 1);

        let err = reads.get_by_id_including_deleted(77).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_page_and_count_come_from_store() {
        let (_repo, reads) = service().await;
        let page = reads.page(&PageRequest::new(0, 1)).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].name, "Harbour Store");
        assert_eq!(reads.count(false).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_get_by_sku() {
        let repo = Repository::<Product>::new(executor().await);
        repo.insert(
            &ProductDraft {
                sku: "NUT-M8".into(),
                name: "M8 nut".into(),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
        let reads = ReadService::new(Arc::new(EntityCache::new(repo.clone())), repo);

        assert_eq!(reads.get_by_sku("nut-m8").await.unwrap().name, "M8 nut");
        assert_eq!(reads.get_by_sku("BOLT").await.unwrap_err().code(), ErrorCode::NotFound);
    }
}
