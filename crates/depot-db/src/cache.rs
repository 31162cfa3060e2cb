//! # Entity Cache
//!
//! One in-memory snapshot per entity kind, indexed by id, name and category.
//!
//! ## Snapshot Swap
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        EntityCache<E>                                   │
//! │                                                                         │
//! │  readers ──► RwLock<Arc<Snapshot>> ── clone Arc, release lock ──► read  │
//! │                        ▲                                                │
//! │                        │ swap pointer (lock held only for the swap)     │
//! │                        │                                                │
//! │  refresh() ──► Mutex refresh_gate (one refresh at a time)               │
//! │                  │                                                      │
//! │                  ├── load every row from the store                      │
//! │                  ├── build a complete new Snapshot off to the side      │
//! │                  └── swap it in; generation += 1                        │
//! │                                                                         │
//! │  Readers during a refresh keep the previous snapshot. There is never    │
//! │  a partially-built snapshot behind the lock.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//! `new` (empty, unloaded) → `init` (first load) → `refresh` ... → `clear`
//! (back to unloaded). `invalidate` marks the snapshot stale without
//! touching it; the read service refreshes a stale cache before serving.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::DbResult;
use crate::repository::{Entity, Repository};

/// Count key for records without a category value.
pub const UNCATEGORIZED: &str = "uncategorized";

// =============================================================================
// Snapshot
// =============================================================================

/// An immutable, fully-indexed view of one kind.
#[derive(Debug)]
struct Snapshot<E> {
    by_id: HashMap<i64, E>,
    /// Normalized name → ids (several when deleted rows release their name).
    by_name: HashMap<String, Vec<i64>>,
    /// Category key → ids of active records.
    by_category: HashMap<String, Vec<i64>>,
    /// Ids in ascending order, for stable listing.
    order: Vec<i64>,
}

impl<E> Default for Snapshot<E> {
    fn default() -> Self {
        Snapshot {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            by_category: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<E: Entity> Snapshot<E> {
    fn build(rows: Vec<E>) -> Self {
        let mut snapshot = Snapshot::default();

        for record in rows {
            let id = record.id();
            snapshot.by_name.entry(name_key(record.name())).or_default().push(id);
            if !record.is_deleted() {
                snapshot
                    .by_category
                    .entry(category_key(&record))
                    .or_default()
                    .push(id);
            }
            snapshot.order.push(id);
            snapshot.by_id.insert(id, record);
        }

        snapshot.order.sort_unstable();
        snapshot
    }

    fn records<'a>(&'a self, ids: impl IntoIterator<Item = &'a i64>) -> impl Iterator<Item = &'a E> {
        ids.into_iter().filter_map(|id| self.by_id.get(id))
    }

    fn active(&self) -> impl Iterator<Item = &E> {
        self.records(&self.order).filter(|r| !r.is_deleted())
    }
}

/// Same folding as the store's `TRIM(name) ... COLLATE NOCASE`: spaces
/// trimmed, ASCII letters folded, everything else compared as-is.
fn name_key(name: &str) -> String {
    name.trim_matches(' ').to_ascii_lowercase()
}

fn category_key<E: Entity>(record: &E) -> String {
    record
        .category_key()
        .unwrap_or_else(|| UNCATEGORIZED.to_string())
}

// =============================================================================
// Cache
// =============================================================================

/// Refreshable read cache for one entity kind.
///
/// Owned by the [`crate::catalog::Catalog`] and shared with the services
/// through `Arc`.
#[derive(Debug)]
pub struct EntityCache<E: Entity> {
    repository: Repository<E>,
    snapshot: RwLock<Arc<Snapshot<E>>>,
    refresh_gate: Mutex<()>,
    loaded: AtomicBool,
    stale: AtomicBool,
    generation: AtomicU64,
}

impl<E: Entity> EntityCache<E> {
    /// An empty, unloaded cache.
    pub fn new(repository: Repository<E>) -> Self {
        EntityCache {
            repository,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            refresh_gate: Mutex::new(()),
            loaded: AtomicBool::new(false),
            stale: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// First load. Does nothing if the cache is already loaded.
    pub async fn init(&self) -> DbResult<()> {
        if self.is_loaded() {
            return Ok(());
        }
        self.refresh().await.map(|_| ())
    }

    /// Reloads every row and swaps in the new snapshot.
    ///
    /// Refreshes are serialized. On failure the previous snapshot stays in
    /// place and the cache is marked stale. Returns the number of records
    /// loaded.
    pub async fn refresh(&self) -> DbResult<usize> {
        let _gate = self.refresh_gate.lock().await;

        // An invalidate() that lands while we load marks the new snapshot stale again
        self.stale.store(false, Ordering::SeqCst);

        let rows = match self.repository.list_all().await {
            Ok(rows) => rows,
            Err(err) => {
                self.stale.store(true, Ordering::SeqCst);
                warn!(entity = E::ENTITY, error = %err, "Cache refresh failed");
                return Err(err);
            }
        };

        let snapshot = Arc::new(Snapshot::build(rows));
        let count = snapshot.by_id.len();

        *self.snapshot.write().await = snapshot;
        self.loaded.store(true, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        debug!(entity = E::ENTITY, count, generation, "Cache refreshed");
        Ok(count)
    }

    /// Marks the snapshot out of date.
    pub fn invalidate(&self) {
        self.stale.store(true, Ordering::SeqCst);
        debug!(entity = E::ENTITY, "Cache invalidated");
    }

    /// Drops the snapshot and returns to the unloaded state.
    pub async fn clear(&self) {
        let _gate = self.refresh_gate.lock().await;
        *self.snapshot.write().await = Arc::new(Snapshot::default());
        self.loaded.store(false, Ordering::SeqCst);
        self.stale.store(false, Ordering::SeqCst);
        info!(entity = E::ENTITY, "Cache cleared");
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    /// True when the next read should refresh first.
    pub fn needs_refresh(&self) -> bool {
        !self.is_loaded() || self.is_stale()
    }

    /// Number of completed refreshes.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    async fn current(&self) -> Arc<Snapshot<E>> {
        self.snapshot.read().await.clone()
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Any cached record with this id, soft-deleted or not.
    pub async fn by_id(&self, id: i64) -> Option<E> {
        self.current().await.by_id.get(&id).cloned()
    }

    /// The active record with this name (trimmed, ASCII case-insensitive).
    pub async fn by_name(&self, name: &str) -> Option<E> {
        let snapshot = self.current().await;
        let ids = snapshot.by_name.get(&name_key(name))?;
        let found = snapshot.records(ids).find(|r| !r.is_deleted()).cloned();
        found
    }

    /// Every record with this name, soft-deleted ones included.
    pub async fn all_by_name(&self, name: &str) -> Vec<E> {
        let snapshot = self.current().await;
        match snapshot.by_name.get(&name_key(name)) {
            Some(ids) => snapshot.records(ids).cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn all_active(&self) -> Vec<E> {
        self.current().await.active().cloned().collect()
    }

    /// The recycle bin: every soft-deleted record.
    pub async fn all_deleted(&self) -> Vec<E> {
        let snapshot = self.current().await;
        snapshot
            .records(&snapshot.order)
            .filter(|r| r.is_deleted())
            .cloned()
            .collect()
    }

    /// Active records under one category key.
    pub async fn by_category(&self, key: &str) -> Vec<E> {
        let snapshot = self.current().await;
        match snapshot.by_category.get(key) {
            Some(ids) => snapshot.records(ids).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Case-insensitive substring match over name and description of active
    /// records, optionally narrowed to one category. A blank term matches
    /// everything.
    pub async fn search(&self, term: &str, category: Option<&str>) -> Vec<E> {
        let snapshot = self.current().await;
        let needle = term.trim().to_lowercase();

        snapshot
            .active()
            .filter(|r| category.map_or(true, |c| category_key(*r) == c))
            .filter(|r| {
                needle.is_empty()
                    || r.name().to_lowercase().contains(&needle)
                    || r.description()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    /// Active record counts per category key.
    pub async fn count_by_category(&self) -> BTreeMap<String, usize> {
        self.current()
            .await
            .by_category
            .iter()
            .map(|(key, ids)| (key.clone(), ids.len()))
            .collect()
    }

    /// Number of cached records, soft-deleted ones included.
    pub async fn len(&self) -> usize {
        self.current().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Params;
    use crate::repository::tests::executor;
    use chrono::Utc;
    use depot_core::{Lifecycle, Location, LocationDraft, LocationKind, Supplier, SupplierDraft};
    use std::collections::HashSet;

    async fn seeded() -> (Repository<Location>, EntityCache<Location>) {
        let repo = Repository::<Location>::new(executor().await);
        for (name, kind, description) in [
            ("Main Warehouse", LocationKind::Warehouse, Some("Bulk pallets")),
            ("Harbour Store", LocationKind::Store, None),
            ("City Store", LocationKind::Store, Some("Next to the harbour")),
        ] {
            let mut draft = LocationDraft::new(name, kind);
            draft.description = description.map(str::to_string);
            repo.insert(&draft, Utc::now()).await.unwrap();
        }
        let cache = EntityCache::new(repo.clone());
        (repo, cache)
    }

    async fn soft_delete(repo: &Repository<Location>, id: i64) {
        let now = Utc::now();
        repo.transition(id, &Lifecycle::Active, &Lifecycle::SoftDeleted { deleted_at: now }, now)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_starts_unloaded_and_init_loads() {
        let (_repo, cache) = seeded().await;
        assert!(!cache.is_loaded());
        assert!(cache.needs_refresh());
        assert!(cache.all_active().await.is_empty());

        cache.init().await.unwrap();
        assert!(cache.is_loaded());
        assert_eq!(cache.generation(), 1);
        assert_eq!(cache.len().await, 3);

        // init is idempotent
        cache.init().await.unwrap();
        assert_eq!(cache.generation(), 1);
    }

    #[tokio::test]
    async fn test_all_active_matches_store_after_refresh() {
        let (repo, cache) = seeded().await;
        let doomed = repo.get(2, false).await.unwrap().unwrap();
        soft_delete(&repo, doomed.id).await;

        cache.refresh().await.unwrap();

        let stored: Vec<Location> = repo
            .executor()
            .query("SELECT * FROM locations WHERE is_deleted = 0", &Params::new())
            .await
            .unwrap();
        let expected: HashSet<i64> = stored.iter().map(|l| l.id).collect();
        let cached: HashSet<i64> = cache.all_active().await.iter().map(|l| l.id).collect();
        assert_eq!(cached, expected);

        let deleted = cache.all_deleted().await;
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, doomed.id);
    }

    #[tokio::test]
    async fn test_lookups() {
        let (_repo, cache) = seeded().await;
        cache.init().await.unwrap();

        let found = cache.by_name("  main WAREHOUSE").await.unwrap();
        assert_eq!(found.kind, LocationKind::Warehouse);
        assert_eq!(cache.by_id(found.id).await.unwrap().name, "Main Warehouse");
        assert!(cache.by_name("Nowhere").await.is_none());

        assert_eq!(cache.by_category("store").await.len(), 2);

        // name and description both searched
        let hits = cache.search("HARBOUR", None).await;
        assert_eq!(hits.len(), 2);
        let hits = cache.search("harbour", Some("warehouse")).await;
        assert!(hits.is_empty());
        assert_eq!(cache.search("", None).await.len(), 3);

        let counts = cache.count_by_category().await;
        assert_eq!(counts.get("store"), Some(&2));
        assert_eq!(counts.get("warehouse"), Some(&1));
    }

    #[tokio::test]
    async fn test_deleted_names_keep_several_ids() {
        let (repo, cache) = seeded().await;
        let original = repo.get(1, false).await.unwrap().unwrap();
        soft_delete(&repo, original.id).await;
        let replacement = repo
            .insert(&LocationDraft::new("Main Warehouse", LocationKind::Warehouse), Utc::now())
            .await
            .unwrap();

        cache.refresh().await.unwrap();

        assert_eq!(cache.by_name("Main Warehouse").await.unwrap().id, replacement);
        assert_eq!(cache.all_by_name("main warehouse").await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_category_counts_as_uncategorized() {
        let repo = Repository::<Supplier>::new(executor().await);
        for (name, country) in [("Acme", Some("NL")), ("Globex", None), ("Initech", None)] {
            let draft = SupplierDraft {
                name: name.into(),
                country: country.map(str::to_string),
                ..Default::default()
            };
            repo.insert(&draft, Utc::now()).await.unwrap();
        }
        let cache = EntityCache::new(repo);
        cache.init().await.unwrap();

        let counts = cache.count_by_category().await;
        assert_eq!(counts.get(UNCATEGORIZED), Some(&2));
        assert_eq!(counts.get("NL"), Some(&1));
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let (_repo, cache) = seeded().await;
        cache.init().await.unwrap();
        assert!(!cache.needs_refresh());

        cache.invalidate();
        assert!(cache.is_stale());
        assert!(cache.needs_refresh());
        // Readers still see the previous snapshot
        assert_eq!(cache.all_active().await.len(), 3);

        cache.refresh().await.unwrap();
        assert!(!cache.is_stale());

        cache.clear().await;
        assert!(!cache.is_loaded());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_snapshot_and_marks_stale() {
        let db = crate::pool::Database::new(crate::pool::DbConfig::in_memory())
            .await
            .unwrap();
        let repo = Repository::<Location>::new(crate::executor::TransactionalExecutor::new(
            &db,
            crate::retry::RetryPolicy::no_retry(),
        ));
        repo.insert(&LocationDraft::new("Dock", LocationKind::Transit), Utc::now())
            .await
            .unwrap();
        let cache = EntityCache::new(repo);
        cache.init().await.unwrap();

        db.close().await;

        assert!(cache.refresh().await.is_err());
        assert!(cache.is_stale());
        assert_eq!(cache.generation(), 1);
        assert_eq!(cache.by_name("dock").await.unwrap().name, "Dock");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refreshes_are_serialized() {
        let (_repo, cache) = seeded().await;
        let cache = Arc::new(cache);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.refresh().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 3);
        }

        assert_eq!(cache.generation(), 8);
        assert_eq!(cache.all_active().await.len(), 3);
    }

    #[tokio::test]
    async fn test_refresh_waits_for_gate() {
        let (_repo, cache) = seeded().await;
        let cache = Arc::new(cache);

        let gate = cache.refresh_gate.lock().await;
        let mut pending = tokio::spawn({
            let cache = cache.clone();
            async move { cache.refresh().await }
        });

        // Blocked behind the held gate
        let waited = tokio::time::timeout(std::time::Duration::from_millis(200), &mut pending).await;
        assert!(waited.is_err());
        assert_eq!(cache.generation(), 0);
        assert!(!cache.is_loaded());

        drop(gate);
        assert_eq!(pending.await.unwrap().unwrap(), 3);
        assert_eq!(cache.generation(), 1);
    }

    #[tokio::test]
    async fn test_name_index_folds_like_the_store() {
        let repo = Repository::<Location>::new(executor().await);
        let upper = repo
            .insert(&LocationDraft::new("Ångström Dock", LocationKind::Transit), Utc::now())
            .await
            .unwrap();
        // NOCASE leaves non-ASCII letters alone, so the store accepts both
        let lower = repo
            .insert(&LocationDraft::new("ångström dock", LocationKind::Transit), Utc::now())
            .await
            .unwrap();
        assert!(!repo.name_taken("ÅNGSTRÖM DOCK", None, false).await.unwrap());

        let cache = EntityCache::new(repo);
        cache.init().await.unwrap();

        assert_eq!(cache.by_name("Ångström DOCK").await.unwrap().id, upper);
        assert_eq!(cache.by_name("ångström DOCK").await.unwrap().id, lower);
        assert_eq!(cache.all_by_name("ÅNGSTRÖM dock").await.len(), 0);
        assert_eq!(cache.all_by_name(" ångström dock ").await.len(), 1);
    }
}
