//! # Repository Module
//!
//! SQL for every entity kind, executed through the [`TransactionalExecutor`].
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One Repository, Five Kinds                           │
//! │                                                                         │
//! │  Location / Supplier / Category / Product / Order                       │
//! │       │ impl Entity                                                     │
//! │       │   kind()          → static EntityKind (table, columns, ...)     │
//! │       │   insert_params() → business column values of a draft          │
//! │       │   update_params() → business column values of a record         │
//! │       ▼                                                                 │
//! │  Repository<E>                                                          │
//! │  ├── get / list_all / count / page                                      │
//! │  ├── name_taken                                                         │
//! │  ├── insert / update (version-checked)                                  │
//! │  ├── transition (conditional on previous delete state)                  │
//! │  ├── count_dependents                                                   │
//! │  └── purge (transaction: re-check state + dependents, then DELETE)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  TransactionalExecutor ──► SQLite                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Kinds
//!
//! - [`location`] - Locations (grouped by kind)
//! - [`supplier`] - Suppliers (grouped by country)
//! - [`category`] - Categories (grouped by parent)
//! - [`product`] - Products (grouped by category)
//! - [`order`] - Purchase orders (grouped by status)

pub mod category;
pub mod location;
pub mod order;
pub mod product;
pub mod supplier;

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use depot_core::{Draft, Lifecycle, Record};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::executor::{execute_on, scalar_on, Params, Statement, TransactionalExecutor};

// =============================================================================
// Entity Description
// =============================================================================

/// A column in another table that references this kind's `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependent {
    pub table: &'static str,
    pub column: &'static str,
}

/// Static description of one entity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityKind {
    pub table: &'static str,
    /// Display label, e.g. "Location".
    pub label: &'static str,
    /// The column holding the unique business name.
    pub name_column: &'static str,
    /// The column records are grouped by, if any.
    pub category_column: Option<&'static str>,
    /// Business columns, in the order `insert_params`/`update_params` bind them.
    pub columns: &'static [&'static str],
    /// Rows that block deleting a record of this kind.
    pub dependents: &'static [Dependent],
}

/// A record kind the repository knows how to store.
pub trait Entity: Record + for<'r> FromRow<'r, SqliteRow> + Unpin + std::fmt::Debug {
    type Draft: Draft;

    fn kind() -> &'static EntityKind;

    /// Values for [`EntityKind::columns`], taken from a draft.
    fn insert_params(draft: &Self::Draft) -> Params;

    /// Values for [`EntityKind::columns`], taken from this record.
    fn update_params(&self) -> Params;

    /// The editable fields of this record, for re-running field rules.
    fn to_draft(&self) -> Self::Draft;
}

// =============================================================================
// Paging
// =============================================================================

/// Which slice of a kind to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Zero-based page index.
    pub page: u32,
    pub page_size: u32,
    pub include_deleted: bool,
    /// Restricts rows to one category value.
    pub category: Option<String>,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        PageRequest {
            page,
            page_size,
            include_deleted: false,
            category: None,
        }
    }

    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest::new(0, 50)
    }
}

/// One page of records plus the total matching count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        let size = i64::from(self.page_size);
        ((self.total + size - 1) / size) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page + 1 < self.total_pages()
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Store access for one entity kind.
#[derive(Debug)]
pub struct Repository<E> {
    executor: TransactionalExecutor,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Repository {
            executor: self.executor.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(executor: TransactionalExecutor) -> Self {
        Repository {
            executor,
            _entity: PhantomData,
        }
    }

    pub fn executor(&self) -> &TransactionalExecutor {
        &self.executor
    }

    fn kind(&self) -> &'static EntityKind {
        E::kind()
    }

    /// Fetches one record; soft-deleted rows only when `include_deleted`.
    pub async fn get(&self, id: i64, include_deleted: bool) -> DbResult<Option<E>> {
        let kind = self.kind();
        let sql = format!(
            "SELECT * FROM {} WHERE id = ?1{}",
            kind.table,
            active_filter(include_deleted, "AND")
        );
        self.executor
            .query_single_or_default(&sql, &Params::new().bind(id))
            .await
    }

    /// Every row of the table, soft-deleted ones included.
    pub async fn list_all(&self) -> DbResult<Vec<E>> {
        let sql = format!("SELECT * FROM {} ORDER BY id", self.kind().table);
        let rows: Vec<E> = self.executor.query(&sql, &Params::new()).await?;
        debug!(entity = E::ENTITY, count = rows.len(), "Loaded all rows");
        Ok(rows)
    }

    pub async fn count(&self, include_deleted: bool) -> DbResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            self.kind().table,
            active_filter(include_deleted, "WHERE")
        );
        self.executor.scalar(&sql, &Params::new()).await
    }

    /// True when another row already uses `name` (trimmed, case-insensitive).
    ///
    /// Soft-deleted rows count only when `include_deleted`.
    pub async fn name_taken(
        &self,
        name: &str,
        exclude_id: Option<i64>,
        include_deleted: bool,
    ) -> DbResult<bool> {
        let kind = self.kind();
        let sql = format!(
            "SELECT COUNT(*) FROM {table} \
             WHERE TRIM({column}) = TRIM(?1) COLLATE NOCASE \
             AND (?2 IS NULL OR id <> ?2){filter}",
            table = kind.table,
            column = kind.name_column,
            filter = active_filter(include_deleted, "AND"),
        );
        let count: i64 = self
            .executor
            .scalar(&sql, &Params::new().bind(name).bind(exclude_id))
            .await?;
        Ok(count > 0)
    }

    /// Inserts a new active row and returns its store-assigned id.
    pub async fn insert(&self, draft: &E::Draft, now: DateTime<Utc>) -> DbResult<i64> {
        let kind = self.kind();
        let params = E::insert_params(draft);
        let n = kind.columns.len();

        let placeholders: Vec<String> = (1..=n).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {table} ({columns}, is_deleted, deleted_at, version, created_at, updated_at) \
             VALUES ({values}, 0, NULL, 1, ?{ts}, ?{ts}) RETURNING id",
            table = kind.table,
            columns = kind.columns.join(", "),
            values = placeholders.join(", "),
            ts = n + 1,
        );

        let id: i64 = self.executor.scalar(&sql, &params.bind(now)).await?;
        info!(entity = E::ENTITY, id, name = draft.name(), "Created");
        Ok(id)
    }

    /// Writes the business columns of `record`.
    ///
    /// Applies only if the stored row is active and still at
    /// `record.version()`; returns false otherwise.
    pub async fn update(&self, record: &E, now: DateTime<Utc>) -> DbResult<bool> {
        let kind = self.kind();
        let n = kind.columns.len();

        let assignments: Vec<String> = kind
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect();
        let sql = format!(
            "UPDATE {table} SET {assignments}, version = version + 1, updated_at = ?{ts} \
             WHERE id = ?{id} AND version = ?{version} AND is_deleted = 0",
            table = kind.table,
            assignments = assignments.join(", "),
            ts = n + 1,
            id = n + 2,
            version = n + 3,
        );

        let params = record
            .update_params()
            .bind(now)
            .bind(record.id())
            .bind(record.version());
        let affected = self.executor.command(&sql, &params).await?;

        if affected == 1 {
            info!(entity = E::ENTITY, id = record.id(), "Updated");
        }
        Ok(affected == 1)
    }

    /// Persists a lifecycle change.
    ///
    /// Applies only if the stored delete flag still matches `from`; returns
    /// false when another writer got there first.
    pub async fn transition(
        &self,
        id: i64,
        from: &Lifecycle,
        to: &Lifecycle,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let (was_deleted, _) = from.to_columns()?;
        let (is_deleted, deleted_at) = to.to_columns()?;

        let sql = format!(
            "UPDATE {} SET is_deleted = ?1, deleted_at = ?2, version = version + 1, updated_at = ?3 \
             WHERE id = ?4 AND is_deleted = ?5",
            self.kind().table
        );
        let params = Params::new()
            .bind(is_deleted)
            .bind(deleted_at)
            .bind(now)
            .bind(id)
            .bind(was_deleted);

        let affected = self.executor.command(&sql, &params).await?;
        if affected == 1 {
            info!(entity = E::ENTITY, id, from = from.name(), to = to.name(), "Lifecycle changed");
        }
        Ok(affected == 1)
    }

    /// Rows referencing `id` across every dependent table.
    ///
    /// `active_only` skips soft-deleted referencing rows.
    pub async fn count_dependents(&self, id: i64, active_only: bool) -> DbResult<i64> {
        let kind = self.kind();
        if kind.dependents.is_empty() {
            return Ok(0);
        }

        let statements: Vec<Statement> = kind
            .dependents
            .iter()
            .map(|dep| Statement::new(dependent_count_sql(dep, active_only), Params::new().bind(id)))
            .collect();

        self.executor
            .multi_query("count_dependents", &statements, |sets| {
                let mut total = 0i64;
                while sets.remaining() > 0 {
                    total += sets.read_scalar::<i64>()?;
                }
                Ok(total)
            })
            .await
    }

    /// Physically deletes a soft-deleted, unreferenced row.
    ///
    /// State and dependents are re-checked inside the deleting transaction.
    pub async fn purge(&self, id: i64) -> DbResult<()> {
        let kind = self.kind();

        self.executor
            .run_in_transaction("purge", move |conn| {
                Box::pin(async move {
                    let state_sql = format!("SELECT is_deleted FROM {} WHERE id = ?1", kind.table);
                    let is_deleted: Option<bool> =
                        sqlx::query_scalar(&state_sql).bind(id).fetch_optional(&mut *conn).await?;

                    match is_deleted {
                        None => return Err(DbError::not_found(kind.label, id)),
                        Some(false) => {
                            return Err(DbError::InvalidState(format!(
                                "{} {} must be deleted before it can be purged",
                                kind.label, id
                            )))
                        }
                        Some(true) => {}
                    }

                    let mut referencing = 0i64;
                    for dep in kind.dependents {
                        let count: i64 =
                            scalar_on(conn, &dependent_count_sql(dep, false), &Params::new().bind(id)).await?;
                        referencing += count;
                    }
                    if referencing > 0 {
                        return Err(DbError::HasDependents {
                            entity: kind.label.to_string(),
                            id,
                            count: referencing,
                        });
                    }

                    let delete_sql = format!("DELETE FROM {} WHERE id = ?1 AND is_deleted = 1", kind.table);
                    execute_on(conn, &delete_sql, &Params::new().bind(id)).await?;
                    Ok(())
                })
            })
            .await?;

        info!(entity = E::ENTITY, id, "Purged");
        Ok(())
    }

    /// One page ordered by name, plus the total, read in one batch.
    pub async fn page(&self, request: &PageRequest) -> DbResult<Page<E>> {
        let kind = self.kind();

        let mut conditions: Vec<String> = Vec::new();
        let mut filter_params = Params::new();
        if !request.include_deleted {
            conditions.push("is_deleted = 0".to_string());
        }
        if let (Some(column), Some(category)) = (kind.category_column, request.category.as_deref()) {
            filter_params = filter_params.bind(category);
            conditions.push(format!("{} = ?{}", column, filter_params.len()));
        }
        let filter = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let limit_at = filter_params.len() + 1;
        let rows = Statement::new(
            format!(
                "SELECT * FROM {table}{filter} ORDER BY {name} COLLATE NOCASE, id LIMIT ?{limit} OFFSET ?{offset}",
                table = kind.table,
                filter = filter,
                name = kind.name_column,
                limit = limit_at,
                offset = limit_at + 1,
            ),
            filter_params
                .clone()
                .bind(request.page_size)
                .bind(request.offset()),
        );
        let total = Statement::new(format!("SELECT COUNT(*) FROM {}{}", kind.table, filter), filter_params);

        let (items, total) = self
            .executor
            .multi_query("page", &[rows, total], |sets| {
                Ok((sets.read::<E>()?, sets.read_scalar::<i64>()?))
            })
            .await?;

        Ok(Page {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
        })
    }
}

fn active_filter(include_deleted: bool, keyword: &str) -> String {
    if include_deleted {
        String::new()
    } else {
        format!(" {} is_deleted = 0", keyword)
    }
}

fn dependent_count_sql(dep: &Dependent, active_only: bool) -> String {
    format!(
        "SELECT COUNT(*) FROM {} WHERE {} = ?1{}",
        dep.table,
        dep.column,
        active_filter(!active_only, "AND")
    )
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::retry::RetryPolicy;
    use depot_core::{
        Category, CategoryDraft, Location, LocationDraft, LocationKind, Product, ProductDraft,
        LifecycleEvent,
    };

    pub(crate) async fn executor() -> TransactionalExecutor {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        TransactionalExecutor::new(&db, RetryPolicy::no_retry())
    }

    async fn soft_delete<E: Entity>(repo: &Repository<E>, id: i64) {
        let now = Utc::now();
        let next = Lifecycle::Active
            .apply(LifecycleEvent::SoftDelete { at: now })
            .unwrap();
        assert!(repo.transition(id, &Lifecycle::Active, &next, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_get_and_version() {
        let repo = Repository::<Location>::new(executor().await);
        let id = repo
            .insert(&LocationDraft::new("Main Warehouse", LocationKind::Warehouse), Utc::now())
            .await
            .unwrap();

        let location = repo.get(id, false).await.unwrap().unwrap();
        assert_eq!(location.name, "Main Warehouse");
        assert_eq!(location.version, 1);
        assert!(location.lifecycle.is_active());
    }

    #[tokio::test]
    async fn test_update_is_version_checked() {
        let repo = Repository::<Location>::new(executor().await);
        let id = repo
            .insert(&LocationDraft::new("Dock", LocationKind::Transit), Utc::now())
            .await
            .unwrap();

        let mut location = repo.get(id, false).await.unwrap().unwrap();
        location.address = Some("Pier 9".into());
        assert!(repo.update(&location, Utc::now()).await.unwrap());

        // Same (now outdated) version again
        location.address = Some("Pier 10".into());
        assert!(!repo.update(&location, Utc::now()).await.unwrap());

        let stored = repo.get(id, false).await.unwrap().unwrap();
        assert_eq!(stored.address.as_deref(), Some("Pier 9"));
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_name_taken_respects_deleted_flag() {
        let repo = Repository::<Location>::new(executor().await);
        let id = repo
            .insert(&LocationDraft::new("Main Warehouse", LocationKind::Warehouse), Utc::now())
            .await
            .unwrap();

        assert!(repo.name_taken("main warehouse ", None, false).await.unwrap());
        assert!(!repo.name_taken("Main Warehouse", Some(id), false).await.unwrap());

        soft_delete(&repo, id).await;
        assert!(!repo.name_taken("Main Warehouse", None, false).await.unwrap());
        assert!(repo.name_taken("Main Warehouse", None, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_transition_is_conditional() {
        let repo = Repository::<Location>::new(executor().await);
        let id = repo
            .insert(&LocationDraft::new("Yard", LocationKind::Other), Utc::now())
            .await
            .unwrap();

        soft_delete(&repo, id).await;

        // A second soft delete from "Active" no longer matches the row
        let now = Utc::now();
        let next = Lifecycle::SoftDeleted { deleted_at: now };
        assert!(!repo.transition(id, &Lifecycle::Active, &next, now).await.unwrap());

        let stored = repo.get(id, true).await.unwrap().unwrap();
        assert!(stored.lifecycle.is_deleted());
        assert!(stored.lifecycle.deleted_at().is_some());
        assert!(repo.get(id, false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dependents_and_purge() {
        let executor = executor().await;
        let categories = Repository::<Category>::new(executor.clone());
        let products = Repository::<Product>::new(executor);

        let category_id = categories
            .insert(
                &CategoryDraft {
                    name: "Fasteners".into(),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();
        let product_id = products
            .insert(
                &ProductDraft {
                    sku: "BOLT-M8".into(),
                    name: "M8 bolt".into(),
                    category_id: Some(category_id),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(categories.count_dependents(category_id, true).await.unwrap(), 1);

        // Not soft-deleted yet
        let err = categories.purge(category_id).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidState(_)));

        soft_delete(&categories, category_id).await;
        soft_delete(&products, product_id).await;

        // Soft-deleted product no longer blocks a soft delete, but still blocks a purge
        assert_eq!(categories.count_dependents(category_id, true).await.unwrap(), 0);
        assert_eq!(categories.count_dependents(category_id, false).await.unwrap(), 1);
        let err = categories.purge(category_id).await.unwrap_err();
        assert!(matches!(err, DbError::HasDependents { count: 1, .. }));

        products.purge(product_id).await.unwrap();
        categories.purge(category_id).await.unwrap();
        assert!(categories.get(category_id, true).await.unwrap().is_none());

        let err = categories.purge(category_id).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_page_and_count() {
        let repo = Repository::<Location>::new(executor().await);
        for (name, kind) in [
            ("Charlie", LocationKind::Store),
            ("alpha", LocationKind::Warehouse),
            ("Bravo", LocationKind::Store),
            ("Delta", LocationKind::Store),
        ] {
            repo.insert(&LocationDraft::new(name, kind), Utc::now()).await.unwrap();
        }

        let first = repo.page(&PageRequest::new(0, 3)).await.unwrap();
        let names: Vec<&str> = first.items.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "Bravo", "Charlie"]);
        assert_eq!(first.total, 4);
        assert_eq!(first.total_pages(), 2);
        assert!(first.has_next());

        let stores = repo.page(&PageRequest::new(0, 10).category("store")).await.unwrap();
        assert_eq!(stores.total, 3);
        assert_eq!(stores.items.len(), 3);

        assert_eq!(repo.count(false).await.unwrap(), 4);
    }
}
