//! # Transactional Executor
//!
//! Every unit of store work goes through here: single statements, scalars,
//! row lists, multi-result batches and caller-defined transactions. Each call
//! is wrapped by the [`RetryPolicy`].
//!
//! ## Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    TransactionalExecutor call                           │
//! │                                                                         │
//! │  RetryPolicy::execute_cancellable ─────────────────────────────┐        │
//! │  │                                                             │        │
//! │  │   acquire connection ──► BEGIN ──► work ──► COMMIT          │        │
//! │  │          │                          │                       │        │
//! │  │          │                          └─ Err ──► ROLLBACK     │        │
//! │  │          ▼                                                  │        │
//! │  │   connection returned to the pool on every exit path        │        │
//! │  │   (including cancellation: dropping a Transaction rolls     │        │
//! │  │    it back)                                                 │        │
//! │  └─────────────────────── transient failure? retry ────────────┘        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Parameters
//! Statements use numbered placeholders (`?1`, `?2`, ...) bound from a
//! [`Params`] bundle:
//! ```rust,ignore
//! let rows: Vec<Location> = executor
//!     .query(
//!         "SELECT * FROM locations WHERE kind = ?1 AND is_deleted = ?2",
//!         &Params::new().bind("warehouse").bind(false),
//!     )
//!     .await?;
//! ```

use std::collections::VecDeque;
use std::future::Future;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Arguments, Decode, FromRow, Row, Sqlite, SqliteConnection, SqlitePool, Type};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::retry::{CancelSignal, RetryPolicy};

// =============================================================================
// Parameters
// =============================================================================

/// A single bound value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(value.clone())
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Ordered parameter bundle; the n-th value binds to `?n`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<SqlValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next positional value.
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.0.push(value.into());
        self
    }

    /// Appends every value of `other`.
    pub fn extend(mut self, other: Params) -> Self {
        self.0.extend(other.0);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.0
    }

    fn to_arguments<'q>(&self) -> DbResult<SqliteArguments<'q>> {
        let mut args = SqliteArguments::default();

        for value in &self.0 {
            let added = match value {
                SqlValue::Null => args.add(Option::<i64>::None),
                SqlValue::Bool(v) => args.add(*v),
                SqlValue::Int(v) => args.add(*v),
                SqlValue::Real(v) => args.add(*v),
                SqlValue::Text(v) => args.add(v.clone()),
                SqlValue::Timestamp(v) => args.add(*v),
            };
            added.map_err(|e| DbError::Internal(format!("Failed to bind parameter: {}", e)))?;
        }

        Ok(args)
    }
}

impl From<Vec<SqlValue>> for Params {
    fn from(values: Vec<SqlValue>) -> Self {
        Params(values)
    }
}

/// One statement of a [`TransactionalExecutor::multi_query`] batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Params,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Params) -> Self {
        Statement {
            sql: sql.into(),
            params,
        }
    }
}

// =============================================================================
// Result Sets
// =============================================================================

/// The result sets of a multi-statement batch, consumed in statement order.
pub struct ResultSets {
    sets: VecDeque<Vec<SqliteRow>>,
}

impl std::fmt::Debug for ResultSets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lens: Vec<usize> = self.sets.iter().map(Vec::len).collect();
        f.debug_struct("ResultSets").field("set_row_counts", &lens).finish()
    }
}

impl ResultSets {
    fn new(sets: Vec<Vec<SqliteRow>>) -> Self {
        ResultSets { sets: sets.into() }
    }

    /// Number of result sets not consumed yet.
    pub fn remaining(&self) -> usize {
        self.sets.len()
    }

    fn next_set(&mut self) -> DbResult<Vec<SqliteRow>> {
        self.sets
            .pop_front()
            .ok_or_else(|| DbError::Internal("Read past the last result set".to_string()))
    }

    /// Maps every row of the next set.
    pub fn read<T>(&mut self) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow>,
    {
        let rows = self.next_set()?;
        let mapped = rows.iter().map(T::from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(mapped)
    }

    /// The first row of the next set, if any.
    pub fn read_single_or_default<T>(&mut self) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow>,
    {
        let rows = self.next_set()?;
        match rows.first() {
            Some(row) => Ok(Some(T::from_row(row)?)),
            None => Ok(None),
        }
    }

    /// The first column of the first row of the next set.
    pub fn read_scalar<T>(&mut self) -> DbResult<T>
    where
        T: for<'r> Decode<'r, Sqlite> + Type<Sqlite>,
    {
        let rows = self.next_set()?;
        let row = rows.first().ok_or(sqlx::Error::RowNotFound)?;
        Ok(row.try_get::<T, _>(0)?)
    }
}

// =============================================================================
// Connection-level helpers (for use inside run_in_transaction)
// =============================================================================

/// Executes one statement on `conn`, returning the affected row count.
pub async fn execute_on(conn: &mut SqliteConnection, sql: &str, params: &Params) -> DbResult<u64> {
    let done = sqlx::query_with(sql, params.to_arguments()?)
        .execute(&mut *conn)
        .await?;
    Ok(done.rows_affected())
}

/// Fetches at most one row on `conn`.
pub async fn fetch_optional_on<T>(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &Params,
) -> DbResult<Option<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let row = sqlx::query_as_with::<_, T, _>(sql, params.to_arguments()?)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Fetches a single scalar on `conn`.
pub async fn scalar_on<T>(conn: &mut SqliteConnection, sql: &str, params: &Params) -> DbResult<T>
where
    (T,): for<'r> FromRow<'r, SqliteRow>,
    T: Send + Unpin,
{
    let value = sqlx::query_scalar_with::<_, T, _>(sql, params.to_arguments()?)
        .fetch_one(&mut *conn)
        .await?;
    Ok(value)
}

// =============================================================================
// Executor
// =============================================================================

/// Runs units of work against the pool, each wrapped by the retry policy.
///
/// Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct TransactionalExecutor {
    pool: SqlitePool,
    retry: RetryPolicy,
    cancel: Option<CancelSignal>,
}

impl TransactionalExecutor {
    pub fn new(database: &Database, retry: RetryPolicy) -> Self {
        TransactionalExecutor {
            pool: database.pool().clone(),
            retry,
            cancel: None,
        }
    }

    /// A copy of this executor whose calls abort when `signal` fires.
    pub fn cancellable(&self, signal: CancelSignal) -> Self {
        TransactionalExecutor {
            cancel: Some(signal),
            ..self.clone()
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run<T, F, Fut>(&self, label: &str, op: F) -> DbResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        debug!(op = label, "Executing");
        self.retry
            .execute_cancellable(label, op, self.cancel.as_ref())
            .await
    }

    /// Executes one statement and returns the affected row count.
    pub async fn command(&self, sql: &str, params: &Params) -> DbResult<u64> {
        let pool = &self.pool;
        self.run(sql, move || async move {
            let done = sqlx::query_with(sql, params.to_arguments()?)
                .execute(pool)
                .await?;
            Ok(done.rows_affected())
        })
        .await
    }

    /// Fetches every row.
    pub async fn query<T>(&self, sql: &str, params: &Params) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let pool = &self.pool;
        self.run(sql, move || async move {
            let rows = sqlx::query_as_with::<_, T, _>(sql, params.to_arguments()?)
                .fetch_all(pool)
                .await?;
            Ok(rows)
        })
        .await
    }

    /// Fetches the first row, or `None` when there is none.
    pub async fn query_single_or_default<T>(&self, sql: &str, params: &Params) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let pool = &self.pool;
        self.run(sql, move || async move {
            let row = sqlx::query_as_with::<_, T, _>(sql, params.to_arguments()?)
                .fetch_optional(pool)
                .await?;
            Ok(row)
        })
        .await
    }

    /// Fetches the first column of the first row.
    pub async fn scalar<T>(&self, sql: &str, params: &Params) -> DbResult<T>
    where
        (T,): for<'r> FromRow<'r, SqliteRow>,
        T: Send + Unpin,
    {
        let pool = &self.pool;
        self.run(sql, move || async move {
            let value = sqlx::query_scalar_with::<_, T, _>(sql, params.to_arguments()?)
                .fetch_one(pool)
                .await?;
            Ok(value)
        })
        .await
    }

    /// Runs `work` inside one transaction on one connection.
    ///
    /// Commits when `work` returns `Ok`, rolls back otherwise. `work` may be
    /// called again on a transient failure, so it must not move captured
    /// state into its future; clone what it needs.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let moved = executor
    ///     .run_in_transaction("move_stock", move |conn| {
    ///         let (from, to) = (from.clone(), to.clone());
    ///         Box::pin(async move {
    ///             execute_on(conn, TAKE_SQL, &from).await?;
    ///             execute_on(conn, GIVE_SQL, &to).await
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn run_in_transaction<T, F>(&self, label: &str, work: F) -> DbResult<T>
    where
        F: for<'c> Fn(&'c mut SqliteConnection) -> BoxFuture<'c, DbResult<T>> + Send + Sync,
        T: Send,
    {
        let pool = &self.pool;
        let work = &work;
        self.run(label, move || async move {
            let mut tx = pool
                .begin()
                .await
                .map_err(|e| begin_failed(label, e))?;

            match work(&mut *tx).await {
                Ok(value) => {
                    tx.commit().await.map_err(|e| commit_failed(label, e))?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(op = label, error = %rollback_err, "Rollback failed");
                    }
                    Err(err)
                }
            }
        })
        .await
    }

    /// Runs a batch of statements on one connection inside one transaction
    /// and reduces their result sets with `combine`.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let (rows, total) = executor
    ///     .multi_query("page", &[rows_stmt, count_stmt], |sets| {
    ///         Ok((sets.read::<Location>()?, sets.read_scalar::<i64>()?))
    ///     })
    ///     .await?;
    /// ```
    pub async fn multi_query<T, F>(&self, label: &str, statements: &[Statement], combine: F) -> DbResult<T>
    where
        F: Fn(&mut ResultSets) -> DbResult<T> + Send + Sync,
        T: Send,
    {
        let pool = &self.pool;
        let combine = &combine;
        self.run(label, move || async move {
            let mut tx = pool
                .begin()
                .await
                .map_err(|e| begin_failed(label, e))?;

            let mut sets = Vec::with_capacity(statements.len());
            for statement in statements {
                let rows = sqlx::query_with(&statement.sql, statement.params.to_arguments()?)
                    .fetch_all(&mut *tx)
                    .await?;
                sets.push(rows);
            }

            tx.commit().await.map_err(|e| commit_failed(label, e))?;

            combine(&mut ResultSets::new(sets))
        })
        .await
    }
}

/// Connection-level failures keep their classification; anything else is a
/// transaction failure.
fn begin_failed(label: &str, err: sqlx::Error) -> DbError {
    match DbError::from(err) {
        DbError::QueryFailed(msg) | DbError::Internal(msg) => {
            DbError::TransactionFailed(format!("{}: begin: {}", label, msg))
        }
        other => other,
    }
}

fn commit_failed(label: &str, err: sqlx::Error) -> DbError {
    match DbError::from(err) {
        DbError::QueryFailed(msg) | DbError::Internal(msg) => {
            DbError::TransactionFailed(format!("{}: commit: {}", label, msg))
        }
        other => other,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::retry::{cancel_pair, RetryConfig};
    use depot_core::{ErrorCode, Location, LocationKind};

    const INSERT_LOCATION: &str = "INSERT INTO locations (name, kind, created_at, updated_at) \
                                   VALUES (?1, ?2, ?3, ?3) RETURNING id";

    async fn executor() -> (Database, TransactionalExecutor) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let executor = TransactionalExecutor::new(&db, RetryPolicy::no_retry());
        (db, executor)
    }

    fn location_params(name: &str) -> Params {
        Params::new()
            .bind(name)
            .bind(LocationKind::Warehouse.as_str())
            .bind(Utc::now())
    }

    #[tokio::test]
    async fn test_scalar_query_and_single() {
        let (_db, executor) = executor().await;

        let id: i64 = executor
            .scalar(INSERT_LOCATION, &location_params("Main Warehouse"))
            .await
            .unwrap();
        assert!(id > 0);

        let rows: Vec<Location> = executor
            .query("SELECT * FROM locations WHERE is_deleted = ?1", &Params::new().bind(false))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Main Warehouse");
        assert_eq!(rows[0].kind, LocationKind::Warehouse);
        assert_eq!(rows[0].version, 1);
        assert!(rows[0].lifecycle.is_active());

        let missing: Option<Location> = executor
            .query_single_or_default("SELECT * FROM locations WHERE id = ?1", &Params::new().bind(id + 100))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_command_returns_affected_rows() {
        let (_db, executor) = executor().await;
        for name in ["A", "B", "C"] {
            let _: i64 = executor.scalar(INSERT_LOCATION, &location_params(name)).await.unwrap();
        }

        let affected = executor
            .command("UPDATE locations SET address = ?1", &Params::new().bind("Quay 4"))
            .await
            .unwrap();
        assert_eq!(affected, 3);
    }

    #[tokio::test]
    async fn test_unique_violation_is_duplicate() {
        let (_db, executor) = executor().await;
        let _: i64 = executor.scalar(INSERT_LOCATION, &location_params("Dock")).await.unwrap();

        let err = executor
            .scalar::<i64>(INSERT_LOCATION, &location_params("dock"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Duplicate);
    }

    #[tokio::test]
    async fn test_check_constraint_is_validation_failure() {
        let (_db, executor) = executor().await;

        let err = executor
            .command(
                "INSERT INTO locations (name, kind, is_deleted, deleted_at, created_at, updated_at) \
                 VALUES ('Half', 'store', 1, NULL, ?1, ?1)",
                &Params::new().bind(Utc::now()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_failure() {
        let (_db, executor) = executor().await;

        let result: DbResult<()> = executor
            .run_in_transaction("insert_then_fail", |conn| {
                Box::pin(async move {
                    execute_on(
                        conn,
                        "INSERT INTO locations (name, kind, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                        &location_params("Ghost"),
                    )
                    .await?;
                    Err(DbError::InvalidState("abort".into()))
                })
            })
            .await;
        assert!(result.is_err());

        let count: i64 = executor
            .scalar("SELECT COUNT(*) FROM locations", &Params::new())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_transaction_commits_on_success() {
        let (_db, executor) = executor().await;

        let id = executor
            .run_in_transaction("insert_and_read", |conn| {
                Box::pin(async move {
                    let id: i64 = scalar_on(conn, INSERT_LOCATION, &location_params("Yard")).await?;
                    let row: Option<Location> =
                        fetch_optional_on(conn, "SELECT * FROM locations WHERE id = ?1", &Params::new().bind(id))
                            .await?;
                    row.map(|l| l.id).ok_or_else(|| DbError::not_found("Location", id))
                })
            })
            .await
            .unwrap();

        let name: String = executor
            .scalar("SELECT name FROM locations WHERE id = ?1", &Params::new().bind(id))
            .await
            .unwrap();
        assert_eq!(name, "Yard");
    }

    #[tokio::test]
    async fn test_multi_query_reads_sets_in_order() {
        let (_db, executor) = executor().await;
        for name in ["North", "South"] {
            let _: i64 = executor.scalar(INSERT_LOCATION, &location_params(name)).await.unwrap();
        }

        let statements = [
            Statement::new("SELECT * FROM locations ORDER BY name", Params::new()),
            Statement::new("SELECT COUNT(*) FROM locations", Params::new()),
            Statement::new("SELECT * FROM locations WHERE id = ?1", Params::new().bind(999i64)),
        ];

        let (names, total, missing) = executor
            .multi_query("names_and_total", &statements, |sets| {
                let rows = sets.read::<Location>()?;
                let total = sets.read_scalar::<i64>()?;
                let missing = sets.read_single_or_default::<Location>()?;
                assert_eq!(sets.remaining(), 0);
                Ok((rows.into_iter().map(|l| l.name).collect::<Vec<_>>(), total, missing))
            })
            .await
            .unwrap();

        assert_eq!(names, vec!["North", "South"]);
        assert_eq!(total, 2);
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_closed_pool_is_connection_failure() {
        let (db, executor) = executor().await;
        db.close().await;

        let err = executor
            .scalar::<i64>("SELECT COUNT(*) FROM locations", &Params::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ConnectionFailure);
    }

    #[tokio::test]
    async fn test_closed_pool_is_retried_then_surfaces() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let executor = TransactionalExecutor::new(
            &db,
            RetryPolicy::new(
                RetryConfig::default()
                    .max_retries(2)
                    .initial_delay(std::time::Duration::from_millis(1)),
            ),
        );
        db.close().await;

        let err = executor
            .command("DELETE FROM locations", &Params::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ConnectionFailure);
    }

    #[tokio::test]
    async fn test_cancelled_executor_short_circuits() {
        let (_db, executor) = executor().await;
        let (canceller, signal) = cancel_pair();
        let executor = executor.cancellable(signal);
        canceller.cancel();

        let err = executor
            .scalar::<i64>("SELECT 1", &Params::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Cancelled);
    }

    #[test]
    fn test_params_binding_order() {
        let params = Params::new()
            .bind(1i64)
            .bind("two")
            .bind(Option::<String>::None)
            .bind(true);

        assert_eq!(params.len(), 4);
        assert_eq!(params.values()[1], SqlValue::Text("two".into()));
        assert_eq!(params.values()[2], SqlValue::Null);
    }
}
