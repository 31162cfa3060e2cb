//! # Catalog
//!
//! Composition root: one cache and one read/write service pair per entity
//! kind, all sharing one executor.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Catalog                                                                │
//! │  ├── Database (pool)                                                    │
//! │  ├── TransactionalExecutor (RetryPolicy)                                │
//! │  ├── Arc<EntityCache<Location>> ──┐                                     │
//! │  ├── Arc<EntityCache<Supplier>>   │ shared with the services handed     │
//! │  ├── Arc<EntityCache<Category>>   │ out by locations(), suppliers(),    │
//! │  ├── Arc<EntityCache<Product>>    │ categories(), products(), orders()  │
//! │  └── Arc<EntityCache<Order>> ─────┘                                     │
//! │                                                                         │
//! │  open / new  →  init (preload caches)  →  ...  →  shutdown              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use depot_core::{Category, DatabaseResult, Location, Order, Product, Supplier};
use tracing::info;

use crate::cache::EntityCache;
use crate::config::DepotConfig;
use crate::error::DbResult;
use crate::executor::TransactionalExecutor;
use crate::pool::Database;
use crate::repository::{Entity, Repository};
use crate::retry::{CancelSignal, RetryPolicy};
use crate::service::{ReadService, WriteOptions, WriteService};

/// Read and write service for one kind, sharing one cache.
#[derive(Debug, Clone)]
pub struct EntityServices<E: Entity> {
    pub read: ReadService<E>,
    pub write: WriteService<E>,
}

impl<E: Entity> EntityServices<E> {
    fn new(executor: &TransactionalExecutor, cache: &Arc<EntityCache<E>>, options: WriteOptions) -> Self {
        let repository = Repository::<E>::new(executor.clone());
        EntityServices {
            read: ReadService::new(cache.clone(), repository.clone()),
            write: WriteService::new(repository, cache.clone(), options),
        }
    }
}

/// Owns the store connection and every per-kind cache.
#[derive(Debug)]
pub struct Catalog {
    database: Database,
    executor: TransactionalExecutor,
    options: WriteOptions,
    locations: Arc<EntityCache<Location>>,
    suppliers: Arc<EntityCache<Supplier>>,
    categories: Arc<EntityCache<Category>>,
    products: Arc<EntityCache<Product>>,
    orders: Arc<EntityCache<Order>>,
}

impl Catalog {
    /// Wires caches and services over an open database. Caches start
    /// unloaded; call [`init`](Self::init) or let the first read load them.
    pub fn new(database: &Database, retry: RetryPolicy, options: WriteOptions) -> Self {
        Catalog::build(database, TransactionalExecutor::new(database, retry), options)
    }

    /// Like [`new`](Self::new), but every store call made by the caches and
    /// services aborts with `Cancelled` once `signal` fires.
    pub fn with_cancel(
        database: &Database,
        retry: RetryPolicy,
        options: WriteOptions,
        signal: CancelSignal,
    ) -> Self {
        let executor = TransactionalExecutor::new(database, retry).cancellable(signal);
        Catalog::build(database, executor, options)
    }

    fn build(database: &Database, executor: TransactionalExecutor, options: WriteOptions) -> Self {
        Catalog {
            database: database.clone(),
            locations: cache(&executor),
            suppliers: cache(&executor),
            categories: cache(&executor),
            products: cache(&executor),
            orders: cache(&executor),
            executor,
            options,
        }
    }

    /// Opens the database described by `config` (running migrations) and
    /// wires the catalog. Caches are preloaded when `cache.preload` is set.
    pub async fn open(config: &DepotConfig) -> DbResult<Self> {
        let database = Database::new(config.to_db_config()).await?;
        let catalog = Catalog::new(
            &database,
            RetryPolicy::new(config.to_retry_config()),
            config.write_options(),
        );

        if config.cache.preload {
            catalog.init().await?;
        }
        Ok(catalog)
    }

    /// Loads every cache that is not loaded yet.
    pub async fn init(&self) -> DbResult<()> {
        self.locations.init().await?;
        self.suppliers.init().await?;
        self.categories.init().await?;
        self.products.init().await?;
        self.orders.init().await?;
        info!("Catalog caches loaded");
        Ok(())
    }

    /// Reloads every cache.
    pub async fn refresh_all(&self) -> DatabaseResult<()> {
        self.locations.refresh().await?;
        self.suppliers.refresh().await?;
        self.categories.refresh().await?;
        self.products.refresh().await?;
        self.orders.refresh().await?;
        Ok(())
    }

    /// Empties every cache and closes the pool.
    pub async fn shutdown(&self) {
        self.locations.clear().await;
        self.suppliers.clear().await;
        self.categories.clear().await;
        self.products.clear().await;
        self.orders.clear().await;
        self.database.close().await;
        info!("Catalog shut down");
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn executor(&self) -> &TransactionalExecutor {
        &self.executor
    }

    pub fn write_options(&self) -> WriteOptions {
        self.options
    }

    pub fn locations(&self) -> EntityServices<Location> {
        EntityServices::new(&self.executor, &self.locations, self.options)
    }

    pub fn suppliers(&self) -> EntityServices<Supplier> {
        EntityServices::new(&self.executor, &self.suppliers, self.options)
    }

    pub fn categories(&self) -> EntityServices<Category> {
        EntityServices::new(&self.executor, &self.categories, self.options)
    }

    pub fn products(&self) -> EntityServices<Product> {
        EntityServices::new(&self.executor, &self.products, self.options)
    }

    pub fn orders(&self) -> EntityServices<Order> {
        EntityServices::new(&self.executor, &self.orders, self.options)
    }
}

fn cache<E: Entity>(executor: &TransactionalExecutor) -> Arc<EntityCache<E>> {
    Arc::new(EntityCache::new(Repository::new(executor.clone())))
}
