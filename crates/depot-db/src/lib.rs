//! # depot-db: Persistence Core for Depot
//!
//! SQLite store of record, plus the resilience and caching layer in front of
//! it: retrying transactional execution, per-kind read caches, the lifecycle
//! validation gate, and the read/write services built on top.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Depot Data Flow                                │
//! │                                                                         │
//! │  Presentation layer (renders Envelope<T>)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     depot-db (THIS CRATE)                       │    │
//! │  │                                                                 │    │
//! │  │   Catalog ── EntityServices<E> { ReadService, WriteService }    │    │
//! │  │                  │                        │                     │    │
//! │  │                  ▼                        ▼                     │    │
//! │  │            EntityCache<E>          ValidationGate<E>            │    │
//! │  │                  │                        │                     │    │
//! │  │                  └──────► Repository<E> ◄─┘                     │    │
//! │  │                                │                                │    │
//! │  │                                ▼                                │    │
//! │  │          TransactionalExecutor ── RetryPolicy (backoff)         │    │
//! │  │                                │                                │    │
//! │  └────────────────────────────────┼────────────────────────────────┘    │
//! │                                   ▼                                     │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │       SQLite (WAL, foreign keys, embedded migrations)           │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types and their classification
//! - [`retry`] - Exponential backoff and cancellation
//! - [`executor`] - Transactional execution of statements
//! - [`repository`] - SQL for every entity kind
//! - [`cache`] - Refreshable per-kind snapshots
//! - [`gate`] - Lifecycle and uniqueness preconditions
//! - [`service`] - Read and write services
//! - [`catalog`] - Wires everything together
//! - [`config`] - File and environment configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use depot_core::{LocationDraft, LocationKind};
//! use depot_db::{Catalog, DepotConfig};
//!
//! let catalog = Catalog::open(&DepotConfig::load(None)?).await?;
//!
//! let locations = catalog.locations();
//! let created = locations
//!     .write
//!     .create(LocationDraft::new("Main Warehouse", LocationKind::Warehouse))
//!     .await?;
//! assert_eq!(locations.read.get_by_id(created.id).await?.name, "Main Warehouse");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod gate;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod retry;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::EntityCache;
pub use catalog::{Catalog, EntityServices};
pub use config::DepotConfig;
pub use error::{DbError, DbResult};
pub use executor::{Params, SqlValue, Statement, TransactionalExecutor};
pub use gate::ValidationGate;
pub use pool::{Database, DbConfig};
pub use repository::{Entity, EntityKind, Page, PageRequest, Repository};
pub use retry::{cancel_pair, CancelSignal, Canceller, RetryConfig, RetryPolicy};
pub use service::{BulkReport, ReadService, WriteOptions, WriteService};
