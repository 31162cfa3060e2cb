//! # Services
//!
//! The read and write API presentation layers talk to, one pair per entity
//! kind.
//!
//! ## Call Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  WriteService::create / update / soft_delete / restore / hard_delete    │
//! │       │                                                                 │
//! │       ├── field rules (Draft::validate)                                 │
//! │       ├── ValidationGate (store of record, first failure wins)          │
//! │       ├── Repository ──► TransactionalExecutor ──► SQLite               │
//! │       └── EntityCache::refresh before returning                         │
//! │              └── refresh failed? cache marked stale, StaleCache         │
//! │                                                                         │
//! │  ReadService::get_by_id / list_active / search / ...                    │
//! │       │                                                                 │
//! │       ├── cache unloaded or stale? refresh first                        │
//! │       ├── EntityCache lookup                                            │
//! │       └── page / count go straight to the store                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every call returns [`DatabaseResult`]; store errors are classified into a
//! [`Failure`] at this boundary.

mod read;
mod write;

pub use read::ReadService;
pub use write::WriteService;

use depot_core::{DatabaseResult, Failure};
use serde::{Deserialize, Serialize};

/// Write-side behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// When set, a soft-deleted record keeps its name and nobody else can
    /// take it until the record is purged.
    pub reserve_deleted_names: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            reserve_deleted_names: false,
        }
    }
}

/// Outcome of a best-effort bulk operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkReport {
    /// Ids the operation was applied to, in request order.
    pub succeeded: Vec<i64>,
    /// Ids that were skipped, with the first rule they failed.
    pub failed: Vec<(i64, Failure)>,
    /// The batch committed but the cache could not be refreshed afterwards.
    pub cache_stale: bool,
}

impl BulkReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, id: i64, result: DatabaseResult<()>) {
        match result {
            Ok(()) => self.succeeded.push(id),
            Err(failure) => self.failed.push((id, failure)),
        }
    }
}
