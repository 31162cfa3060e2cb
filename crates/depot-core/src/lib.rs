//! # depot-core: Pure Domain Types for Depot
//!
//! This crate holds everything about inventory records that does not touch a
//! store: the records themselves, the delete lifecycle, the outcome envelope
//! every layer reports through, and the field validators.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Depot Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │              Presentation layer (not in this repo)              │    │
//! │  │     renders Envelope<T>, runs field validators before writes    │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │        depot-db: ReadService / WriteService per entity kind     │    │
//! │  │   ValidationGate · EntityCache · Executor · RetryPolicy         │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │ uses                                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │               ★ depot-core (THIS CRATE) ★                       │    │
//! │  │   types · lifecycle · outcome · validation · error              │    │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Records (Location, Supplier, Category, Product, Order) and drafts
//! - [`lifecycle`] - Active → SoftDeleted → Purged state machine
//! - [`outcome`] - `DatabaseResult<T>`, `Failure`, `ErrorCode`, `Envelope<T>`
//! - [`validation`] - Composable field rules and the `Violations` report
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use depot_core::{Lifecycle, LifecycleEvent};
//!
//! let deleted = Lifecycle::Active
//!     .apply(LifecycleEvent::SoftDelete { at: Utc::now() })
//!     .unwrap();
//! assert!(deleted.is_deleted());
//!
//! // Restoring an active record is rejected
//! assert!(Lifecycle::Active.apply(LifecycleEvent::Restore).is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod lifecycle;
pub mod outcome;
#[cfg(feature = "sqlx")]
mod row;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{LifecycleError, ValidationError};
pub use lifecycle::{Lifecycle, LifecycleEvent};
pub use outcome::{DatabaseResult, Envelope, ErrorCode, Failure};
pub use types::*;
pub use validation::Violations;
