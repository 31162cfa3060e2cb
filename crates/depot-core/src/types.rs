//! # Domain Types
//!
//! Entity records and their drafts.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐        │
//! │  │    Location     │   │    Supplier     │   │    Category     │        │
//! │  │  name, kind     │   │  name, country  │   │  name, parent   │        │
//! │  └────────▲────────┘   └────────▲────────┘   └────────▲────────┘        │
//! │           │ location_id         │ supplier_id         │ category_id     │
//! │  ┌────────┴─────────────────────┴─────────────────────┴────────┐        │
//! │  │                         Product                             │        │
//! │  └─────────────────────────────────────────────────────────────┘        │
//! │  ┌─────────────────────────────────────────────────────────────┐        │
//! │  │  Order (order_number, status) → supplier_id, location_id    │        │
//! │  └─────────────────────────────────────────────────────────────┘        │
//! │                                                                         │
//! │  Every record: id (store-assigned), lifecycle, version, timestamps      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Records vs Drafts
//! A `*Draft` is what a caller hands to `create`: business fields only. The
//! store assigns the id, and the record comes back with its lifecycle,
//! version and timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::Lifecycle;
use crate::validation::{self, Violations, MAX_NAME_LEN, MAX_TEXT_LEN};

// =============================================================================
// Record / Draft traits
// =============================================================================

/// Read-side view shared by every entity kind.
///
/// Caches and services index and search records through this trait.
pub trait Record: Clone + Send + Sync + 'static {
    /// Display label of the kind ("Location", "Supplier", ...).
    const ENTITY: &'static str;

    fn id(&self) -> i64;

    /// The unique business name (order number for orders).
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str>;

    /// Grouping key used for per-category counts.
    fn category_key(&self) -> Option<String>;

    fn lifecycle(&self) -> &Lifecycle;

    /// Optimistic concurrency token.
    fn version(&self) -> i64;

    fn is_deleted(&self) -> bool {
        self.lifecycle().is_deleted()
    }
}

/// Creation input for an entity kind.
pub trait Draft: Clone + Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Runs all field rules and reports every violation.
    fn validate(&self) -> Result<(), Violations>;
}

// =============================================================================
// Location
// =============================================================================

/// What a location is used for. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    #[default]
    Warehouse,
    Store,
    Transit,
    Other,
}

impl LocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationKind::Warehouse => "warehouse",
            LocationKind::Store => "store",
            LocationKind::Transit => "transit",
            LocationKind::Other => "other",
        }
    }
}

impl std::fmt::Display for LocationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical place stock is held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub kind: LocationKind,
    pub address: Option<String>,
    pub lifecycle: Lifecycle,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocationDraft {
    pub name: String,
    pub description: Option<String>,
    pub kind: LocationKind,
    pub address: Option<String>,
}

impl LocationDraft {
    pub fn new(name: impl Into<String>, kind: LocationKind) -> Self {
        LocationDraft {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }
}

impl Record for Location {
    const ENTITY: &'static str = "Location";

    fn id(&self) -> i64 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    fn category_key(&self) -> Option<String> {
        Some(self.kind.as_str().to_string())
    }
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
    fn version(&self) -> i64 {
        self.version
    }
}

impl Draft for LocationDraft {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), Violations> {
        Violations::new()
            .check(validation::name("name", &self.name, MAX_NAME_LEN))
            .check(validation::optional_text("description", self.description.as_deref(), MAX_TEXT_LEN))
            .check(validation::optional_text("address", self.address.as_deref(), MAX_TEXT_LEN))
            .into_result()
    }
}

// =============================================================================
// Supplier
// =============================================================================

/// A vendor goods are ordered from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub lifecycle: Lifecycle,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SupplierDraft {
    pub name: String,
    pub description: Option<String>,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
}

impl Record for Supplier {
    const ENTITY: &'static str = "Supplier";

    fn id(&self) -> i64 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    fn category_key(&self) -> Option<String> {
        self.country.clone()
    }
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
    fn version(&self) -> i64 {
        self.version
    }
}

impl Draft for SupplierDraft {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), Violations> {
        Violations::new()
            .check(validation::name("name", &self.name, MAX_NAME_LEN))
            .check(validation::optional_text("description", self.description.as_deref(), MAX_TEXT_LEN))
            .check(validation::email("contact_email", self.contact_email.as_deref()))
            .check(validation::optional_text("phone", self.phone.as_deref(), 40))
            .check(validation::optional_text("country", self.country.as_deref(), 60))
            .into_result()
    }
}

// =============================================================================
// Category
// =============================================================================

/// A product grouping; categories may nest one level under a parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub lifecycle: Lifecycle,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryDraft {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
}

impl Record for Category {
    const ENTITY: &'static str = "Category";

    fn id(&self) -> i64 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    fn category_key(&self) -> Option<String> {
        self.parent_id.map(|id| id.to_string())
    }
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
    fn version(&self) -> i64 {
        self.version
    }
}

impl Draft for CategoryDraft {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), Violations> {
        Violations::new()
            .check(validation::name("name", &self.name, MAX_NAME_LEN))
            .check(validation::optional_text("description", self.description.as_deref(), MAX_TEXT_LEN))
            .check(validation::reference("parent_id", self.parent_id))
            .into_result()
    }
}

// =============================================================================
// Product
// =============================================================================

/// A stocked item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub location_id: Option<i64>,
    /// Unit price in cents (smallest currency unit).
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub lifecycle: Lifecycle,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductDraft {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub supplier_id: Option<i64>,
    pub location_id: Option<i64>,
    pub unit_price_cents: i64,
    pub quantity: i64,
}

impl Record for Product {
    const ENTITY: &'static str = "Product";

    fn id(&self) -> i64 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    fn category_key(&self) -> Option<String> {
        self.category_id.map(|id| id.to_string())
    }
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
    fn version(&self) -> i64 {
        self.version
    }
}

impl Draft for ProductDraft {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<(), Violations> {
        Violations::new()
            .check(validation::sku("sku", &self.sku))
            .check(validation::name("name", &self.name, MAX_NAME_LEN))
            .check(validation::optional_text("description", self.description.as_deref(), MAX_TEXT_LEN))
            .check(validation::reference("category_id", self.category_id))
            .check(validation::reference("supplier_id", self.supplier_id))
            .check(validation::reference("location_id", self.location_id))
            .check(validation::non_negative("unit_price_cents", self.unit_price_cents))
            .check(validation::non_negative("quantity", self.quantity))
            .into_result()
    }
}

// =============================================================================
// Order
// =============================================================================

/// Purchase order status. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Being prepared, not sent to the supplier yet.
    #[default]
    Draft,
    /// Sent to the supplier.
    Placed,
    /// Goods arrived at the location.
    Received,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Placed => "placed",
            OrderStatus::Received => "received",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purchase order against a supplier, delivered to a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub description: Option<String>,
    pub supplier_id: Option<i64>,
    pub location_id: Option<i64>,
    pub status: OrderStatus,
    pub ordered_at: Option<DateTime<Utc>>,
    pub lifecycle: Lifecycle,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderDraft {
    pub order_number: String,
    pub description: Option<String>,
    pub supplier_id: Option<i64>,
    pub location_id: Option<i64>,
    pub status: OrderStatus,
    pub ordered_at: Option<DateTime<Utc>>,
}

impl Record for Order {
    const ENTITY: &'static str = "Order";

    fn id(&self) -> i64 {
        self.id
    }
    fn name(&self) -> &str {
        &self.order_number
    }
    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    fn category_key(&self) -> Option<String> {
        Some(self.status.as_str().to_string())
    }
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
    fn version(&self) -> i64 {
        self.version
    }
}

impl Draft for OrderDraft {
    fn name(&self) -> &str {
        &self.order_number
    }

    fn validate(&self) -> Result<(), Violations> {
        Violations::new()
            .check(validation::name("order_number", &self.order_number, 40))
            .check(validation::optional_text("description", self.description.as_deref(), MAX_TEXT_LEN))
            .check(validation::reference("supplier_id", self.supplier_id))
            .check(validation::reference("location_id", self.location_id))
            .into_result()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
