//! # Row Decoding
//!
//! `sqlx::FromRow` implementations for every record, compiled only with the
//! `sqlx` feature.
//!
//! Every entity table shares the trailing columns
//! `is_deleted, deleted_at, version, created_at, updated_at`. The delete pair
//! is decoded through [`Lifecycle::from_columns`], so a row whose flag and
//! timestamp disagree fails to decode instead of producing a half-deleted
//! record.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::lifecycle::Lifecycle;
use crate::types::{Category, Location, Order, Product, Supplier};

fn lifecycle(row: &SqliteRow) -> Result<Lifecycle, sqlx::Error> {
    let is_deleted: bool = row.try_get("is_deleted")?;
    let deleted_at: Option<DateTime<Utc>> = row.try_get("deleted_at")?;

    Lifecycle::from_columns(is_deleted, deleted_at).map_err(|e| sqlx::Error::ColumnDecode {
        index: "deleted_at".to_string(),
        source: Box::new(e),
    })
}

impl<'r> FromRow<'r, SqliteRow> for Location {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Location {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            kind: row.try_get("kind")?,
            address: row.try_get("address")?,
            lifecycle: lifecycle(row)?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for Supplier {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Supplier {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            contact_email: row.try_get("contact_email")?,
            phone: row.try_get("phone")?,
            country: row.try_get("country")?,
            lifecycle: lifecycle(row)?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for Category {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Category {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            parent_id: row.try_get("parent_id")?,
            lifecycle: lifecycle(row)?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for Product {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Product {
            id: row.try_get("id")?,
            sku: row.try_get("sku")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            category_id: row.try_get("category_id")?,
            supplier_id: row.try_get("supplier_id")?,
            location_id: row.try_get("location_id")?,
            unit_price_cents: row.try_get("unit_price_cents")?,
            quantity: row.try_get("quantity")?,
            lifecycle: lifecycle(row)?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for Order {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Order {
            id: row.try_get("id")?,
            order_number: row.try_get("order_number")?,
            description: row.try_get("description")?,
            supplier_id: row.try_get("supplier_id")?,
            location_id: row.try_get("location_id")?,
            status: row.try_get("status")?,
            ordered_at: row.try_get("ordered_at")?,
            lifecycle: lifecycle(row)?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
