//! # Product Table
//!
//! Products are grouped by `category_id`. Besides the unique name, the SKU
//! is unique among active products.

use depot_core::{Product, ProductDraft};

use super::{Entity, EntityKind, Repository};
use crate::error::DbResult;
use crate::executor::Params;

static PRODUCT: EntityKind = EntityKind {
    table: "products",
    label: "Product",
    name_column: "name",
    category_column: Some("category_id"),
    columns: &[
        "sku",
        "name",
        "description",
        "category_id",
        "supplier_id",
        "location_id",
        "unit_price_cents",
        "quantity",
    ],
    dependents: &[],
};

impl Entity for Product {
    type Draft = ProductDraft;

    fn kind() -> &'static EntityKind {
        &PRODUCT
    }

    fn insert_params(draft: &ProductDraft) -> Params {
        Params::new()
            .bind(draft.sku.trim())
            .bind(draft.name.trim())
            .bind(draft.description.as_deref())
            .bind(draft.category_id)
            .bind(draft.supplier_id)
            .bind(draft.location_id)
            .bind(draft.unit_price_cents)
            .bind(draft.quantity)
    }

    fn update_params(&self) -> Params {
        Params::new()
            .bind(self.sku.trim())
            .bind(self.name.trim())
            .bind(self.description.as_deref())
            .bind(self.category_id)
            .bind(self.supplier_id)
            .bind(self.location_id)
            .bind(self.unit_price_cents)
            .bind(self.quantity)
    }

    fn to_draft(&self) -> ProductDraft {
        ProductDraft {
            sku: self.sku.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            category_id: self.category_id,
            supplier_id: self.supplier_id,
            location_id: self.location_id,
            unit_price_cents: self.unit_price_cents,
            quantity: self.quantity,
        }
    }
}

impl Repository<Product> {
    /// The active product with this SKU (case-insensitive).
    pub async fn find_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        self.executor()
            .query_single_or_default(
                "SELECT * FROM products WHERE sku = ?1 COLLATE NOCASE AND is_deleted = 0",
                &Params::new().bind(sku.trim()),
            )
            .await
    }
}
