//! # Supplier Table
//!
//! Suppliers are grouped by `country` and referenced by products and orders.

use depot_core::{Supplier, SupplierDraft};

use super::{Dependent, Entity, EntityKind};
use crate::executor::Params;

static SUPPLIER: EntityKind = EntityKind {
    table: "suppliers",
    label: "Supplier",
    name_column: "name",
    category_column: Some("country"),
    columns: &["name", "description", "contact_email", "phone", "country"],
    dependents: &[
        Dependent {
            table: "products",
            column: "supplier_id",
        },
        Dependent {
            table: "orders",
            column: "supplier_id",
        },
    ],
};

impl Entity for Supplier {
    type Draft = SupplierDraft;

    fn kind() -> &'static EntityKind {
        &SUPPLIER
    }

    fn insert_params(draft: &SupplierDraft) -> Params {
        Params::new()
            .bind(draft.name.trim())
            .bind(draft.description.as_deref())
            .bind(draft.contact_email.as_deref().map(str::trim))
            .bind(draft.phone.as_deref())
            .bind(draft.country.as_deref())
    }

    fn update_params(&self) -> Params {
        Params::new()
            .bind(self.name.trim())
            .bind(self.description.as_deref())
            .bind(self.contact_email.as_deref().map(str::trim))
            .bind(self.phone.as_deref())
            .bind(self.country.as_deref())
    }

    fn to_draft(&self) -> SupplierDraft {
        SupplierDraft {
            name: self.name.clone(),
            description: self.description.clone(),
            contact_email: self.contact_email.clone(),
            phone: self.phone.clone(),
            country: self.country.clone(),
        }
    }
}
