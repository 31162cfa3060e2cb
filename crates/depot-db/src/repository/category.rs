//! # Category Table
//!
//! Categories nest under an optional parent. A category is referenced by its
//! products and by its child categories.

use depot_core::{Category, CategoryDraft};

use super::{Dependent, Entity, EntityKind};
use crate::executor::Params;

static CATEGORY: EntityKind = EntityKind {
    table: "categories",
    label: "Category",
    name_column: "name",
    category_column: Some("parent_id"),
    columns: &["name", "description", "parent_id"],
    dependents: &[
        Dependent {
            table: "products",
            column: "category_id",
        },
        Dependent {
            table: "categories",
            column: "parent_id",
        },
    ],
};

impl Entity for Category {
    type Draft = CategoryDraft;

    fn kind() -> &'static EntityKind {
        &CATEGORY
    }

    fn insert_params(draft: &CategoryDraft) -> Params {
        Params::new()
            .bind(draft.name.trim())
            .bind(draft.description.as_deref())
            .bind(draft.parent_id)
    }

    fn update_params(&self) -> Params {
        Params::new()
            .bind(self.name.trim())
            .bind(self.description.as_deref())
            .bind(self.parent_id)
    }

    fn to_draft(&self) -> CategoryDraft {
        CategoryDraft {
            name: self.name.clone(),
            description: self.description.clone(),
            parent_id: self.parent_id,
        }
    }
}
