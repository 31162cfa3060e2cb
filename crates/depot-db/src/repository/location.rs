//! # Location Table
//!
//! Locations are grouped by `kind` and referenced by products and orders.

use depot_core::{Location, LocationDraft};

use super::{Dependent, Entity, EntityKind};
use crate::executor::Params;

static LOCATION: EntityKind = EntityKind {
    table: "locations",
    label: "Location",
    name_column: "name",
    category_column: Some("kind"),
    columns: &["name", "description", "kind", "address"],
    dependents: &[
        Dependent {
            table: "products",
            column: "location_id",
        },
        Dependent {
            table: "orders",
            column: "location_id",
        },
    ],
};

impl Entity for Location {
    type Draft = LocationDraft;

    fn kind() -> &'static EntityKind {
        &LOCATION
    }

    fn insert_params(draft: &LocationDraft) -> Params {
        Params::new()
            .bind(draft.name.trim())
            .bind(draft.description.as_deref())
            .bind(draft.kind.as_str())
            .bind(draft.address.as_deref())
    }

    fn update_params(&self) -> Params {
        Params::new()
            .bind(self.name.trim())
            .bind(self.description.as_deref())
            .bind(self.kind.as_str())
            .bind(self.address.as_deref())
    }

    fn to_draft(&self) -> LocationDraft {
        LocationDraft {
            name: self.name.clone(),
            description: self.description.clone(),
            kind: self.kind,
            address: self.address.clone(),
        }
    }
}
