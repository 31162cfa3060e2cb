//! # Order Table
//!
//! Purchase orders are named by `order_number` and grouped by `status`.
//! Nothing references an order, so they never have dependents.

use depot_core::{Order, OrderDraft, OrderStatus};

use super::{Entity, EntityKind, Repository};
use crate::error::DbResult;
use crate::executor::Params;

static ORDER: EntityKind = EntityKind {
    table: "orders",
    label: "Order",
    name_column: "order_number",
    category_column: Some("status"),
    columns: &[
        "order_number",
        "description",
        "supplier_id",
        "location_id",
        "status",
        "ordered_at",
    ],
    dependents: &[],
};

impl Entity for Order {
    type Draft = OrderDraft;

    fn kind() -> &'static EntityKind {
        &ORDER
    }

    fn insert_params(draft: &OrderDraft) -> Params {
        Params::new()
            .bind(draft.order_number.trim())
            .bind(draft.description.as_deref())
            .bind(draft.supplier_id)
            .bind(draft.location_id)
            .bind(draft.status.as_str())
            .bind(draft.ordered_at)
    }

    fn update_params(&self) -> Params {
        Params::new()
            .bind(self.order_number.trim())
            .bind(self.description.as_deref())
            .bind(self.supplier_id)
            .bind(self.location_id)
            .bind(self.status.as_str())
            .bind(self.ordered_at)
    }

    fn to_draft(&self) -> OrderDraft {
        OrderDraft {
            order_number: self.order_number.clone(),
            description: self.description.clone(),
            supplier_id: self.supplier_id,
            location_id: self.location_id,
            status: self.status,
            ordered_at: self.ordered_at,
        }
    }
}

impl Repository<Order> {
    /// Active orders placed with one supplier, newest first.
    pub async fn list_for_supplier(&self, supplier_id: i64) -> DbResult<Vec<Order>> {
        self.executor()
            .query(
                "SELECT * FROM orders WHERE supplier_id = ?1 AND is_deleted = 0 \
                 ORDER BY ordered_at DESC, id DESC",
                &Params::new().bind(supplier_id),
            )
            .await
    }

    /// Active orders still waiting on delivery.
    pub async fn list_open(&self) -> DbResult<Vec<Order>> {
        self.executor()
            .query(
                "SELECT * FROM orders WHERE status = ?1 AND is_deleted = 0 ORDER BY ordered_at, id",
                &Params::new().bind(OrderStatus::Placed.as_str()),
            )
            .await
    }
}
