use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// A purchased quantity of one product, as seen by the inventory adjuster.
#[derive(Debug, Clone, Copy)]
pub struct PurchasedItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Inventory adjuster: applies purchases to product stock counters.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Decrements `stock` and increments `sold` by the purchased quantity,
    /// one atomic column update per product.
    ///
    /// This is a blind decrement: no stock check and no floor at zero.
    /// Sufficient-stock validation belongs at the cart/checkout boundary,
    /// and the settlement orchestrator's idempotency guard is what prevents
    /// the same order from being applied twice.
    #[instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn apply_purchase(&self, items: &[PurchasedItem]) -> Result<(), ServiceError> {
        for item in items {
            let result = ProductEntity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).sub(item.quantity),
                )
                .col_expr(
                    product::Column::Sold,
                    Expr::col(product::Column::Sold).add(item.quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
                .filter(product::Column::Id.eq(item.product_id))
                .exec(&*self.db)
                .await?;

            if result.rows_affected == 0 {
                warn!(product_id = %item.product_id, "purchase references unknown product");
                continue;
            }

            self.event_sender
                .send_or_log(Event::StockAdjusted {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .await;
        }

        Ok(())
    }
}
