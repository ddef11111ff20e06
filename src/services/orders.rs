use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        order::{self, Entity as OrderEntity, OrderStatus, PaymentMethod},
        order_item::{self, Entity as OrderItemEntity},
        order_status_history::{self, Entity as StatusHistoryEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Customer snapshot captured on the order at purchase time.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CustomerInfo {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[validate(email(message = "Email must be valid"))]
    pub email: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderLineDraft {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount: Decimal,
}

/// Checkout draft as submitted by the client: a cart snapshot plus totals.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderDraft {
    #[validate]
    pub customer: CustomerInfo,
    #[validate]
    pub line_items: Vec<OrderLineDraft>,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub voucher_id: Option<Uuid>,
    pub voucher_code: Option<String>,
    pub payment_method: PaymentMethod,
    pub note: Option<String>,
}

impl OrderDraft {
    /// Boundary validation: field checks plus the amount invariant.
    /// Runs before any mutation so a rejected draft leaves no partial state.
    pub fn check(&self) -> Result<(), ServiceError> {
        self.validate()?;

        if self.line_items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order must contain at least one item".to_string(),
            ));
        }

        if self.subtotal < Decimal::ZERO
            || self.shipping_fee < Decimal::ZERO
            || self.discount_amount < Decimal::ZERO
            || self.total_amount < Decimal::ZERO
        {
            return Err(ServiceError::ValidationError(
                "Order amounts must be non-negative".to_string(),
            ));
        }

        let expected = self.subtotal + self.shipping_fee - self.discount_amount;
        if self.total_amount != expected {
            return Err(ServiceError::ValidationError(format!(
                "Total amount {} does not match subtotal + shipping - discount = {}",
                self.total_amount, expected
            )));
        }

        Ok(())
    }
}

/// Order store: order creation, the single sanctioned status-mutation path,
/// and reads.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Inserts a new order and its line items in one transaction.
    ///
    /// Gateway payments start in `AwaitingPayment`; cash on delivery starts
    /// directly in `Pending`. The status history starts empty — entries are
    /// appended only through `set_status`.
    #[instrument(skip(self, draft), fields(customer_id = %customer_id, payment_method = ?draft.payment_method))]
    pub async fn create_order(
        &self,
        customer_id: Uuid,
        draft: &OrderDraft,
    ) -> Result<order::Model, ServiceError> {
        draft.check()?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let initial_status = match draft.payment_method {
            PaymentMethod::Gateway => OrderStatus::AwaitingPayment,
            PaymentMethod::Cod => OrderStatus::Pending,
        };

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "failed to start order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        let order = order::ActiveModel {
            id: Set(order_id),
            customer_id: Set(customer_id),
            customer_name: Set(draft.customer.name.clone()),
            customer_phone: Set(draft.customer.phone.clone()),
            customer_email: Set(draft.customer.email.clone()),
            customer_address: Set(draft.customer.address.clone()),
            subtotal: Set(draft.subtotal),
            shipping_fee: Set(draft.shipping_fee),
            discount_amount: Set(draft.discount_amount),
            total_amount: Set(draft.total_amount),
            voucher_id: Set(draft.voucher_id),
            voucher_code: Set(draft.voucher_code.clone()),
            payment_method: Set(draft.payment_method),
            status: Set(initial_status),
            note: Set(draft.note.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let order = order.insert(&txn).await?;

        for line in &draft.line_items {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                discount: Set(line.discount),
            };
            item.insert(&txn).await?;
        }

        txn.commit().await?;

        info!(order_id = %order_id, status = ?initial_status, "order created");
        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;

        Ok(order)
    }

    /// The only sanctioned way to change an order's status: sets the field,
    /// appends one history row, bumps `updated_at` — all in one transaction
    /// so the log and the field cannot drift.
    ///
    /// Terminal states are enforced: a delivered or cancelled order accepts
    /// no further transitions.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = ?new_status))]
    pub async fn set_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let existing = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                warn!(order_id = %order_id, "order not found for status update");
                ServiceError::NotFound(format!("Order {order_id} not found"))
            })?;

        let old_status = existing.status;
        if old_status.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {order_id} is already {old_status:?} and cannot change status"
            )));
        }

        let mut active: order::ActiveModel = existing.into();
        active.status = Set(new_status);
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;

        let history = order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(new_status),
            recorded_at: Set(now),
        };
        history.insert(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, ?old_status, ?new_status, "order status updated");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;

        Ok(updated)
    }

    /// Fetches an order by id. `None` means the order does not exist; the
    /// caller reports that as a terminal error, never a retry condition.
    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        Ok(OrderEntity::find_by_id(order_id).one(&*self.db).await?)
    }

    /// The caller's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<order::Model>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    pub async fn get_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?)
    }

    /// Status transitions of an order, oldest first.
    pub async fn get_status_history(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_status_history::Model>, ServiceError> {
        Ok(StatusHistoryEntity::find()
            .filter(order_status_history::Column::OrderId.eq(order_id))
            .order_by_asc(order_status_history::Column::RecordedAt)
            .all(&*self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft() -> OrderDraft {
        OrderDraft {
            customer: CustomerInfo {
                name: "Nguyen Van A".into(),
                phone: "0900000001".into(),
                email: "a@example.com".into(),
                address: "1 Tran Hung Dao".into(),
            },
            line_items: vec![OrderLineDraft {
                product_id: Uuid::new_v4(),
                quantity: 2,
                unit_price: dec!(100000),
                discount: dec!(0),
            }],
            subtotal: dec!(200000),
            shipping_fee: dec!(20000),
            discount_amount: dec!(0),
            total_amount: dec!(220000),
            voucher_id: None,
            voucher_code: None,
            payment_method: PaymentMethod::Cod,
            note: None,
        }
    }

    #[test]
    fn valid_draft_passes_check() {
        assert!(draft().check().is_ok());
    }

    #[test]
    fn amount_invariant_is_enforced() {
        let mut d = draft();
        d.total_amount = dec!(999999);
        assert!(matches!(d.check(), Err(ServiceError::ValidationError(_))));
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let mut d = draft();
        d.discount_amount = dec!(-1);
        assert!(d.check().is_err());
    }

    #[test]
    fn empty_line_items_are_rejected() {
        let mut d = draft();
        d.line_items.clear();
        assert!(d.check().is_err());
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let mut d = draft();
        d.line_items[0].quantity = 0;
        assert!(d.check().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::AwaitingPayment.is_terminal());
    }
}
