use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::order::{self, OrderStatus, PaymentMethod},
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::VnpayGateway,
    services::{
        carts::CartService,
        inventory::{InventoryService, PurchasedItem},
        notifications::NotificationService,
        orders::{OrderDraft, OrderService},
        vouchers::VoucherService,
    },
};

/// Result of attempting to settle an order.
#[derive(Debug)]
pub enum SettlementOutcome {
    /// The settlement sequence ran to completion.
    Settled(order::Model),
    /// The order was already past payment confirmation; nothing was touched.
    AlreadySettled,
}

/// Customer-facing post-purchase action (PUT /orders/:id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerAction {
    Cancel,
    Receive,
}

/// Checkout orchestrator.
///
/// Composes the order store, voucher ledger, cart reconciler, inventory
/// adjuster, and notification dispatcher into the two checkout flows and
/// the settlement sequence both of them share.
#[derive(Clone)]
pub struct SettlementService {
    orders: Arc<OrderService>,
    carts: Arc<CartService>,
    inventory: Arc<InventoryService>,
    notifications: Arc<NotificationService>,
    vouchers: Arc<VoucherService>,
    gateway: Arc<VnpayGateway>,
    event_sender: Arc<EventSender>,
}

impl SettlementService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<OrderService>,
        carts: Arc<CartService>,
        inventory: Arc<InventoryService>,
        notifications: Arc<NotificationService>,
        vouchers: Arc<VoucherService>,
        gateway: Arc<VnpayGateway>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            orders,
            carts,
            inventory,
            notifications,
            vouchers,
            gateway,
            event_sender,
        }
    }

    /// Gateway checkout: create the order in `AwaitingPayment`, record the
    /// voucher use, and hand back the signed redirect URL. No cart or stock
    /// mutation happens until the gateway's callback arrives.
    #[instrument(skip(self, user, draft), fields(customer_id = %user.user_id))]
    pub async fn checkout_gateway(
        &self,
        user: &AuthUser,
        draft: &OrderDraft,
        client_ip: &str,
    ) -> Result<Url, ServiceError> {
        if draft.payment_method != PaymentMethod::Gateway {
            return Err(ServiceError::ValidationError(
                "Gateway checkout requires the gateway payment method".to_string(),
            ));
        }

        let order = self.orders.create_order(user.user_id, draft).await?;
        self.consume_voucher(draft).await?;

        self.gateway
            .build_redirect_url(order.id, order.total_amount, client_ip, Utc::now())
    }

    /// Cash-on-delivery checkout: create the order in `Pending` and run the
    /// settlement sequence inline, without waiting for any callback.
    #[instrument(skip(self, user, draft), fields(customer_id = %user.user_id))]
    pub async fn checkout_cod(
        &self,
        user: &AuthUser,
        draft: &OrderDraft,
    ) -> Result<order::Model, ServiceError> {
        if draft.payment_method != PaymentMethod::Cod {
            return Err(ServiceError::ValidationError(
                "COD checkout requires the cash-on-delivery payment method".to_string(),
            ));
        }

        let order = self.orders.create_order(user.user_id, draft).await?;
        self.consume_voucher(draft).await?;

        match self.settle(&order).await? {
            SettlementOutcome::Settled(updated) => Ok(updated),
            // COD orders are created un-settled a moment ago; this arm is
            // unreachable unless a concurrent settlement raced us.
            SettlementOutcome::AlreadySettled => Ok(order),
        }
    }

    /// Runs the settlement sequence for a confirmed order: cart reconcile →
    /// inventory adjust → confirmation email → status update.
    ///
    /// Idempotency guard: a gateway order that is no longer in
    /// `AwaitingPayment` has already been settled, and a repeated callback
    /// must not decrement stock or send mail again. COD orders run this
    /// exactly once, inline from checkout; the callback handler turns them
    /// away before they reach here.
    ///
    /// A notification failure is isolated — the status update still lands
    /// and the error surfaces to the caller afterwards, so committed steps
    /// are never undone while the failure stays visible.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn settle(&self, order: &order::Model) -> Result<SettlementOutcome, ServiceError> {
        if order.payment_method == PaymentMethod::Gateway
            && order.status != OrderStatus::AwaitingPayment
        {
            warn!(order_id = %order.id, status = ?order.status, "settlement skipped, order already settled");
            return Ok(SettlementOutcome::AlreadySettled);
        }
        if order.status.is_terminal() {
            return Ok(SettlementOutcome::AlreadySettled);
        }

        let items = self.orders.get_order_items(order.id).await?;
        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let purchased: Vec<PurchasedItem> = items
            .iter()
            .map(|i| PurchasedItem {
                product_id: i.product_id,
                quantity: i.quantity,
            })
            .collect();

        // Cart cleanup and stock adjustment touch disjoint rows; only their
        // position before the email and the status flip is significant.
        self.carts
            .remove_purchased_items(order.customer_id, &product_ids)
            .await?;
        self.carts.delete_if_empty(order.customer_id).await?;
        self.inventory.apply_purchase(&purchased).await?;

        let notify_result = self.notifications.send_order_confirmation(order, &items).await;

        let updated = self.orders.set_status(order.id, OrderStatus::Pending).await?;

        self.event_sender
            .send_or_log(Event::OrderSettled(order.id))
            .await;
        info!(order_id = %order.id, "order settled");

        notify_result?;
        Ok(SettlementOutcome::Settled(updated))
    }

    /// Marks a gateway order whose payment the gateway declined.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn mark_payment_failed(
        &self,
        order: &order::Model,
        response_code: &str,
    ) -> Result<(), ServiceError> {
        warn!(order_id = %order.id, response_code, "gateway declined payment");
        self.orders
            .set_status(order.id, OrderStatus::Cancelled)
            .await?;
        Ok(())
    }

    /// Customer cancel/receive, gated on ownership. The only customer-facing
    /// status transition outside the settlement sequence.
    #[instrument(skip(self), fields(order_id = %order_id, customer_id = %customer_id))]
    pub async fn customer_action(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
        action: CustomerAction,
    ) -> Result<order::Model, ServiceError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if order.customer_id != customer_id {
            return Err(ServiceError::Forbidden(
                "Order belongs to another customer".to_string(),
            ));
        }

        let new_status = match action {
            CustomerAction::Cancel => OrderStatus::Cancelled,
            CustomerAction::Receive => OrderStatus::Delivered,
        };
        self.orders.set_status(order_id, new_status).await
    }

    async fn consume_voucher(&self, draft: &OrderDraft) -> Result<(), ServiceError> {
        if let Some(voucher_id) = draft.voucher_id {
            self.vouchers.consume(voucher_id).await?;
        }
        Ok(())
    }
}
