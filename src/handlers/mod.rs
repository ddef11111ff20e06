pub mod checkout;
pub mod orders;
pub mod vouchers;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    gateway::VnpayGateway,
    services::{
        carts::CartService,
        inventory::InventoryService,
        notifications::{EmailSender, NotificationService},
        orders::OrderService,
        settlement::SettlementService,
        vouchers::VoucherService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub carts: Arc<CartService>,
    pub inventory: Arc<InventoryService>,
    pub vouchers: Arc<VoucherService>,
    pub notifications: Arc<NotificationService>,
    pub settlement: Arc<SettlementService>,
    pub gateway: Arc<VnpayGateway>,
}

impl AppServices {
    /// Wires the service graph over one connection pool and event channel.
    /// The email transport is injected so tests can substitute a mock.
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        email_sender: Arc<dyn EmailSender>,
        config: &AppConfig,
    ) -> Self {
        let orders = Arc::new(OrderService::new(db.clone(), event_sender.clone()));
        let carts = Arc::new(CartService::new(db.clone()));
        let inventory = Arc::new(InventoryService::new(db.clone(), event_sender.clone()));
        let vouchers = Arc::new(VoucherService::new(db.clone(), event_sender.clone()));
        let notifications = Arc::new(NotificationService::new(
            db.clone(),
            email_sender,
            event_sender.clone(),
        ));
        let gateway = Arc::new(VnpayGateway::new(config.vnpay.clone()));
        let settlement = Arc::new(SettlementService::new(
            orders.clone(),
            carts.clone(),
            inventory.clone(),
            notifications.clone(),
            vouchers.clone(),
            gateway.clone(),
            event_sender,
        ));

        Self {
            orders,
            carts,
            inventory,
            vouchers,
            notifications,
            settlement,
            gateway,
        }
    }
}
