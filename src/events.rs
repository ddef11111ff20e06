use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Domain events emitted by the checkout pipeline. Consumed in-process by a
/// logging drain; downstream integrations subscribe here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderSettled(Uuid),
    VoucherConsumed(Uuid),
    StockAdjusted {
        product_id: Uuid,
        quantity: i32,
    },
    EmailLogged {
        order_id: Uuid,
        recipient: String,
        sent: bool,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing channel failure to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {e}"))
    }

    /// Sends an event and logs instead of failing when the channel is down.
    /// Event delivery is advisory; it must never abort a settlement step.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!(error = %e, ?event, "event channel unavailable, dropping event");
        }
    }
}

/// Creates the event channel used by the application.
pub fn event_channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Drains events and logs them. Spawned once at startup.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "event: order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(order_id = %order_id, ?old_status, ?new_status, "event: order status changed");
            }
            Event::OrderSettled(order_id) => {
                info!(order_id = %order_id, "event: order settled");
            }
            Event::VoucherConsumed(voucher_id) => {
                info!(voucher_id = %voucher_id, "event: voucher consumed");
            }
            Event::StockAdjusted {
                product_id,
                quantity,
            } => {
                info!(product_id = %product_id, quantity, "event: stock adjusted");
            }
            Event::EmailLogged {
                order_id,
                recipient,
                sent,
            } => {
                info!(order_id = %order_id, recipient = %recipient, sent, "event: email logged");
            }
        }
    }
}
