use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    config::EmailConfig,
    entities::{
        email_log::{self, EmailStatus},
        order,
        order_item,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

const ORDER_CONFIRMATION_CATEGORY: &str = "order_confirmation";

/// Outbound email message handed to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Transport to the external email provider. Returns the provider's message
/// id on success.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<String, ServiceError>;
}

/// HTTP JSON client for the email provider's send endpoint.
pub struct HttpEmailSender {
    client: reqwest::Client,
    config: EmailConfig,
}

impl HttpEmailSender {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<String, ServiceError> {
        let payload = json!({
            "from": {
                "email": self.config.from_address,
                "name": self.config.from_name,
            },
            "to": [{ "email": message.to }],
            "subject": message.subject,
            "html": message.html_body,
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("email provider: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "email provider returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("email provider: {e}")))?;

        Ok(body
            .get("message_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

/// Notification dispatcher: order-confirmation email plus its append-only
/// delivery log.
#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DatabaseConnection>,
    sender: Arc<dyn EmailSender>,
    event_sender: Arc<EventSender>,
}

impl NotificationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        sender: Arc<dyn EmailSender>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            sender,
            event_sender,
        }
    }

    /// Renders and sends the order-confirmation email, then records exactly
    /// one email-log row: `Sent` with the provider message id, or `Failed`.
    ///
    /// A send failure is recorded and returned to the caller; it is the
    /// caller's job to keep that failure from undoing settlement steps that
    /// already committed.
    #[instrument(skip(self, order, items), fields(order_id = %order.id, recipient = %order.customer_email))]
    pub async fn send_order_confirmation(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<(), ServiceError> {
        let message = EmailMessage {
            to: order.customer_email.clone(),
            subject: format!("Order confirmation #{}", short_ref(order.id)),
            html_body: render_order_confirmation(order, items),
        };

        let send_result = self.sender.send(&message).await;

        let (status, message_id) = match &send_result {
            Ok(message_id) => (EmailStatus::Sent, Some(message_id.clone())),
            Err(e) => {
                error!(error = %e, "order confirmation send failed");
                (EmailStatus::Failed, None)
            }
        };

        let log = email_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            recipient: Set(message.to.clone()),
            subject: Set(message.subject.clone()),
            category: Set(ORDER_CONFIRMATION_CATEGORY.to_string()),
            status: Set(status),
            provider_message_id: Set(message_id),
            created_at: Set(Utc::now()),
        };
        log.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::EmailLogged {
                order_id: order.id,
                recipient: message.to.clone(),
                sent: send_result.is_ok(),
            })
            .await;

        if send_result.is_ok() {
            info!("order confirmation sent");
        }
        send_result.map(|_| ())
    }
}

/// Short human-readable order reference used in the subject line.
fn short_ref(order_id: Uuid) -> String {
    order_id.simple().to_string()[..8].to_uppercase()
}

/// Fixed HTML template with order fields substituted.
fn render_order_confirmation(order: &order::Model, items: &[order_item::Model]) -> String {
    let mut rows = String::new();
    for item in items {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            item.product_id, item.quantity, item.unit_price
        ));
    }

    format!(
        concat!(
            "<html><body>",
            "<h2>Thank you for your order, {name}!</h2>",
            "<p>Order reference: <strong>{reference}</strong></p>",
            "<p>Delivery address: {address}</p>",
            "<table border=\"1\" cellpadding=\"4\">",
            "<tr><th>Product</th><th>Qty</th><th>Unit price</th></tr>",
            "{rows}",
            "</table>",
            "<p>Subtotal: {subtotal}</p>",
            "<p>Shipping: {shipping}</p>",
            "<p>Discount: {discount}</p>",
            "<p><strong>Total: {total}</strong></p>",
            "</body></html>"
        ),
        name = order.customer_name,
        reference = short_ref(order.id),
        address = order.customer_address,
        rows = rows,
        subtotal = order.subtotal,
        shipping = order.shipping_fee,
        discount = order.discount_amount,
        total = order.total_amount,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::{OrderStatus, PaymentMethod};
    use rust_decimal_macros::dec;

    fn sample_order() -> order::Model {
        order::Model {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            customer_name: "Nguyen Van A".into(),
            customer_phone: "0900000001".into(),
            customer_email: "a@example.com".into(),
            customer_address: "1 Tran Hung Dao".into(),
            subtotal: dec!(200000),
            shipping_fee: dec!(20000),
            discount_amount: dec!(0),
            total_amount: dec!(220000),
            voucher_id: None,
            voucher_code: None,
            payment_method: PaymentMethod::Cod,
            status: OrderStatus::Pending,
            note: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn template_substitutes_order_fields() {
        let order = sample_order();
        let items = vec![order_item::Model {
            id: Uuid::new_v4(),
            order_id: order.id,
            product_id: Uuid::new_v4(),
            quantity: 2,
            unit_price: dec!(100000),
            discount: dec!(0),
        }];

        let html = render_order_confirmation(&order, &items);
        assert!(html.contains("Nguyen Van A"));
        assert!(html.contains("1 Tran Hung Dao"));
        assert!(html.contains("220000"));
        assert!(html.contains("<td>2</td>"));
    }

    #[test]
    fn short_ref_is_eight_chars_upper() {
        let r = short_ref(Uuid::new_v4());
        assert_eq!(r.len(), 8);
        assert_eq!(r, r.to_uppercase());
    }

    #[tokio::test]
    async fn http_sender_extracts_provider_message_id() {
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/send"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "message_id": "msg-42" })),
            )
            .mount(&server)
            .await;

        let sender = HttpEmailSender::new(crate::config::EmailConfig {
            endpoint: format!("{}/v1/send", server.uri()),
            api_key: "test-key".into(),
            from_address: "orders@shop.example.com".into(),
            from_name: "Storefront".into(),
        });

        let id = sender
            .send(&EmailMessage {
                to: "a@example.com".into(),
                subject: "Order confirmation".into(),
                html_body: "<p>hi</p>".into(),
            })
            .await
            .unwrap();
        assert_eq!(id, "msg-42");
    }

    #[tokio::test]
    async fn http_sender_surfaces_provider_errors() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sender = HttpEmailSender::new(crate::config::EmailConfig {
            endpoint: server.uri(),
            api_key: "test-key".into(),
            from_address: "orders@shop.example.com".into(),
            from_name: "Storefront".into(),
        });

        let err = sender
            .send(&EmailMessage {
                to: "a@example.com".into(),
                subject: "Order confirmation".into(),
                html_body: "<p>hi</p>".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ExternalServiceError(_)));
    }
}
