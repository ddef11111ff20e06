use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use sha2::Sha512;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    auth,
    config::{AppConfig, EmailConfig, VnpayConfig},
    db::{self, DbConfig},
    entities::{cart, cart_item, product, voucher},
    errors::ServiceError,
    events,
    handlers::AppServices,
    services::notifications::{EmailMessage, EmailSender},
    AppState,
};

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";
pub const TEST_HASH_SECRET: &str = "integration_test_hash_secret_key";

/// Email transport double: records every message and can be switched into a
/// failure mode to exercise notification-failure isolation.
pub struct RecordingEmailSender {
    pub sent: Mutex<Vec<EmailMessage>>,
    fail: AtomicBool,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<String, ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "email provider unavailable".to_string(),
            ));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(format!("test-message-{}", Uuid::new_v4().simple()))
    }
}

/// Helper harness backed by a throwaway SQLite database file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub email: Arc<RecordingEmailSender>,
    db_file: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_file = format!("storefront_test_{}.db", Uuid::new_v4().simple());
        let _ = std::fs::remove_file(&db_file);

        let cfg = AppConfig {
            database_url: format!("sqlite://{db_file}?mode=rwc"),
            jwt_secret: TEST_JWT_SECRET.to_string(),
            host: "127.0.0.1".to_string(),
            port: 18_080,
            environment: "test".to_string(),
            log_level: "warn".to_string(),
            log_json: false,
            auto_migrate: true,
            vnpay: VnpayConfig {
                tmn_code: "TESTTMN1".to_string(),
                hash_secret: TEST_HASH_SECRET.to_string(),
                pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
                return_url: "http://localhost:3000/payment/result".to_string(),
                locale: "vn".to_string(),
            },
            email: EmailConfig {
                endpoint: "https://mail.invalid/v1/send".to_string(),
                api_key: "test-key".to_string(),
                from_address: "orders@shop.example.com".to_string(),
                from_name: "Storefront".to_string(),
            },
        };

        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 5,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to create test database");

        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_sender, event_rx) = events::event_channel(256);
        let event_sender = Arc::new(event_sender);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let email = Arc::new(RecordingEmailSender::new());
        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            email.clone(),
            &cfg,
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", storefront_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            email,
            db_file,
            _event_task: event_task,
        }
    }

    /// Bearer token for the given customer, signed with the test secret.
    pub fn token_for(&self, customer_id: Uuid) -> String {
        auth::issue_token(customer_id, Some("test@example.com"), TEST_JWT_SECRET)
            .expect("issue test token")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {tok}"));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn request_as(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        customer_id: Uuid,
    ) -> axum::response::Response {
        let token = self.token_for(customer_id);
        self.request(method, uri, body, Some(&token)).await
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            stock: Set(stock),
            sold: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product for tests")
    }

    pub async fn seed_cart(&self, customer_id: Uuid, items: &[(Uuid, i32)]) -> cart::Model {
        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed cart for tests");

        for (product_id, quantity) in items {
            cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(*product_id),
                quantity: Set(*quantity),
                added_at: Set(now),
            }
            .insert(&*self.state.db)
            .await
            .expect("seed cart item for tests");
        }

        cart
    }

    pub async fn seed_voucher(&self, spec: VoucherSpec) -> voucher::Model {
        let now = Utc::now();
        voucher::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(spec.code.to_string()),
            kind: Set(voucher::VoucherKind::Fixed),
            value: Set(spec.value),
            max_discount: Set(None),
            min_order_value: Set(spec.min_order_value),
            usage_limit: Set(spec.usage_limit),
            used_count: Set(spec.used_count),
            starts_at: Set(now + Duration::hours(spec.starts_in_hours)),
            ends_at: Set(now + Duration::hours(spec.ends_in_hours)),
            status: Set(spec.status),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed voucher for tests")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
        let _ = std::fs::remove_file(&self.db_file);
    }
}

/// Seed parameters for a test voucher; defaults describe a currently valid,
/// unrestricted voucher.
pub struct VoucherSpec {
    pub code: &'static str,
    pub value: Decimal,
    pub min_order_value: Decimal,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub starts_in_hours: i64,
    pub ends_in_hours: i64,
    pub status: voucher::VoucherStatus,
}

impl Default for VoucherSpec {
    fn default() -> Self {
        Self {
            code: "TESTCODE",
            value: Decimal::new(20_000, 0),
            min_order_value: Decimal::ZERO,
            usage_limit: None,
            used_count: 0,
            starts_in_hours: -1,
            ends_in_hours: 24,
            status: voucher::VoucherStatus::Active,
        }
    }
}

/// Deserializes a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read response body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("response body is not valid json")
}

/// Signs a callback parameter set the way the gateway does: sorted keys,
/// form-urlencoded, HMAC-SHA512 hex. Independent of the production signer so
/// the tests validate the protocol, not the implementation against itself.
pub fn sign_gateway_params(params: &BTreeMap<String, String>, secret: &str) -> String {
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish();
    let mut mac =
        Hmac::<Sha512>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(encoded.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Builds a signed JSON callback body for the given order.
pub fn signed_callback_body(order_id: Uuid, response_code: &str) -> Value {
    let mut params = BTreeMap::new();
    params.insert("vnp_TxnRef".to_string(), order_id.to_string());
    params.insert("vnp_ResponseCode".to_string(), response_code.to_string());
    params.insert("vnp_TransactionNo".to_string(), "14226112".to_string());
    let signature = sign_gateway_params(&params, TEST_HASH_SECRET);

    let mut body = serde_json::Map::new();
    body.insert("orderId".to_string(), Value::String(order_id.to_string()));
    for (k, v) in params {
        body.insert(k, Value::String(v));
    }
    body.insert("vnp_SecureHash".to_string(), Value::String(signature));
    Value::Object(body)
}

/// Standard checkout body for a two-unit purchase of one product.
pub fn checkout_body(product_id: Uuid, unit_price: Decimal, quantity: i32) -> Value {
    let subtotal = unit_price * Decimal::from(quantity);
    let shipping = Decimal::new(20_000, 0);
    serde_json::json!({
        "customer": {
            "name": "Nguyen Van A",
            "phone": "0900000001",
            "email": "a@example.com",
            "address": "1 Tran Hung Dao, Ha Noi"
        },
        "line_items": [{
            "product_id": product_id,
            "quantity": quantity,
            "unit_price": unit_price,
            "discount": "0"
        }],
        "subtotal": subtotal,
        "shipping_fee": shipping,
        "discount_amount": "0",
        "total_amount": subtotal + shipping,
        "voucher_id": null,
        "voucher_code": null,
        "note": null
    })
}
