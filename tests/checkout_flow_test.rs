mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

use common::{body_json, checkout_body, signed_callback_body, TestApp};
use storefront_api::entities::{
    cart, email_log, order, order_status_history, product,
};

#[tokio::test]
async fn cod_checkout_settles_inline() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let product = app.seed_product("Ao thun", dec!(100000), 10).await;
    app.seed_cart(customer_id, &[(product.id, 2)]).await;

    let response = app
        .request_as(
            Method::POST,
            "/api/v1/payment/create-order-cod",
            Some(checkout_body(product.id, dec!(100000), 2)),
            customer_id,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["message"], "order created");
    assert_eq!(body["order"]["status"], "pending");
    assert_eq!(body["order"]["payment_method"], "cod");
    assert_eq!(body["order"]["total_amount"], "220000");

    let order_id: Uuid = body["order"]["id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("order id in response");

    // Stock decremented, sold incremented.
    let refreshed = product::Entity::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.stock, 8);
    assert_eq!(refreshed.sold, 2);

    // Cart emptied and the row removed.
    let carts = cart::Entity::find()
        .filter(cart::Column::CustomerId.eq(customer_id))
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(carts, 0);

    // Exactly one confirmation email, logged as sent.
    assert_eq!(app.email.sent_count(), 1);
    let logs = email_log::Entity::find().all(&*app.state.db).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, email_log::EmailStatus::Sent);
    assert_eq!(logs[0].recipient, "a@example.com");
    assert!(logs[0].provider_message_id.is_some());

    // One history entry from the settlement status update.
    let history = order_status_history::Entity::find()
        .filter(order_status_history::Column::OrderId.eq(order_id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, order::OrderStatus::Pending);
}

#[tokio::test]
async fn settlement_keeps_unpurchased_cart_items() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let bought = app.seed_product("Ao thun", dec!(100000), 10).await;
    let kept = app.seed_product("Quan jean", dec!(250000), 5).await;
    app.seed_cart(customer_id, &[(bought.id, 2), (kept.id, 1)]).await;

    let response = app
        .request_as(
            Method::POST,
            "/api/v1/payment/create-order-cod",
            Some(checkout_body(bought.id, dec!(100000), 2)),
            customer_id,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Only the purchased line leaves the cart; the cart row survives.
    let items = app
        .state
        .services
        .carts
        .items_for_customer(customer_id)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_id, kept.id);

    let carts = cart::Entity::find()
        .filter(cart::Column::CustomerId.eq(customer_id))
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(carts, 1);

    // The unpurchased product's counters are untouched.
    let untouched = product::Entity::find_by_id(kept.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.stock, 5);
    assert_eq!(untouched.sold, 0);
}

#[tokio::test]
async fn checkout_requires_authentication() {
    let app = TestApp::new().await;
    let product = app.seed_product("Ao thun", dec!(100000), 10).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/payment/create-order-cod",
            Some(checkout_body(product.id, dec!(100000), 1)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/payment",
            Some(checkout_body(product.id, dec!(100000), 1)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn checkout_rejects_mismatched_total() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    let product = app.seed_product("Ao thun", dec!(100000), 10).await;

    let mut body = checkout_body(product.id, dec!(100000), 2);
    body["total_amount"] = serde_json::json!("999999");

    let response = app
        .request_as(
            Method::POST,
            "/api/v1/payment/create-order-cod",
            Some(body),
            customer_id,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // A rejected draft leaves no partial state behind.
    let orders = order::Entity::find().count(&*app.state.db).await.unwrap();
    assert_eq!(orders, 0);
    let refreshed = product::Entity::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.stock, 10);
}

#[tokio::test]
async fn checkout_rejects_empty_line_items() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let mut body = checkout_body(Uuid::new_v4(), dec!(100000), 1);
    body["line_items"] = serde_json::json!([]);
    body["subtotal"] = serde_json::json!("0");
    body["total_amount"] = serde_json::json!("20000");

    let response = app
        .request_as(
            Method::POST,
            "/api/v1/payment/create-order-cod",
            Some(body),
            customer_id,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn callback_for_unknown_order_writes_nothing() {
    let app = TestApp::new().await;
    let product = app.seed_product("Ao thun", dec!(100000), 10).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/payment/vnpay-callback",
            Some(signed_callback_body(Uuid::new_v4(), "00")),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["message"], "order not found");

    let refreshed = product::Entity::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.stock, 10);
    assert_eq!(app.email.sent_count(), 0);
}
