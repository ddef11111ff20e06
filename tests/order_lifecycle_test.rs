mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use common::{body_json, checkout_body, TestApp};

async fn place_cod_order(app: &TestApp, customer_id: Uuid, product_id: Uuid) -> Uuid {
    let response = app
        .request_as(
            Method::POST,
            "/api/v1/payment/create-order-cod",
            Some(checkout_body(product_id, dec!(100000), 1)),
            customer_id,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["order"]["id"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("order id in response")
}

#[tokio::test]
async fn orders_are_listed_newest_first() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    let product = app.seed_product("Ao thun", dec!(100000), 10).await;

    let first = place_cod_order(&app, customer_id, product.id).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let second = place_cod_order(&app, customer_id, product.id).await;

    let response = app
        .request_as(Method::GET, "/api/v1/orders", None, customer_id)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let orders = body["data"].as_array().expect("order list");
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["id"], second.to_string());
    assert_eq!(orders[1]["id"], first.to_string());
}

#[tokio::test]
async fn order_detail_includes_items_and_history() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    let product = app.seed_product("Ao thun", dec!(100000), 10).await;
    let order_id = place_cod_order(&app, customer_id, product.id).await;

    let response = app
        .request_as(
            Method::GET,
            &format!("/api/v1/orders/{order_id}"),
            None,
            customer_id,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let detail = &body["data"];
    assert_eq!(detail["id"], order_id.to_string());
    assert_eq!(detail["items"].as_array().unwrap().len(), 1);
    assert_eq!(detail["items"][0]["product_id"], product.id.to_string());
    assert_eq!(detail["status_history"].as_array().unwrap().len(), 1);
    assert_eq!(detail["status_history"][0]["status"], "pending");
}

#[tokio::test]
async fn orders_are_scoped_to_their_owner() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let product = app.seed_product("Ao thun", dec!(100000), 10).await;
    let order_id = place_cod_order(&app, owner, product.id).await;

    let response = app
        .request_as(
            Method::GET,
            &format!("/api/v1/orders/{order_id}"),
            None,
            stranger,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request_as(
            Method::PUT,
            &format!("/api/v1/orders/{order_id}"),
            Some(json!({ "status": 0 })),
            stranger,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The stranger's own list is empty.
    let response = app
        .request_as(Method::GET, "/api/v1/orders", None, stranger)
        .await;
    let body = body_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_order_returns_not_found() {
    let app = TestApp::new().await;
    let response = app
        .request_as(
            Method::GET,
            &format!("/api/v1/orders/{}", Uuid::new_v4()),
            None,
            Uuid::new_v4(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn customer_can_cancel_then_status_is_terminal() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    let product = app.seed_product("Ao thun", dec!(100000), 10).await;
    let order_id = place_cod_order(&app, customer_id, product.id).await;

    let response = app
        .request_as(
            Method::PUT,
            &format!("/api/v1/orders/{order_id}"),
            Some(json!({ "status": 0 })),
            customer_id,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "cancelled");

    // Terminal states accept no further transitions.
    let response = app
        .request_as(
            Method::PUT,
            &format!("/api/v1/orders/{order_id}"),
            Some(json!({ "status": 1 })),
            customer_id,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Cancellation appended a history entry.
    let response = app
        .request_as(
            Method::GET,
            &format!("/api/v1/orders/{order_id}"),
            None,
            customer_id,
        )
        .await;
    let body = body_json(response).await;
    let history = body["data"]["status_history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1]["status"], "cancelled");
}

#[tokio::test]
async fn customer_can_confirm_receipt() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    let product = app.seed_product("Ao thun", dec!(100000), 10).await;
    let order_id = place_cod_order(&app, customer_id, product.id).await;

    let response = app
        .request_as(
            Method::PUT,
            &format!("/api/v1/orders/{order_id}"),
            Some(json!({ "status": 1 })),
            customer_id,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "delivered");
}

#[tokio::test]
async fn unknown_action_code_is_rejected() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();
    let product = app.seed_product("Ao thun", dec!(100000), 10).await;
    let order_id = place_cod_order(&app, customer_id, product.id).await;

    let response = app
        .request_as(
            Method::PUT,
            &format!("/api/v1/orders/{order_id}"),
            Some(json!({ "status": 7 })),
            customer_id,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
