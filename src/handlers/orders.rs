use axum::{
    extract::{Json, Path, State},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{order, order_item, order_status_history},
    errors::ServiceError,
    handlers::AppState,
    services::settlement::CustomerAction,
    ApiResponse,
};

/// Order with its line items and status trail.
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub status_history: Vec<order_status_history::Model>,
}

/// Customer status update: 0 cancels the order, 1 confirms receipt.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderRequest {
    pub status: u8,
}

/// List the caller's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses(
        (status = 200, description = "Orders for the authenticated customer", body = Vec<order::Model>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<order::Model>>>, ServiceError> {
    let orders = state.services.orders.list_for_customer(user.user_id).await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// Get one of the caller's orders with items and status history
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order detail", body = OrderDetail),
        (status = 403, description = "Order belongs to another customer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    let order = state
        .services
        .orders
        .get_order(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;

    if order.customer_id != user.user_id {
        return Err(ServiceError::Forbidden(
            "Order belongs to another customer".to_string(),
        ));
    }

    let items = state.services.orders.get_order_items(id).await?;
    let status_history = state.services.orders.get_status_history(id).await?;

    Ok(Json(ApiResponse::success(OrderDetail {
        order,
        items,
        status_history,
    })))
}

/// Cancel an order or confirm its delivery
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderRequest,
    responses(
        (status = 200, description = "Updated order", body = order::Model),
        (status = 400, description = "Order is in a terminal state or the action code is unknown", body = crate::errors::ErrorResponse),
        (status = 403, description = "Order belongs to another customer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderRequest>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    let action = match request.status {
        0 => CustomerAction::Cancel,
        1 => CustomerAction::Receive,
        other => {
            return Err(ServiceError::ValidationError(format!(
                "Unknown order action {other}, expected 0 (cancel) or 1 (received)"
            )))
        }
    };

    let updated = state
        .services
        .settlement
        .customer_action(user.user_id, id, action)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Order routes
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order).put(update_order))
}
