use axum::{
    extract::{Json, Query, State},
    routing::get,
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    entities::voucher, errors::ServiceError, handlers::AppState, ApiResponse,
};

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct AvailableVouchersQuery {
    /// Order value the vouchers must be applicable to
    #[serde(default)]
    pub order_value: Decimal,
}

/// List vouchers applicable to an order of the given value
#[utoipa::path(
    get,
    path = "/api/v1/vouchers/available",
    params(AvailableVouchersQuery),
    responses(
        (status = 200, description = "Applicable vouchers", body = Vec<voucher::Model>)
    ),
    tag = "Vouchers"
)]
pub async fn list_available_vouchers(
    State(state): State<AppState>,
    Query(query): Query<AvailableVouchersQuery>,
) -> Result<Json<ApiResponse<Vec<voucher::Model>>>, ServiceError> {
    let vouchers = state
        .services
        .vouchers
        .list_available(query.order_value)
        .await?;
    Ok(Json(ApiResponse::success(vouchers)))
}

/// Voucher routes
pub fn vouchers_routes() -> Router<AppState> {
    Router::new().route("/available", get(list_available_vouchers))
}
