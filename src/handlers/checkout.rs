use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    entities::order::{self, PaymentMethod},
    errors::ServiceError,
    gateway::{CallbackOutcome, VnpayGateway},
    handlers::AppState,
    services::{
        orders::{CustomerInfo, OrderDraft, OrderLineDraft},
        settlement::SettlementOutcome,
    },
    ApiResponse,
};

/// Checkout body shared by the gateway and COD endpoints: a cart snapshot
/// with the totals the client computed, re-validated server-side.
#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct CheckoutRequest {
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
    pub note: Option<String>,
}

impl CheckoutRequest {
    fn into_draft(self, payment_method: PaymentMethod) -> OrderDraft {
        OrderDraft {
            customer: self.customer,
            line_items: self.line_items,
            subtotal: self.subtotal,
            shipping_fee: self.shipping_fee,
            discount_amount: self.discount_amount,
            total_amount: self.total_amount,
            voucher_id: self.voucher_id,
            voucher_code: self.voucher_code,
            payment_method,
            note: self.note,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GatewayCheckoutResponse {
    /// Signed redirect URL for the hosted payment page
    pub url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CodCheckoutResponse {
    pub message: String,
    pub order: order::Model,
}

/// Gateway payment callback body: the order reference plus the gateway's
/// `vnp_*` fields, signature included. Only the `vnp_*` set is covered by
/// the signature; the order is resolved from the signed `vnp_TxnRef` and
/// `orderId` must agree with it.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackRequest {
    #[serde(rename = "orderId")]
    pub order_id: Uuid,
    #[serde(flatten)]
    pub gateway_params: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CallbackResponse {
    pub message: String,
}

/// Start a gateway checkout and return the redirect URL
#[utoipa::path(
    post,
    path = "/api/v1/payment",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Redirect URL created", body = GatewayCheckoutResponse),
        (status = 400, description = "Invalid checkout body", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn create_gateway_payment(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<ApiResponse<GatewayCheckoutResponse>>, ServiceError> {
    let client_ip = client_ip(&headers);
    let draft = request.into_draft(PaymentMethod::Gateway);

    let url = state
        .services
        .settlement
        .checkout_gateway(&user, &draft, &client_ip)
        .await?;

    Ok(Json(ApiResponse::success(GatewayCheckoutResponse {
        url: url.to_string(),
    })))
}

/// Create a cash-on-delivery order and settle it inline
#[utoipa::path(
    post,
    path = "/api/v1/payment/create-order-cod",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created and settled", body = CodCheckoutResponse),
        (status = 400, description = "Invalid checkout body", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 502, description = "Confirmation email failed", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn create_cod_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CodCheckoutResponse>), ServiceError> {
    let draft = request.into_draft(PaymentMethod::Cod);

    let order = state.services.settlement.checkout_cod(&user, &draft).await?;

    Ok((
        StatusCode::CREATED,
        Json(CodCheckoutResponse {
            message: "order created".to_string(),
            order,
        }),
    ))
}

/// Gateway payment confirmation callback
///
/// The signature is verified before the payload is trusted; an invalid or
/// missing signature is rejected with zero writes.
#[utoipa::path(
    post,
    path = "/api/v1/payment/vnpay-callback",
    request_body = CallbackRequest,
    responses(
        (status = 200, description = "Callback processed", body = CallbackResponse),
        (status = 404, description = "Order not found", body = CallbackResponse),
        (status = 400, description = "Missing transaction reference", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature or order reference", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn vnpay_callback(
    State(state): State<AppState>,
    Json(request): Json<CallbackRequest>,
) -> Result<(StatusCode, Json<CallbackResponse>), ServiceError> {
    let params: Vec<(&str, &str)> = request
        .gateway_params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    if !state.services.gateway.verify_signature(params) {
        warn!(order_id = %request.order_id, "callback signature verification failed");
        return Err(ServiceError::Unauthorized(
            "invalid callback signature".to_string(),
        ));
    }

    // Only the vnp_* set is signed. The order reference is taken from
    // vnp_TxnRef so a replayed payload cannot be pointed at another order
    // through the unsigned orderId field.
    let Some(txn_ref) = VnpayGateway::transaction_ref(&request.gateway_params) else {
        return Err(ServiceError::ValidationError(
            "callback is missing the transaction reference".to_string(),
        ));
    };
    if txn_ref != request.order_id {
        warn!(order_id = %request.order_id, %txn_ref, "callback order id does not match the signed transaction reference");
        return Err(ServiceError::Unauthorized(
            "order reference does not match the signed transaction reference".to_string(),
        ));
    }

    let Some(order) = state.services.orders.get_order(txn_ref).await? else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(CallbackResponse {
                message: "order not found".to_string(),
            }),
        ));
    };

    // COD orders settle inline at checkout and never await a callback.
    if order.payment_method == PaymentMethod::Cod {
        warn!(order_id = %order.id, "callback for a cash-on-delivery order ignored");
        return Ok((
            StatusCode::OK,
            Json(CallbackResponse {
                message: "order already settled".to_string(),
            }),
        ));
    }

    match VnpayGateway::interpret_callback(&request.gateway_params) {
        CallbackOutcome::Confirmed => {
            match state.services.settlement.settle(&order).await? {
                SettlementOutcome::Settled(_) => Ok((
                    StatusCode::OK,
                    Json(CallbackResponse {
                        message: "order updated".to_string(),
                    }),
                )),
                SettlementOutcome::AlreadySettled => Ok((
                    StatusCode::OK,
                    Json(CallbackResponse {
                        message: "order already settled".to_string(),
                    }),
                )),
            }
        }
        CallbackOutcome::Declined { response_code } => {
            state
                .services
                .settlement
                .mark_payment_failed(&order, &response_code)
                .await?;
            Ok((
                StatusCode::OK,
                Json(CallbackResponse {
                    message: "payment failed".to_string(),
                }),
            ))
        }
    }
}

/// Client IP from the proxy headers, falling back to the placeholder the
/// gateway accepts for unknown origins.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

/// Checkout routes
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_gateway_payment))
        .route("/create-order-cod", post(create_cod_order))
        .route("/vnpay-callback", post(vnpay_callback))
}
