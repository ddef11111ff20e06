use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront Checkout and Order API

Checkout, payment settlement, and order lifecycle for the storefront.

## Authentication

Customer endpoints require a JWT in the Authorization header:

```
Authorization: Bearer <your-jwt-token>
```

The gateway callback endpoint is unauthenticated but signature-verified.

## Error Handling

The API uses consistent error response formats with appropriate HTTP status codes:

```json
{
  "error": "Bad Request",
  "message": "Validation failed",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Checkout and payment endpoints"),
        (name = "Orders", description = "Customer order endpoints"),
        (name = "Vouchers", description = "Voucher discovery endpoints")
    ),
    paths(
        // Checkout
        crate::handlers::checkout::create_gateway_payment,
        crate::handlers::checkout::create_cod_order,
        crate::handlers::checkout::vnpay_callback,

        // Orders
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order,

        // Vouchers
        crate::handlers::vouchers::list_available_vouchers,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,

            crate::handlers::checkout::CheckoutRequest,
            crate::handlers::checkout::GatewayCheckoutResponse,
            crate::handlers::checkout::CodCheckoutResponse,
            crate::handlers::checkout::CallbackRequest,
            crate::handlers::checkout::CallbackResponse,

            crate::handlers::orders::OrderDetail,
            crate::handlers::orders::UpdateOrderRequest,

            crate::services::orders::CustomerInfo,
            crate::services::orders::OrderLineDraft,

            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentMethod,
            crate::entities::voucher::VoucherKind,
            crate::entities::voucher::VoucherStatus,

            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
