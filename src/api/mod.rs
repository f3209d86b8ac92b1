pub mod health;
pub mod orders;
pub mod payments;
pub mod refunds;
pub mod reports;
pub mod shipments;
pub mod storefront;
pub mod tags;
pub mod webhooks;

use crate::error::AppError;
use crate::orchestration::Ledger;
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    routing::{delete, get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
}

impl AppState {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

/// JSON body extractor whose rejections use the standard error envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

/// `{"success": true, ...fields of T}`
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

pub fn success<T: Serialize>(data: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        data,
    })
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        // checkout boundary
        .route("/v1/checkout", post(storefront::checkout))
        .route("/v1/storefront/orders/:order_id", get(storefront::get_customer_order))
        // admin surface
        .route("/v1/orders/changes", get(orders::get_changes))
        .route("/v1/orders/:order_id", get(orders::get_order))
        .route("/v1/orders/:order_id/status", post(orders::update_status))
        .route("/v1/orders/:order_id/timeline", post(orders::append_timeline))
        .route("/v1/orders/:order_id/fulfill", post(orders::fulfill))
        .route("/v1/orders/:order_id/invoice", post(orders::record_invoice))
        .route(
            "/v1/orders/:order_id/payments",
            get(payments::list_payments).post(payments::create_payment),
        )
        .route("/v1/payments/:payment_id/status", post(payments::update_status))
        .route("/v1/payments/:payment_id/payout", post(payments::update_payout))
        .route(
            "/v1/orders/:order_id/refunds",
            get(refunds::list_refunds).post(refunds::create_refund),
        )
        .route(
            "/v1/orders/:order_id/shipments",
            get(shipments::list_shipments).post(shipments::create_shipment),
        )
        .route(
            "/v1/orders/:order_id/logistics",
            post(shipments::create_logistics_shipment),
        )
        .route(
            "/v1/orders/:order_id/logistics/status",
            post(shipments::query_logistics_status),
        )
        .route("/v1/shipments/:shipment_id/updates", post(shipments::append_update))
        .route("/v1/orders/:order_id/tags", post(tags::add_tag))
        .route(
            "/v1/orders/:order_id/tags/:tag_type/:value",
            delete(tags::remove_tag),
        )
        .route(
            "/v1/orders/:order_id/flag",
            post(tags::flag_order).delete(tags::unflag_order),
        )
        // collaborators
        .route("/v1/webhooks/payments/:provider", post(webhooks::payment_webhook))
        .route("/v1/webhooks/logistics", post(webhooks::logistics_webhook))
        .route("/v1/reports/revenue", get(reports::get_revenue))
        .route("/v1/reports/payments.csv", get(reports::get_payments_csv))
        .route("/v1/invoice-actions", get(reports::get_invoice_actions))
        .layer(cors)
        .with_state(state)
}
