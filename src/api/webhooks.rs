//! Signed callbacks from payment gateways and logistics providers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::{success, AppState, Success};
use crate::domain::PaymentProvider;
use crate::error::AppError;
use crate::orchestration::{PaymentOutcome, TrackingOutcome};
use crate::webhook::{verify_signature, LogisticsWebhook, PaymentWebhook, SIGNATURE_HEADER};

/// Check the signature over the raw body, then parse it.
fn authenticated<T: DeserializeOwned>(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<T, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Err(err) = verify_signature(&state.ledger.config().webhook_secret, body, signature) {
        warn!(error = %err, "Rejected webhook");
        return Err(AppError::Unauthorized(err.to_string()));
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))
}

pub async fn payment_webhook(
    State(state): State<AppState>,
    Path(provider): Path<PaymentProvider>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Success<PaymentOutcome>>, AppError> {
    let webhook: PaymentWebhook = authenticated(&state, &headers, &body)?;
    let (order_id, payment) = webhook.into_new_payment(provider);
    info!(order_id = %order_id, provider = %provider, "Payment webhook received");
    let outcome = state.ledger.record_payment(&order_id, payment).await?;
    Ok(success(outcome))
}

pub async fn logistics_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Success<TrackingOutcome>>, AppError> {
    let webhook: LogisticsWebhook = authenticated(&state, &headers, &body)?;
    info!(
        all_pay_logistics_id = %webhook.all_pay_logistics_id,
        status = webhook.status.as_str(),
        "Logistics webhook received"
    );
    let outcome = state
        .ledger
        .ingest_logistics_update(&webhook.all_pay_logistics_id, webhook.status_update())
        .await?;
    Ok(success(outcome))
}
