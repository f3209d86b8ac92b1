use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{success, ApiJson, AppState, Success};
use crate::domain::{NewPayment, OrderId, Payment, PaymentId, PaymentStatus, PayoutStatus};
use crate::error::AppError;
use crate::orchestration::PaymentOutcome;

#[derive(Debug, Serialize)]
pub struct PaymentsResponse {
    pub payments: Vec<Payment>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub payment: Payment,
}

pub async fn list_payments(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Success<PaymentsResponse>>, AppError> {
    let payments = state
        .ledger
        .payments_for_order(&OrderId::new(order_id))
        .await?;
    Ok(success(PaymentsResponse { payments }))
}

/// Manual payment entry. Order status is left to a separate status call.
pub async fn create_payment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    ApiJson(body): ApiJson<NewPayment>,
) -> Result<Json<Success<PaymentOutcome>>, AppError> {
    let outcome = state
        .ledger
        .record_payment(&OrderId::new(order_id), body)
        .await?;
    Ok(success(outcome))
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusRequest {
    pub status: PaymentStatus,
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    ApiJson(body): ApiJson<PaymentStatusRequest>,
) -> Result<Json<Success<PaymentResponse>>, AppError> {
    let payment = state
        .ledger
        .update_payment_status(&PaymentId::new(payment_id), body.status)
        .await?;
    Ok(success(PaymentResponse { payment }))
}

#[derive(Debug, Deserialize)]
pub struct PayoutRequest {
    pub payout_status: PayoutStatus,
}

pub async fn update_payout(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    ApiJson(body): ApiJson<PayoutRequest>,
) -> Result<Json<Success<PaymentResponse>>, AppError> {
    let payment = state
        .ledger
        .set_payout_status(&PaymentId::new(payment_id), body.payout_status)
        .await?;
    Ok(success(PaymentResponse { payment }))
}
