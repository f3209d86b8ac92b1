use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use super::{success, ApiJson, AppState, Success};
use crate::domain::{OrderId, Refund, RefundRequest};
use crate::error::AppError;
use crate::orchestration::RefundOutcome;

#[derive(Debug, Serialize)]
pub struct RefundsResponse {
    pub refunds: Vec<Refund>,
}

pub async fn list_refunds(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Success<RefundsResponse>>, AppError> {
    let refunds = state
        .ledger
        .refunds_for_order(&OrderId::new(order_id))
        .await?;
    Ok(success(RefundsResponse { refunds }))
}

pub async fn create_refund(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    ApiJson(body): ApiJson<RefundRequest>,
) -> Result<Json<Success<RefundOutcome>>, AppError> {
    let outcome = state
        .ledger
        .create_refund(&OrderId::new(order_id), body)
        .await?;
    Ok(success(outcome))
}
