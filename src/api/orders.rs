use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{success, ApiJson, AppState, Success};
use crate::domain::{Order, OrderId, OrderStatus, TrackingInfo};
use crate::error::AppError;
use crate::orchestration::OrderDetail;

const DEFAULT_CHANGES_LIMIT: i64 = 100;

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order: Order,
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Success<OrderDetail>>, AppError> {
    let detail = state.ledger.order_detail(&OrderId::new(order_id)).await?;
    Ok(success(detail))
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    ApiJson(body): ApiJson<StatusChangeRequest>,
) -> Result<Json<Success<OrderResponse>>, AppError> {
    let tracking = match (&body.carrier, &body.tracking_number) {
        (None, None) => None,
        _ => Some(TrackingInfo {
            carrier: body.carrier.clone(),
            tracking_number: body.tracking_number.clone(),
        }),
    };
    let order = state
        .ledger
        .transition_status(
            &OrderId::new(order_id),
            body.status,
            body.note.as_deref(),
            tracking.as_ref(),
        )
        .await?;
    Ok(success(OrderResponse { order }))
}

#[derive(Debug, Deserialize)]
pub struct TimelineRequest {
    pub note: String,
}

pub async fn append_timeline(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    ApiJson(body): ApiJson<TimelineRequest>,
) -> Result<Json<Success<OrderResponse>>, AppError> {
    let order = state
        .ledger
        .append_timeline_event(&OrderId::new(order_id), &body.note)
        .await?;
    Ok(success(OrderResponse { order }))
}

pub async fn fulfill(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Success<OrderResponse>>, AppError> {
    let order = state.ledger.fulfill_order(&OrderId::new(order_id)).await?;
    Ok(success(OrderResponse { order }))
}

#[derive(Debug, Deserialize)]
pub struct InvoiceNumberRequest {
    pub invoice_number: String,
}

pub async fn record_invoice(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    ApiJson(body): ApiJson<InvoiceNumberRequest>,
) -> Result<Json<Success<OrderResponse>>, AppError> {
    let order = state
        .ledger
        .record_invoice_number(&OrderId::new(order_id), &body.invoice_number)
        .await?;
    Ok(success(OrderResponse { order }))
}

#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    #[serde(default)]
    pub since: i64,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ChangesResponse {
    pub orders: Vec<Order>,
    pub next_cursor: i64,
}

/// Orders changed after `since`, in change order.
pub async fn get_changes(
    State(state): State<AppState>,
    Query(params): Query<ChangesQuery>,
) -> Result<Json<Success<ChangesResponse>>, AppError> {
    let (orders, next_cursor) = state
        .ledger
        .changes_since(params.since, params.limit.unwrap_or(DEFAULT_CHANGES_LIMIT))
        .await?;
    Ok(success(ChangesResponse {
        orders,
        next_cursor,
    }))
}
