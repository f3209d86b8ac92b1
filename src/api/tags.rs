use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::orders::OrderResponse;
use super::{success, ApiJson, AppState, Success};
use crate::domain::{FlagPriority, OrderId};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    #[serde(rename = "type")]
    pub tag_type: String,
    pub value: String,
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn add_tag(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    ApiJson(body): ApiJson<TagRequest>,
) -> Result<Json<Success<OrderResponse>>, AppError> {
    let order = state
        .ledger
        .add_tag(&OrderId::new(order_id), &body.tag_type, &body.value, body.notes)
        .await?;
    Ok(success(OrderResponse { order }))
}

pub async fn remove_tag(
    State(state): State<AppState>,
    Path((order_id, tag_type, value)): Path<(String, String, String)>,
) -> Result<Json<Success<OrderResponse>>, AppError> {
    let order = state
        .ledger
        .remove_tag(&OrderId::new(order_id), &tag_type, &value)
        .await?;
    Ok(success(OrderResponse { order }))
}

#[derive(Debug, Deserialize)]
pub struct FlagRequest {
    pub reason: String,
    #[serde(default = "default_priority")]
    pub priority: FlagPriority,
}

fn default_priority() -> FlagPriority {
    FlagPriority::Medium
}

pub async fn flag_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    ApiJson(body): ApiJson<FlagRequest>,
) -> Result<Json<Success<OrderResponse>>, AppError> {
    let order = state
        .ledger
        .flag_order(&OrderId::new(order_id), &body.reason, body.priority)
        .await?;
    Ok(success(OrderResponse { order }))
}

pub async fn unflag_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Success<OrderResponse>>, AppError> {
    let order = state.ledger.unflag_order(&OrderId::new(order_id)).await?;
    Ok(success(OrderResponse { order }))
}
