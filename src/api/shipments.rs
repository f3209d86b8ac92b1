use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use super::{success, ApiJson, AppState, Success};
use crate::domain::{ManualShipmentRequest, OrderId, Shipment, ShipmentId, StatusUpdate};
use crate::error::AppError;
use crate::orchestration::{ShipmentOutcome, TrackingOutcome};

#[derive(Debug, Serialize)]
pub struct ShipmentsResponse {
    pub shipments: Vec<Shipment>,
}

pub async fn list_shipments(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Success<ShipmentsResponse>>, AppError> {
    let shipments = state
        .ledger
        .shipments_for_order(&OrderId::new(order_id))
        .await?;
    Ok(success(ShipmentsResponse { shipments }))
}

pub async fn create_shipment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    ApiJson(body): ApiJson<ManualShipmentRequest>,
) -> Result<Json<Success<ShipmentOutcome>>, AppError> {
    let outcome = state
        .ledger
        .create_shipment(&OrderId::new(order_id), body)
        .await?;
    Ok(success(outcome))
}

pub async fn create_logistics_shipment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Success<ShipmentOutcome>>, AppError> {
    let outcome = state
        .ledger
        .create_logistics_shipment(&OrderId::new(order_id))
        .await?;
    Ok(success(outcome))
}

pub async fn query_logistics_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Success<TrackingOutcome>>, AppError> {
    let outcome = state
        .ledger
        .query_logistics_status(&OrderId::new(order_id))
        .await?;
    Ok(success(outcome))
}

pub async fn append_update(
    State(state): State<AppState>,
    Path(shipment_id): Path<String>,
    ApiJson(body): ApiJson<StatusUpdate>,
) -> Result<Json<Success<TrackingOutcome>>, AppError> {
    let outcome = state
        .ledger
        .append_shipment_update(&ShipmentId::new(shipment_id), body)
        .await?;
    Ok(success(outcome))
}
