use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::{Decimal, OrderStatus};

/// Failure of a single ledger operation.
///
/// None of these are fatal to the process; each is scoped to one order
/// operation, and the transaction that produced it has been rolled back.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("{0} not found")]
    NotFound(String),
    #[error("refund of {requested} exceeds refundable balance of {refundable}")]
    ExceedsPaid {
        requested: Decimal,
        refundable: Decimal,
    },
    #[error("order is not refundable: {0}")]
    OrderNotRefundable(String),
    #[error("{provider} gateway error: {message}")]
    Gateway { provider: String, message: String },
    #[error("order is already fulfilled")]
    AlreadyFulfilled,
    #[error("order has no preorder items")]
    NotPreorder,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        LedgerError::NotFound(what.into())
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "ValidationError",
            LedgerError::InvalidTransition { .. } => "InvalidTransition",
            LedgerError::NotFound(_) => "NotFound",
            LedgerError::ExceedsPaid { .. } => "ExceedsPaid",
            LedgerError::OrderNotRefundable(_) => "OrderNotRefundable",
            LedgerError::Gateway { .. } => "GatewayError",
            LedgerError::AlreadyFulfilled => "AlreadyFulfilled",
            LedgerError::NotPreorder => "NotPreorder",
            LedgerError::Db(_) => "Internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::InvalidTransition { .. }
            | LedgerError::OrderNotRefundable(_)
            | LedgerError::AlreadyFulfilled => StatusCode::CONFLICT,
            LedgerError::ExceedsPaid { .. } | LedgerError::NotPreorder => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            LedgerError::Gateway { .. } => StatusCode::BAD_GATEWAY,
            LedgerError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "ValidationError", msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "Unauthorized", msg),
            // Provider text is surfaced untouched so operators can act on it.
            AppError::Ledger(LedgerError::Gateway { provider, message }) => {
                let body = Json(json!({
                    "success": false,
                    "kind": "GatewayError",
                    "provider": provider,
                    "error": message,
                }));
                return (StatusCode::BAD_GATEWAY, body).into_response();
            }
            AppError::Ledger(LedgerError::Db(err)) => {
                tracing::error!(error = %err, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal", err.to_string())
            }
            AppError::Ledger(err) => (err.status_code(), err.kind(), err.to_string()),
        };

        let body = Json(json!({
            "success": false,
            "kind": kind,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
