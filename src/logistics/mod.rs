//! Logistics provider abstraction for convenience-store parcel creation and tracking.

use crate::domain::{Decimal, LogisticsSubType, StatusUpdate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod http;
pub mod mock;

pub use http::HttpLogisticsProvider;
pub use mock::MockLogisticsProvider;

/// Parcel creation request for a CVS pickup shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvsShipmentRequest {
    pub sub_type: LogisticsSubType,
    pub goods_name: String,
    pub goods_amount: Decimal,
    pub sender_name: String,
    pub sender_phone: String,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub receiver_email: Option<String>,
    pub receiver_store_id: String,
    /// `{order_id}:create_logistics`; lets the provider drop retried creations.
    pub idempotency_key: String,
}

/// Identifiers the provider issues for a created parcel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvsShipmentReceipt {
    pub cvs_paper_no: String,
    pub all_pay_logistics_id: String,
}

/// External logistics provider.
///
/// Implementations own retry/backoff for transient failures; callers wrap
/// each call in an overall timeout.
#[async_trait]
pub trait LogisticsProvider: Send + Sync + fmt::Debug {
    /// Create a convenience-store parcel.
    async fn create_cvs_shipment(
        &self,
        request: &CvsShipmentRequest,
    ) -> Result<CvsShipmentReceipt, LogisticsError>;

    /// Fetch the provider's status history for a parcel, oldest first.
    async fn query_status(&self, all_pay_logistics_id: &str) -> Result<Vec<StatusUpdate>, LogisticsError>;
}

/// Error type for logistics provider calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogisticsError {
    /// Connection failure, DNS, reset.
    NetworkError(String),
    /// Non-success HTTP status with the response body.
    HttpError { status: u16, message: String },
    /// The provider answered but refused the request.
    Rejected(String),
    /// Malformed response body.
    ParseError(String),
    RateLimited,
}

impl LogisticsError {
    /// Whether the call may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            LogisticsError::NetworkError(_) | LogisticsError::RateLimited => true,
            LogisticsError::HttpError { status, .. } => *status >= 500,
            LogisticsError::Rejected(_) | LogisticsError::ParseError(_) => false,
        }
    }

    /// Provider-facing message, unaltered.
    pub fn provider_message(&self) -> String {
        match self {
            LogisticsError::Rejected(msg) => msg.clone(),
            LogisticsError::HttpError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for LogisticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogisticsError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            LogisticsError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            LogisticsError::Rejected(msg) => write!(f, "Rejected: {}", msg),
            LogisticsError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            LogisticsError::RateLimited => write!(f, "Rate limited"),
        }
    }
}

impl std::error::Error for LogisticsError {}
