//! Inbound webhook authentication and payloads.
//!
//! Gateways and logistics providers sign the raw request body with the shared
//! secret: `X-Signature: hex(HMAC-SHA256(secret, body))`. The signature is
//! checked before the body is parsed.

use crate::domain::{
    Currency, Decimal, NewPayment, OrderId, PaymentProvider, PaymentStatus, PaymentType,
    ShipmentStatus, StatusUpdate, TimeMs,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,
    #[error("signature is not valid hex")]
    Malformed,
    #[error("signature mismatch")]
    Mismatch,
    #[error("webhook secret is unusable")]
    BadKey,
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::BadKey)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify `signature` (hex) against `body` in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::Missing)?;
    let expected = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::BadKey)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

/// Payment gateway callback. The provider comes from the route.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentWebhook {
    pub order_id: OrderId,
    pub transaction_id: String,
    pub payment_method: String,
    #[serde(default = "default_payment_type")]
    pub payment_type: PaymentType,
    pub amount: Decimal,
    #[serde(default)]
    pub gateway_fee: Decimal,
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub exchange_rate: Option<Decimal>,
    pub status: PaymentStatus,
    #[serde(default)]
    pub paid_at: Option<TimeMs>,
}

fn default_payment_type() -> PaymentType {
    PaymentType::Full
}

impl PaymentWebhook {
    pub fn into_new_payment(self, provider: PaymentProvider) -> (OrderId, NewPayment) {
        let payment = NewPayment {
            payment_provider: provider,
            transaction_id: Some(self.transaction_id),
            payment_method: self.payment_method,
            payment_type: self.payment_type,
            amount: self.amount,
            gateway_fee: self.gateway_fee,
            currency: self.currency,
            exchange_rate: self.exchange_rate,
            payment_status: Some(self.status),
            paid_at: self.paid_at,
        };
        (self.order_id, payment)
    }
}

/// Logistics provider status push for one parcel.
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticsWebhook {
    pub all_pay_logistics_id: String,
    pub status: ShipmentStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub timestamp: TimeMs,
}

impl LogisticsWebhook {
    pub fn status_update(&self) -> StatusUpdate {
        StatusUpdate {
            status: self.status,
            description: self.description.clone(),
            location: self.location.clone(),
            timestamp: self.timestamp,
        }
    }
}
