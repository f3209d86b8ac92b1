//! Payment ledger rows.

use crate::domain::{Currency, Decimal, OrderId, PaymentId, TimeMs};
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Gateway that collected a payment. `Manual` covers admin-entered
/// bank transfers and cash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    Ecpay,
    Stripe,
    Paypal,
    LinePay,
    Manual,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Ecpay => "ecpay",
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::Paypal => "paypal",
            PaymentProvider::LinePay => "line_pay",
            PaymentProvider::Manual => "manual",
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ecpay" => Ok(PaymentProvider::Ecpay),
            "stripe" => Ok(PaymentProvider::Stripe),
            "paypal" => Ok(PaymentProvider::Paypal),
            "line_pay" => Ok(PaymentProvider::LinePay),
            "manual" => Ok(PaymentProvider::Manual),
            other => Err(format!("unknown payment provider: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Deposit,
    Final,
    Full,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Deposit => "deposit",
            PaymentType::Final => "final",
            PaymentType::Full => "full",
        }
    }
}

impl FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(PaymentType::Deposit),
            "final" => Ok(PaymentType::Final),
            "full" => Ok(PaymentType::Full),
            other => Err(format!("unknown payment type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Forward-only edges; a failed payment is never resurrected.
    pub fn can_advance_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (*self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Refunded)
        )
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    PaidOut,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::PaidOut => "paid_out",
        }
    }
}

impl FromStr for PayoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PayoutStatus::Pending),
            "paid_out" => Ok(PayoutStatus::PaidOut),
            other => Err(format!("unknown payout status: {}", other)),
        }
    }
}

/// A payment attempt or completion recorded against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub payment_provider: PaymentProvider,
    pub transaction_id: Option<String>,
    pub payment_method: String,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub currency: Currency,
    pub exchange_rate: Decimal,
    pub gateway_fee: Decimal,
    /// Always `amount - gateway_fee`.
    pub net_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub payout_status: PayoutStatus,
    pub paid_at: Option<TimeMs>,
    pub payout_at: Option<TimeMs>,
    pub created_at: TimeMs,
}

/// Input for recording a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub payment_provider: PaymentProvider,
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub payment_method: String,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    #[serde(default)]
    pub gateway_fee: Decimal,
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub exchange_rate: Option<Decimal>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub paid_at: Option<TimeMs>,
}

impl NewPayment {
    /// Normalized transaction id used for idempotency, if any.
    pub fn normalized_transaction_id(&self) -> Option<String> {
        self.transaction_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.amount.is_positive() {
            return Err(LedgerError::validation("payment amount must be positive"));
        }
        if self.gateway_fee.is_negative() {
            return Err(LedgerError::validation("gateway_fee must not be negative"));
        }
        if self.amount.exceeds_max_amount() {
            return Err(LedgerError::validation(format!(
                "payment amount exceeds {}",
                Decimal::max_amount()
            )));
        }
        if self.gateway_fee > self.amount {
            return Err(LedgerError::validation("gateway_fee exceeds payment amount"));
        }
        if self.payment_method.trim().is_empty() {
            return Err(LedgerError::validation("payment_method is required"));
        }
        if let Some(rate) = self.exchange_rate {
            if !rate.is_positive() {
                return Err(LedgerError::validation("exchange_rate must be positive"));
            }
        }
        if self.payment_provider != PaymentProvider::Manual
            && self.normalized_transaction_id().is_none()
        {
            return Err(LedgerError::validation(format!(
                "{} payments require a transaction_id",
                self.payment_provider
            )));
        }
        if self.payment_status == Some(PaymentStatus::Refunded) {
            return Err(LedgerError::validation(
                "payments cannot be recorded as refunded",
            ));
        }
        Ok(())
    }

    /// Build the ledger row, defaulting currency and rate from the order.
    pub fn into_payment(
        self,
        id: PaymentId,
        order_id: OrderId,
        order_currency: Currency,
        order_rate: Decimal,
        now: TimeMs,
    ) -> Payment {
        let transaction_id = self.normalized_transaction_id();
        let payment_status = self.payment_status.unwrap_or(PaymentStatus::Completed);
        let paid_at = match payment_status {
            PaymentStatus::Completed => Some(self.paid_at.unwrap_or(now)),
            _ => None,
        };
        Payment {
            id,
            order_id,
            payment_provider: self.payment_provider,
            transaction_id,
            payment_method: self.payment_method.trim().to_string(),
            payment_type: self.payment_type,
            amount: self.amount,
            currency: self.currency.unwrap_or(order_currency),
            exchange_rate: self.exchange_rate.unwrap_or(order_rate),
            gateway_fee: self.gateway_fee,
            net_amount: self.amount - self.gateway_fee,
            payment_status,
            payout_status: PayoutStatus::Pending,
            paid_at,
            payout_at: None,
            created_at: now,
        }
    }
}
