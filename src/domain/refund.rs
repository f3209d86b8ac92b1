//! Refund rows and the invoice side effects they request.

use crate::domain::{Decimal, OrderId, RefundId, TimeMs};
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundType {
    Full,
    Partial,
}

impl RefundType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundType::Full => "full",
            RefundType::Partial => "partial",
        }
    }
}

impl FromStr for RefundType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(RefundType::Full),
            "partial" => Ok(RefundType::Partial),
            other => Err(format!("unknown refund type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceAction {
    Void,
    CreditNote,
}

impl InvoiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceAction::Void => "void",
            InvoiceAction::CreditNote => "credit_note",
        }
    }
}

impl FromStr for InvoiceAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "void" => Ok(InvoiceAction::Void),
            "credit_note" => Ok(InvoiceAction::CreditNote),
            other => Err(format!("unknown invoice action: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Processing => "processing",
            RefundStatus::Completed => "completed",
            RefundStatus::Failed => "failed",
        }
    }
}

impl FromStr for RefundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RefundStatus::Pending),
            "processing" => Ok(RefundStatus::Processing),
            "completed" => Ok(RefundStatus::Completed),
            "failed" => Ok(RefundStatus::Failed),
            other => Err(format!("unknown refund status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: RefundId,
    pub order_id: OrderId,
    pub refund_amount: Decimal,
    pub refund_fee: Decimal,
    /// Always `refund_amount - refund_fee`.
    pub net_refund: Decimal,
    pub refund_type: RefundType,
    pub refund_reason: String,
    pub invoice_action: InvoiceAction,
    pub refund_status: RefundStatus,
    pub created_at: TimeMs,
}

/// Refund request as submitted by an operator.
///
/// For `full` refunds `refund_amount` may be omitted and defaults to the
/// refundable balance; if given it must equal that balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub refund_amount: Option<Decimal>,
    #[serde(default)]
    pub refund_fee: Decimal,
    pub refund_type: RefundType,
    pub refund_reason: String,
    pub invoice_action: InvoiceAction,
}

impl RefundRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.refund_reason.trim().is_empty() {
            return Err(LedgerError::validation("refund_reason is required"));
        }
        if self.refund_fee.is_negative() {
            return Err(LedgerError::validation("refund_fee must not be negative"));
        }
        match (self.refund_type, self.refund_amount) {
            (RefundType::Partial, None) => Err(LedgerError::validation(
                "partial refunds need a refund_amount",
            )),
            (_, Some(amount)) if !amount.is_positive() => {
                Err(LedgerError::validation("refund_amount must be positive"))
            }
            (_, Some(amount)) if amount.exceeds_max_amount() => Err(LedgerError::validation(
                format!("refund_amount exceeds {}", Decimal::max_amount()),
            )),
            _ => Ok(()),
        }
    }
}

/// Outbox row asking the invoicing collaborator to void or credit an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDirective {
    pub id: i64,
    pub order_id: OrderId,
    pub refund_id: RefundId,
    pub action: InvoiceAction,
    pub invoice_number: Option<String>,
    pub amount: Decimal,
    pub status: String,
    pub created_at: TimeMs,
}
