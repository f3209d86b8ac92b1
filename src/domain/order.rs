//! Order aggregate root and its status state machine.

use crate::domain::{Currency, Decimal, LogisticsSubType, OrderId, TimeMs};
use crate::engine::revenue;
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    PreorderConfirmed,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::PreorderConfirmed => "preorder_confirmed",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Paid, processing, shipped or delivered.
    pub fn is_paid_or_later(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }

    /// Whether `self -> next` is an edge an operator may request directly.
    ///
    /// `refunded` is deliberately absent: only the refund processor moves an
    /// order there.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (*self, next),
            (Pending, Paid)
                | (PreorderConfirmed, Paid)
                | (Paid, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Pending, Cancelled)
                | (PreorderConfirmed, Cancelled)
                | (Paid, Cancelled)
                | (Processing, Cancelled)
                | (Shipped, Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "preorder_confirmed" => Ok(OrderStatus::PreorderConfirmed),
            "paid" => Ok(OrderStatus::Paid),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    HomeDelivery,
    CvsPickup,
}

/// Recipient and delivery snapshot taken at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub method: ShippingMethod,
    pub recipient_name: String,
    #[serde(default)]
    pub recipient_email: Option<String>,
    pub recipient_phone: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub cvs_store_id: Option<String>,
    #[serde(default)]
    pub cvs_store_name: Option<String>,
    #[serde(default)]
    pub cvs_store_address: Option<String>,
    #[serde(default)]
    pub cvs_sub_type: Option<LogisticsSubType>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

impl ShippingInfo {
    fn has_cvs_fields(&self) -> bool {
        self.cvs_store_id.is_some()
            || self.cvs_store_name.is_some()
            || self.cvs_store_address.is_some()
            || self.cvs_sub_type.is_some()
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.recipient_name.trim().is_empty() {
            return Err(LedgerError::validation("recipient_name is required"));
        }
        if self.recipient_phone.trim().is_empty() {
            return Err(LedgerError::validation("recipient_phone is required"));
        }
        match self.method {
            ShippingMethod::HomeDelivery => {
                if self.address.as_deref().map_or(true, |a| a.trim().is_empty()) {
                    return Err(LedgerError::validation(
                        "address is required for home delivery",
                    ));
                }
                if self.has_cvs_fields() {
                    return Err(LedgerError::validation(
                        "convenience-store fields are only allowed for cvs_pickup",
                    ));
                }
            }
            ShippingMethod::CvsPickup => {}
        }
        Ok(())
    }
}

/// Tracking details an operator may attach when marking an order shipped/delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingInfo {
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Personal,
    Company,
    Donation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceInfo {
    #[serde(default)]
    pub invoice_required: bool,
    #[serde(default)]
    pub invoice_type: Option<InvoiceType>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub invoice_number: Option<String>,
}

impl InvoiceInfo {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.invoice_type == Some(InvoiceType::Company) {
            let tax_id_ok = self
                .tax_id
                .as_deref()
                .is_some_and(|t| t.len() == 8 && t.chars().all(|c| c.is_ascii_digit()));
            if !tax_id_ok {
                return Err(LedgerError::validation(
                    "company invoices need an 8-digit tax_id",
                ));
            }
            if self.company_name.as_deref().map_or(true, |c| c.trim().is_empty()) {
                return Err(LedgerError::validation(
                    "company invoices need a company_name",
                ));
            }
        }
        if self.invoice_type.is_some() && !self.invoice_required {
            return Err(LedgerError::validation(
                "invoice_type given but invoice_required is false",
            ));
        }
        Ok(())
    }
}

/// One order line. `cost` is admin-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub cost: Decimal,
    #[serde(default)]
    pub is_preorder: bool,
}

impl OrderItem {
    /// `price * quantity`, or `None` on overflow.
    pub fn line_total(&self) -> Option<Decimal> {
        self.price
            .checked_mul(Decimal::from_i64(i64::from(self.quantity)))
    }
}

/// Free-form operational tag. Duplicates are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "type")]
    pub tag_type: String,
    pub value: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: TimeMs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl FlagPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagPriority::Low => "low",
            FlagPriority::Medium => "medium",
            FlagPriority::High => "high",
            FlagPriority::Urgent => "urgent",
        }
    }
}

impl FromStr for FlagPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(FlagPriority::Low),
            "medium" => Ok(FlagPriority::Medium),
            "high" => Ok(FlagPriority::High),
            "urgent" => Ok(FlagPriority::Urgent),
            other => Err(format!("unknown flag priority: {}", other)),
        }
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub date: TimeMs,
    pub status: OrderStatus,
    pub note: String,
}

/// The order aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub currency: Currency,
    pub exchange_rate: Decimal,

    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub shipping_fee: Decimal,
    pub total_amount: Decimal,

    pub has_preorder: bool,
    pub deposit_amount: Decimal,
    pub remaining_amount: Decimal,
    pub is_fulfilled: bool,
    pub fulfilled_at: Option<TimeMs>,

    pub deferred_revenue: Decimal,
    pub recognized_revenue: Decimal,

    pub status: OrderStatus,
    pub shipping: ShippingInfo,
    pub invoice: InvoiceInfo,

    pub is_flagged: bool,
    pub flag_reason: Option<String>,
    pub flag_priority: Option<FlagPriority>,
    pub tags: Vec<Tag>,

    pub timeline: Vec<TimelineEvent>,
    pub items: Vec<OrderItem>,

    /// Bumped on every committed mutation of this order.
    pub version: i64,
    /// Global change cursor of the last mutation.
    pub change_seq: i64,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

impl Order {
    /// `total_amount == subtotal + tax_amount + shipping_fee`.
    pub fn totals_balance(&self) -> bool {
        self.total_amount == self.subtotal + self.tax_amount + self.shipping_fee
    }

    pub fn push_timeline(&mut self, note: impl Into<String>, now: TimeMs) {
        self.timeline.push(TimelineEvent {
            date: now,
            status: self.status,
            note: note.into(),
        });
    }

    /// Recompute deferred/recognized revenue from the current state.
    pub fn apply_revenue(&mut self) {
        let figures = revenue::recompute(self);
        self.deferred_revenue = figures.deferred_revenue;
        self.recognized_revenue = figures.recognized_revenue;
    }

    /// Apply an operator-requested status change.
    pub fn transition(
        &mut self,
        next: OrderStatus,
        note: Option<&str>,
        tracking: Option<&TrackingInfo>,
        now: TimeMs,
    ) -> Result<(), LedgerError> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        if matches!(next, OrderStatus::Shipped | OrderStatus::Delivered) {
            if let Some(tracking) = tracking {
                if let Some(carrier) = &tracking.carrier {
                    self.shipping.carrier = Some(carrier.clone());
                }
                if let Some(number) = &tracking.tracking_number {
                    self.shipping.tracking_number = Some(number.clone());
                }
            }
        }

        let previous = self.status;
        self.status = next;
        let note = match note {
            Some(n) if !n.trim().is_empty() => n.to_string(),
            _ => format!("Status changed from {} to {}", previous, next),
        };
        self.push_timeline(note, now);
        self.apply_revenue();
        Ok(())
    }

    /// Move the order to `refunded`. Only the refund processor calls this.
    pub fn mark_refunded(&mut self, note: impl Into<String>, now: TimeMs) -> Result<(), LedgerError> {
        self.ensure_refundable()?;
        self.status = OrderStatus::Refunded;
        self.push_timeline(note, now);
        self.apply_revenue();
        Ok(())
    }

    pub fn ensure_refundable(&self) -> Result<(), LedgerError> {
        if self.status == OrderStatus::Refunded {
            return Err(LedgerError::OrderNotRefundable(
                "order is already refunded".to_string(),
            ));
        }
        if !self.status.is_paid_or_later() {
            return Err(LedgerError::OrderNotRefundable(format!(
                "order status {} has no settled payment to refund",
                self.status
            )));
        }
        Ok(())
    }

    /// Flip `is_fulfilled`, collapsing deferred revenue into recognized.
    pub fn fulfill(&mut self, now: TimeMs) -> Result<(), LedgerError> {
        if !self.has_preorder {
            return Err(LedgerError::NotPreorder);
        }
        if self.is_fulfilled {
            return Err(LedgerError::AlreadyFulfilled);
        }
        if matches!(self.status, OrderStatus::Cancelled | OrderStatus::Refunded) {
            return Err(LedgerError::validation(format!(
                "cannot fulfill a {} order",
                self.status
            )));
        }
        self.is_fulfilled = true;
        self.fulfilled_at = Some(now);
        self.push_timeline("Preorder fulfilled", now);
        self.apply_revenue();
        Ok(())
    }

    pub fn add_tag(&mut self, tag_type: &str, value: &str, notes: Option<String>, now: TimeMs) -> Result<(), LedgerError> {
        if tag_type.trim().is_empty() || value.trim().is_empty() {
            return Err(LedgerError::validation("tag type and value are required"));
        }
        self.tags.push(Tag {
            tag_type: tag_type.trim().to_string(),
            value: value.trim().to_string(),
            notes,
            created_at: now,
        });
        Ok(())
    }

    /// Remove every tag matching `(tag_type, value)`; returns how many were removed.
    pub fn remove_tag(&mut self, tag_type: &str, value: &str) -> Result<usize, LedgerError> {
        let before = self.tags.len();
        self.tags
            .retain(|t| !(t.tag_type == tag_type.trim() && t.value == value.trim()));
        let removed = before - self.tags.len();
        if removed == 0 {
            return Err(LedgerError::not_found(format!("tag {}:{}", tag_type, value)));
        }
        Ok(removed)
    }

    pub fn flag(&mut self, reason: &str, priority: FlagPriority, now: TimeMs) -> Result<(), LedgerError> {
        if reason.trim().is_empty() {
            return Err(LedgerError::validation("flag reason is required"));
        }
        self.is_flagged = true;
        self.flag_reason = Some(reason.trim().to_string());
        self.flag_priority = Some(priority);
        self.push_timeline(
            format!("Flagged ({}): {}", priority.as_str(), reason.trim()),
            now,
        );
        Ok(())
    }

    pub fn unflag(&mut self, now: TimeMs) {
        let was_flagged = self.is_flagged;
        self.is_flagged = false;
        self.flag_reason = None;
        self.flag_priority = None;
        if was_flagged {
            self.push_timeline("Flag cleared", now);
        }
    }
}
