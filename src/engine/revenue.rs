//! Revenue recognition.
//!
//! Deferred vs. recognized revenue is a pure function of the order's state.
//! Recognition for preorders is all-or-nothing at fulfillment.

use crate::domain::{Decimal, Order, OrderStatus};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RevenueFigures {
    pub deferred_revenue: Decimal,
    pub recognized_revenue: Decimal,
}

impl RevenueFigures {
    fn new(deferred_revenue: Decimal, recognized_revenue: Decimal) -> Self {
        Self {
            deferred_revenue,
            recognized_revenue,
        }
    }
}

pub fn recompute(order: &Order) -> RevenueFigures {
    let total = order.total_amount;
    match order.status {
        OrderStatus::Cancelled | OrderStatus::Refunded => {
            RevenueFigures::new(Decimal::zero(), Decimal::zero())
        }
        _ if order.has_preorder => {
            if order.is_fulfilled {
                RevenueFigures::new(Decimal::zero(), total)
            } else {
                RevenueFigures::new(total, Decimal::zero())
            }
        }
        status if status.is_paid_or_later() => RevenueFigures::new(Decimal::zero(), total),
        _ => RevenueFigures::new(Decimal::zero(), Decimal::zero()),
    }
}
