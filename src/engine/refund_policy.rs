//! Refundable-balance arithmetic.
//!
//! Balances are always derived from the ledger rows, never cached on the order.

use crate::domain::{
    Decimal, Order, Payment, PaymentStatus, Refund, RefundRequest, RefundStatus, RefundType,
};
use crate::error::LedgerError;

/// Sum of completed payment amounts.
pub fn completed_paid(payments: &[Payment]) -> Decimal {
    payments
        .iter()
        .filter(|p| p.payment_status == PaymentStatus::Completed)
        .map(|p| p.amount)
        .sum()
}

/// Sum of completed refund amounts.
pub fn completed_refunded(refunds: &[Refund]) -> Decimal {
    refunds
        .iter()
        .filter(|r| r.refund_status == RefundStatus::Completed)
        .map(|r| r.refund_amount)
        .sum()
}

pub fn refundable_balance(payments: &[Payment], refunds: &[Refund]) -> Decimal {
    completed_paid(payments) - completed_refunded(refunds)
}

/// Resolve the amount to refund, or reject the request.
///
/// A `full` refund must equal the refundable balance; when the caller omits
/// the amount it defaults to that balance.
pub fn resolve_refund_amount(
    order: &Order,
    request: &RefundRequest,
    payments: &[Payment],
    refunds: &[Refund],
) -> Result<Decimal, LedgerError> {
    request.validate()?;
    order.ensure_refundable()?;

    let refundable = refundable_balance(payments, refunds);
    if !refundable.is_positive() {
        return Err(LedgerError::OrderNotRefundable(
            "no completed payments left to refund".to_string(),
        ));
    }

    let amount = match (request.refund_type, request.refund_amount) {
        (RefundType::Full, None) => refundable,
        (_, Some(amount)) => amount,
        (RefundType::Partial, None) => {
            return Err(LedgerError::validation("partial refunds need a refund_amount"))
        }
    };

    if amount > refundable {
        return Err(LedgerError::ExceedsPaid {
            requested: amount,
            refundable,
        });
    }
    if request.refund_type == RefundType::Full && amount != refundable {
        return Err(LedgerError::validation(format!(
            "full refund must equal the refundable balance of {}",
            refundable
        )));
    }
    if !order.currency.is_minor_exact(amount) {
        return Err(LedgerError::validation(format!(
            "refund_amount has more precision than {} allows",
            order.currency
        )));
    }
    if request.refund_fee > amount {
        return Err(LedgerError::validation("refund_fee exceeds refund_amount"));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkout::tests::{d, sample_order};
    use crate::domain::{
        Currency, InvoiceAction, OrderId, OrderStatus, PaymentId, PaymentProvider, PaymentType,
        PayoutStatus, RefundId, TimeMs,
    };

    fn payment(amount: &str, status: PaymentStatus) -> Payment {
        Payment {
            id: PaymentId::generate(),
            order_id: OrderId::new("ord-1"),
            payment_provider: PaymentProvider::Ecpay,
            transaction_id: Some("t".to_string()),
            payment_method: "credit_card".to_string(),
            payment_type: PaymentType::Full,
            amount: d(amount),
            currency: Currency::Twd,
            exchange_rate: d("1"),
            gateway_fee: Decimal::zero(),
            net_amount: d(amount),
            payment_status: status,
            payout_status: PayoutStatus::Pending,
            paid_at: None,
            payout_at: None,
            created_at: TimeMs::new(0),
        }
    }

    fn refund(amount: &str, status: RefundStatus) -> Refund {
        Refund {
            id: RefundId::generate(),
            order_id: OrderId::new("ord-1"),
            refund_amount: d(amount),
            refund_fee: Decimal::zero(),
            net_refund: d(amount),
            refund_type: RefundType::Partial,
            refund_reason: "r".to_string(),
            invoice_action: InvoiceAction::CreditNote,
            refund_status: status,
            created_at: TimeMs::new(0),
        }
    }

    fn request(refund_type: RefundType, amount: Option<&str>) -> RefundRequest {
        RefundRequest {
            refund_amount: amount.map(d),
            refund_fee: Decimal::zero(),
            refund_type,
            refund_reason: "customer request".to_string(),
            invoice_action: InvoiceAction::Void,
        }
    }

    fn paid_order() -> Order {
        let mut order = sample_order(false);
        order.status = OrderStatus::Paid;
        order
    }

    #[test]
    fn test_only_completed_rows_count() {
        let payments = vec![
            payment("1000", PaymentStatus::Completed),
            payment("500", PaymentStatus::Failed),
            payment("200", PaymentStatus::Pending),
        ];
        let refunds = vec![
            refund("100", RefundStatus::Completed),
            refund("50", RefundStatus::Failed),
        ];
        assert_eq!(refundable_balance(&payments, &refunds), d("900"));
    }

    #[test]
    fn test_exceeds_paid() {
        let payments = vec![payment("1000", PaymentStatus::Completed)];
        let err = resolve_refund_amount(
            &paid_order(),
            &request(RefundType::Partial, Some("1200")),
            &payments,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::ExceedsPaid { .. }));
    }

    #[test]
    fn test_full_defaults_to_balance_and_must_match() {
        let payments = vec![payment("1000", PaymentStatus::Completed)];
        let refunds = vec![refund("300", RefundStatus::Completed)];
        let amount = resolve_refund_amount(
            &paid_order(),
            &request(RefundType::Full, None),
            &payments,
            &refunds,
        )
        .unwrap();
        assert_eq!(amount, d("700"));

        let err = resolve_refund_amount(
            &paid_order(),
            &request(RefundType::Full, Some("500")),
            &payments,
            &refunds,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn test_unpaid_or_refunded_orders_rejected() {
        let payments = vec![payment("1000", PaymentStatus::Completed)];
        let pending = sample_order(false);
        assert!(matches!(
            resolve_refund_amount(&pending, &request(RefundType::Full, None), &payments, &[]),
            Err(LedgerError::OrderNotRefundable(_))
        ));

        let mut refunded = paid_order();
        refunded.status = OrderStatus::Refunded;
        assert!(matches!(
            resolve_refund_amount(&refunded, &request(RefundType::Full, None), &payments, &[]),
            Err(LedgerError::OrderNotRefundable(_))
        ));
    }
}
