//! Read-side revenue views derived from completed payments.
//!
//! Nothing here is persisted; every figure is recomputed from ledger rows.

use crate::domain::{Currency, Decimal, Order, Payment, PaymentProvider, PaymentStatus};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderTotals {
    pub provider: PaymentProvider,
    pub payment_count: usize,
    pub gross_revenue: Decimal,
    pub gateway_fees: Decimal,
    pub net_revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevenueReport {
    /// Currency every figure below is expressed in.
    pub base_currency: Currency,
    pub providers: Vec<ProviderTotals>,
    pub gross_revenue: Decimal,
    pub gateway_fees: Decimal,
    pub net_revenue: Decimal,
    pub deferred_revenue: Decimal,
    pub recognized_revenue: Decimal,
}

/// Aggregate completed payments by provider, converted into `base`.
///
/// Deferred/recognized totals come from the orders passed in, which are
/// expected to be the orders the payments belong to.
pub fn build_revenue_report(payments: &[Payment], orders: &[Order], base: Currency) -> RevenueReport {
    let mut by_provider: BTreeMap<PaymentProvider, ProviderTotals> = BTreeMap::new();

    for payment in payments
        .iter()
        .filter(|p| p.payment_status == PaymentStatus::Completed)
    {
        let gross = payment
            .currency
            .to_base(payment.amount, payment.exchange_rate, base);
        let fee = payment
            .currency
            .to_base(payment.gateway_fee, payment.exchange_rate, base);

        let entry = by_provider
            .entry(payment.payment_provider)
            .or_insert_with(|| ProviderTotals {
                provider: payment.payment_provider,
                payment_count: 0,
                gross_revenue: Decimal::zero(),
                gateway_fees: Decimal::zero(),
                net_revenue: Decimal::zero(),
            });
        entry.payment_count += 1;
        entry.gross_revenue += gross;
        entry.gateway_fees += fee;
        entry.net_revenue += gross - fee;
    }

    let providers: Vec<ProviderTotals> = by_provider.into_values().collect();
    let gross_revenue = providers.iter().map(|p| p.gross_revenue).sum();
    let gateway_fees = providers.iter().map(|p| p.gateway_fees).sum();
    let net_revenue = providers.iter().map(|p| p.net_revenue).sum();

    let deferred_revenue = orders
        .iter()
        .map(|o| o.currency.to_base(o.deferred_revenue, o.exchange_rate, base))
        .sum();
    let recognized_revenue = orders
        .iter()
        .map(|o| o.currency.to_base(o.recognized_revenue, o.exchange_rate, base))
        .sum();

    RevenueReport {
        base_currency: base,
        providers,
        gross_revenue,
        gateway_fees,
        net_revenue,
        deferred_revenue,
        recognized_revenue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkout::tests::{d, sample_order};
    use crate::domain::{OrderId, PaymentId, PaymentType, PayoutStatus, TimeMs};

    fn payment(provider: PaymentProvider, amount: &str, fee: &str, status: PaymentStatus) -> Payment {
        Payment {
            id: PaymentId::generate(),
            order_id: OrderId::new("ord-1"),
            payment_provider: provider,
            transaction_id: None,
            payment_method: "credit_card".to_string(),
            payment_type: PaymentType::Full,
            amount: d(amount),
            currency: Currency::Twd,
            exchange_rate: d("1"),
            gateway_fee: d(fee),
            net_amount: d(amount) - d(fee),
            payment_status: status,
            payout_status: PayoutStatus::Pending,
            paid_at: Some(TimeMs::new(1)),
            payout_at: None,
            created_at: TimeMs::new(1),
        }
    }

    #[test]
    fn test_groups_completed_payments_by_provider() {
        let payments = vec![
            payment(PaymentProvider::Ecpay, "1000", "30", PaymentStatus::Completed),
            payment(PaymentProvider::Ecpay, "500", "15", PaymentStatus::Completed),
            payment(PaymentProvider::Stripe, "200", "8", PaymentStatus::Completed),
            payment(PaymentProvider::Stripe, "999", "9", PaymentStatus::Failed),
        ];
        let report = build_revenue_report(&payments, &[], Currency::Twd);

        assert_eq!(report.providers.len(), 2);
        let ecpay = &report.providers[0];
        assert_eq!(ecpay.provider, PaymentProvider::Ecpay);
        assert_eq!(ecpay.payment_count, 2);
        assert_eq!(ecpay.gross_revenue, d("1500"));
        assert_eq!(ecpay.net_revenue, d("1455"));

        assert_eq!(report.gross_revenue, d("1700"));
        assert_eq!(report.gateway_fees, d("53"));
        assert_eq!(report.net_revenue, d("1647"));
    }

    #[test]
    fn test_foreign_currency_converted_to_base() {
        let mut usd = payment(PaymentProvider::Paypal, "10", "0.5", PaymentStatus::Completed);
        usd.currency = Currency::Usd;
        usd.exchange_rate = d("31.2");
        let report = build_revenue_report(&[usd], &[], Currency::Twd);
        assert_eq!(report.gross_revenue, d("312"));
        assert_eq!(report.gateway_fees, d("16"));
        assert_eq!(report.net_revenue, d("296"));
    }

    #[test]
    fn test_order_revenue_totals() {
        let mut plain = sample_order(false);
        plain.status = crate::domain::OrderStatus::Paid;
        plain.apply_revenue();
        let pre = sample_order(true);
        let report = build_revenue_report(&[], &[plain, pre], Currency::Twd);
        assert_eq!(report.recognized_revenue, d("1000"));
        assert_eq!(report.deferred_revenue, d("1000"));
    }
}
