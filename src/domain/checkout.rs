//! Checkout order intent and its conversion into a new Order.

use crate::domain::{
    Currency, Decimal, InvoiceInfo, Order, OrderId, OrderItem, OrderStatus, PaymentProvider,
    ShippingInfo, TimeMs,
};
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};

/// What the cart/checkout boundary submits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub items: Vec<OrderItem>,
    pub shipping: ShippingInfo,
    #[serde(default)]
    pub invoice: InvoiceInfo,
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub exchange_rate: Option<Decimal>,
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub shipping_fee: Decimal,
    /// Explicit preorder deposit; derived from the configured rate when absent.
    #[serde(default)]
    pub deposit_amount: Option<Decimal>,
    /// Gateway the customer chose, used to build the payment directive.
    #[serde(default)]
    pub payment_provider: Option<PaymentProvider>,
}

/// Pricing policy applied when turning an intent into an order.
#[derive(Debug, Clone, Copy)]
pub struct PricingPolicy {
    pub default_currency: Currency,
    pub preorder_deposit_rate: Decimal,
}

impl OrderIntent {
    fn validate(&self, currency: Currency) -> Result<(), LedgerError> {
        if self.items.is_empty() {
            return Err(LedgerError::validation("order must contain at least one item"));
        }
        for item in &self.items {
            if item.product_id.trim().is_empty() || item.name.trim().is_empty() {
                return Err(LedgerError::validation("item product_id and name are required"));
            }
            if item.quantity == 0 {
                return Err(LedgerError::validation(format!(
                    "item {} has zero quantity",
                    item.product_id
                )));
            }
            if item.price.is_negative() || item.cost.is_negative() {
                return Err(LedgerError::validation(format!(
                    "item {} has a negative price or cost",
                    item.product_id
                )));
            }
            if item.price.exceeds_max_amount() || item.cost.exceeds_max_amount() {
                return Err(LedgerError::validation(format!(
                    "item {} price or cost exceeds {}",
                    item.product_id,
                    Decimal::max_amount()
                )));
            }
            if !currency.is_minor_exact(item.price) {
                return Err(LedgerError::validation(format!(
                    "item {} price has more precision than {} allows",
                    item.product_id, currency
                )));
            }
        }
        if self.shipping_fee.is_negative()
            || self.shipping_fee.exceeds_max_amount()
            || !currency.is_minor_exact(self.shipping_fee)
        {
            return Err(LedgerError::validation("invalid shipping_fee"));
        }
        if self.tax_rate.is_negative() || self.tax_rate > Decimal::from_i64(1) {
            return Err(LedgerError::validation("tax_rate must be within [0, 1]"));
        }
        if let Some(rate) = self.exchange_rate {
            if !rate.is_positive() {
                return Err(LedgerError::validation("exchange_rate must be positive"));
            }
        }
        self.shipping.validate()?;
        self.invoice.validate()?;
        Ok(())
    }

    /// Build a new order in `pending` or `preorder_confirmed`.
    ///
    /// Totals are computed once here and never recomputed afterwards.
    pub fn into_order(
        self,
        id: OrderId,
        policy: &PricingPolicy,
        now: TimeMs,
    ) -> Result<Order, LedgerError> {
        let currency = self.currency.unwrap_or(policy.default_currency);
        self.validate(currency)?;

        let overflow = || LedgerError::validation("order total is out of range");
        let line_totals = self
            .items
            .iter()
            .map(OrderItem::line_total)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(overflow)?;
        let subtotal = Decimal::checked_sum(line_totals).ok_or_else(overflow)?;
        let tax_amount = currency.round_minor(
            subtotal
                .checked_mul(self.tax_rate)
                .ok_or_else(overflow)?,
        );
        let total_amount = subtotal
            .checked_add(tax_amount)
            .and_then(|t| t.checked_add(self.shipping_fee))
            .ok_or_else(overflow)?;

        let has_preorder = self.items.iter().any(|i| i.is_preorder);
        let (deposit_amount, remaining_amount) = if has_preorder {
            let deposit = match self.deposit_amount {
                Some(d) => {
                    if !d.is_positive() || d > total_amount || !currency.is_minor_exact(d) {
                        return Err(LedgerError::validation(
                            "deposit_amount must be within (0, total_amount]",
                        ));
                    }
                    d
                }
                None => currency.round_minor(
                    total_amount
                        .checked_mul(policy.preorder_deposit_rate)
                        .ok_or_else(overflow)?,
                ),
            };
            (deposit, total_amount - deposit)
        } else {
            if self.deposit_amount.is_some() {
                return Err(LedgerError::validation(
                    "deposit_amount is only valid for preorder items",
                ));
            }
            (Decimal::zero(), Decimal::zero())
        };

        let status = if has_preorder {
            OrderStatus::PreorderConfirmed
        } else {
            OrderStatus::Pending
        };

        let mut order = Order {
            id,
            currency,
            exchange_rate: self.exchange_rate.unwrap_or(Decimal::from_i64(1)),
            subtotal,
            tax_rate: self.tax_rate,
            tax_amount,
            shipping_fee: self.shipping_fee,
            total_amount,
            has_preorder,
            deposit_amount,
            remaining_amount,
            is_fulfilled: false,
            fulfilled_at: None,
            deferred_revenue: Decimal::zero(),
            recognized_revenue: Decimal::zero(),
            status,
            shipping: self.shipping,
            invoice: InvoiceInfo {
                invoice_number: None,
                ..self.invoice
            },
            is_flagged: false,
            flag_reason: None,
            flag_priority: None,
            tags: Vec::new(),
            timeline: Vec::new(),
            items: self.items,
            version: 0,
            change_seq: 0,
            created_at: now,
            updated_at: now,
        };
        order.push_timeline("Order created", now);
        order.apply_revenue();
        Ok(order)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::ShippingMethod;
    use std::str::FromStr;

    pub(crate) fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    pub(crate) fn policy() -> PricingPolicy {
        PricingPolicy {
            default_currency: Currency::Twd,
            preorder_deposit_rate: d("0.3"),
        }
    }

    pub(crate) fn home_shipping() -> ShippingInfo {
        ShippingInfo {
            method: ShippingMethod::HomeDelivery,
            recipient_name: "Lin".to_string(),
            recipient_email: Some("lin@example.com".to_string()),
            recipient_phone: "0912345678".to_string(),
            address: Some("No. 1, Section 1, Taipei".to_string()),
            cvs_store_id: None,
            cvs_store_name: None,
            cvs_store_address: None,
            cvs_sub_type: None,
            carrier: None,
            tracking_number: None,
        }
    }

    pub(crate) fn item(price: &str, quantity: u32, is_preorder: bool) -> OrderItem {
        OrderItem {
            product_id: "p-1".to_string(),
            variant_id: None,
            name: "Ceramic mug".to_string(),
            price: d(price),
            quantity,
            cost: d("100"),
            is_preorder,
        }
    }

    pub(crate) fn intent(items: Vec<OrderItem>) -> OrderIntent {
        OrderIntent {
            items,
            shipping: home_shipping(),
            invoice: InvoiceInfo::default(),
            currency: None,
            exchange_rate: None,
            tax_rate: Decimal::zero(),
            shipping_fee: Decimal::zero(),
            deposit_amount: None,
            payment_provider: None,
        }
    }

    pub(crate) fn sample_order(preorder: bool) -> Order {
        intent(vec![item("1000", 1, preorder)])
            .into_order(OrderId::new("ord-1"), &policy(), TimeMs::new(1_000))
            .unwrap()
    }

    #[test]
    fn test_totals_are_exact() {
        let mut i = intent(vec![item("475", 2, false)]);
        i.tax_rate = d("0.05");
        i.shipping_fee = d("60");
        let order = i
            .into_order(OrderId::new("o"), &policy(), TimeMs::new(1))
            .unwrap();
        assert_eq!(order.subtotal, d("950"));
        assert_eq!(order.tax_amount, d("48"));
        assert_eq!(order.total_amount, d("1058"));
        assert!(order.totals_balance());
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.timeline.len(), 1);
    }

    #[test]
    fn test_preorder_split_uses_configured_rate() {
        let order = intent(vec![item("2000", 1, true)])
            .into_order(OrderId::new("o"), &policy(), TimeMs::new(1))
            .unwrap();
        assert!(order.has_preorder);
        assert_eq!(order.status, OrderStatus::PreorderConfirmed);
        assert_eq!(order.deposit_amount, d("600"));
        assert_eq!(order.remaining_amount, d("1400"));
        assert_eq!(order.deposit_amount + order.remaining_amount, order.total_amount);
        assert_eq!(order.deferred_revenue, d("2000"));
        assert_eq!(order.recognized_revenue, Decimal::zero());
    }

    #[test]
    fn test_explicit_deposit_out_of_range_rejected() {
        let mut i = intent(vec![item("2000", 1, true)]);
        i.deposit_amount = Some(d("2500"));
        let err = i
            .into_order(OrderId::new("o"), &policy(), TimeMs::new(1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn test_validation_rejects_bad_intents() {
        let empty = intent(vec![]);
        assert!(empty
            .into_order(OrderId::new("o"), &policy(), TimeMs::new(1))
            .is_err());

        let zero_qty = intent(vec![item("10", 0, false)]);
        assert!(zero_qty
            .into_order(OrderId::new("o"), &policy(), TimeMs::new(1))
            .is_err());

        let fractional_twd = intent(vec![item("10.5", 1, false)]);
        assert!(fractional_twd
            .into_order(OrderId::new("o"), &policy(), TimeMs::new(1))
            .is_err());

        let mut no_address = intent(vec![item("10", 1, false)]);
        no_address.shipping.address = None;
        assert!(no_address
            .into_order(OrderId::new("o"), &policy(), TimeMs::new(1))
            .is_err());
    }

    #[test]
    fn test_cvs_order_may_lack_store_at_creation() {
        let mut i = intent(vec![item("300", 1, false)]);
        i.shipping.method = ShippingMethod::CvsPickup;
        i.shipping.address = None;
        let order = i
            .into_order(OrderId::new("o"), &policy(), TimeMs::new(1))
            .unwrap();
        assert_eq!(order.shipping.cvs_store_id, None);
    }

    #[test]
    fn test_home_delivery_rejects_cvs_fields() {
        let mut i = intent(vec![item("300", 1, false)]);
        i.shipping.cvs_store_id = Some("991182".to_string());
        assert!(i
            .into_order(OrderId::new("o"), &policy(), TimeMs::new(1))
            .is_err());
    }

    #[test]
    fn test_oversized_amounts_are_validation_errors() {
        let huge = intent(vec![item("79228162514264337593543950335", 2, false)]);
        assert!(matches!(
            huge.into_order(OrderId::new("o"), &policy(), TimeMs::new(1)),
            Err(LedgerError::Validation(_))
        ));

        // Each line is within range; the sum over many lines is not.
        let lines = (0..100_000)
            .map(|_| item("1000000000000000", u32::MAX, false))
            .collect();
        assert!(matches!(
            intent(lines).into_order(OrderId::new("o"), &policy(), TimeMs::new(1)),
            Err(LedgerError::Validation(_))
        ));
    }
}
