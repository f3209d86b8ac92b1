//! Transactional operations over the order aggregate.
//!
//! Every mutation locks the order row first (see [`Repository::lock_order`]),
//! applies pure domain methods to the loaded aggregate, writes child rows on
//! the same connection and commits once. An early `?` drops the transaction,
//! which rolls back every write made so far.

use crate::config::Config;
use crate::db::repo::{payments, refunds};
use crate::db::Repository;
use crate::domain::{
    FlagPriority, NewPayment, Order, OrderId, OrderIntent, OrderStatus, Payment, PaymentId,
    PaymentStatus, PayoutStatus, Refund, RefundId, RefundRequest, RefundStatus, TimeMs,
    TrackingInfo,
};
use crate::engine::refund_policy::{completed_paid, completed_refunded};
use crate::engine::{build_revenue_report, resolve_refund_amount, RevenueReport};
use crate::error::LedgerError;
use crate::logistics::LogisticsProvider;
use crate::orchestration::directive::{self, PaymentDirective};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Ledger {
    pub(super) repo: Arc<Repository>,
    pub(super) logistics: Arc<dyn LogisticsProvider>,
    pub(super) config: Config,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub total_amount: crate::domain::Decimal,
    pub payment: PaymentDirective,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub payment: Payment,
    /// False when an existing `(provider, transaction_id)` row was returned.
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub refund: Refund,
    pub order: Order,
    pub invoice_action_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub payments: Vec<Payment>,
    pub refunds: Vec<Refund>,
    pub shipments: Vec<crate::domain::Shipment>,
}

impl Ledger {
    pub fn new(repo: Arc<Repository>, logistics: Arc<dyn LogisticsProvider>, config: Config) -> Self {
        Self {
            repo,
            logistics,
            config,
        }
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Turn a checkout intent into a persisted order plus payment directive.
    pub async fn create_order(&self, intent: OrderIntent) -> Result<CheckoutOutcome, LedgerError> {
        let provider = intent.payment_provider;
        let order = intent.into_order(
            OrderId::generate(),
            &self.config.pricing_policy(),
            TimeMs::now(),
        )?;
        let order = self.repo.insert_order(order).await?;
        let payment = directive::build(&self.config, &order, provider);

        info!(
            order_id = %order.id,
            status = %order.status,
            total = %order.total_amount,
            has_preorder = order.has_preorder,
            "Order created"
        );

        Ok(CheckoutOutcome {
            order_id: order.id,
            status: order.status,
            total_amount: order.total_amount,
            payment,
        })
    }

    pub async fn get_order(&self, order_id: &OrderId) -> Result<Order, LedgerError> {
        self.repo
            .get_order(order_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("order {}", order_id)))
    }

    /// Order with its ledger and shipment rows, read concurrently.
    pub async fn order_detail(&self, order_id: &OrderId) -> Result<OrderDetail, LedgerError> {
        let (order, payments, refunds, shipments) = futures::try_join!(
            self.get_order(order_id),
            async { Ok::<_, LedgerError>(self.repo.payments_for_order(order_id).await?) },
            async { Ok::<_, LedgerError>(self.repo.refunds_for_order(order_id).await?) },
            async { Ok::<_, LedgerError>(self.repo.shipments_for_order(order_id).await?) },
        )?;
        Ok(OrderDetail {
            order,
            payments,
            refunds,
            shipments,
        })
    }

    pub async fn transition_status(
        &self,
        order_id: &OrderId,
        next: OrderStatus,
        note: Option<&str>,
        tracking: Option<&TrackingInfo>,
    ) -> Result<Order, LedgerError> {
        if next == OrderStatus::Refunded {
            return Err(LedgerError::validation(
                "orders move to refunded only through a refund",
            ));
        }

        let mut otx = self.repo.lock_order(order_id).await?;
        let from = otx.order.status;
        let now = otx.now();
        otx.order.transition(next, note, tracking, now)?;
        let order = otx.commit().await?;

        info!(order_id = %order_id, from = %from, to = %next, "Order status changed");
        Ok(order)
    }

    /// Append a free-text audit note without changing status.
    pub async fn append_timeline_event(&self, order_id: &OrderId, note: &str) -> Result<Order, LedgerError> {
        if note.trim().is_empty() {
            return Err(LedgerError::validation("note is required"));
        }
        let mut otx = self.repo.lock_order(order_id).await?;
        let now = otx.now();
        otx.order.push_timeline(note.trim(), now);
        Ok(otx.commit().await?)
    }

    /// Record a payment. Never changes order status.
    ///
    /// A repeated `(provider, transaction_id)` returns the existing row; if the
    /// repeat carries a later payment status, the row is advanced instead.
    pub async fn record_payment(
        &self,
        order_id: &OrderId,
        input: NewPayment,
    ) -> Result<PaymentOutcome, LedgerError> {
        input.validate()?;

        let mut otx = self.repo.lock_order(order_id).await?;
        let now = otx.now();

        if let Some(txn) = input.normalized_transaction_id() {
            let existing =
                payments::find_by_transaction(otx.conn(), input.payment_provider, &txn).await?;
            if let Some(mut existing) = existing {
                if &existing.order_id != order_id {
                    return Err(LedgerError::validation(format!(
                        "transaction {} is already recorded against order {}",
                        txn, existing.order_id
                    )));
                }
                let requested = input.payment_status.unwrap_or(PaymentStatus::Completed);
                if !existing.payment_status.can_advance_to(requested) {
                    debug!(
                        order_id = %order_id,
                        provider = %input.payment_provider,
                        transaction_id = %txn,
                        "Duplicate payment delivery ignored"
                    );
                    return Ok(PaymentOutcome {
                        payment: existing,
                        created: false,
                    });
                }
                advance_payment(&mut existing, requested, input.paid_at.unwrap_or(now));
                payments::update_payment(otx.conn(), &existing).await?;
                otx.commit().await?;
                info!(
                    payment_id = %existing.id,
                    status = existing.payment_status.as_str(),
                    "Payment status advanced by redelivery"
                );
                return Ok(PaymentOutcome {
                    payment: existing,
                    created: false,
                });
            }
        }

        let currency = input.currency.unwrap_or(otx.order.currency);
        if currency != otx.order.currency {
            return Err(LedgerError::validation(format!(
                "payment currency {} does not match order currency {}",
                currency, otx.order.currency
            )));
        }
        if !currency.is_minor_exact(input.amount) || !currency.is_minor_exact(input.gateway_fee) {
            return Err(LedgerError::validation(format!(
                "payment amounts have more precision than {} allows",
                currency
            )));
        }

        let payment = input.into_payment(
            PaymentId::generate(),
            order_id.clone(),
            otx.order.currency,
            otx.order.exchange_rate,
            now,
        );
        payments::insert_payment(otx.conn(), &payment).await?;
        otx.commit().await?;

        info!(
            order_id = %order_id,
            payment_id = %payment.id,
            provider = %payment.payment_provider,
            amount = %payment.amount,
            fee = %payment.gateway_fee,
            status = payment.payment_status.as_str(),
            "Payment recorded"
        );
        Ok(PaymentOutcome {
            payment,
            created: true,
        })
    }

    pub async fn payments_for_order(&self, order_id: &OrderId) -> Result<Vec<Payment>, LedgerError> {
        self.get_order(order_id).await?;
        Ok(self.repo.payments_for_order(order_id).await?)
    }

    /// Load a payment and lock its order.
    async fn lock_payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<(crate::db::repo::OrderTx, Payment), LedgerError> {
        let payment = self
            .repo
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("payment {}", payment_id)))?;
        let mut otx = self.repo.lock_order(&payment.order_id).await?;
        let payment = payments::get_payment(otx.conn(), payment_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("payment {}", payment_id)))?;
        Ok((otx, payment))
    }

    /// Move a payment forward through its status machine.
    pub async fn update_payment_status(
        &self,
        payment_id: &PaymentId,
        status: PaymentStatus,
    ) -> Result<Payment, LedgerError> {
        let (mut otx, mut payment) = self.lock_payment(payment_id).await?;
        if payment.payment_status == status {
            return Ok(payment);
        }
        if !payment.payment_status.can_advance_to(status) {
            return Err(LedgerError::validation(format!(
                "payment status cannot move from {} to {}",
                payment.payment_status.as_str(),
                status.as_str()
            )));
        }
        if payment.payment_status == PaymentStatus::Completed {
            let order_id = payment.order_id.clone();
            let paid = payments::list_for_order(otx.conn(), &order_id).await?;
            let refunded = refunds::list_for_order(otx.conn(), &order_id).await?;
            let remaining = completed_paid(&paid) - payment.amount;
            if remaining < completed_refunded(&refunded) {
                return Err(LedgerError::validation(format!(
                    "payment {} backs refunds already issued on order {}",
                    payment_id, order_id
                )));
            }
        }
        let now = otx.now();
        advance_payment(&mut payment, status, now);
        payments::update_payment(otx.conn(), &payment).await?;
        otx.commit().await?;

        info!(payment_id = %payment_id, status = status.as_str(), "Payment status updated");
        Ok(payment)
    }

    /// Back-office reconciliation toggle; independent of order status.
    pub async fn set_payout_status(
        &self,
        payment_id: &PaymentId,
        status: PayoutStatus,
    ) -> Result<Payment, LedgerError> {
        let (mut otx, mut payment) = self.lock_payment(payment_id).await?;
        if payment.payout_status == status {
            return Ok(payment);
        }
        if status == PayoutStatus::PaidOut && payment.payment_status != PaymentStatus::Completed {
            return Err(LedgerError::validation(
                "only completed payments can be paid out",
            ));
        }
        payment.payout_status = status;
        payment.payout_at = match status {
            PayoutStatus::PaidOut => Some(otx.now()),
            PayoutStatus::Pending => None,
        };
        payments::update_payment(otx.conn(), &payment).await?;
        otx.commit().await?;

        info!(payment_id = %payment_id, payout_status = status.as_str(), "Payout status updated");
        Ok(payment)
    }

    pub async fn fulfill_order(&self, order_id: &OrderId) -> Result<Order, LedgerError> {
        let mut otx = self.repo.lock_order(order_id).await?;
        let now = otx.now();
        otx.order.fulfill(now)?;
        let order = otx.commit().await?;

        info!(
            order_id = %order_id,
            recognized = %order.recognized_revenue,
            "Preorder fulfilled"
        );
        Ok(order)
    }

    /// Refund against completed payments and move the order to `refunded`.
    pub async fn create_refund(
        &self,
        order_id: &OrderId,
        request: RefundRequest,
    ) -> Result<RefundOutcome, LedgerError> {
        let mut otx = self.repo.lock_order(order_id).await?;
        let now = otx.now();

        let paid = payments::list_for_order(otx.conn(), order_id).await?;
        let prior = refunds::list_for_order(otx.conn(), order_id).await?;
        let amount = resolve_refund_amount(&otx.order, &request, &paid, &prior)?;

        let refund = Refund {
            id: RefundId::generate(),
            order_id: order_id.clone(),
            refund_amount: amount,
            refund_fee: request.refund_fee,
            net_refund: amount - request.refund_fee,
            refund_type: request.refund_type,
            refund_reason: request.refund_reason.trim().to_string(),
            invoice_action: request.invoice_action,
            refund_status: RefundStatus::Completed,
            created_at: now,
        };
        refunds::insert_refund(otx.conn(), &refund).await?;

        let invoice_action_id = if otx.order.invoice.invoice_required {
            let number = otx.order.invoice.invoice_number.clone();
            Some(refunds::insert_invoice_action(otx.conn(), &refund, number.as_deref()).await?)
        } else {
            None
        };

        otx.order.mark_refunded(
            format!(
                "Refunded {} ({}): {}",
                refund.refund_amount,
                refund.refund_type.as_str(),
                refund.refund_reason
            ),
            now,
        )?;
        let order = otx.commit().await?;

        info!(
            order_id = %order_id,
            refund_id = %refund.id,
            amount = %refund.refund_amount,
            invoice_action = refund.invoice_action.as_str(),
            "Refund recorded"
        );
        Ok(RefundOutcome {
            refund,
            order,
            invoice_action_id,
        })
    }

    pub async fn refunds_for_order(&self, order_id: &OrderId) -> Result<Vec<Refund>, LedgerError> {
        self.get_order(order_id).await?;
        Ok(self.repo.refunds_for_order(order_id).await?)
    }

    pub async fn add_tag(
        &self,
        order_id: &OrderId,
        tag_type: &str,
        value: &str,
        notes: Option<String>,
    ) -> Result<Order, LedgerError> {
        let mut otx = self.repo.lock_order(order_id).await?;
        let now = otx.now();
        otx.order.add_tag(tag_type, value, notes, now)?;
        Ok(otx.commit().await?)
    }

    pub async fn remove_tag(&self, order_id: &OrderId, tag_type: &str, value: &str) -> Result<Order, LedgerError> {
        let mut otx = self.repo.lock_order(order_id).await?;
        let removed = otx.order.remove_tag(tag_type, value)?;
        debug!(order_id = %order_id, removed, "Tags removed");
        Ok(otx.commit().await?)
    }

    pub async fn flag_order(
        &self,
        order_id: &OrderId,
        reason: &str,
        priority: FlagPriority,
    ) -> Result<Order, LedgerError> {
        let mut otx = self.repo.lock_order(order_id).await?;
        let now = otx.now();
        otx.order.flag(reason, priority, now)?;
        let order = otx.commit().await?;
        warn!(order_id = %order_id, priority = priority.as_str(), reason = %reason, "Order flagged");
        Ok(order)
    }

    pub async fn unflag_order(&self, order_id: &OrderId) -> Result<Order, LedgerError> {
        let mut otx = self.repo.lock_order(order_id).await?;
        let now = otx.now();
        otx.order.unflag(now);
        Ok(otx.commit().await?)
    }

    /// Store the number issued by the invoicing collaborator.
    pub async fn record_invoice_number(&self, order_id: &OrderId, number: &str) -> Result<Order, LedgerError> {
        let number = number.trim();
        if number.is_empty() {
            return Err(LedgerError::validation("invoice_number is required"));
        }
        let mut otx = self.repo.lock_order(order_id).await?;
        if !otx.order.invoice.invoice_required {
            return Err(LedgerError::validation("order does not require an invoice"));
        }
        let now = otx.now();
        otx.order.invoice.invoice_number = Some(number.to_string());
        otx.order.push_timeline(format!("Invoice {} issued", number), now);
        let order = otx.commit().await?;
        info!(order_id = %order_id, invoice_number = %number, "Invoice number recorded");
        Ok(order)
    }

    /// Orders changed after `since`, plus the cursor to poll from next.
    pub async fn changes_since(&self, since: i64, limit: i64) -> Result<(Vec<Order>, i64), LedgerError> {
        let limit = limit.clamp(1, 500);
        let orders = self.repo.list_changed_since(since, limit).await?;
        let next = match orders.last() {
            Some(order) => order.change_seq,
            None => since.max(0),
        };
        Ok((orders, next))
    }

    pub async fn revenue_report(&self, from: TimeMs, to: TimeMs) -> Result<RevenueReport, LedgerError> {
        let (payments, orders) = futures::try_join!(
            self.repo.list_payments_paid_between(from, to),
            self.repo.list_orders_created_between(from, to),
        )?;
        Ok(build_revenue_report(
            &payments,
            &orders,
            self.config.default_currency,
        ))
    }

    /// Payment ledger rows paid within the window, oldest first.
    pub async fn payments_paid_between(&self, from: TimeMs, to: TimeMs) -> Result<Vec<Payment>, LedgerError> {
        Ok(self.repo.list_payments_paid_between(from, to).await?)
    }
}

fn advance_payment(payment: &mut Payment, status: PaymentStatus, at: TimeMs) {
    payment.payment_status = status;
    if status == PaymentStatus::Completed && payment.paid_at.is_none() {
        payment.paid_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Currency, Decimal, PaymentProvider, PaymentType};

    #[test]
    fn test_advance_payment_sets_paid_at_once() {
        let mut payment = Payment {
            id: PaymentId::new("p"),
            order_id: OrderId::new("o"),
            payment_provider: PaymentProvider::Stripe,
            transaction_id: Some("pi_1".to_string()),
            payment_method: "card".to_string(),
            payment_type: PaymentType::Full,
            amount: Decimal::from_i64(10),
            currency: Currency::Usd,
            exchange_rate: Decimal::from_i64(31),
            gateway_fee: Decimal::zero(),
            net_amount: Decimal::from_i64(10),
            payment_status: PaymentStatus::Pending,
            payout_status: PayoutStatus::Pending,
            paid_at: None,
            payout_at: None,
            created_at: TimeMs::new(0),
        };
        advance_payment(&mut payment, PaymentStatus::Completed, TimeMs::new(7));
        assert_eq!(payment.paid_at, Some(TimeMs::new(7)));
        advance_payment(&mut payment, PaymentStatus::Refunded, TimeMs::new(9));
        assert_eq!(payment.paid_at, Some(TimeMs::new(7)));
    }
}
