//! Payment ledger rows.
//!
//! Writes take a connection so they join the caller's order transaction.

use crate::domain::{OrderId, Payment, PaymentId, PaymentProvider, TimeMs};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::{get_decimal, get_opt_time, get_parsed, Repository};

const PAYMENT_COLUMNS: &str = r#"
    id, order_id, payment_provider, transaction_id, payment_method, payment_type,
    amount, currency, exchange_rate, gateway_fee, net_amount, payment_status,
    payout_status, paid_at, payout_at, created_at
"#;

/// Insert a payment row.
///
/// # Errors
/// Fails on a duplicate `(payment_provider, transaction_id)`; callers look the
/// pair up first under the order lock.
pub async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT INTO payments ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        PAYMENT_COLUMNS
    );
    sqlx::query(&sql)
        .bind(payment.id.as_str())
        .bind(payment.order_id.as_str())
        .bind(payment.payment_provider.as_str())
        .bind(payment.transaction_id.as_deref())
        .bind(payment.payment_method.as_str())
        .bind(payment.payment_type.as_str())
        .bind(payment.amount.to_canonical_string())
        .bind(payment.currency.as_str())
        .bind(payment.exchange_rate.to_canonical_string())
        .bind(payment.gateway_fee.to_canonical_string())
        .bind(payment.net_amount.to_canonical_string())
        .bind(payment.payment_status.as_str())
        .bind(payment.payout_status.as_str())
        .bind(payment.paid_at.map(|t| t.as_ms()))
        .bind(payment.payout_at.map(|t| t.as_ms()))
        .bind(payment.created_at.as_ms())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Persist status and payout fields. Amounts are immutable.
pub async fn update_payment(conn: &mut SqliteConnection, payment: &Payment) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE payments
        SET payment_status = ?, payout_status = ?, paid_at = ?, payout_at = ?
        WHERE id = ?
        "#,
    )
    .bind(payment.payment_status.as_str())
    .bind(payment.payout_status.as_str())
    .bind(payment.paid_at.map(|t| t.as_ms()))
    .bind(payment.payout_at.map(|t| t.as_ms()))
    .bind(payment.id.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find_by_transaction(
    conn: &mut SqliteConnection,
    provider: PaymentProvider,
    transaction_id: &str,
) -> Result<Option<Payment>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM payments WHERE payment_provider = ? AND transaction_id = ?",
        PAYMENT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(provider.as_str())
        .bind(transaction_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(payment_from_row).transpose()
}

pub async fn list_for_order(
    conn: &mut SqliteConnection,
    order_id: &OrderId,
) -> Result<Vec<Payment>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM payments WHERE order_id = ? ORDER BY created_at ASC, id ASC",
        PAYMENT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(order_id.as_str())
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(payment_from_row).collect()
}

pub async fn get_payment(
    conn: &mut SqliteConnection,
    payment_id: &PaymentId,
) -> Result<Option<Payment>, sqlx::Error> {
    let sql = format!("SELECT {} FROM payments WHERE id = ?", PAYMENT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(payment_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(payment_from_row).transpose()
}

impl Repository {
    pub async fn payments_for_order(&self, order_id: &OrderId) -> Result<Vec<Payment>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        list_for_order(&mut conn, order_id).await
    }

    pub async fn get_payment(&self, payment_id: &PaymentId) -> Result<Option<Payment>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        get_payment(&mut conn, payment_id).await
    }

    pub async fn find_payment_by_transaction(
        &self,
        provider: PaymentProvider,
        transaction_id: &str,
    ) -> Result<Option<Payment>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        find_by_transaction(&mut conn, provider, transaction_id).await
    }

    /// Payments with `paid_at` in `[from, to]`, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_payments_paid_between(
        &self,
        from: TimeMs,
        to: TimeMs,
    ) -> Result<Vec<Payment>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM payments WHERE paid_at >= ? AND paid_at <= ? ORDER BY paid_at ASC, id ASC",
            PAYMENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(from.as_ms())
            .bind(to.as_ms())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(payment_from_row).collect()
    }
}

fn payment_from_row(row: &SqliteRow) -> Result<Payment, sqlx::Error> {
    Ok(Payment {
        id: PaymentId::new(row.try_get::<String, _>("id")?),
        order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
        payment_provider: get_parsed(row, "payment_provider")?,
        transaction_id: row.try_get("transaction_id")?,
        payment_method: row.try_get("payment_method")?,
        payment_type: get_parsed(row, "payment_type")?,
        amount: get_decimal(row, "amount")?,
        currency: get_parsed(row, "currency")?,
        exchange_rate: get_decimal(row, "exchange_rate")?,
        gateway_fee: get_decimal(row, "gateway_fee")?,
        net_amount: get_decimal(row, "net_amount")?,
        payment_status: get_parsed(row, "payment_status")?,
        payout_status: get_parsed(row, "payout_status")?,
        paid_at: get_opt_time(row, "paid_at")?,
        payout_at: get_opt_time(row, "payout_at")?,
        created_at: TimeMs::new(row.try_get("created_at")?),
    })
}
