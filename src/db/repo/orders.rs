//! Order rows and the change feed.

use crate::domain::{Order, OrderId, TimeMs};
use crate::error::LedgerError;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::{
    get_decimal, get_json, get_opt_parsed, get_opt_time, get_parsed, to_json, Repository,
};

const ORDER_COLUMNS: &str = r#"
    id, currency, exchange_rate, subtotal, tax_rate, tax_amount, shipping_fee,
    total_amount, has_preorder, deposit_amount, remaining_amount, is_fulfilled,
    fulfilled_at, deferred_revenue, recognized_revenue, status, shipping_json,
    invoice_json, is_flagged, flag_reason, flag_priority, tags_json, timeline_json,
    items_json, version, change_seq, created_at, updated_at
"#;

impl Repository {
    /// Persist a freshly built order as version 1.
    ///
    /// # Errors
    /// Returns an error if the insert fails (including a duplicate id).
    pub async fn insert_order(&self, mut order: Order) -> Result<Order, LedgerError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE change_cursor SET seq = seq + 1 WHERE id = 1")
            .execute(&mut *tx)
            .await?;
        let seq: i64 = sqlx::query_scalar("SELECT seq FROM change_cursor WHERE id = 1")
            .fetch_one(&mut *tx)
            .await?;

        order.version = 1;
        order.change_seq = seq;

        let sql = format!(
            "INSERT INTO orders ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ORDER_COLUMNS
        );
        sqlx::query(&sql)
            .bind(order.id.as_str())
            .bind(order.currency.as_str())
            .bind(order.exchange_rate.to_canonical_string())
            .bind(order.subtotal.to_canonical_string())
            .bind(order.tax_rate.to_canonical_string())
            .bind(order.tax_amount.to_canonical_string())
            .bind(order.shipping_fee.to_canonical_string())
            .bind(order.total_amount.to_canonical_string())
            .bind(order.has_preorder)
            .bind(order.deposit_amount.to_canonical_string())
            .bind(order.remaining_amount.to_canonical_string())
            .bind(order.is_fulfilled)
            .bind(order.fulfilled_at.map(|t| t.as_ms()))
            .bind(order.deferred_revenue.to_canonical_string())
            .bind(order.recognized_revenue.to_canonical_string())
            .bind(order.status.as_str())
            .bind(to_json(&order.shipping)?)
            .bind(to_json(&order.invoice)?)
            .bind(order.is_flagged)
            .bind(order.flag_reason.as_deref())
            .bind(order.flag_priority.map(|p| p.as_str()))
            .bind(to_json(&order.tags)?)
            .bind(to_json(&order.timeline)?)
            .bind(to_json(&order.items)?)
            .bind(order.version)
            .bind(order.change_seq)
            .bind(order.created_at.as_ms())
            .bind(order.updated_at.as_ms())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(order)
    }

    pub async fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, order_id).await
    }

    /// Orders whose last mutation is after `since`, oldest change first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_changed_since(&self, since: i64, limit: i64) -> Result<Vec<Order>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM orders WHERE change_seq > ? ORDER BY change_seq ASC LIMIT ?",
            ORDER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(since)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(order_from_row).collect()
    }

    pub async fn current_cursor(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT seq FROM change_cursor WHERE id = 1")
            .fetch_one(&self.pool)
            .await
    }

    /// Orders created within `[from, to]`.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_orders_created_between(
        &self,
        from: TimeMs,
        to: TimeMs,
    ) -> Result<Vec<Order>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM orders WHERE created_at >= ? AND created_at <= ? ORDER BY created_at ASC, id ASC",
            ORDER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(from.as_ms())
            .bind(to.as_ms())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(order_from_row).collect()
    }
}

pub(super) async fn fetch_order(
    conn: &mut SqliteConnection,
    order_id: &OrderId,
) -> Result<Option<Order>, sqlx::Error> {
    let sql = format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(order_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(order_from_row).transpose()
}

/// Write back every mutable column. `version`/`change_seq`/`updated_at`
/// were already bumped by the lock statement.
pub(super) async fn update_order(conn: &mut SqliteConnection, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE orders SET
            deposit_amount = ?, remaining_amount = ?, is_fulfilled = ?, fulfilled_at = ?,
            deferred_revenue = ?, recognized_revenue = ?, status = ?, shipping_json = ?,
            invoice_json = ?, is_flagged = ?, flag_reason = ?, flag_priority = ?,
            tags_json = ?, timeline_json = ?
        WHERE id = ?
        "#,
    )
    .bind(order.deposit_amount.to_canonical_string())
    .bind(order.remaining_amount.to_canonical_string())
    .bind(order.is_fulfilled)
    .bind(order.fulfilled_at.map(|t| t.as_ms()))
    .bind(order.deferred_revenue.to_canonical_string())
    .bind(order.recognized_revenue.to_canonical_string())
    .bind(order.status.as_str())
    .bind(to_json(&order.shipping)?)
    .bind(to_json(&order.invoice)?)
    .bind(order.is_flagged)
    .bind(order.flag_reason.as_deref())
    .bind(order.flag_priority.map(|p| p.as_str()))
    .bind(to_json(&order.tags)?)
    .bind(to_json(&order.timeline)?)
    .bind(order.id.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn order_from_row(row: &SqliteRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        id: OrderId::new(row.try_get::<String, _>("id")?),
        currency: get_parsed(row, "currency")?,
        exchange_rate: get_decimal(row, "exchange_rate")?,
        subtotal: get_decimal(row, "subtotal")?,
        tax_rate: get_decimal(row, "tax_rate")?,
        tax_amount: get_decimal(row, "tax_amount")?,
        shipping_fee: get_decimal(row, "shipping_fee")?,
        total_amount: get_decimal(row, "total_amount")?,
        has_preorder: row.try_get("has_preorder")?,
        deposit_amount: get_decimal(row, "deposit_amount")?,
        remaining_amount: get_decimal(row, "remaining_amount")?,
        is_fulfilled: row.try_get("is_fulfilled")?,
        fulfilled_at: get_opt_time(row, "fulfilled_at")?,
        deferred_revenue: get_decimal(row, "deferred_revenue")?,
        recognized_revenue: get_decimal(row, "recognized_revenue")?,
        status: get_parsed(row, "status")?,
        shipping: get_json(row, "shipping_json")?,
        invoice: get_json(row, "invoice_json")?,
        is_flagged: row.try_get("is_flagged")?,
        flag_reason: row.try_get("flag_reason")?,
        flag_priority: get_opt_parsed(row, "flag_priority")?,
        tags: get_json(row, "tags_json")?,
        timeline: get_json(row, "timeline_json")?,
        items: get_json(row, "items_json")?,
        version: row.try_get("version")?,
        change_seq: row.try_get("change_seq")?,
        created_at: TimeMs::new(row.try_get("created_at")?),
        updated_at: TimeMs::new(row.try_get("updated_at")?),
    })
}
