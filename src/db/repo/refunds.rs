//! Refund rows and the invoice action outbox.

use crate::domain::{InvoiceDirective, OrderId, Refund, RefundId, TimeMs};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::{get_decimal, get_parsed, Repository};

const REFUND_COLUMNS: &str = r#"
    id, order_id, refund_amount, refund_fee, net_refund, refund_type,
    refund_reason, invoice_action, refund_status, created_at
"#;

pub async fn insert_refund(conn: &mut SqliteConnection, refund: &Refund) -> Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT INTO refunds ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        REFUND_COLUMNS
    );
    sqlx::query(&sql)
        .bind(refund.id.as_str())
        .bind(refund.order_id.as_str())
        .bind(refund.refund_amount.to_canonical_string())
        .bind(refund.refund_fee.to_canonical_string())
        .bind(refund.net_refund.to_canonical_string())
        .bind(refund.refund_type.as_str())
        .bind(refund.refund_reason.as_str())
        .bind(refund.invoice_action.as_str())
        .bind(refund.refund_status.as_str())
        .bind(refund.created_at.as_ms())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn list_for_order(
    conn: &mut SqliteConnection,
    order_id: &OrderId,
) -> Result<Vec<Refund>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM refunds WHERE order_id = ? ORDER BY created_at ASC, id ASC",
        REFUND_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(order_id.as_str())
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(refund_from_row).collect()
}

/// Queue an invoice void/credit-note for the invoicing collaborator.
///
/// Returns the outbox row id.
pub async fn insert_invoice_action(
    conn: &mut SqliteConnection,
    refund: &Refund,
    invoice_number: Option<&str>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO invoice_actions (
            order_id, refund_id, action, invoice_number, amount, status, created_at
        ) VALUES (?, ?, ?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(refund.order_id.as_str())
    .bind(refund.id.as_str())
    .bind(refund.invoice_action.as_str())
    .bind(invoice_number)
    .bind(refund.refund_amount.to_canonical_string())
    .bind(refund.created_at.as_ms())
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

impl Repository {
    pub async fn refunds_for_order(&self, order_id: &OrderId) -> Result<Vec<Refund>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        list_for_order(&mut conn, order_id).await
    }

    /// Outbox rows in insertion order, optionally filtered by status.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_invoice_actions(
        &self,
        status: Option<&str>,
    ) -> Result<Vec<InvoiceDirective>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, refund_id, action, invoice_number, amount, status, created_at
            FROM invoice_actions
            WHERE (? IS NULL OR status = ?)
            ORDER BY id ASC
            "#,
        )
        .bind(status)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(InvoiceDirective {
                    id: row.try_get("id")?,
                    order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
                    refund_id: RefundId::new(row.try_get::<String, _>("refund_id")?),
                    action: get_parsed(row, "action")?,
                    invoice_number: row.try_get("invoice_number")?,
                    amount: get_decimal(row, "amount")?,
                    status: row.try_get("status")?,
                    created_at: TimeMs::new(row.try_get("created_at")?),
                })
            })
            .collect()
    }
}

fn refund_from_row(row: &SqliteRow) -> Result<Refund, sqlx::Error> {
    Ok(Refund {
        id: RefundId::new(row.try_get::<String, _>("id")?),
        order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
        refund_amount: get_decimal(row, "refund_amount")?,
        refund_fee: get_decimal(row, "refund_fee")?,
        net_refund: get_decimal(row, "net_refund")?,
        refund_type: get_parsed(row, "refund_type")?,
        refund_reason: row.try_get("refund_reason")?,
        invoice_action: get_parsed(row, "invoice_action")?,
        refund_status: get_parsed(row, "refund_status")?,
        created_at: TimeMs::new(row.try_get("created_at")?),
    })
}
