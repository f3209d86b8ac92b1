//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by aggregate:
//! - `orders.rs` - Order rows, per-order locking and the change feed
//! - `payments.rs` - Payment ledger rows
//! - `refunds.rs` - Refund rows and the invoice action outbox
//! - `shipments.rs` - Shipments and their status logs
//!
//! Every mutation goes through [`OrderTx`]: a transaction whose first
//! statement bumps the order row, so it holds the SQLite write lock before
//! anything is read and sees a stable snapshot of the aggregate.

mod orders;
pub mod payments;
pub mod refunds;
pub mod shipments;

use crate::domain::{Decimal, Order, TimeMs};
use crate::error::LedgerError;
use serde::de::DeserializeOwned;
use sqlx::sqlite::{Sqlite, SqliteConnection, SqlitePool, SqliteRow};
use sqlx::{Row, Transaction};
use std::str::FromStr;
use tracing::warn;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Lock an order for mutation.
    ///
    /// Bumps the order's `version` and stamps it with the next change cursor.
    /// Dropping the returned handle without [`OrderTx::commit`] rolls back.
    ///
    /// # Errors
    /// `NotFound` if the order does not exist.
    pub async fn lock_order(&self, order_id: &crate::domain::OrderId) -> Result<OrderTx, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let now = TimeMs::now();

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET version = version + 1,
                change_seq = (SELECT seq + 1 FROM change_cursor WHERE id = 1),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now.as_ms())
        .bind(order_id.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found(format!("order {}", order_id)));
        }

        sqlx::query("UPDATE change_cursor SET seq = seq + 1 WHERE id = 1")
            .execute(&mut *tx)
            .await?;

        let order = orders::fetch_order(&mut tx, order_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("order {}", order_id)))?;

        Ok(OrderTx { tx, order, now })
    }
}

/// An order loaded under its row lock, plus the open transaction.
pub struct OrderTx {
    tx: Transaction<'static, Sqlite>,
    pub order: Order,
    now: TimeMs,
}

impl OrderTx {
    /// Timestamp shared by every write in this transaction.
    pub fn now(&self) -> TimeMs {
        self.now
    }

    /// Connection for child-row writes that must commit with the order.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Persist the (possibly mutated) order and commit everything.
    pub async fn commit(mut self) -> Result<Order, LedgerError> {
        orders::update_order(&mut self.tx, &self.order).await?;
        self.tx.commit().await?;
        Ok(self.order)
    }
}

fn decode_error(column: &str, raw: &str, err: impl std::fmt::Display) -> sqlx::Error {
    warn!(column = %column, value = %raw, error = %err, "Failed to decode stored value");
    sqlx::Error::Decode(format!("column {}: {}", column, err).into())
}

pub(crate) fn get_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| decode_error(column, &raw, e))
}

pub(crate) fn get_opt_decimal(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| Decimal::from_str(&s).map_err(|e| decode_error(column, &s, e)))
        .transpose()
}

pub(crate) fn get_parsed<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    T::from_str(&raw).map_err(|e| decode_error(column, &raw, e))
}

pub(crate) fn get_opt_parsed<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr<Err = String>,
{
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| T::from_str(&s).map_err(|e| decode_error(column, &s, e)))
        .transpose()
}

pub(crate) fn get_json<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).map_err(|e| decode_error(column, &raw, e))
}

pub(crate) fn get_opt_time(row: &SqliteRow, column: &str) -> Result<Option<TimeMs>, sqlx::Error> {
    let raw: Option<i64> = row.try_get(column)?;
    Ok(raw.map(TimeMs::new))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Protocol(e.to_string()))
}
