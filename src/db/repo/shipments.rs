//! Shipments and their append-only status logs.

use crate::domain::{OrderId, Shipment, ShipmentId, StatusUpdate, TimeMs};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::{get_opt_decimal, get_opt_parsed, get_parsed, Repository};

const SHIPMENT_COLUMNS: &str = r#"
    id, order_id, carrier, tracking_number, package_weight, logistics_sub_type,
    cvs_paper_no, all_pay_logistics_id, created_at
"#;

/// Insert a shipment and its initial status log.
///
/// `idempotency_key` is set for provider-created shipments only.
pub async fn insert_shipment(
    conn: &mut SqliteConnection,
    shipment: &Shipment,
    idempotency_key: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO shipments (
            id, order_id, carrier, tracking_number, package_weight, logistics_sub_type,
            cvs_paper_no, all_pay_logistics_id, idempotency_key, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(shipment.id.as_str())
    .bind(shipment.order_id.as_str())
    .bind(shipment.carrier.as_str())
    .bind(shipment.tracking_number.as_deref())
    .bind(shipment.package_weight.map(|w| w.to_canonical_string()))
    .bind(shipment.logistics_sub_type.map(|s| s.as_str()))
    .bind(shipment.cvs_paper_no.as_deref())
    .bind(shipment.all_pay_logistics_id.as_deref())
    .bind(idempotency_key)
    .bind(shipment.created_at.as_ms())
    .execute(&mut *conn)
    .await?;

    for update in &shipment.status_updates {
        append_status_update(conn, &shipment.id, update).await?;
    }
    Ok(())
}

/// Append one status update unless an identical one was already logged.
///
/// Returns whether a row was inserted.
pub async fn append_status_update(
    conn: &mut SqliteConnection,
    shipment_id: &ShipmentId,
    update: &StatusUpdate,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO shipment_status_updates (
            shipment_id, status, description, location, timestamp_ms, event_key
        ) VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(shipment_id, event_key) DO NOTHING
        "#,
    )
    .bind(shipment_id.as_str())
    .bind(update.status.as_str())
    .bind(update.description.as_str())
    .bind(update.location.as_str())
    .bind(update.timestamp.as_ms())
    .bind(update.event_key())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn load_updates(
    conn: &mut SqliteConnection,
    shipment_id: &ShipmentId,
) -> Result<Vec<StatusUpdate>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT status, description, location, timestamp_ms
        FROM shipment_status_updates
        WHERE shipment_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(shipment_id.as_str())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(StatusUpdate {
                status: get_parsed(row, "status")?,
                description: row.try_get("description")?,
                location: row.try_get("location")?,
                timestamp: TimeMs::new(row.try_get("timestamp_ms")?),
            })
        })
        .collect()
}

async fn hydrate(conn: &mut SqliteConnection, rows: Vec<SqliteRow>) -> Result<Vec<Shipment>, sqlx::Error> {
    let mut shipments = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut shipment = shipment_from_row(row)?;
        shipment.status_updates = load_updates(conn, &shipment.id).await?;
        shipments.push(shipment);
    }
    Ok(shipments)
}

async fn fetch_one_where(
    conn: &mut SqliteConnection,
    column: &str,
    value: &str,
) -> Result<Option<Shipment>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM shipments WHERE {} = ? ORDER BY created_at ASC LIMIT 1",
        SHIPMENT_COLUMNS, column
    );
    let rows = sqlx::query(&sql).bind(value).fetch_all(&mut *conn).await?;
    Ok(hydrate(conn, rows).await?.into_iter().next())
}

pub async fn get_shipment(
    conn: &mut SqliteConnection,
    shipment_id: &ShipmentId,
) -> Result<Option<Shipment>, sqlx::Error> {
    fetch_one_where(conn, "id", shipment_id.as_str()).await
}

pub async fn find_by_idempotency_key(
    conn: &mut SqliteConnection,
    key: &str,
) -> Result<Option<Shipment>, sqlx::Error> {
    fetch_one_where(conn, "idempotency_key", key).await
}

pub async fn find_by_logistics_id(
    conn: &mut SqliteConnection,
    all_pay_logistics_id: &str,
) -> Result<Option<Shipment>, sqlx::Error> {
    fetch_one_where(conn, "all_pay_logistics_id", all_pay_logistics_id).await
}

pub async fn list_for_order(
    conn: &mut SqliteConnection,
    order_id: &OrderId,
) -> Result<Vec<Shipment>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM shipments WHERE order_id = ? ORDER BY created_at ASC, id ASC",
        SHIPMENT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(order_id.as_str())
        .fetch_all(&mut *conn)
        .await?;
    hydrate(conn, rows).await
}

impl Repository {
    pub async fn shipments_for_order(&self, order_id: &OrderId) -> Result<Vec<Shipment>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        list_for_order(&mut conn, order_id).await
    }

    pub async fn get_shipment(&self, shipment_id: &ShipmentId) -> Result<Option<Shipment>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        get_shipment(&mut conn, shipment_id).await
    }

    pub async fn find_shipment_by_idempotency_key(&self, key: &str) -> Result<Option<Shipment>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        find_by_idempotency_key(&mut conn, key).await
    }

    pub async fn find_shipment_by_logistics_id(
        &self,
        all_pay_logistics_id: &str,
    ) -> Result<Option<Shipment>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        find_by_logistics_id(&mut conn, all_pay_logistics_id).await
    }
}

fn shipment_from_row(row: &SqliteRow) -> Result<Shipment, sqlx::Error> {
    Ok(Shipment {
        id: ShipmentId::new(row.try_get::<String, _>("id")?),
        order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
        carrier: row.try_get("carrier")?,
        tracking_number: row.try_get("tracking_number")?,
        package_weight: get_opt_decimal(row, "package_weight")?,
        logistics_sub_type: get_opt_parsed(row, "logistics_sub_type")?,
        cvs_paper_no: row.try_get("cvs_paper_no")?,
        all_pay_logistics_id: row.try_get("all_pay_logistics_id")?,
        status_updates: Vec::new(),
        created_at: TimeMs::new(row.try_get("created_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::super::tests::{seed_order, setup_test_db};
    use super::*;
    use crate::domain::{LogisticsSubType, ShipmentStatus};

    fn update(status: ShipmentStatus, ts: i64) -> StatusUpdate {
        StatusUpdate {
            status,
            description: "scan".to_string(),
            location: "Taipei".to_string(),
            timestamp: TimeMs::new(ts),
        }
    }

    fn shipment(order_id: &OrderId) -> Shipment {
        Shipment {
            id: ShipmentId::generate(),
            order_id: order_id.clone(),
            carrier: "UNIMART".to_string(),
            tracking_number: Some("P123".to_string()),
            package_weight: None,
            logistics_sub_type: Some(LogisticsSubType::Unimart),
            cvs_paper_no: Some("P123".to_string()),
            all_pay_logistics_id: Some("L-1".to_string()),
            status_updates: vec![update(ShipmentStatus::Preparing, 1)],
            created_at: TimeMs::new(1),
        }
    }

    #[tokio::test]
    async fn test_duplicate_updates_are_dropped_and_order_is_arrival() {
        let (repo, _temp) = setup_test_db().await;
        let order = seed_order(&repo, false).await;
        let s = shipment(&order.id);

        let mut otx = repo.lock_order(&order.id).await.unwrap();
        insert_shipment(otx.conn(), &s, Some("k-1")).await.unwrap();
        assert!(append_status_update(otx.conn(), &s.id, &update(ShipmentStatus::InTransit, 30))
            .await
            .unwrap());
        assert!(append_status_update(otx.conn(), &s.id, &update(ShipmentStatus::PickedUp, 20))
            .await
            .unwrap());
        assert!(!append_status_update(otx.conn(), &s.id, &update(ShipmentStatus::InTransit, 30))
            .await
            .unwrap());
        otx.commit().await.unwrap();

        let stored = repo.get_shipment(&s.id).await.unwrap().unwrap();
        let statuses: Vec<_> = stored.status_updates.iter().map(|u| u.status).collect();
        assert_eq!(
            statuses,
            vec![
                ShipmentStatus::Preparing,
                ShipmentStatus::InTransit,
                ShipmentStatus::PickedUp
            ]
        );
        assert_eq!(stored.current_status(), Some(ShipmentStatus::PickedUp));
    }

    #[tokio::test]
    async fn test_lookup_by_keys() {
        let (repo, _temp) = setup_test_db().await;
        let order = seed_order(&repo, false).await;
        let s = shipment(&order.id);

        let mut otx = repo.lock_order(&order.id).await.unwrap();
        insert_shipment(otx.conn(), &s, Some("k-1")).await.unwrap();
        otx.commit().await.unwrap();

        let by_key = repo.find_shipment_by_idempotency_key("k-1").await.unwrap().unwrap();
        assert_eq!(by_key.id, s.id);
        let by_logistics = repo.find_shipment_by_logistics_id("L-1").await.unwrap().unwrap();
        assert_eq!(by_logistics, s);
        assert!(repo.find_shipment_by_idempotency_key("k-2").await.unwrap().is_none());
        assert_eq!(repo.shipments_for_order(&order.id).await.unwrap().len(), 1);
    }
}
