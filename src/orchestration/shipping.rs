//! Shipment creation and tracking for both carrier paths.
//!
//! The CVS path calls the logistics provider before taking the order lock and
//! applies local effects only after the provider confirmed the parcel.

use super::ledger::Ledger;
use crate::db::repo::shipments;
use crate::domain::{
    ManualShipmentRequest, Order, OrderId, OrderStatus, Shipment, ShipmentId, ShipmentStatus,
    ShippingMethod, StatusUpdate, TimeMs, TrackingInfo,
};
use crate::error::LedgerError;
use crate::logistics::{CvsShipmentRequest, LogisticsError};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

const PROVIDER: &str = "logistics";
const GOODS_NAME_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentOutcome {
    pub shipment: Shipment,
    pub order: Order,
    /// False when an earlier attempt already created this shipment.
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingOutcome {
    pub shipment: Shipment,
    pub current_status: Option<ShipmentStatus>,
    pub appended: usize,
    pub order_status: OrderStatus,
}

pub fn logistics_idempotency_key(order_id: &OrderId) -> String {
    format!("{}:create_logistics", order_id)
}

fn initial_update(now: TimeMs, description: &str) -> StatusUpdate {
    StatusUpdate {
        status: ShipmentStatus::Preparing,
        description: description.to_string(),
        location: String::new(),
        timestamp: now,
    }
}

fn goods_name(order: &Order) -> String {
    let joined = order
        .items
        .iter()
        .map(|i| i.name.trim())
        .collect::<Vec<_>>()
        .join(",");
    joined.chars().take(GOODS_NAME_MAX_CHARS).collect()
}

fn gateway_error(err: LogisticsError) -> LedgerError {
    LedgerError::Gateway {
        provider: PROVIDER.to_string(),
        message: err.provider_message(),
    }
}

impl Ledger {
    async fn call_logistics<T, F>(&self, call: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LogisticsError>>,
    {
        let timeout = Duration::from_millis(self.config.logistics_timeout_ms);
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                warn!(error = %err, "Logistics provider call failed");
                Err(gateway_error(err))
            }
            Err(_) => {
                warn!(timeout_ms = self.config.logistics_timeout_ms, "Logistics provider call timed out");
                Err(LedgerError::Gateway {
                    provider: PROVIDER.to_string(),
                    message: format!(
                        "no response within {} ms",
                        self.config.logistics_timeout_ms
                    ),
                })
            }
        }
    }

    /// Manual carrier path: record carrier + tracking number and ship.
    pub async fn create_shipment(
        &self,
        order_id: &OrderId,
        request: ManualShipmentRequest,
    ) -> Result<ShipmentOutcome, LedgerError> {
        request.validate()?;

        let mut otx = self.repo.lock_order(order_id).await?;
        if otx.order.shipping.method == ShippingMethod::CvsPickup {
            return Err(LedgerError::validation(format!(
                "order {} ships by convenience-store pickup; create it through logistics",
                order_id
            )));
        }
        let now = otx.now();
        let tracking = TrackingInfo {
            carrier: Some(request.carrier.trim().to_string()),
            tracking_number: Some(request.tracking_number.trim().to_string()),
        };
        let note = format!(
            "Shipped via {} ({})",
            request.carrier.trim(),
            request.tracking_number.trim()
        );
        otx.order
            .transition(OrderStatus::Shipped, Some(note.as_str()), Some(&tracking), now)?;

        let shipment = Shipment {
            id: ShipmentId::generate(),
            order_id: order_id.clone(),
            carrier: request.carrier.trim().to_string(),
            tracking_number: Some(request.tracking_number.trim().to_string()),
            package_weight: request.package_weight,
            logistics_sub_type: None,
            cvs_paper_no: None,
            all_pay_logistics_id: None,
            status_updates: vec![initial_update(now, "Shipment created")],
            created_at: now,
        };
        shipments::insert_shipment(otx.conn(), &shipment, None).await?;
        let order = otx.commit().await?;

        info!(
            order_id = %order_id,
            shipment_id = %shipment.id,
            carrier = %shipment.carrier,
            "Manual shipment created"
        );
        Ok(ShipmentOutcome {
            shipment,
            order,
            created: true,
        })
    }

    /// Convenience-store path: create the parcel with the provider, then ship.
    ///
    /// Retrying after a timeout is safe: the provider call carries the
    /// `{order_id}:create_logistics` key, and a shipment already stored under
    /// that key is returned without another call.
    pub async fn create_logistics_shipment(&self, order_id: &OrderId) -> Result<ShipmentOutcome, LedgerError> {
        let order = self.get_order(order_id).await?;
        let key = logistics_idempotency_key(order_id);

        if let Some(existing) = self.repo.find_shipment_by_idempotency_key(&key).await? {
            debug!(order_id = %order_id, shipment_id = %existing.id, "Logistics shipment already exists");
            return Ok(ShipmentOutcome {
                shipment: existing,
                order,
                created: false,
            });
        }

        if order.shipping.method != ShippingMethod::CvsPickup {
            return Err(LedgerError::validation(
                "logistics shipments are only created for cvs_pickup orders",
            ));
        }
        let store_id = order
            .shipping
            .cvs_store_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LedgerError::validation("order has no cvs_store_id"))?;
        let sub_type = order
            .shipping
            .cvs_sub_type
            .ok_or_else(|| LedgerError::validation("order has no cvs_sub_type"))?;
        if !order.status.can_transition_to(OrderStatus::Shipped) {
            return Err(LedgerError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Shipped,
            });
        }

        let request = CvsShipmentRequest {
            sub_type,
            goods_name: goods_name(&order),
            goods_amount: order.total_amount,
            sender_name: self.config.sender_name.clone(),
            sender_phone: self.config.sender_phone.clone(),
            receiver_name: order.shipping.recipient_name.clone(),
            receiver_phone: order.shipping.recipient_phone.clone(),
            receiver_email: order.shipping.recipient_email.clone(),
            receiver_store_id: store_id.to_string(),
            idempotency_key: key.clone(),
        };
        info!(order_id = %order_id, store_id = %store_id, sub_type = sub_type.as_str(), "Creating logistics shipment");
        let receipt = self
            .call_logistics(self.logistics.create_cvs_shipment(&request))
            .await?;

        let mut otx = self.repo.lock_order(order_id).await?;
        if let Some(existing) = shipments::find_by_idempotency_key(otx.conn(), &key).await? {
            drop(otx);
            return Ok(ShipmentOutcome {
                shipment: existing,
                order: self.get_order(order_id).await?,
                created: false,
            });
        }
        let now = otx.now();
        let tracking = TrackingInfo {
            carrier: Some(sub_type.as_str().to_string()),
            tracking_number: Some(receipt.cvs_paper_no.clone()),
        };
        let note = format!("CVS parcel {} created", receipt.cvs_paper_no);
        if let Err(err) = otx
            .order
            .transition(OrderStatus::Shipped, Some(note.as_str()), Some(&tracking), now)
        {
            warn!(
                order_id = %order_id,
                all_pay_logistics_id = %receipt.all_pay_logistics_id,
                cvs_paper_no = %receipt.cvs_paper_no,
                error = %err,
                "Order changed while the parcel was being created"
            );
            return Err(err);
        }

        let shipment = Shipment {
            id: ShipmentId::generate(),
            order_id: order_id.clone(),
            carrier: sub_type.as_str().to_string(),
            tracking_number: Some(receipt.cvs_paper_no.clone()),
            package_weight: None,
            logistics_sub_type: Some(sub_type),
            cvs_paper_no: Some(receipt.cvs_paper_no),
            all_pay_logistics_id: Some(receipt.all_pay_logistics_id),
            status_updates: vec![initial_update(now, "Parcel created with provider")],
            created_at: now,
        };
        shipments::insert_shipment(otx.conn(), &shipment, Some(&key)).await?;
        let order = otx.commit().await?;

        info!(order_id = %order_id, shipment_id = %shipment.id, "Logistics shipment created");
        Ok(ShipmentOutcome {
            shipment,
            order,
            created: true,
        })
    }

    pub async fn shipments_for_order(&self, order_id: &OrderId) -> Result<Vec<Shipment>, LedgerError> {
        self.get_order(order_id).await?;
        Ok(self.repo.shipments_for_order(order_id).await?)
    }

    /// Pull the provider's history for the order's CVS parcel and append unseen entries.
    pub async fn query_logistics_status(&self, order_id: &OrderId) -> Result<TrackingOutcome, LedgerError> {
        let shipment = self
            .repo
            .find_shipment_by_idempotency_key(&logistics_idempotency_key(order_id))
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("logistics shipment for order {}", order_id)))?;
        let logistics_id = shipment
            .all_pay_logistics_id
            .clone()
            .ok_or_else(|| LedgerError::not_found(format!("provider id for shipment {}", shipment.id)))?;

        let updates = self
            .call_logistics(self.logistics.query_status(&logistics_id))
            .await?;
        self.append_shipment_updates(&shipment.id, &updates).await
    }

    /// Append one status update to a shipment's log.
    pub async fn append_shipment_update(
        &self,
        shipment_id: &ShipmentId,
        update: StatusUpdate,
    ) -> Result<TrackingOutcome, LedgerError> {
        self.append_shipment_updates(shipment_id, std::slice::from_ref(&update))
            .await
    }

    /// Apply a status push from the logistics provider.
    pub async fn ingest_logistics_update(
        &self,
        all_pay_logistics_id: &str,
        update: StatusUpdate,
    ) -> Result<TrackingOutcome, LedgerError> {
        let shipment = self
            .repo
            .find_shipment_by_logistics_id(all_pay_logistics_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("shipment {}", all_pay_logistics_id)))?;
        self.append_shipment_updates(&shipment.id, std::slice::from_ref(&update))
            .await
    }

    /// Append updates in arrival order, dropping ones already logged.
    ///
    /// A newly seen `delivered` entry moves a `shipped` order to `delivered`.
    async fn append_shipment_updates(
        &self,
        shipment_id: &ShipmentId,
        updates: &[StatusUpdate],
    ) -> Result<TrackingOutcome, LedgerError> {
        let order_id = self
            .repo
            .get_shipment(shipment_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("shipment {}", shipment_id)))?
            .order_id;

        let mut otx = self.repo.lock_order(&order_id).await?;
        let mut appended = 0usize;
        let mut delivered = false;
        for update in updates {
            if shipments::append_status_update(otx.conn(), shipment_id, update).await? {
                appended += 1;
                delivered |= update.status == ShipmentStatus::Delivered;
            }
        }

        if appended == 0 {
            let shipment = shipments::get_shipment(otx.conn(), shipment_id)
                .await?
                .ok_or_else(|| LedgerError::not_found(format!("shipment {}", shipment_id)))?;
            return Ok(TrackingOutcome {
                current_status: shipment.current_status(),
                shipment,
                appended,
                order_status: otx.order.status,
            });
        }

        if delivered && otx.order.status == OrderStatus::Shipped {
            let now = otx.now();
            otx.order
                .transition(OrderStatus::Delivered, Some("Delivered per carrier"), None, now)?;
        }

        let shipment = shipments::get_shipment(otx.conn(), shipment_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("shipment {}", shipment_id)))?;
        let order = otx.commit().await?;

        info!(
            shipment_id = %shipment_id,
            appended,
            current = ?shipment.current_status(),
            "Shipment status updated"
        );
        Ok(TrackingOutcome {
            current_status: shipment.current_status(),
            shipment,
            appended,
            order_status: order.status,
        })
    }
}
