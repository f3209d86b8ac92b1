//! Shipment records and their append-only status log.

use crate::domain::{Decimal, OrderId, ShipmentId, TimeMs};
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Preparing,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    Failed,
    Returned,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Preparing => "preparing",
            ShipmentStatus::PickedUp => "picked_up",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::OutForDelivery => "out_for_delivery",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::Failed => "failed",
            ShipmentStatus::Returned => "returned",
        }
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShipmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preparing" => Ok(ShipmentStatus::Preparing),
            "picked_up" => Ok(ShipmentStatus::PickedUp),
            "in_transit" => Ok(ShipmentStatus::InTransit),
            "out_for_delivery" => Ok(ShipmentStatus::OutForDelivery),
            "delivered" => Ok(ShipmentStatus::Delivered),
            "failed" => Ok(ShipmentStatus::Failed),
            "returned" => Ok(ShipmentStatus::Returned),
            other => Err(format!("unknown shipment status: {}", other)),
        }
    }
}

/// Convenience-store chain used for CVS pickup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogisticsSubType {
    Unimart,
    Fami,
}

impl LogisticsSubType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogisticsSubType::Unimart => "UNIMART",
            LogisticsSubType::Fami => "FAMI",
        }
    }
}

impl FromStr for LogisticsSubType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNIMART" => Ok(LogisticsSubType::Unimart),
            "FAMI" => Ok(LogisticsSubType::Fami),
            other => Err(format!("unknown logistics sub type: {}", other)),
        }
    }
}

/// One entry of a shipment's status log. `status` and `timestamp` are mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: ShipmentStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub timestamp: TimeMs,
}

impl StatusUpdate {
    /// Stable key used to drop redelivered provider updates.
    pub fn event_key(&self) -> String {
        use sha2::{Digest, Sha256};

        fn hash_var(hasher: &mut Sha256, data: &str) {
            hasher.update((data.len() as u32).to_le_bytes());
            hasher.update(data.as_bytes());
        }

        let mut hasher = Sha256::new();
        hash_var(&mut hasher, self.status.as_str());
        hasher.update(self.timestamp.as_ms().to_le_bytes());
        hash_var(&mut hasher, self.location.trim());
        hash_var(&mut hasher, self.description.trim());

        let hash = hasher.finalize();
        format!("upd:{}", hex::encode(&hash[..16]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub order_id: OrderId,
    pub carrier: String,
    pub tracking_number: Option<String>,
    pub package_weight: Option<Decimal>,
    pub logistics_sub_type: Option<LogisticsSubType>,
    pub cvs_paper_no: Option<String>,
    pub all_pay_logistics_id: Option<String>,
    /// Arrival-ordered log; never re-sorted by timestamp.
    pub status_updates: Vec<StatusUpdate>,
    pub created_at: TimeMs,
}

impl Shipment {
    /// Current status is the last appended update.
    pub fn current_status(&self) -> Option<ShipmentStatus> {
        self.status_updates.last().map(|u| u.status)
    }
}

/// Operator input for the manual carrier path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualShipmentRequest {
    pub carrier: String,
    pub tracking_number: String,
    #[serde(default)]
    pub package_weight: Option<Decimal>,
}

impl ManualShipmentRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.carrier.trim().is_empty() || self.tracking_number.trim().is_empty() {
            return Err(LedgerError::validation(
                "carrier and tracking_number are required",
            ));
        }
        if let Some(weight) = self.package_weight {
            if !weight.is_positive() {
                return Err(LedgerError::validation("package_weight must be positive"));
            }
        }
        Ok(())
    }
}
