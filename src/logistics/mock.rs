//! Mock logistics provider for testing without network calls.

use super::{CvsShipmentReceipt, CvsShipmentRequest, LogisticsError, LogisticsProvider};
use crate::domain::StatusUpdate;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mock provider returning predefined results and counting calls.
#[derive(Debug, Clone, Default)]
pub struct MockLogisticsProvider {
    failure: Option<LogisticsError>,
    delay: Option<Duration>,
    updates: HashMap<String, Vec<StatusUpdate>>,
    create_calls: Arc<AtomicUsize>,
}

impl MockLogisticsProvider {
    /// Create a mock that accepts every shipment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `error`.
    pub fn with_failure(mut self, error: LogisticsError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Sleep before answering, to exercise caller timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Status history returned for `all_pay_logistics_id`.
    pub fn with_updates(mut self, all_pay_logistics_id: &str, updates: Vec<StatusUpdate>) -> Self {
        self.updates.insert(all_pay_logistics_id.to_string(), updates);
        self
    }

    /// Number of `create_cvs_shipment` calls seen so far, across clones.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl LogisticsProvider for MockLogisticsProvider {
    async fn create_cvs_shipment(
        &self,
        request: &CvsShipmentRequest,
    ) -> Result<CvsShipmentReceipt, LogisticsError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.pause().await;
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(CvsShipmentReceipt {
            cvs_paper_no: format!("{}{:08}", request.sub_type.as_str().chars().next().unwrap_or('C'), n),
            all_pay_logistics_id: format!("LGS-{:06}", n),
        })
    }

    async fn query_status(&self, all_pay_logistics_id: &str) -> Result<Vec<StatusUpdate>, LogisticsError> {
        self.pause().await;
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(self
            .updates
            .get(all_pay_logistics_id)
            .cloned()
            .unwrap_or_default())
    }
}
