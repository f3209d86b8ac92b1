//! HTTP client for the convenience-store logistics API.

use super::{CvsShipmentReceipt, CvsShipmentRequest, LogisticsError, LogisticsProvider};
use crate::domain::StatusUpdate;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Logistics provider speaking JSON over HTTP.
///
/// Responses carry `{"success": bool, "message": ..., ...}`; `success: false`
/// is a permanent rejection whose message is passed through untouched.
#[derive(Debug, Clone)]
pub struct HttpLogisticsProvider {
    client: Client,
    base_url: String,
    api_key: String,
    retry_budget: Duration,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    cvs_paper_no: Option<String>,
    #[serde(default)]
    all_pay_logistics_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    updates: Vec<StatusUpdate>,
}

impl HttpLogisticsProvider {
    /// Create a provider; retries stop once `retry_budget` has elapsed.
    pub fn new(base_url: String, api_key: String, retry_budget: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry_budget,
        }
    }

    async fn send_json<T, F>(&self, build: F) -> Result<T, LogisticsError>
    where
        T: for<'de> Deserialize<'de>,
        F: Fn() -> RequestBuilder,
    {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.retry_budget),
            ..Default::default()
        };

        retry(backoff, || async {
            let mut request = build();
            if !self.api_key.is_empty() {
                request = request.bearer_auth(&self.api_key);
            }
            let response = request.send().await.map_err(|e| {
                warn!(error = %e, "Logistics request failed, retrying");
                backoff::Error::transient(LogisticsError::NetworkError(e.to_string()))
            })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(LogisticsError::RateLimited));
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                let err = LogisticsError::HttpError {
                    status: status.as_u16(),
                    message,
                };
                return if err.is_transient() {
                    Err(backoff::Error::transient(err))
                } else {
                    Err(backoff::Error::permanent(err))
                };
            }

            response
                .json::<T>()
                .await
                .map_err(|e| backoff::Error::permanent(LogisticsError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl LogisticsProvider for HttpLogisticsProvider {
    async fn create_cvs_shipment(
        &self,
        request: &CvsShipmentRequest,
    ) -> Result<CvsShipmentReceipt, LogisticsError> {
        debug!(
            idempotency_key = %request.idempotency_key,
            sub_type = request.sub_type.as_str(),
            "Creating CVS shipment"
        );
        let url = format!("{}/shipments/cvs", self.base_url);

        let response: CreateResponse = self
            .send_json(|| {
                self.client
                    .post(&url)
                    .header("Idempotency-Key", request.idempotency_key.as_str())
                    .json(request)
            })
            .await?;

        parse_create_response(response)
    }

    async fn query_status(&self, all_pay_logistics_id: &str) -> Result<Vec<StatusUpdate>, LogisticsError> {
        debug!(all_pay_logistics_id = %all_pay_logistics_id, "Querying logistics status");
        let url = format!("{}/shipments/{}/status", self.base_url, all_pay_logistics_id);

        let response: StatusResponse = self.send_json(|| self.client.get(&url)).await?;
        if !response.success {
            return Err(LogisticsError::Rejected(
                response.message.unwrap_or_else(|| "status query failed".to_string()),
            ));
        }
        Ok(response.updates)
    }
}

fn parse_create_response(response: CreateResponse) -> Result<CvsShipmentReceipt, LogisticsError> {
    if !response.success {
        return Err(LogisticsError::Rejected(
            response
                .message
                .unwrap_or_else(|| "shipment creation failed".to_string()),
        ));
    }
    match (response.cvs_paper_no, response.all_pay_logistics_id) {
        (Some(cvs_paper_no), Some(all_pay_logistics_id)) => Ok(CvsShipmentReceipt {
            cvs_paper_no,
            all_pay_logistics_id,
        }),
        _ => Err(LogisticsError::ParseError(
            "success response without cvs_paper_no/all_pay_logistics_id".to_string(),
        )),
    }
}
