use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{success, AppState, Success};
use crate::domain::{InvoiceDirective, Payment, TimeMs};
use crate::engine::RevenueReport;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowQuery {
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

impl WindowQuery {
    fn bounds(&self) -> Result<(TimeMs, TimeMs), AppError> {
        let from = TimeMs::new(self.from_ms.unwrap_or(0));
        let to = TimeMs::new(self.to_ms.unwrap_or(i64::MAX));
        if from > to {
            return Err(AppError::BadRequest("fromMs must not be after toMs".into()));
        }
        Ok((from, to))
    }
}

#[derive(Debug, Serialize)]
pub struct RevenueResponse {
    pub report: RevenueReport,
}

pub async fn get_revenue(
    State(state): State<AppState>,
    Query(params): Query<WindowQuery>,
) -> Result<Json<Success<RevenueResponse>>, AppError> {
    let (from, to) = params.bounds()?;
    let report = state.ledger.revenue_report(from, to).await?;
    Ok(success(RevenueResponse { report }))
}

/// Payment ledger export for back-office reconciliation.
pub async fn get_payments_csv(
    State(state): State<AppState>,
    Query(params): Query<WindowQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (from, to) = params.bounds()?;
    let payments = state.ledger.payments_paid_between(from, to).await?;
    let body = payments_csv(&payments)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"payments.csv\"",
            ),
        ],
        body,
    ))
}

fn payments_csv(payments: &[Payment]) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "payment_id",
        "order_id",
        "provider",
        "transaction_id",
        "method",
        "type",
        "amount",
        "currency",
        "exchange_rate",
        "gateway_fee",
        "net_amount",
        "status",
        "payout_status",
        "paid_at",
        "payout_at",
    ])?;
    for p in payments {
        writer.write_record([
            p.id.as_str().to_string(),
            p.order_id.as_str().to_string(),
            p.payment_provider.as_str().to_string(),
            p.transaction_id.clone().unwrap_or_default(),
            p.payment_method.clone(),
            p.payment_type.as_str().to_string(),
            p.amount.to_canonical_string(),
            p.currency.to_string(),
            p.exchange_rate.to_canonical_string(),
            p.gateway_fee.to_canonical_string(),
            p.net_amount.to_canonical_string(),
            p.payment_status.as_str().to_string(),
            p.payout_status.as_str().to_string(),
            p.paid_at.map(|t| t.as_ms().to_string()).unwrap_or_default(),
            p.payout_at.map(|t| t.as_ms().to_string()).unwrap_or_default(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(e.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct InvoiceActionsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceActionsResponse {
    pub invoice_actions: Vec<InvoiceDirective>,
}

/// Pending void/credit-note work for the invoicing collaborator.
pub async fn get_invoice_actions(
    State(state): State<AppState>,
    Query(params): Query<InvoiceActionsQuery>,
) -> Result<Json<Success<InvoiceActionsResponse>>, AppError> {
    let invoice_actions = state
        .ledger
        .repo()
        .list_invoice_actions(params.status.as_deref())
        .await?;
    Ok(success(InvoiceActionsResponse { invoice_actions }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Currency, Decimal, OrderId, PaymentId, PaymentProvider, PaymentStatus, PaymentType,
        PayoutStatus,
    };
    use std::str::FromStr;

    #[test]
    fn test_csv_has_header_and_exact_amounts() {
        let payment = Payment {
            id: PaymentId::new("pay-1"),
            order_id: OrderId::new("ord-1"),
            payment_provider: PaymentProvider::Ecpay,
            transaction_id: Some("T,1".to_string()),
            payment_method: "credit".to_string(),
            payment_type: PaymentType::Full,
            amount: Decimal::from_str("1000").unwrap(),
            currency: Currency::Twd,
            exchange_rate: Decimal::from_str("1").unwrap(),
            gateway_fee: Decimal::from_str("30").unwrap(),
            net_amount: Decimal::from_str("970").unwrap(),
            payment_status: PaymentStatus::Completed,
            payout_status: PayoutStatus::Pending,
            paid_at: Some(TimeMs::new(5)),
            payout_at: None,
            created_at: TimeMs::new(5),
        };
        let csv = payments_csv(&[payment]).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("payment_id,order_id,provider"));
        let row = lines.next().unwrap();
        assert!(row.contains("\"T,1\""));
        assert!(row.contains(",1000,TWD,1,30,970,completed,pending,5,"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_window_rejects_inverted_bounds() {
        let query = WindowQuery {
            from_ms: Some(10),
            to_ms: Some(5),
        };
        assert!(query.bounds().is_err());
    }
}
