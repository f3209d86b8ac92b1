mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::{json, Value};
use storeledger::domain::{
    Decimal, InvoiceAction, OrderId, OrderStatus, PaymentStatus, RefundRequest, RefundStatus,
    RefundType,
};
use storeledger::engine::refund_policy::{completed_paid, completed_refunded};
use storeledger::{LedgerError, MockLogisticsProvider};

async fn paid_order(t: &TestApp, invoice: Option<Value>) -> String {
    let mut body = json!({ "items": [item("1000", 1, false)], "shipping": home_shipping() });
    if let Some(invoice) = invoice {
        body["invoice"] = invoice;
    }
    let order_id = checkout(&t.app, body).await;
    manual_payment(&t.app, &order_id, "full", "1000", "30").await;
    let (status, _) = set_status(&t.app, &order_id, "paid").await;
    assert_eq!(status, StatusCode::OK);
    order_id
}

async fn refund(t: &TestApp, order_id: &str, body: Value) -> (StatusCode, Value) {
    request(&t.app, "POST", &format!("/v1/orders/{}/refunds", order_id), Some(body)).await
}

#[tokio::test]
async fn test_refund_over_paid_then_full_refund() {
    let t = setup_test_app(MockLogisticsProvider::new()).await;
    let order_id = paid_order(&t, None).await;
    let id = OrderId::new(order_id.clone());
    let before = t.ledger.get_order(&id).await.unwrap();

    let (status, json) = refund(
        &t,
        &order_id,
        json!({
            "refund_amount": "1200",
            "refund_type": "partial",
            "refund_reason": "damaged",
            "invoice_action": "credit_note",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["kind"], "ExceedsPaid");
    assert_eq!(t.ledger.get_order(&id).await.unwrap(), before);
    assert!(t.ledger.refunds_for_order(&id).await.unwrap().is_empty());

    let (status, json) = refund(
        &t,
        &order_id,
        json!({
            "refund_amount": "1000",
            "refund_type": "full",
            "refund_reason": "customer cancelled",
            "invoice_action": "void",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    assert_eq!(json["order"]["status"], "refunded");
    assert_eq!(dec(&json["order"]["deferred_revenue"]), Decimal::zero());
    assert_eq!(dec(&json["order"]["recognized_revenue"]), Decimal::zero());
    assert_eq!(json["refund"]["refund_status"], "completed");
    assert!(json["invoice_action_id"].is_null());

    // Payment rows are untouched by the refund.
    let payments = t.ledger.payments_for_order(&id).await.unwrap();
    assert_eq!(payments[0].payment_status, PaymentStatus::Completed);

    let (status, json) = refund(
        &t,
        &order_id,
        json!({
            "refund_amount": "1",
            "refund_type": "partial",
            "refund_reason": "again",
            "invoice_action": "void",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "OrderNotRefundable");
}

#[tokio::test]
async fn test_full_refund_must_match_balance_and_defaults_to_it() {
    let t = setup_test_app(MockLogisticsProvider::new()).await;
    let order_id = paid_order(&t, None).await;

    let (status, json) = refund(
        &t,
        &order_id,
        json!({
            "refund_amount": "400",
            "refund_type": "full",
            "refund_reason": "mismatch",
            "invoice_action": "void",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "ValidationError");

    let (status, json) = refund(
        &t,
        &order_id,
        json!({
            "refund_type": "full",
            "refund_reason": "whole order",
            "invoice_action": "void",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec(&json["refund"]["refund_amount"]), d("1000"));
}

#[tokio::test]
async fn test_unpaid_order_is_not_refundable() {
    let t = setup_test_app(MockLogisticsProvider::new()).await;
    let order_id = checkout(
        &t.app,
        json!({ "items": [item("1000", 1, false)], "shipping": home_shipping() }),
    )
    .await;
    let (status, json) = refund(
        &t,
        &order_id,
        json!({
            "refund_amount": "100",
            "refund_type": "partial",
            "refund_reason": "early",
            "invoice_action": "void",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "OrderNotRefundable");
}

#[tokio::test]
async fn test_partial_refund_enqueues_invoice_action() {
    let t = setup_test_app(MockLogisticsProvider::new()).await;
    let order_id = paid_order(
        &t,
        Some(json!({ "invoice_required": true, "invoice_type": "personal" })),
    )
    .await;
    let (status, _) = request(
        &t.app,
        "POST",
        &format!("/v1/orders/{}/invoice", order_id),
        Some(json!({ "invoice_number": "AB-12345678" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = refund(
        &t,
        &order_id,
        json!({
            "refund_amount": "250",
            "refund_fee": "10",
            "refund_type": "partial",
            "refund_reason": "one item broken",
            "invoice_action": "credit_note",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec(&json["refund"]["net_refund"]), d("240"));
    assert!(json["invoice_action_id"].is_i64());

    let (_, json) = request(&t.app, "GET", "/v1/invoice-actions?status=pending", None).await;
    let actions = json["invoice_actions"].as_array().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["action"], "credit_note");
    assert_eq!(actions[0]["invoice_number"], "AB-12345678");
    assert_eq!(actions[0]["order_id"], order_id.as_str());
}

#[tokio::test]
async fn test_refunded_sum_never_exceeds_paid() {
    let t = setup_test_app(MockLogisticsProvider::new()).await;
    let order_id = paid_order(&t, None).await;
    let id = OrderId::new(order_id.clone());

    for amount in ["600", "600", "1000"] {
        let _ = refund(
            &t,
            &order_id,
            json!({
                "refund_amount": amount,
                "refund_type": "partial",
                "refund_reason": "batch",
                "invoice_action": "void",
            }),
        )
        .await;
        let payments = t.ledger.payments_for_order(&id).await.unwrap();
        let refunds = t.ledger.refunds_for_order(&id).await.unwrap();
        assert!(completed_refunded(&refunds) <= completed_paid(&payments));
        assert!(refunds.iter().all(|r| r.refund_status == RefundStatus::Completed));
    }

    // The payment backing the refund cannot be walked back to refunded.
    let payment = &t.ledger.payments_for_order(&id).await.unwrap()[0];
    let (status, _) = request(
        &t.app,
        "POST",
        &format!("/v1/payments/{}/status", payment.id),
        Some(json!({ "status": "refunded" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let order = t.ledger.get_order(&id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);
}

#[tokio::test]
async fn test_payout_and_revenue_report() {
    let t = setup_test_app(MockLogisticsProvider::new()).await;
    let order_id = paid_order(&t, None).await;
    let id = OrderId::new(order_id.clone());
    let payment = t.ledger.payments_for_order(&id).await.unwrap().remove(0);

    let (status, json) = request(
        &t.app,
        "POST",
        &format!("/v1/payments/{}/payout", payment.id),
        Some(json!({ "payout_status": "paid_out" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["payment"]["payout_status"], "paid_out");
    assert!(json["payment"]["payout_at"].is_i64());

    let (status, json) = request(&t.app, "GET", "/v1/reports/revenue", None).await;
    assert_eq!(status, StatusCode::OK);
    let report = &json["report"];
    assert_eq!(dec(&report["gross_revenue"]), d("1000"));
    assert_eq!(dec(&report["gateway_fees"]), d("30"));
    assert_eq!(dec(&report["net_revenue"]), d("970"));
    assert_eq!(dec(&report["recognized_revenue"]), d("1000"));
    assert_eq!(report["providers"][0]["provider"], "manual");
    assert_eq!(report["providers"][0]["payment_count"], 1);

    let req = axum::http::Request::builder()
        .uri("/v1/reports/payments.csv")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = tower::util::ServiceExt::oneshot(t.app.clone(), req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "text/csv; charset=utf-8"
    );
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.contains(&order_id));
}

#[tokio::test]
async fn test_foreign_currency_payment_cannot_inflate_refundable_balance() {
    let t = setup_test_app(MockLogisticsProvider::new()).await;
    let order_id = checkout(
        &t.app,
        json!({
            "items": [item("100", 1, false)],
            "shipping": home_shipping(),
            "currency": "USD",
            "exchange_rate": "31.5",
        }),
    )
    .await;

    let (status, json) = request(
        &t.app,
        "POST",
        &format!("/v1/orders/{}/payments", order_id),
        Some(json!({
            "payment_provider": "manual",
            "payment_method": "bank_transfer",
            "payment_type": "full",
            "amount": "3100",
            "currency": "TWD",
            "exchange_rate": "0.032",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", json);
    assert_eq!(json["kind"], "ValidationError");

    let id = OrderId::new(order_id.clone());
    assert!(t.ledger.payments_for_order(&id).await.unwrap().is_empty());

    manual_payment(&t.app, &order_id, "full", "100", "0").await;
    let (status, _) = set_status(&t.app, &order_id, "paid").await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = refund(
        &t,
        &order_id,
        json!({
            "refund_amount": "3000",
            "refund_type": "partial",
            "refund_reason": "overcharge",
            "invoice_action": "credit_note",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["kind"], "ExceedsPaid");

    let payments = t.ledger.payments_for_order(&id).await.unwrap();
    assert_eq!(payments[0].currency.as_str(), "USD");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refunds_never_exceed_paid() {
    let t = setup_test_app(MockLogisticsProvider::new()).await;
    let order_id = OrderId::new(paid_order(&t, None).await);

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let ledger = t.ledger.clone();
            let order_id = order_id.clone();
            tokio::spawn(async move {
                let request = RefundRequest {
                    refund_amount: Some(d("600")),
                    refund_fee: Decimal::zero(),
                    refund_type: RefundType::Partial,
                    refund_reason: format!("duplicate click {}", i),
                    invoice_action: InvoiceAction::CreditNote,
                };
                ledger.create_refund(&order_id, request).await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(err) => assert!(
                matches!(
                    err,
                    LedgerError::OrderNotRefundable(_) | LedgerError::ExceedsPaid { .. }
                ),
                "unexpected error: {}",
                err
            ),
        }
    }
    assert_eq!(succeeded, 1);

    let refunds = t.ledger.refunds_for_order(&order_id).await.unwrap();
    let payments = t.ledger.payments_for_order(&order_id).await.unwrap();
    assert_eq!(refunds.len(), 1);
    assert!(completed_refunded(&refunds) <= completed_paid(&payments));
    assert_eq!(
        t.ledger.get_order(&order_id).await.unwrap().status,
        OrderStatus::Refunded
    );
}
