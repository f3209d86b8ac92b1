mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;
use storeledger::domain::{
    NewPayment, OrderId, OrderStatus, PaymentProvider, PaymentStatus, PaymentType,
};
use storeledger::webhook::sign;
use storeledger::MockLogisticsProvider;

fn payment_body(order_id: &str, txn: &str, status: &str) -> String {
    json!({
        "order_id": order_id,
        "transaction_id": txn,
        "payment_method": "credit_card",
        "amount": "1000",
        "gateway_fee": "28",
        "status": status,
    })
    .to_string()
}

async fn plain_order(t: &TestApp) -> String {
    checkout(
        &t.app,
        json!({ "items": [item("1000", 1, false)], "shipping": home_shipping() }),
    )
    .await
}

#[tokio::test]
async fn test_unsigned_or_forged_webhook_is_rejected() {
    let t = setup_test_app(MockLogisticsProvider::new()).await;
    let order_id = plain_order(&t).await;
    let body = payment_body(&order_id, "TX-1", "completed");

    let (status, json) = signed_request(&t.app, "/v1/webhooks/payments/ecpay", &body, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);

    let forged = sign("wrong-secret", body.as_bytes()).unwrap();
    let (status, _) = signed_request(&t.app, "/v1/webhooks/payments/ecpay", &body, Some(&forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Signature over a different body does not carry over.
    let other = sign(WEBHOOK_SECRET, b"{}").unwrap();
    let (status, _) = signed_request(&t.app, "/v1/webhooks/payments/ecpay", &body, Some(&other)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let payments = t
        .ledger
        .payments_for_order(&OrderId::new(order_id))
        .await
        .unwrap();
    assert!(payments.is_empty());
}

#[tokio::test]
async fn test_duplicate_delivery_records_one_payment() {
    let t = setup_test_app(MockLogisticsProvider::new()).await;
    let order_id = plain_order(&t).await;
    let id = OrderId::new(order_id.clone());
    let body = payment_body(&order_id, "TX-42", "completed");
    let signature = sign(WEBHOOK_SECRET, body.as_bytes()).unwrap();

    let (status, json) =
        signed_request(&t.app, "/v1/webhooks/payments/ecpay", &body, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    assert_eq!(json["created"], true);
    let payment_id = json["payment"]["id"].clone();
    let version = t.ledger.get_order(&id).await.unwrap().version;

    let (status, json) =
        signed_request(&t.app, "/v1/webhooks/payments/ecpay", &body, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["created"], false);
    assert_eq!(json["payment"]["id"], payment_id);

    let payments = t.ledger.payments_for_order(&id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(dec(&json["payment"]["net_amount"]), d("972"));

    let order = t.ledger.get_order(&id).await.unwrap();
    assert_eq!(order.version, version);
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_redelivery_advances_pending_payment() {
    let t = setup_test_app(MockLogisticsProvider::new()).await;
    let order_id = plain_order(&t).await;
    let id = OrderId::new(order_id.clone());

    for status in ["pending", "completed", "pending"] {
        let body = payment_body(&order_id, "TX-7", status);
        let signature = sign(WEBHOOK_SECRET, body.as_bytes()).unwrap();
        let (code, _) =
            signed_request(&t.app, "/v1/webhooks/payments/line_pay", &body, Some(&signature)).await;
        assert_eq!(code, StatusCode::OK);
    }

    let payments = t.ledger.payments_for_order(&id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].payment_status, PaymentStatus::Completed);
    assert!(payments[0].paid_at.is_some());
}

#[tokio::test]
async fn test_transaction_reused_on_other_order_is_rejected() {
    let t = setup_test_app(MockLogisticsProvider::new()).await;
    let first = plain_order(&t).await;
    let second = plain_order(&t).await;

    let body = payment_body(&first, "TX-9", "completed");
    let signature = sign(WEBHOOK_SECRET, body.as_bytes()).unwrap();
    let (status, _) = signed_request(&t.app, "/v1/webhooks/payments/ecpay", &body, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);

    let body = payment_body(&second, "TX-9", "completed");
    let signature = sign(WEBHOOK_SECRET, body.as_bytes()).unwrap();
    let (status, json) =
        signed_request(&t.app, "/v1/webhooks/payments/ecpay", &body, Some(&signature)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "ValidationError");
}

#[tokio::test]
async fn test_logistics_webhook_delivers_order() {
    let t = setup_test_app(MockLogisticsProvider::new()).await;
    let order_id = checkout(
        &t.app,
        json!({ "items": [item("300", 1, false)], "shipping": cvs_shipping(Some("991182")) }),
    )
    .await;
    manual_payment(&t.app, &order_id, "full", "300", "0").await;
    for next in ["paid", "processing"] {
        set_status(&t.app, &order_id, next).await;
    }
    let (status, json) = request(&t.app, "POST", &format!("/v1/orders/{}/logistics", order_id), None).await;
    assert_eq!(status, StatusCode::OK);
    let logistics_id = json["shipment"]["all_pay_logistics_id"].as_str().unwrap().to_string();

    let body = json!({
        "all_pay_logistics_id": logistics_id,
        "status": "delivered",
        "description": "picked up by customer",
        "location": "991182",
        "timestamp": 9_000,
    })
    .to_string();
    let signature = sign(WEBHOOK_SECRET, body.as_bytes()).unwrap();
    let (status, json) = signed_request(&t.app, "/v1/webhooks/logistics", &body, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    assert_eq!(json["order_status"], "delivered");

    let (_, json) = signed_request(&t.app, "/v1/webhooks/logistics", &body, Some(&signature)).await;
    assert_eq!(json["appended"], 0);

    let order = t.ledger.get_order(&OrderId::new(order_id)).await.unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
    assert_eq!(order.recognized_revenue, d("300"));
}

#[tokio::test]
async fn test_logistics_webhook_for_unknown_parcel() {
    let t = setup_test_app(MockLogisticsProvider::new()).await;
    let body = json!({
        "all_pay_logistics_id": "LGS-999999",
        "status": "in_transit",
        "timestamp": 1,
    })
    .to_string();
    let signature = sign(WEBHOOK_SECRET, body.as_bytes()).unwrap();
    let (status, _) = signed_request(&t.app, "/v1/webhooks/logistics", &body, Some(&signature)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_record_one_payment() {
    let t = setup_test_app(MockLogisticsProvider::new()).await;
    let order_id = OrderId::new(plain_order(&t).await);

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let ledger = t.ledger.clone();
            let order_id = order_id.clone();
            tokio::spawn(async move {
                let input = NewPayment {
                    payment_provider: PaymentProvider::Ecpay,
                    transaction_id: Some("TX-RACE".to_string()),
                    payment_method: "credit_card".to_string(),
                    payment_type: PaymentType::Full,
                    amount: d("1000"),
                    gateway_fee: d("28"),
                    currency: None,
                    exchange_rate: None,
                    payment_status: None,
                    paid_at: None,
                };
                ledger.record_payment(&order_id, input).await
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if outcome.created {
            created += 1;
        }
        assert_eq!(outcome.payment.transaction_id.as_deref(), Some("TX-RACE"));
    }
    assert_eq!(created, 1);

    let payments = t.ledger.payments_for_order(&order_id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].payment_status, PaymentStatus::Completed);
}
