#![allow(dead_code)]

use axum::http::StatusCode;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use storeledger::config::Config;
use storeledger::db::init_db;
use storeledger::domain::{Currency, Decimal};
use storeledger::{api, Ledger, MockLogisticsProvider, Repository};
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const WEBHOOK_SECRET: &str = "whsec_integration";

pub struct TestApp {
    pub app: axum::Router,
    pub ledger: Arc<Ledger>,
    pub logistics: MockLogisticsProvider,
    _temp: TempDir,
}

pub fn test_config(db_path: String) -> Config {
    Config {
        port: 0,
        database_path: db_path,
        webhook_secret: WEBHOOK_SECRET.to_string(),
        logistics_api_url: "http://example.invalid".to_string(),
        logistics_api_key: String::new(),
        logistics_timeout_ms: 200,
        sender_name: "Shop".to_string(),
        sender_phone: "0222222222".to_string(),
        default_currency: Currency::Twd,
        preorder_deposit_rate: Decimal::from_str("0.3").unwrap(),
        payment_gateway: None,
        storefront_base_url: "https://shop.example.com".to_string(),
    }
}

pub async fn setup_test_app(logistics: MockLogisticsProvider) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let ledger = Arc::new(Ledger::new(
        repo,
        Arc::new(logistics.clone()),
        test_config(db_path),
    ));
    let app = api::create_router(api::AppState::new(ledger.clone()));

    TestApp {
        app,
        ledger,
        logistics,
        _temp: temp_dir,
    }
}

pub async fn request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    read(app.clone().oneshot(req).await.unwrap()).await
}

pub async fn signed_request(
    app: &axum::Router,
    uri: &str,
    body: &str,
    signature: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("X-Signature", signature);
    }
    let req = builder
        .body(axum::body::Body::from(body.to_string()))
        .unwrap();
    read(app.clone().oneshot(req).await.unwrap()).await
}

/// Send a raw body, for payloads that are not valid JSON.
pub async fn raw_request(app: &axum::Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap();
    read(app.clone().oneshot(req).await.unwrap()).await
}

async fn read(resp: axum::response::Response) -> (StatusCode, Value) {
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Parse a JSON decimal string.
pub fn dec(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal string")).unwrap()
}

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn item(price: &str, quantity: u32, is_preorder: bool) -> Value {
    json!({
        "product_id": "p-1",
        "name": "Ceramic mug",
        "price": price,
        "quantity": quantity,
        "cost": "100",
        "is_preorder": is_preorder,
    })
}

pub fn home_shipping() -> Value {
    json!({
        "method": "home_delivery",
        "recipient_name": "Lin",
        "recipient_phone": "0912345678",
        "address": "No. 1, Section 1, Taipei",
    })
}

pub fn cvs_shipping(store_id: Option<&str>) -> Value {
    let mut shipping = json!({
        "method": "cvs_pickup",
        "recipient_name": "Lin",
        "recipient_phone": "0912345678",
        "recipient_email": "lin@example.com",
        "cvs_sub_type": "UNIMART",
    });
    if let Some(id) = store_id {
        shipping["cvs_store_id"] = json!(id);
        shipping["cvs_store_name"] = json!("Xinyi branch");
    }
    shipping
}

/// Create an order through checkout and return its id.
pub async fn checkout(app: &axum::Router, body: Value) -> String {
    let (status, json) = request(app, "POST", "/v1/checkout", Some(body)).await;
    assert_eq!(status, StatusCode::OK, "checkout failed: {}", json);
    json["order_id"].as_str().unwrap().to_string()
}

pub async fn manual_payment(app: &axum::Router, order_id: &str, payment_type: &str, amount: &str, fee: &str) -> Value {
    let (status, json) = request(
        app,
        "POST",
        &format!("/v1/orders/{}/payments", order_id),
        Some(json!({
            "payment_provider": "manual",
            "payment_method": "bank_transfer",
            "payment_type": payment_type,
            "amount": amount,
            "gateway_fee": fee,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "payment failed: {}", json);
    json
}

pub async fn set_status(app: &axum::Router, order_id: &str, status: &str) -> (StatusCode, Value) {
    request(
        app,
        "POST",
        &format!("/v1/orders/{}/status", order_id),
        Some(json!({ "status": status })),
    )
    .await
}
