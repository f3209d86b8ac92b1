//! Payment directives handed back to the checkout boundary.

use crate::config::{Config, PaymentGatewayConfig};
use crate::domain::{Order, PaymentProvider};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::warn;

/// What the storefront should do after an order is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentDirective {
    /// Auto-submit an HTML form to the hosted payment page.
    FormPost {
        action: String,
        fields: BTreeMap<String, String>,
    },
    /// Send the customer to a page; used when no gateway form can be built.
    Redirect { url: String },
}

pub fn confirmation_url(config: &Config, order: &Order) -> String {
    format!("{}/orders/{}/confirmation", config.storefront_base_url, order.id)
}

/// Build the directive for `order`, falling back to the confirmation page.
pub fn build(config: &Config, order: &Order, provider: Option<PaymentProvider>) -> PaymentDirective {
    let fallback = || PaymentDirective::Redirect {
        url: confirmation_url(config, order),
    };

    let (gateway, provider) = match (&config.payment_gateway, provider) {
        (Some(gateway), Some(provider)) if provider != PaymentProvider::Manual => (gateway, provider),
        _ => return fallback(),
    };

    match form_fields(config, gateway, order, provider) {
        Ok(fields) => PaymentDirective::FormPost {
            action: gateway.url.clone(),
            fields,
        },
        Err(reason) => {
            warn!(order_id = %order.id, provider = %provider, reason = %reason, "Falling back to confirmation page");
            fallback()
        }
    }
}

fn form_fields(
    config: &Config,
    gateway: &PaymentGatewayConfig,
    order: &Order,
    provider: PaymentProvider,
) -> Result<BTreeMap<String, String>, String> {
    if order.currency.minor_units() != 0 {
        return Err(format!("gateway form cannot charge {} amounts", order.currency));
    }
    let amount = if order.has_preorder {
        order.deposit_amount
    } else {
        order.total_amount
    };
    if !amount.is_positive() {
        return Err("nothing to charge".to_string());
    }

    let trade_date = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(order.created_at.as_ms())
        .ok_or_else(|| "order timestamp out of range".to_string())?
        .format("%Y/%m/%d %H:%M:%S")
        .to_string();

    let trade_no: String = order
        .id
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(20)
        .collect();

    let item_name = order
        .items
        .iter()
        .map(|i| format!("{} x {}", i.name, i.quantity))
        .collect::<Vec<_>>()
        .join("#");

    let mut fields = BTreeMap::new();
    fields.insert("MerchantID".to_string(), gateway.merchant_id.clone());
    fields.insert("MerchantTradeNo".to_string(), trade_no);
    fields.insert("MerchantTradeDate".to_string(), trade_date);
    fields.insert("PaymentType".to_string(), "aio".to_string());
    fields.insert("TotalAmount".to_string(), amount.to_canonical_string());
    fields.insert("TradeDesc".to_string(), format!("Order {}", order.id));
    fields.insert("ItemName".to_string(), item_name);
    fields.insert("ChoosePayment".to_string(), provider.as_str().to_string());
    fields.insert("ClientBackURL".to_string(), confirmation_url(config, order));
    fields.insert("CustomField1".to_string(), order.id.to_string());

    let check_value = check_value(&gateway.hash_key, &fields);
    fields.insert("CheckValue".to_string(), check_value);
    Ok(fields)
}

/// Upper-case hex SHA-256 over `HashKey=...&k1=v1&...` in key order.
fn check_value(hash_key: &str, fields: &BTreeMap<String, String>) -> String {
    let joined = fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(format!("HashKey={}&{}", hash_key, joined).as_bytes());
    hex::encode_upper(hasher.finalize())
}
