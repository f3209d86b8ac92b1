use crate::domain::{Currency, Decimal, PricingPolicy};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub webhook_secret: String,
    pub logistics_api_url: String,
    pub logistics_api_key: String,
    pub logistics_timeout_ms: u64,
    pub sender_name: String,
    pub sender_phone: String,
    pub default_currency: Currency,
    pub preorder_deposit_rate: Decimal,
    pub payment_gateway: Option<PaymentGatewayConfig>,
    pub storefront_base_url: String,
}

/// Hosted payment page settings. Absent means checkout always falls back to
/// the order-confirmation page.
#[derive(Debug, Clone)]
pub struct PaymentGatewayConfig {
    pub url: String,
    pub merchant_id: String,
    pub hash_key: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = required(&env_map, "DATABASE_PATH")?;
        let webhook_secret = required(&env_map, "WEBHOOK_SECRET")?;
        let logistics_api_url = required(&env_map, "LOGISTICS_API_URL")?;
        let sender_name = required(&env_map, "SENDER_NAME")?;
        let sender_phone = required(&env_map, "SENDER_PHONE")?;

        let logistics_api_key = env_map
            .get("LOGISTICS_API_KEY")
            .cloned()
            .unwrap_or_default();

        let logistics_timeout_ms = env_map
            .get("LOGISTICS_TIMEOUT_MS")
            .map(|s| s.as_str())
            .unwrap_or("10000")
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "LOGISTICS_TIMEOUT_MS".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let default_currency = Currency::from_str(
            env_map
                .get("DEFAULT_CURRENCY")
                .map(|s| s.as_str())
                .unwrap_or("TWD"),
        )
        .map_err(|e| ConfigError::InvalidValue("DEFAULT_CURRENCY".to_string(), e))?;

        let preorder_deposit_rate = Decimal::from_str(
            env_map
                .get("PREORDER_DEPOSIT_RATE")
                .map(|s| s.as_str())
                .unwrap_or("0.3"),
        )
        .ok()
        .filter(|r| r.is_positive() && *r <= Decimal::from_i64(1))
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                "PREORDER_DEPOSIT_RATE".to_string(),
                "must be a decimal in (0, 1]".to_string(),
            )
        })?;

        let payment_gateway = parse_payment_gateway_from_map(&env_map)?;

        let storefront_base_url = env_map
            .get("STOREFRONT_BASE_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_default();

        Ok(Config {
            port,
            database_path,
            webhook_secret,
            logistics_api_url,
            logistics_api_key,
            logistics_timeout_ms,
            sender_name,
            sender_phone,
            default_currency,
            preorder_deposit_rate,
            payment_gateway,
            storefront_base_url,
        })
    }

    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy {
            default_currency: self.default_currency,
            preorder_deposit_rate: self.preorder_deposit_rate,
        }
    }
}

fn required(env_map: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    env_map
        .get(name)
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(name.to_string()))
}

/// All three gateway variables or none.
fn parse_payment_gateway_from_map(
    env_map: &HashMap<String, String>,
) -> Result<Option<PaymentGatewayConfig>, ConfigError> {
    let url = env_map.get("PAYMENT_GATEWAY_URL");
    let merchant_id = env_map.get("PAYMENT_MERCHANT_ID");
    let hash_key = env_map.get("PAYMENT_HASH_KEY");

    match (url, merchant_id, hash_key) {
        (None, None, None) => Ok(None),
        (Some(url), Some(merchant_id), Some(hash_key)) => Ok(Some(PaymentGatewayConfig {
            url: url.clone(),
            merchant_id: merchant_id.clone(),
            hash_key: hash_key.clone(),
        })),
        _ => Err(ConfigError::InvalidValue(
            "PAYMENT_GATEWAY_URL".to_string(),
            "PAYMENT_GATEWAY_URL, PAYMENT_MERCHANT_ID and PAYMENT_HASH_KEY must be set together"
                .to_string(),
        )),
    }
}
