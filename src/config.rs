//! Environment configuration. A `.env` file is honoured when present.

use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::payment::stripe::DEFAULT_API_BASE;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    pub currency: String,
    pub delivery_charge: Decimal,
    pub payment_confirm_timeout: Duration,
    /// Whole-request limit on calls to the Stripe API, intent creation included.
    pub stripe_http_timeout: Duration,
    pub nats_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            get(key).filter(|v| !v.trim().is_empty()).ok_or(ConfigError::Missing(key))
        };
        let or_default = |key: &str, default: &str| {
            get(key).filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string())
        };
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            port: parse("PORT", &or_default("PORT", "8083"))?,
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            stripe_api_base: or_default("STRIPE_API_BASE", DEFAULT_API_BASE),
            currency: or_default("CURRENCY", "usd").to_ascii_lowercase(),
            delivery_charge: {
                let charge: Decimal = parse("DELIVERY_CHARGE", &or_default("DELIVERY_CHARGE", "0"))?;
                if charge.is_sign_negative() {
                    return Err(ConfigError::Invalid { key: "DELIVERY_CHARGE", value: charge.to_string() });
                }
                charge
            },
            payment_confirm_timeout: Duration::from_secs(parse("PAYMENT_CONFIRM_TIMEOUT_SECS", &or_default("PAYMENT_CONFIRM_TIMEOUT_SECS", "10"))?),
            stripe_http_timeout: Duration::from_secs(parse("STRIPE_HTTP_TIMEOUT_SECS", &or_default("STRIPE_HTTP_TIMEOUT_SECS", "30"))?),
            nats_url: get("NATS_URL").filter(|v| !v.trim().is_empty()),
        })
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid { key, value: value.to_string() })
}
