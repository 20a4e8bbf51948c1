//! Runtime configuration read from the environment (and `.env`, if present).

use crate::application::gateway::{DEFAULT_MERCHANT_CITY, GatewaySettings};
use crate::error::{PaymentError, Result};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api-bakong.nbc.gov.kh";
pub const DEFAULT_QR_EXPIRATION_SECONDS: u64 = 600;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: String,
    pub token: Option<String>,
    pub account_id: Option<String>,
    pub merchant_name: Option<String>,
    pub merchant_city: String,
    pub qr_expiration: Duration,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Config {
    /// Loads `.env` into the process environment, then reads the configuration from it.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            tracing::warn!(error = %e, "Ignoring unreadable .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Ok(Self {
            api_url: get("BAKONG_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            token: get("BAKONG_TOKEN"),
            account_id: get("BAKONG_ACCOUNT_ID"),
            merchant_name: get("MERCHANT_NAME"),
            merchant_city: get("MERCHANT_CITY").unwrap_or_else(|| DEFAULT_MERCHANT_CITY.to_string()),
            qr_expiration: Duration::from_secs(parse_or(
                "QR_EXPIRATION_SECONDS",
                get("QR_EXPIRATION_SECONDS"),
                DEFAULT_QR_EXPIRATION_SECONDS,
            )?),
            poll_interval: Duration::from_millis(parse_or(
                "POLL_INTERVAL_MS",
                get("POLL_INTERVAL_MS"),
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            request_timeout: Duration::from_secs(parse_or(
                "BAKONG_TIMEOUT_SECONDS",
                get("BAKONG_TIMEOUT_SECONDS"),
                DEFAULT_TIMEOUT_SECONDS,
            )?),
        })
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            poll_interval: self.poll_interval,
            qr_expiration: self.qr_expiration,
            default_city: self.merchant_city.clone(),
        }
    }

    /// The API token, required for anything that talks to the settlement authority.
    pub fn require_token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| PaymentError::Config("BAKONG_TOKEN is not set".to_string()))
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|e| PaymentError::Config(format!("{} has invalid value {:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}
