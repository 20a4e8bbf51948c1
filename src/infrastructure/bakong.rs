//! HTTP client for the Bakong settlement API.
//!
//! Responses are classified from the structured `responseCode` / `errorCode`
//! pair only. Anything not explicitly recognised is reported as transient so
//! the poller retries it instead of guessing at a terminal state.

use crate::domain::fingerprint::Fingerprint;
use crate::domain::ports::{SettlementClient, SettlementOutcome};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const CHECK_BY_MD5_PATH: &str = "v1/check_transaction_by_md5";
const CHECK_BY_HASH_PATH: &str = "v1/check_transaction_by_hash";

const RESPONSE_SUCCESS: i64 = 0;
const RESPONSE_ERROR: i64 = 1;

const ERROR_TRANSACTION_NOT_FOUND: i64 = 1;
const ERROR_TRANSACTION_FAILED: i64 = 3;
const ERROR_UNAUTHORIZED: i64 = 6;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckResponse {
    response_code: i64,
    #[serde(default)]
    response_message: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Settlement client speaking the Bakong open API.
pub struct BakongClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl BakongClient {
    /// Builds a client with a per-request timeout.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into(),
            token: token.into(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Looks a payment up by the MD5 fingerprint of its payload.
    pub async fn check_transaction_by_md5(&self, fingerprint: &Fingerprint) -> Result<SettlementOutcome> {
        tracing::debug!(fingerprint = %fingerprint, "Checking transaction by md5");
        self.post_check(CHECK_BY_MD5_PATH, json!({ "md5": fingerprint.as_str() }))
            .await
    }

    /// Looks a payment up by the full transaction hash issued by the authority.
    pub async fn check_transaction_by_hash(&self, hash: &str) -> Result<SettlementOutcome> {
        tracing::debug!(hash, "Checking transaction by hash");
        self.post_check(CHECK_BY_HASH_PATH, json!({ "hash": hash })).await
    }

    async fn post_check(&self, path: &str, body: serde_json::Value) -> Result<SettlementOutcome> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::SettlementTransient(format!("Request failed: {}", e)))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(PaymentError::SettlementUnauthorized(format!(
                    "HTTP {}",
                    response.status()
                )));
            }
            StatusCode::NOT_FOUND => return Ok(SettlementOutcome::NotFound),
            status if !status.is_success() => {
                return Err(PaymentError::SettlementTransient(format!("HTTP {}", status)));
            }
            _ => {}
        }

        let body: CheckResponse = response.json().await.map_err(|e| {
            PaymentError::SettlementTransient(format!("Unreadable response body: {}", e))
        })?;
        let outcome = classify(body);
        if let Ok(outcome) = &outcome {
            tracing::debug!(?outcome, "Settlement response classified");
        }
        outcome
    }
}

fn classify(body: CheckResponse) -> Result<SettlementOutcome> {
    let message = body.response_message.unwrap_or_default();
    match (body.response_code, body.error_code, body.data) {
        (RESPONSE_SUCCESS, _, Some(data)) if !data.is_null() => Ok(SettlementOutcome::Settled(data)),
        (RESPONSE_ERROR, Some(ERROR_TRANSACTION_NOT_FOUND), _) => Ok(SettlementOutcome::NotFound),
        (RESPONSE_ERROR, Some(ERROR_TRANSACTION_FAILED), _) => Ok(SettlementOutcome::Failed),
        (RESPONSE_ERROR, Some(ERROR_UNAUTHORIZED), _) => {
            Err(PaymentError::SettlementUnauthorized(message))
        }
        (code, error_code, _) => Err(PaymentError::SettlementTransient(format!(
            "Unrecognised response (responseCode={}, errorCode={:?}): {}",
            code, error_code, message
        ))),
    }
}

#[async_trait]
impl SettlementClient for BakongClient {
    async fn query_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<SettlementOutcome> {
        self.check_transaction_by_md5(fingerprint).await
    }
}
