use super::amount::{Amount, Currency};
use super::fingerprint::Fingerprint;
use super::payload::EncodedPayload;
use crate::error::PaymentError;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for TransactionId {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| PaymentError::Validation(format!("Invalid transaction id: {}", e)))
    }
}

/// Lifecycle of a payment attempt. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Success,
    Failed,
    Timeout,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payment attempt against a generated code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub fingerprint: Fingerprint,
    pub encoded_payload: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub description: String,
    pub status: TransactionStatus,
    pub expires_at: DateTime<Utc>,
    /// Settlement record returned by the authority, only set on `Success`.
    pub result_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Builds a fresh `Pending` record expiring `ttl` after `created_at`.
    ///
    /// Fails with `Config` when the expiry falls outside the representable range.
    pub fn pending(
        payload: EncodedPayload,
        amount: Amount,
        currency: Currency,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, PaymentError> {
        let expires_at = created_at.checked_add_signed(ttl).ok_or_else(|| {
            PaymentError::Config(format!("QR expiration of {} is out of range", ttl))
        })?;
        let (encoded_payload, fingerprint) = payload.into_parts();
        Ok(Self {
            id: TransactionId::new(),
            fingerprint,
            encoded_payload,
            amount: amount.value(),
            currency,
            description: description.into(),
            status: TransactionStatus::Pending,
            expires_at,
            result_payload: None,
            created_at,
            updated_at: created_at,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Applies a status change and reports whether anything changed.
    ///
    /// Terminal records never change again, and moving back to `Pending` is
    /// ignored, so duplicate or late writers are harmless.
    pub fn transition(
        &mut self,
        status: TransactionStatus,
        result_payload: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.result_payload = match status {
            TransactionStatus::Success => result_payload,
            _ => None,
        };
        self.updated_at = now;
        true
    }
}
