use thiserror::Error;

/// Every failure the codec, store, settlement client, or gateway can report.
///
/// Checksum mismatches and expiry are deliberately absent: `verify` answers
/// `false` and expiry is recorded as the `TIMEOUT` status.
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Decode error at offset {offset}: {reason}")]
    Decode { offset: usize, reason: String },
    #[error("Settlement authority rejected credentials: {0}")]
    SettlementUnauthorized(String),
    #[error("Settlement authority unavailable: {0}")]
    SettlementTransient(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Duplicate fingerprint: {0}")]
    DuplicateFingerprint(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    pub(crate) fn decode(offset: usize, reason: impl Into<String>) -> Self {
        Self::Decode {
            offset,
            reason: reason.into(),
        }
    }

    /// True for errors the poller retries on its next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SettlementTransient(_))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        PaymentError::Internal(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
