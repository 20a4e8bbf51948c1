use super::fingerprint::Fingerprint;
use super::transaction::{Transaction, TransactionId, TransactionStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Durable record of payment attempts, unique-indexed by fingerprint.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts a new record. Fails with `DuplicateFingerprint` if the fingerprint is taken.
    async fn create(&self, tx: Transaction) -> Result<Transaction>;
    async fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>>;
    async fn get_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<Transaction>>;
    /// Moves a record to `status`. Terminal records are returned unchanged.
    async fn update_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
        result_payload: Option<serde_json::Value>,
    ) -> Result<Transaction>;
}

/// What the settlement authority knows about a fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// Paid; carries the authority's settlement record.
    Settled(serde_json::Value),
    /// Explicitly declined or failed.
    Failed,
    /// No payment seen yet.
    NotFound,
}

/// Remote settlement authority.
///
/// Errors are either `SettlementUnauthorized` (credentials problem, needs an
/// operator) or `SettlementTransient` (retry on the next tick).
#[async_trait]
pub trait SettlementClient: Send + Sync {
    async fn query_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<SettlementOutcome>;
}

pub type SharedTransactionStore = Arc<dyn TransactionStore>;
pub type SharedSettlementClient = Arc<dyn SettlementClient>;
