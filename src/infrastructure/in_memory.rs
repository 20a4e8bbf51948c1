use crate::domain::fingerprint::Fingerprint;
use crate::domain::ports::TransactionStore;
use crate::domain::transaction::{Transaction, TransactionId, TransactionStatus};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Records {
    by_id: HashMap<TransactionId, Transaction>,
    by_fingerprint: HashMap<Fingerprint, TransactionId>,
}

/// A thread-safe in-memory store for payment transactions.
///
/// Both maps sit behind one `RwLock`, so the fingerprint uniqueness check and
/// the insert happen atomically. Clones share the same data.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    records: Arc<RwLock<Records>>,
}

impl InMemoryTransactionStore {
    /// Creates a new, empty in-memory transaction store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn create(&self, tx: Transaction) -> Result<Transaction> {
        let mut records = self.records.write().await;
        if records.by_fingerprint.contains_key(&tx.fingerprint) {
            return Err(PaymentError::DuplicateFingerprint(tx.fingerprint.to_string()));
        }
        records.by_fingerprint.insert(tx.fingerprint.clone(), tx.id);
        records.by_id.insert(tx.id, tx.clone());
        Ok(tx)
    }

    async fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let records = self.records.read().await;
        Ok(records.by_id.get(&id).cloned())
    }

    async fn get_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<Transaction>> {
        let records = self.records.read().await;
        Ok(records
            .by_fingerprint
            .get(fingerprint)
            .and_then(|id| records.by_id.get(id))
            .cloned())
    }

    async fn update_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
        result_payload: Option<serde_json::Value>,
    ) -> Result<Transaction> {
        let mut records = self.records.write().await;
        let tx = records
            .by_id
            .get_mut(&id)
            .ok_or_else(|| PaymentError::TransactionNotFound(id.to_string()))?;
        if !tx.transition(status, result_payload, Utc::now()) {
            tracing::debug!(transaction_id = %id, current = %tx.status, requested = %status, "Status update ignored");
        }
        Ok(tx.clone())
    }
}
