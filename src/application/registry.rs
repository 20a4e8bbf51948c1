use super::poller::{PollerExit, SettlementPoller};
use crate::domain::transaction::TransactionId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct PollEntry {
    generation: u64,
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct PollTable {
    entries: HashMap<TransactionId, PollEntry>,
    next_generation: u64,
}

/// Owns the running settlement pollers, at most one per transaction.
///
/// The table is only locked for synchronous bookkeeping, never across an
/// `.await`. Dropping the registry cancels every poller it owns.
#[derive(Default)]
pub struct PollerRegistry {
    table: Arc<Mutex<PollTable>>,
}

impl PollerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(table: &Mutex<PollTable>) -> MutexGuard<'_, PollTable> {
        table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawns `poller`, replacing any poller already tracking the same transaction.
    ///
    /// A replaced poller is cancelled and the new one waits for it to finish
    /// before its first tick, so two pollers never overlap on one transaction.
    pub fn start(&self, poller: SettlementPoller) {
        let id = poller.transaction_id();
        let (cancel, cancel_rx) = oneshot::channel();
        let table = Arc::clone(&self.table);

        let mut guard = Self::lock(&self.table);
        guard.next_generation += 1;
        let generation = guard.next_generation;

        let previous = guard.entries.remove(&id).map(|entry| {
            let _ = entry.cancel.send(());
            entry.handle
        });
        if previous.is_some() {
            tracing::info!(transaction_id = %id, "Replacing existing poller");
        }

        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            match poller.run(cancel_rx).await {
                PollerExit::Cancelled => {}
                exit => {
                    tracing::debug!(transaction_id = %id, ?exit, "Poller finished");
                    let mut guard = Self::lock(&table);
                    if guard
                        .entries
                        .get(&id)
                        .is_some_and(|entry| entry.generation == generation)
                    {
                        guard.entries.remove(&id);
                    }
                }
            }
        });

        guard.entries.insert(
            id,
            PollEntry {
                generation,
                cancel,
                handle,
            },
        );
        tracing::info!(transaction_id = %id, "Poller started");
    }

    /// Cancels the poller for `id` and waits for it to wind down.
    ///
    /// Once this returns the poller issues no further ticks or writes. Returns
    /// `false` if nothing was tracking `id`.
    pub async fn stop(&self, id: TransactionId) -> bool {
        let entry = Self::lock(&self.table).entries.remove(&id);
        match entry {
            Some(entry) => {
                let _ = entry.cancel.send(());
                if let Err(e) = entry.handle.await {
                    tracing::error!(transaction_id = %id, error = %e, "Poller task panicked");
                }
                tracing::info!(transaction_id = %id, "Poller stopped");
                true
            }
            None => false,
        }
    }

    /// Cancels every poller and waits for all of them.
    pub async fn shutdown(&self) {
        let entries: Vec<_> = Self::lock(&self.table).entries.drain().collect();
        let mut handles = Vec::with_capacity(entries.len());
        for (id, entry) in entries {
            let _ = entry.cancel.send(());
            handles.push((id, entry.handle));
        }
        for (id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!(transaction_id = %id, error = %e, "Poller task panicked");
            }
        }
    }

    pub fn is_tracking(&self, id: TransactionId) -> bool {
        Self::lock(&self.table).entries.contains_key(&id)
    }

    pub fn active_count(&self) -> usize {
        Self::lock(&self.table).entries.len()
    }
}

impl Drop for PollerRegistry {
    fn drop(&mut self) {
        for (_, entry) in Self::lock(&self.table).entries.drain() {
            let _ = entry.cancel.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::amount::{Amount, Currency};
    use crate::domain::fingerprint::Fingerprint;
    use crate::domain::payload::{AccountInfo, EncodedPayload, QrPayload};
    use crate::domain::ports::{SettlementClient, SettlementOutcome, TransactionStore};
    use crate::domain::transaction::{Transaction, TransactionStatus};
    use crate::error::Result;
    use crate::infrastructure::in_memory::InMemoryTransactionStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::time::Duration;

    // Distinct timestamps keep every test payload's fingerprint unique.
    static NEXT_TIMESTAMP_MS: AtomicI64 = AtomicI64::new(1_771_499_981_397);

    /// Never settles; counts queries and how many run at once.
    #[derive(Default)]
    struct PendingSettlement {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl SettlementClient for PendingSettlement {
        async fn query_by_fingerprint(&self, _fingerprint: &Fingerprint) -> Result<SettlementOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(SettlementOutcome::NotFound)
        }
    }

    async fn pending_transaction(store: &InMemoryTransactionStore, ttl: chrono::Duration) -> TransactionId {
        let amount = Amount::new(dec!(1)).unwrap();
        let payload = QrPayload::new(
            AccountInfo::individual("acc123"),
            "Shop",
            "Phnom Penh",
            Currency::Usd,
            NEXT_TIMESTAMP_MS.fetch_add(1, Ordering::SeqCst),
        )
        .with_amount(amount);
        let tx = Transaction::pending(
            EncodedPayload::encode(&payload).unwrap(),
            amount,
            Currency::Usd,
            "",
            Utc::now(),
            ttl,
        )
        .unwrap();
        store.create(tx).await.unwrap().id
    }

    fn poller(
        id: TransactionId,
        store: &Arc<InMemoryTransactionStore>,
        settlement: &Arc<PendingSettlement>,
    ) -> SettlementPoller {
        SettlementPoller::new(
            id,
            store.clone(),
            settlement.clone(),
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn test_start_twice_keeps_one_poller() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let settlement = Arc::new(PendingSettlement::default());
        let id = pending_transaction(&store, chrono::Duration::seconds(60)).await;
        let registry = PollerRegistry::new();

        registry.start(poller(id, &store, &settlement));
        registry.start(poller(id, &store, &settlement));
        assert_eq!(registry.active_count(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(settlement.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(registry.stop(id).await);
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_prevents_further_queries() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let settlement = Arc::new(PendingSettlement::default());
        let id = pending_transaction(&store, chrono::Duration::seconds(60)).await;
        let registry = PollerRegistry::new();

        registry.start(poller(id, &store, &settlement));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(registry.stop(id).await);

        let calls = settlement.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(settlement.calls.load(Ordering::SeqCst), calls);
        assert!(!registry.is_tracking(id));
    }

    #[tokio::test]
    async fn test_stop_absent_is_safe() {
        let registry = PollerRegistry::new();
        assert!(!registry.stop(TransactionId::new()).await);
    }

    #[tokio::test]
    async fn test_resolved_poller_deregisters_itself() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let settlement = Arc::new(PendingSettlement::default());
        let id = pending_transaction(&store, chrono::Duration::seconds(-1)).await;
        let registry = PollerRegistry::new();

        registry.start(poller(id, &store, &settlement));
        for _ in 0..100 {
            if !registry.is_tracking(id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(!registry.is_tracking(id));
        let tx = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Timeout);
        assert_eq!(settlement.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let settlement = Arc::new(PendingSettlement::default());
        let registry = PollerRegistry::new();
        for _ in 0..3 {
            let id = pending_transaction(&store, chrono::Duration::seconds(60)).await;
            registry.start(poller(id, &store, &settlement));
        }
        assert_eq!(registry.active_count(), 3);
        tokio::time::sleep(Duration::from_millis(20)).await;

        registry.shutdown().await;
        assert_eq!(registry.active_count(), 0);
        let calls = settlement.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(settlement.calls.load(Ordering::SeqCst), calls);
    }
}
