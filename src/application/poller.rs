use crate::domain::ports::{SettlementOutcome, SharedSettlementClient, SharedTransactionStore};
use crate::domain::transaction::{TransactionId, TransactionStatus};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Result of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still pending, poll again.
    Continue,
    /// The transaction is terminal, by this tick or by someone else.
    Resolved(TransactionStatus),
    /// The transaction no longer exists in the store.
    Vanished,
}

/// Why a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerExit {
    Cancelled,
    Resolved(TransactionStatus),
    Vanished,
}

/// Drives one pending transaction to a terminal state by querying the
/// settlement authority at a fixed interval.
///
/// The only way out on errors is wall-clock expiry: every failure inside a
/// tick is logged and the next tick tries again.
pub struct SettlementPoller {
    transaction_id: TransactionId,
    store: SharedTransactionStore,
    settlement: SharedSettlementClient,
    interval: Duration,
}

impl SettlementPoller {
    pub fn new(
        transaction_id: TransactionId,
        store: SharedTransactionStore,
        settlement: SharedSettlementClient,
        interval: Duration,
    ) -> Self {
        Self {
            transaction_id,
            store,
            settlement,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Runs one poll. Never fails; errors are logged and reported as `Continue`.
    pub async fn tick(&self) -> Tick {
        match self.try_tick().await {
            Ok(tick) => tick,
            Err(PaymentError::SettlementUnauthorized(reason)) => {
                tracing::error!(
                    alert = true,
                    transaction_id = %self.transaction_id,
                    reason = %reason,
                    "Settlement authority rejected credentials, operator action required"
                );
                Tick::Continue
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(transaction_id = %self.transaction_id, error = %e, "Settlement query failed, will retry");
                Tick::Continue
            }
            Err(e) => {
                tracing::error!(transaction_id = %self.transaction_id, error = %e, "Poll tick failed, will retry");
                Tick::Continue
            }
        }
    }

    async fn try_tick(&self) -> Result<Tick> {
        let Some(tx) = self.store.get_by_id(self.transaction_id).await? else {
            tracing::warn!(transaction_id = %self.transaction_id, "Tracked transaction disappeared");
            return Ok(Tick::Vanished);
        };

        if tx.status.is_terminal() {
            return Ok(Tick::Resolved(tx.status));
        }

        if tx.is_expired(Utc::now()) {
            let updated = self
                .store
                .update_status(tx.id, TransactionStatus::Timeout, None)
                .await?;
            tracing::info!(transaction_id = %tx.id, status = %updated.status, "Payment code expired");
            return Ok(Tick::Resolved(updated.status));
        }

        let next = match self.settlement.query_by_fingerprint(&tx.fingerprint).await? {
            SettlementOutcome::Settled(data) => Some((TransactionStatus::Success, Some(data))),
            SettlementOutcome::Failed => Some((TransactionStatus::Failed, None)),
            SettlementOutcome::NotFound => None,
        };

        match next {
            Some((status, payload)) => {
                let updated = self.store.update_status(tx.id, status, payload).await?;
                tracing::info!(
                    transaction_id = %tx.id,
                    fingerprint = %tx.fingerprint,
                    status = %updated.status,
                    "Payment resolved"
                );
                Ok(Tick::Resolved(updated.status))
            }
            None => {
                tracing::debug!(transaction_id = %tx.id, "Payment not seen yet");
                Ok(Tick::Continue)
            }
        }
    }

    /// Ticks until the transaction resolves or `cancel` fires.
    ///
    /// Cancellation is checked before every tick and raced against the tick
    /// itself, so once it fires no further store write is issued. A dropped
    /// sender counts as cancellation.
    pub async fn run(self, mut cancel: oneshot::Receiver<()>) -> PollerExit {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => return self.cancelled(),
                _ = ticker.tick() => {}
            }

            let tick = tokio::select! {
                biased;
                _ = &mut cancel => return self.cancelled(),
                tick = self.tick() => tick,
            };

            match tick {
                Tick::Continue => {}
                Tick::Resolved(status) => return PollerExit::Resolved(status),
                Tick::Vanished => return PollerExit::Vanished,
            }
        }
    }

    fn cancelled(&self) -> PollerExit {
        tracing::debug!(transaction_id = %self.transaction_id, "Poller cancelled");
        PollerExit::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::amount::{Amount, Currency};
    use crate::domain::fingerprint::Fingerprint;
    use crate::domain::payload::{AccountInfo, EncodedPayload, QrPayload};
    use crate::domain::ports::{SettlementClient, TransactionStore};
    use crate::domain::transaction::Transaction;
    use crate::infrastructure::in_memory::InMemoryTransactionStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted responses, then keeps answering `NotFound`.
    struct ScriptedSettlement {
        responses: Mutex<VecDeque<Result<SettlementOutcome>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSettlement {
        fn new(responses: Vec<Result<SettlementOutcome>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SettlementClient for ScriptedSettlement {
        async fn query_by_fingerprint(&self, _fingerprint: &Fingerprint) -> Result<SettlementOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(SettlementOutcome::NotFound))
        }
    }

    async fn seeded_store(ttl: chrono::Duration) -> (Arc<InMemoryTransactionStore>, TransactionId) {
        let store = Arc::new(InMemoryTransactionStore::new());
        let amount = Amount::new(dec!(5000)).unwrap();
        let payload = QrPayload::new(
            AccountInfo::individual("acc123"),
            "Shop",
            "Phnom Penh",
            Currency::Khr,
            Utc::now().timestamp_millis(),
        )
        .with_amount(amount);
        let tx = Transaction::pending(
            EncodedPayload::encode(&payload).unwrap(),
            amount,
            Currency::Khr,
            "",
            Utc::now(),
            ttl,
        )
        .unwrap();
        let id = tx.id;
        store.create(tx).await.unwrap();
        (store, id)
    }

    fn poller(
        id: TransactionId,
        store: Arc<InMemoryTransactionStore>,
        settlement: Arc<ScriptedSettlement>,
    ) -> SettlementPoller {
        SettlementPoller::new(id, store, settlement, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_expired_transaction_times_out_without_query() {
        let (store, id) = seeded_store(chrono::Duration::seconds(-1)).await;
        let settlement = ScriptedSettlement::new(vec![]);
        let poller = poller(id, store.clone(), settlement.clone());

        assert_eq!(poller.tick().await, Tick::Resolved(TransactionStatus::Timeout));
        assert_eq!(settlement.calls(), 0);
        let tx = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Timeout);
    }

    #[tokio::test]
    async fn test_settled_transaction_succeeds_with_payload() {
        let (store, id) = seeded_store(chrono::Duration::seconds(60)).await;
        let data = json!({"hash": "abc", "fromAccountId": "payer@aba"});
        let settlement = ScriptedSettlement::new(vec![
            Ok(SettlementOutcome::NotFound),
            Ok(SettlementOutcome::Settled(data.clone())),
        ]);
        let poller = poller(id, store.clone(), settlement.clone());

        assert_eq!(poller.tick().await, Tick::Continue);
        assert_eq!(poller.tick().await, Tick::Resolved(TransactionStatus::Success));
        let tx = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(tx.result_payload, Some(data));
    }

    #[tokio::test]
    async fn test_explicit_failure() {
        let (store, id) = seeded_store(chrono::Duration::seconds(60)).await;
        let settlement = ScriptedSettlement::new(vec![Ok(SettlementOutcome::Failed)]);
        let poller = poller(id, store.clone(), settlement);

        assert_eq!(poller.tick().await, Tick::Resolved(TransactionStatus::Failed));
    }

    #[tokio::test]
    async fn test_errors_keep_polling() {
        let (store, id) = seeded_store(chrono::Duration::seconds(60)).await;
        let settlement = ScriptedSettlement::new(vec![
            Err(PaymentError::SettlementTransient("connection reset".to_string())),
            Err(PaymentError::SettlementUnauthorized("HTTP 401".to_string())),
        ]);
        let poller = poller(id, store.clone(), settlement.clone());

        assert_eq!(poller.tick().await, Tick::Continue);
        assert_eq!(poller.tick().await, Tick::Continue);
        assert_eq!(settlement.calls(), 2);
        let tx = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_already_terminal_is_not_queried() {
        let (store, id) = seeded_store(chrono::Duration::seconds(60)).await;
        store
            .update_status(id, TransactionStatus::Failed, None)
            .await
            .unwrap();
        let settlement = ScriptedSettlement::new(vec![]);
        let poller = poller(id, store, settlement.clone());

        assert_eq!(poller.tick().await, Tick::Resolved(TransactionStatus::Failed));
        assert_eq!(settlement.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_transaction_vanishes() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let poller = poller(TransactionId::new(), store, ScriptedSettlement::new(vec![]));
        assert_eq!(poller.tick().await, Tick::Vanished);
    }

    #[tokio::test]
    async fn test_run_until_resolved() {
        let (store, id) = seeded_store(chrono::Duration::seconds(60)).await;
        let settlement = ScriptedSettlement::new(vec![
            Ok(SettlementOutcome::NotFound),
            Ok(SettlementOutcome::NotFound),
            Ok(SettlementOutcome::Settled(json!({"hash": "h"}))),
        ]);
        let (_cancel, cancel_rx) = oneshot::channel();

        let exit = poller(id, store, settlement.clone()).run(cancel_rx).await;
        assert_eq!(exit, PollerExit::Resolved(TransactionStatus::Success));
        assert_eq!(settlement.calls(), 3);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let (store, id) = seeded_store(chrono::Duration::seconds(60)).await;
        let (cancel, cancel_rx) = oneshot::channel();
        cancel.send(()).unwrap();

        let exit = poller(id, store, ScriptedSettlement::new(vec![])).run(cancel_rx).await;
        assert_eq!(exit, PollerExit::Cancelled);
    }
}
