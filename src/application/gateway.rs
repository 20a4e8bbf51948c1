use super::poller::SettlementPoller;
use super::registry::PollerRegistry;
use crate::domain::amount::{Amount, Currency};
use crate::domain::fingerprint::Fingerprint;
use crate::domain::payload::{AccountInfo, AdditionalData, EncodedPayload, QrPayload};
use crate::domain::ports::{SettlementOutcome, SharedSettlementClient, SharedTransactionStore};
use crate::domain::tlv;
use crate::domain::transaction::{Transaction, TransactionId, TransactionStatus};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_MERCHANT_CITY: &str = "Phnom Penh";

/// Timing and defaults applied to every payment the gateway creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    pub poll_interval: Duration,
    pub qr_expiration: Duration,
    pub default_city: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            qr_expiration: Duration::from_secs(600),
            default_city: DEFAULT_MERCHANT_CITY.to_string(),
        }
    }
}

/// A request for a single-use, amount-carrying payment code.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub account: AccountInfo,
    pub merchant_name: String,
    /// Falls back to [`GatewaySettings::default_city`].
    pub merchant_city: Option<String>,
    pub amount: Amount,
    pub currency: Currency,
    pub additional_data: AdditionalData,
    pub description: String,
}

impl PaymentRequest {
    pub fn new(
        account: AccountInfo,
        merchant_name: impl Into<String>,
        amount: Amount,
        currency: Currency,
    ) -> Self {
        Self {
            account,
            merchant_name: merchant_name.into(),
            merchant_city: None,
            amount,
            currency,
            additional_data: AdditionalData::default(),
            description: String::new(),
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.merchant_city = Some(city.into());
        self
    }

    pub fn with_additional_data(mut self, additional_data: AdditionalData) -> Self {
        self.additional_data = additional_data;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The entry point for generating payment codes and tracking their settlement.
///
/// `PaymentGateway` owns the storage backend, the settlement client and the
/// poller registry. Dropping it cancels every poller it started; call
/// [`PaymentGateway::shutdown`] to also wait for them.
pub struct PaymentGateway {
    store: SharedTransactionStore,
    settlement: SharedSettlementClient,
    registry: PollerRegistry,
    settings: GatewaySettings,
}

impl PaymentGateway {
    /// Creates a new `PaymentGateway`.
    ///
    /// # Arguments
    ///
    /// * `store` - The store for transaction records.
    /// * `settlement` - The client used to query the settlement authority.
    /// * `settings` - Poll interval, code lifetime and defaults.
    pub fn new(
        store: SharedTransactionStore,
        settlement: SharedSettlementClient,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            store,
            settlement,
            registry: PollerRegistry::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Encodes a payload. Fails with `Validation` on missing or oversized fields.
    pub fn generate_payload(&self, payload: &QrPayload) -> Result<EncodedPayload> {
        EncodedPayload::encode(payload)
    }

    pub fn verify_payload(&self, encoded: &str) -> bool {
        tlv::verify(encoded)
    }

    pub fn decode_payload(&self, encoded: &str) -> Result<BTreeMap<String, String>> {
        tlv::decode(encoded)
    }

    /// Builds a dynamic code for `request` and records it as `PENDING`.
    ///
    /// The code expires `qr_expiration` after creation. Tracking is not
    /// started; call [`PaymentGateway::begin_tracking`] for that.
    pub async fn create_payment(&self, request: PaymentRequest) -> Result<Transaction> {
        let now = Utc::now();
        let city = request
            .merchant_city
            .filter(|city| !city.trim().is_empty())
            .unwrap_or_else(|| self.settings.default_city.clone());
        let payload = QrPayload::new(
            request.account,
            request.merchant_name,
            city,
            request.currency,
            now.timestamp_millis(),
        )
        .with_amount(request.amount)
        .with_additional_data(request.additional_data);

        let encoded = self.generate_payload(&payload)?;
        let ttl = chrono::Duration::from_std(self.settings.qr_expiration)
            .map_err(|e| PaymentError::Config(format!("Invalid QR expiration: {}", e)))?;
        let tx = Transaction::pending(
            encoded,
            request.amount,
            request.currency,
            request.description,
            now,
            ttl,
        )?;

        let tx = self.store.create(tx).await?;
        tracing::info!(
            transaction_id = %tx.id,
            fingerprint = %tx.fingerprint,
            amount = %tx.amount,
            currency = %tx.currency,
            expires_at = %tx.expires_at,
            "Payment created"
        );
        Ok(tx)
    }

    /// Starts polling settlement for `tx`. Records that are not `PENDING` are ignored.
    pub fn begin_tracking(&self, tx: &Transaction) {
        if tx.status != TransactionStatus::Pending {
            tracing::debug!(transaction_id = %tx.id, status = %tx.status, "Not tracking resolved transaction");
            return;
        }
        self.registry.start(SettlementPoller::new(
            tx.id,
            self.store.clone(),
            self.settlement.clone(),
            self.settings.poll_interval,
        ));
    }

    pub async fn begin_tracking_by_id(&self, id: TransactionId) -> Result<()> {
        let tx = self.status(id).await?;
        self.begin_tracking(&tx);
        Ok(())
    }

    /// Stops polling `id`. Once this returns no further status write happens
    /// on behalf of the poller. Returns `false` if `id` was not tracked.
    pub async fn stop_tracking(&self, id: TransactionId) -> bool {
        self.registry.stop(id).await
    }

    pub fn is_tracking(&self, id: TransactionId) -> bool {
        self.registry.is_tracking(id)
    }

    /// Abandons a payment: stops tracking and marks it `FAILED`.
    ///
    /// A transaction that already reached a terminal state is returned unchanged.
    pub async fn cancel_payment(&self, id: TransactionId) -> Result<Transaction> {
        self.registry.stop(id).await;
        let tx = self
            .store
            .update_status(id, TransactionStatus::Failed, None)
            .await?;
        tracing::info!(transaction_id = %id, status = %tx.status, "Payment cancelled");
        Ok(tx)
    }

    pub async fn status(&self, id: TransactionId) -> Result<Transaction> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(id.to_string()))
    }

    pub async fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Transaction> {
        self.store
            .get_by_fingerprint(fingerprint)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(fingerprint.to_string()))
    }

    /// One-off settlement query, independent of any tracked transaction.
    pub async fn check_settlement(&self, fingerprint: &Fingerprint) -> Result<SettlementOutcome> {
        self.settlement.query_by_fingerprint(fingerprint).await
    }

    /// Re-reads `id` every `check_every` until it reaches a terminal state or
    /// stops being tracked, and returns the last record seen.
    pub async fn wait_for_resolution(
        &self,
        id: TransactionId,
        check_every: Duration,
    ) -> Result<Transaction> {
        loop {
            let tx = self.status(id).await?;
            if tx.status.is_terminal() || !self.registry.is_tracking(id) {
                return Ok(tx);
            }
            tokio::time::sleep(check_every).await;
        }
    }

    /// Cancels every poller and waits for them to finish.
    pub async fn shutdown(&self) {
        let active = self.registry.active_count();
        self.registry.shutdown().await;
        tracing::info!(stopped = active, "Gateway shut down");
    }
}
