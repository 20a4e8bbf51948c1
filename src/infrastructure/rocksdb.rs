use crate::domain::fingerprint::Fingerprint;
use crate::domain::ports::TransactionStore;
use crate::domain::transaction::{Transaction, TransactionId, TransactionStatus};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for transaction records, keyed by id.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family mapping fingerprint to transaction id.
pub const CF_FINGERPRINTS: &str = "fingerprints";

/// A persistent transaction store backed by RocksDB.
///
/// Records are stored as JSON. Writers are serialised through an internal
/// lock so the fingerprint uniqueness check and insert are atomic, and the
/// record and its index entry are written in one batch.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_transactions = ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default());
        let cf_fingerprints = ColumnFamilyDescriptor::new(CF_FINGERPRINTS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_transactions, cf_fingerprints])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::Internal(Box::new(std::io::Error::other(format!(
                "Column family {} not found",
                name
            ))))
        })
    }

    fn read(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        match self.db.get_cf(cf, id.to_string())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, batch: &mut WriteBatch, tx: &Transaction) -> Result<()> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        batch.put_cf(cf, tx.id.to_string(), serde_json::to_vec(tx)?);
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn create(&self, tx: Transaction) -> Result<Transaction> {
        let _guard = self.write_lock.lock().await;
        let cf_fingerprints = self.cf(CF_FINGERPRINTS)?;
        if self.db.get_cf(cf_fingerprints, tx.fingerprint.as_str())?.is_some() {
            return Err(PaymentError::DuplicateFingerprint(tx.fingerprint.to_string()));
        }

        let mut batch = WriteBatch::default();
        self.write(&mut batch, &tx)?;
        batch.put_cf(cf_fingerprints, tx.fingerprint.as_str(), tx.id.to_string());
        self.db.write(batch)?;
        Ok(tx)
    }

    async fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.read(id)
    }

    async fn get_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<Transaction>> {
        let cf = self.cf(CF_FINGERPRINTS)?;
        let Some(id_bytes) = self.db.get_cf(cf, fingerprint.as_str())? else {
            return Ok(None);
        };
        let id: TransactionId = String::from_utf8_lossy(&id_bytes).parse()?;
        self.read(id)
    }

    async fn update_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
        result_payload: Option<serde_json::Value>,
    ) -> Result<Transaction> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .read(id)?
            .ok_or_else(|| PaymentError::TransactionNotFound(id.to_string()))?;
        if tx.transition(status, result_payload, Utc::now()) {
            let mut batch = WriteBatch::default();
            self.write(&mut batch, &tx)?;
            self.db.write(batch)?;
        }
        Ok(tx)
    }
}
