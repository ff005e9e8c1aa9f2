use crate::domain::ports::LedgerStore;
use crate::domain::transaction::{BatchOutcome, LedgerBatch, Transaction};
use crate::domain::wallet::{Wallet, WalletId, WalletRef};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for wallet snapshots, keyed by wallet reference.
pub const CF_WALLETS: &str = "wallets";
/// Column Family for ledger rows, keyed by wallet id then sequence number.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family holding idempotency keys of applied batches.
pub const CF_APPLIED: &str = "applied_keys";
/// Column Family for store bookkeeping such as the row sequence.
pub const CF_META: &str = "meta";

const SEQUENCE_KEY: &[u8] = b"sequence";

/// Persistent ledger backed by RocksDB.
///
/// Each batch is committed with one `WriteBatch`; the mutex serializes the
/// balance checks that precede it.
#[derive(Clone)]
pub struct RocksDBLedgerStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

fn wallet_key(wallet: &WalletRef) -> String {
    match wallet {
        WalletRef::User(user) => format!("user:{user}"),
        WalletRef::Platform => "platform".to_string(),
    }
}

fn transaction_key(wallet_id: WalletId, sequence: u64) -> Vec<u8> {
    let mut key = wallet_id.as_bytes().to_vec();
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(MarketError::from)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(MarketError::from)
}

impl RocksDBLedgerStore {
    /// Opens or creates the ledger database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_WALLETS, CF_TRANSACTIONS, CF_APPLIED, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| MarketError::internal(format!("{name} column family not found")))
    }

    fn load_wallet(&self, wallet: &WalletRef) -> Result<Option<Wallet>> {
        match self.db.get_cf(self.cf(CF_WALLETS)?, wallet_key(wallet))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn next_sequence(&self) -> Result<u64> {
        let current = match self.db.get_cf(self.cf(CF_META)?, SEQUENCE_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| MarketError::internal("corrupt ledger sequence"))?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        Ok(current)
    }
}

#[async_trait]
impl LedgerStore for RocksDBLedgerStore {
    async fn apply(&self, batch: LedgerBatch, now: DateTime<Utc>) -> Result<BatchOutcome> {
        let _guard = self.write_lock.lock().await;

        let applied = self.cf(CF_APPLIED)?;
        if let Some(key) = &batch.idempotency_key
            && self.db.get_pinned_cf(applied, key)?.is_some()
        {
            return Ok(BatchOutcome::Duplicate);
        }

        let mut wallets = HashMap::new();
        for wallet in batch.wallet_refs() {
            if let Some(stored) = self.load_wallet(&wallet)? {
                wallets.insert(wallet, stored);
            }
        }
        let transactions = batch.apply_to(&mut wallets, now)?;

        let mut write = WriteBatch::default();
        let wallets_cf = self.cf(CF_WALLETS)?;
        for (wallet_ref, wallet) in &wallets {
            write.put_cf(wallets_cf, wallet_key(wallet_ref), encode(wallet)?);
        }
        let mut sequence = self.next_sequence()?;
        let transactions_cf = self.cf(CF_TRANSACTIONS)?;
        for tx in &transactions {
            sequence += 1;
            write.put_cf(
                transactions_cf,
                transaction_key(tx.wallet_id, sequence),
                encode(tx)?,
            );
        }
        write.put_cf(self.cf(CF_META)?, SEQUENCE_KEY, sequence.to_be_bytes());
        if let Some(key) = &batch.idempotency_key {
            write.put_cf(applied, key, b"");
        }
        self.db.write(write)?;

        Ok(BatchOutcome::Applied(transactions))
    }

    async fn wallet(&self, wallet: WalletRef) -> Result<Option<Wallet>> {
        self.load_wallet(&wallet)
    }

    async fn wallets(&self) -> Result<Vec<Wallet>> {
        let mut wallets = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_WALLETS)?, IteratorMode::Start) {
            let (_key, value) = item?;
            wallets.push(decode(&value)?);
        }
        Ok(wallets)
    }

    async fn transactions(&self, wallet_id: WalletId) -> Result<Vec<Transaction>> {
        let prefix: &[u8] = wallet_id.as_bytes();
        let mode = IteratorMode::From(prefix, Direction::Forward);
        let mut transactions = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_TRANSACTIONS)?, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            transactions.push(decode(&value)?);
        }
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::coins::{Amount, Coins};
    use crate::domain::transaction::Posting;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn amount(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBLedgerStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in [CF_WALLETS, CF_TRANSACTIONS, CF_APPLIED, CF_META] {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_batch_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let user = WalletRef::User(Uuid::new_v4());
        {
            let store = RocksDBLedgerStore::open(dir.path()).unwrap();
            let credit = Posting::credit(user, amount(dec!(100)), "top up");
            store.apply(LedgerBatch::new(vec![credit]), Utc::now()).await.unwrap();
            let debit = Posting::debit(user, amount(dec!(30)), "spend");
            store.apply(LedgerBatch::new(vec![debit]), Utc::now()).await.unwrap();
        }

        let store = RocksDBLedgerStore::open(dir.path()).unwrap();
        let wallet = store.wallet(user).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Coins::new(dec!(70)));

        let history = store.transactions(wallet.id).await.unwrap();
        let balances: Vec<Coins> = history.iter().map(|tx| tx.balance_after).collect();
        assert_eq!(balances, vec![Coins::new(dec!(100)), Coins::new(dec!(70))]);
    }

    #[tokio::test]
    async fn test_rocksdb_keyed_batch_applies_once() {
        let dir = tempdir().unwrap();
        let store = RocksDBLedgerStore::open(dir.path()).unwrap();
        let user = WalletRef::User(Uuid::new_v4());
        let batch = || {
            LedgerBatch::keyed(
                "provider-event:evt_1",
                vec![Posting::credit(user, amount(dec!(25)), "purchase")],
            )
        };

        assert!(matches!(
            store.apply(batch(), Utc::now()).await.unwrap(),
            BatchOutcome::Applied(_)
        ));
        assert_eq!(
            store.apply(batch(), Utc::now()).await.unwrap(),
            BatchOutcome::Duplicate
        );
        assert_eq!(store.wallets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_rejected_batch_writes_nothing() {
        let dir = tempdir().unwrap();
        let store = RocksDBLedgerStore::open(dir.path()).unwrap();
        let payer = WalletRef::User(Uuid::new_v4());
        let payee = WalletRef::User(Uuid::new_v4());
        let batch = LedgerBatch::new(vec![
            Posting::credit(payee, amount(dec!(10)), "earn"),
            Posting::debit(payer, amount(dec!(10)), "pay"),
        ]);

        assert!(matches!(
            store.apply(batch, Utc::now()).await,
            Err(MarketError::InsufficientBalance { .. })
        ));
        assert!(store.wallets().await.unwrap().is_empty());
    }
}
