#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use chrono::Utc;
use rust_decimal_macros::dec;
use skillswap::domain::coins::Amount;
use skillswap::domain::ports::LedgerStore;
use skillswap::domain::settlement::coin_purchase;
use skillswap::domain::transaction::{LedgerBatch, Posting};
use skillswap::domain::wallet::WalletRef;
use skillswap::infrastructure::rocksdb::RocksDBLedgerStore;
use std::process::Command;
use tempfile::tempdir;
use uuid::Uuid;

#[tokio::test]
async fn test_ledger_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("ledger_db");
    let user = Uuid::new_v4();

    {
        let store = RocksDBLedgerStore::open(&db_path).unwrap();
        store
            .apply(
                coin_purchase("evt_persist", user, Amount::new(dec!(100)).unwrap()),
                Utc::now(),
            )
            .await
            .unwrap();
        store
            .apply(
                LedgerBatch::new(vec![Posting::debit(
                    WalletRef::User(user),
                    Amount::new(dec!(40)).unwrap(),
                    "Spent",
                )]),
                Utc::now(),
            )
            .await
            .unwrap();
    }

    let output = Command::new(cargo_bin!("skillswap"))
        .arg("--db-path")
        .arg(&db_path)
        .arg("statement")
        .arg("--user")
        .arg(user.to_string())
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 3);
    assert!(stdout.contains(",credit,100,100,Purchased 100 coins,"));
    assert!(stdout.contains(",debit,40,60,Spent,"));

    let output = Command::new(cargo_bin!("skillswap"))
        .arg("--db-path")
        .arg(&db_path)
        .arg("reconcile")
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(",2,60,ok"));
}

#[tokio::test]
async fn test_replayed_event_not_credited_after_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("ledger_db");
    let user = Uuid::new_v4();
    let coins = Amount::new(dec!(25)).unwrap();

    {
        let store = RocksDBLedgerStore::open(&db_path).unwrap();
        store
            .apply(coin_purchase("evt_once", user, coins), Utc::now())
            .await
            .unwrap();
    }

    let store = RocksDBLedgerStore::open(&db_path).unwrap();
    let outcome = store
        .apply(coin_purchase("evt_once", user, coins), Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome, skillswap::domain::transaction::BatchOutcome::Duplicate);
    let wallet = store.wallet(WalletRef::User(user)).await.unwrap().unwrap();
    assert_eq!(wallet.balance.value(), dec!(25));
}
