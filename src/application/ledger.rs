use crate::domain::clock::ClockRef;
use crate::domain::coins::{Amount, Coins};
use crate::domain::ports::LedgerStoreRef;
use crate::domain::session::Session;
use crate::domain::settlement;
use crate::domain::transaction::{
    BatchOutcome, Discrepancy, LedgerBatch, Posting, Transaction, reconcile,
};
use crate::domain::user::UserId;
use crate::domain::wallet::{Wallet, WalletRef};
use crate::error::{MarketError, Result};

/// Double-entry wallet engine.
///
/// Every balance change goes through [`LedgerStore::apply`](crate::domain::ports::LedgerStore::apply),
/// which checks balances and writes wallets plus their ledger rows as a single
/// unit.
#[derive(Clone)]
pub struct LedgerEngine {
    store: LedgerStoreRef,
    clock: ClockRef,
}

/// Result of replaying one wallet's ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationReport {
    pub wallet: Wallet,
    pub transactions: usize,
    pub outcome: std::result::Result<Coins, Discrepancy>,
}

impl ReconciliationReport {
    /// The ledger replays cleanly and lands on the stored balance.
    pub fn is_consistent(&self) -> bool {
        matches!(self.outcome, Ok(closing) if closing == self.wallet.balance)
    }
}

impl LedgerEngine {
    pub fn new(store: LedgerStoreRef, clock: ClockRef) -> Self {
        Self { store, clock }
    }

    /// Applies `batch` atomically.
    pub async fn apply(&self, batch: LedgerBatch) -> Result<BatchOutcome> {
        let key = batch.idempotency_key.clone();
        let outcome = self.store.apply(batch, self.clock.now()).await?;
        match &outcome {
            BatchOutcome::Applied(txs) => {
                tracing::info!(key = ?key, rows = txs.len(), "Ledger batch applied");
            }
            BatchOutcome::Duplicate => {
                tracing::info!(key = ?key, "Ledger batch already applied, skipping");
            }
        }
        Ok(outcome)
    }

    pub async fn credit(
        &self,
        wallet: WalletRef,
        amount: Amount,
        description: &str,
    ) -> Result<Transaction> {
        self.single(Posting::credit(wallet, amount, description)).await
    }

    /// Fails with `InsufficientBalance` and writes nothing when the wallet
    /// cannot cover `amount`.
    pub async fn debit(
        &self,
        wallet: WalletRef,
        amount: Amount,
        description: &str,
    ) -> Result<Transaction> {
        self.single(Posting::debit(wallet, amount, description)).await
    }

    async fn single(&self, posting: Posting) -> Result<Transaction> {
        match self.apply(LedgerBatch::new(vec![posting])).await? {
            BatchOutcome::Applied(mut txs) => txs
                .pop()
                .ok_or_else(|| MarketError::internal("ledger store wrote no transaction")),
            BatchOutcome::Duplicate => Err(MarketError::internal(
                "unkeyed ledger batch reported as duplicate",
            )),
        }
    }

    /// Charges the participants of `session` according to its type.
    ///
    /// A session is settled at most once; a second attempt is a `Conflict`.
    pub async fn settle_session(&self, session: &Session) -> Result<Vec<Transaction>> {
        match self.apply(settlement::session_settlement(session)).await {
            Ok(BatchOutcome::Applied(txs)) => {
                tracing::info!(
                    session_id = %session.id,
                    session_type = ?session.session_type,
                    "Session payment settled"
                );
                Ok(txs)
            }
            Ok(BatchOutcome::Duplicate) => Err(MarketError::Conflict(format!(
                "Session {} is already paid",
                session.id
            ))),
            Err(err) => {
                tracing::warn!(session_id = %session.id, error = %err, "Session settlement rejected");
                Err(err)
            }
        }
    }

    pub async fn wallet_of(&self, user: UserId) -> Result<Option<Wallet>> {
        self.store.wallet(WalletRef::User(user)).await
    }

    pub async fn platform_wallet(&self) -> Result<Option<Wallet>> {
        self.store.wallet(WalletRef::Platform).await
    }

    pub async fn history(&self, user: UserId) -> Result<Vec<Transaction>> {
        match self.wallet_of(user).await? {
            Some(wallet) => self.store.transactions(wallet.id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Replays every wallet's ledger from zero.
    pub async fn reconcile_all(&self) -> Result<Vec<ReconciliationReport>> {
        let mut reports = Vec::new();
        for wallet in self.store.wallets().await? {
            let txs = self.store.transactions(wallet.id).await?;
            let outcome = reconcile(Coins::ZERO, &txs);
            if let Err(discrepancy) = &outcome {
                tracing::error!(
                    wallet_id = %wallet.id,
                    transaction_id = %discrepancy.transaction_id,
                    expected = %discrepancy.expected,
                    recorded = %discrepancy.recorded,
                    "Ledger discrepancy"
                );
            }
            reports.push(ReconciliationReport {
                wallet,
                transactions: txs.len(),
                outcome,
            });
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::SystemClock;
    use crate::domain::session::{NewSession, SessionType};
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use uuid::Uuid;

    fn engine() -> LedgerEngine {
        LedgerEngine::new(Arc::new(InMemoryLedgerStore::new()), Arc::new(SystemClock))
    }

    fn coins(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    fn session(session_type: SessionType) -> Session {
        Session::new(NewSession {
            host_id: Uuid::new_v4(),
            learner_id: Uuid::new_v4(),
            scheduled_time: Utc::now(),
            title: "Chess openings".into(),
            description: None,
            session_type,
        })
    }

    #[tokio::test]
    async fn test_credit_then_debit() {
        let engine = engine();
        let user = Uuid::new_v4();
        engine
            .credit(WalletRef::User(user), coins(dec!(80)), "Coin purchase")
            .await
            .unwrap();
        let tx = engine
            .debit(WalletRef::User(user), coins(dec!(30)), "Session")
            .await
            .unwrap();

        assert_eq!(tx.balance_after, Coins::new(dec!(50)));
        let wallet = engine.wallet_of(user).await.unwrap().unwrap();
        assert_eq!(wallet.balance, Coins::new(dec!(50)));
        assert_eq!(wallet.total_earned, Coins::new(dec!(80)));
        assert_eq!(wallet.total_spent, Coins::new(dec!(30)));
    }

    #[tokio::test]
    async fn test_debit_without_wallet_is_insufficient() {
        let engine = engine();
        let user = Uuid::new_v4();
        let result = engine
            .debit(WalletRef::User(user), coins(dec!(1)), "Session")
            .await;
        assert!(matches!(result, Err(MarketError::InsufficientBalance { .. })));
        assert!(engine.history(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_teaching_settlement_at_exact_balance() {
        let engine = engine();
        let s = session(SessionType::SkillTeaching);
        engine
            .credit(WalletRef::User(s.learner_id), coins(dec!(150)), "Coin purchase")
            .await
            .unwrap();

        let txs = engine.settle_session(&s).await.unwrap();
        assert_eq!(txs.len(), 3);

        let learner = engine.wallet_of(s.learner_id).await.unwrap().unwrap();
        let host = engine.wallet_of(s.host_id).await.unwrap().unwrap();
        let platform = engine.platform_wallet().await.unwrap().unwrap();
        assert_eq!(learner.balance, Coins::ZERO);
        assert_eq!(host.balance, Coins::new(dec!(50)));
        assert_eq!(platform.balance, Coins::new(dec!(100)));
    }

    #[tokio::test]
    async fn test_settlement_twice_is_conflict() {
        let engine = engine();
        let s = session(SessionType::SkillTeaching);
        engine
            .credit(WalletRef::User(s.learner_id), coins(dec!(300)), "Coin purchase")
            .await
            .unwrap();
        engine.settle_session(&s).await.unwrap();

        let again = engine.settle_session(&s).await;
        assert!(matches!(again, Err(MarketError::Conflict(_))));
        let learner = engine.wallet_of(s.learner_id).await.unwrap().unwrap();
        assert_eq!(learner.balance, Coins::new(dec!(150)));
    }

    #[tokio::test]
    async fn test_reconcile_all_consistent() {
        let engine = engine();
        let s = session(SessionType::SkillExchange);
        for user in s.participants() {
            engine
                .credit(WalletRef::User(user), coins(dec!(70)), "Coin purchase")
                .await
                .unwrap();
        }
        engine.settle_session(&s).await.unwrap();

        let reports = engine.reconcile_all().await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(ReconciliationReport::is_consistent));
        assert!(reports.iter().all(|r| r.transactions == 2));
    }
}
