use super::coins::{Amount, Coins};
use super::session::SessionId;
use super::user::UserId;
use super::wallet::{Wallet, WalletId, WalletRef};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type TransactionId = Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Credit,
    Debit,
}

/// One immutable ledger row. `balance_after` is the wallet balance right
/// after this row was applied.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub r#type: TransactionType,
    pub amount: Amount,
    pub balance_after: Coins,
    pub description: String,
    pub session_id: Option<SessionId>,
    pub from_user_id: Option<UserId>,
    pub to_user_id: Option<UserId>,
    pub platform_share: Coins,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Signed change this row applied to its wallet.
    pub fn delta(&self) -> Coins {
        match self.r#type {
            TransactionType::Credit => Coins::from(self.amount),
            TransactionType::Debit => Coins::ZERO - Coins::from(self.amount),
        }
    }
}

/// A single wallet movement requested as part of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub wallet: WalletRef,
    pub r#type: TransactionType,
    pub amount: Amount,
    pub description: String,
    pub session_id: Option<SessionId>,
    pub from_user_id: Option<UserId>,
    pub to_user_id: Option<UserId>,
    pub platform_share: Coins,
}

impl Posting {
    pub fn credit(wallet: WalletRef, amount: Amount, description: impl Into<String>) -> Self {
        Self::new(wallet, TransactionType::Credit, amount, description)
    }

    pub fn debit(wallet: WalletRef, amount: Amount, description: impl Into<String>) -> Self {
        Self::new(wallet, TransactionType::Debit, amount, description)
    }

    fn new(
        wallet: WalletRef,
        r#type: TransactionType,
        amount: Amount,
        description: impl Into<String>,
    ) -> Self {
        Self {
            wallet,
            r#type,
            amount,
            description: description.into(),
            session_id: None,
            from_user_id: None,
            to_user_id: None,
            platform_share: Coins::ZERO,
        }
    }

    pub fn for_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn between(mut self, from: Option<UserId>, to: Option<UserId>) -> Self {
        self.from_user_id = from;
        self.to_user_id = to;
        self
    }

    pub fn with_platform_share(mut self, share: Coins) -> Self {
        self.platform_share = share;
        self
    }
}

/// Postings that must be applied together or not at all.
///
/// When `idempotency_key` is set, a store applies the batch at most once for
/// that key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LedgerBatch {
    pub idempotency_key: Option<String>,
    pub postings: Vec<Posting>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Applied(Vec<Transaction>),
    /// The idempotency key was already consumed; nothing was written.
    Duplicate,
}

impl LedgerBatch {
    pub fn new(postings: Vec<Posting>) -> Self {
        Self {
            idempotency_key: None,
            postings,
        }
    }

    pub fn keyed(key: impl Into<String>, postings: Vec<Posting>) -> Self {
        Self {
            idempotency_key: Some(key.into()),
            postings,
        }
    }

    /// Runs every posting against `wallets`, creating missing wallets on first
    /// use.
    ///
    /// Works on the caller's map: stores hand in copies and only persist them
    /// once this returns `Ok`, so a failing posting leaves nothing behind.
    pub fn apply_to(
        &self,
        wallets: &mut HashMap<WalletRef, Wallet>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let mut written = Vec::with_capacity(self.postings.len());
        for posting in &self.postings {
            let wallet = wallets
                .entry(posting.wallet)
                .or_insert_with(|| Wallet::for_ref(posting.wallet));
            match posting.r#type {
                TransactionType::Credit => wallet.credit(posting.amount),
                TransactionType::Debit => wallet.debit(posting.amount)?,
            }
            written.push(Transaction {
                id: Uuid::new_v4(),
                wallet_id: wallet.id,
                r#type: posting.r#type,
                amount: posting.amount,
                balance_after: wallet.balance,
                description: posting.description.clone(),
                session_id: posting.session_id,
                from_user_id: posting.from_user_id,
                to_user_id: posting.to_user_id,
                platform_share: posting.platform_share,
                created_at: now,
            });
        }
        Ok(written)
    }

    /// Wallets this batch touches, in first-use order without repeats.
    pub fn wallet_refs(&self) -> Vec<WalletRef> {
        let mut refs = Vec::new();
        for posting in &self.postings {
            if !refs.contains(&posting.wallet) {
                refs.push(posting.wallet);
            }
        }
        refs
    }
}

/// A ledger row whose `balance_after` disagrees with the running balance.
#[derive(Debug, Clone, PartialEq)]
pub struct Discrepancy {
    pub transaction_id: TransactionId,
    pub expected: Coins,
    pub recorded: Coins,
}

/// Anything that records a signed movement and the balance it produced.
pub trait LedgerEntry {
    fn entry_id(&self) -> TransactionId;
    fn delta(&self) -> Coins;
    fn balance_after(&self) -> Coins;
}

impl LedgerEntry for Transaction {
    fn entry_id(&self) -> TransactionId {
        self.id
    }

    fn delta(&self) -> Coins {
        Transaction::delta(self)
    }

    fn balance_after(&self) -> Coins {
        self.balance_after
    }
}

/// Replays `entries` (oldest first) from `opening` and checks every recorded
/// balance. Returns the closing balance.
pub fn reconcile<'a, E, I>(opening: Coins, entries: I) -> std::result::Result<Coins, Discrepancy>
where
    E: LedgerEntry + 'a,
    I: IntoIterator<Item = &'a E>,
{
    let mut running = opening;
    for entry in entries {
        running += entry.delta();
        if running != entry.balance_after() {
            return Err(Discrepancy {
                transaction_id: entry.entry_id(),
                expected: running,
                recorded: entry.balance_after(),
            });
        }
    }
    Ok(running)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MarketError;
    use rust_decimal_macros::dec;

    fn amount(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[test]
    fn test_apply_creates_wallets_and_stamps_balance_after() {
        let user = Uuid::new_v4();
        let batch = LedgerBatch::new(vec![
            Posting::credit(WalletRef::User(user), amount(dec!(100)), "Coin purchase"),
            Posting::debit(WalletRef::User(user), amount(dec!(30)), "Session"),
        ]);
        let mut wallets = HashMap::new();

        let txs = batch.apply_to(&mut wallets, Utc::now()).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].balance_after, Coins::new(dec!(100)));
        assert_eq!(txs[1].balance_after, Coins::new(dec!(70)));
        assert_eq!(wallets[&WalletRef::User(user)].balance, Coins::new(dec!(70)));
    }

    #[test]
    fn test_apply_fails_on_overdraft() {
        let batch = LedgerBatch::new(vec![Posting::debit(
            WalletRef::User(Uuid::new_v4()),
            amount(dec!(1)),
            "Session",
        )]);
        let mut wallets = HashMap::new();
        let result = batch.apply_to(&mut wallets, Utc::now());
        assert!(matches!(result, Err(MarketError::InsufficientBalance { .. })));
    }

    #[test]
    fn test_reconcile_detects_tampered_row() {
        let user = Uuid::new_v4();
        let batch = LedgerBatch::new(vec![
            Posting::credit(WalletRef::User(user), amount(dec!(100)), "Coin purchase"),
            Posting::debit(WalletRef::User(user), amount(dec!(50)), "Swap"),
            Posting::credit(WalletRef::User(user), amount(dec!(5)), "Refund"),
        ]);
        let mut wallets = HashMap::new();
        let mut txs = batch.apply_to(&mut wallets, Utc::now()).unwrap();

        assert_eq!(reconcile(Coins::ZERO, &txs), Ok(Coins::new(dec!(55))));

        txs[1].balance_after = Coins::new(dec!(60));
        let err = reconcile(Coins::ZERO, &txs).unwrap_err();
        assert_eq!(err.transaction_id, txs[1].id);
        assert_eq!(err.expected, Coins::new(dec!(50)));
    }

    #[test]
    fn test_wallet_refs_deduplicated() {
        let user = Uuid::new_v4();
        let batch = LedgerBatch::new(vec![
            Posting::debit(WalletRef::User(user), amount(dec!(1)), "a"),
            Posting::credit(WalletRef::Platform, amount(dec!(1)), "b"),
            Posting::credit(WalletRef::User(user), amount(dec!(1)), "c"),
        ]);
        assert_eq!(
            batch.wallet_refs(),
            vec![WalletRef::User(user), WalletRef::Platform]
        );
    }
}
