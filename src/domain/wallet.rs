use super::coins::{Amount, Coins};
use super::user::UserId;
use crate::error::{MarketError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type WalletId = Uuid;

pub const CURRENCY: &str = "coins";

/// Addresses a wallet without knowing its id: a user's wallet or the
/// single platform wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "userId")]
pub enum WalletRef {
    User(UserId),
    Platform,
}

/// Coin balance owned by a user or by the platform.
///
/// `total_earned` and `total_spent` are independent lifetime counters; they
/// are not required to add up to `balance`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: WalletId,
    /// `None` only for the platform wallet.
    pub user_id: Option<UserId>,
    pub balance: Coins,
    pub total_earned: Coins,
    pub total_spent: Coins,
    pub currency: String,
    pub is_platform: bool,
}

impl Wallet {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: Some(user_id),
            balance: Coins::ZERO,
            total_earned: Coins::ZERO,
            total_spent: Coins::ZERO,
            currency: CURRENCY.to_string(),
            is_platform: false,
        }
    }

    pub fn platform() -> Self {
        Self {
            user_id: None,
            is_platform: true,
            ..Self::for_user(Uuid::nil())
        }
    }

    pub fn for_ref(wallet: WalletRef) -> Self {
        match wallet {
            WalletRef::User(user_id) => Self::for_user(user_id),
            WalletRef::Platform => Self::platform(),
        }
    }

    pub fn wallet_ref(&self) -> WalletRef {
        match self.user_id {
            Some(user_id) if !self.is_platform => WalletRef::User(user_id),
            _ => WalletRef::Platform,
        }
    }

    /// Adds coins to the balance and the lifetime earnings.
    pub fn credit(&mut self, amount: Amount) {
        let amount = Coins::from(amount);
        self.balance += amount;
        self.total_earned += amount;
    }

    /// Removes coins if the balance covers them; the wallet is untouched otherwise.
    pub fn debit(&mut self, amount: Amount) -> Result<()> {
        let amount = Coins::from(amount);
        if self.balance >= amount {
            self.balance -= amount;
            self.total_spent += amount;
            Ok(())
        } else {
            Err(MarketError::InsufficientBalance {
                wallet: self.id.to_string(),
                required: amount.value(),
                available: self.balance.value(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amount(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[test]
    fn test_credit_tracks_earnings() {
        let mut wallet = Wallet::for_user(Uuid::new_v4());
        wallet.credit(amount(dec!(200)));
        assert_eq!(wallet.balance, Coins::new(dec!(200)));
        assert_eq!(wallet.total_earned, Coins::new(dec!(200)));
        assert_eq!(wallet.total_spent, Coins::ZERO);
    }

    #[test]
    fn test_debit_exact_balance() {
        let mut wallet = Wallet::for_user(Uuid::new_v4());
        wallet.credit(amount(dec!(150)));
        wallet.debit(amount(dec!(150))).unwrap();
        assert_eq!(wallet.balance, Coins::ZERO);
        assert_eq!(wallet.total_spent, Coins::new(dec!(150)));
    }

    #[test]
    fn test_debit_insufficient_leaves_wallet_untouched() {
        let mut wallet = Wallet::for_user(Uuid::new_v4());
        wallet.credit(amount(dec!(49)));
        let before = wallet.clone();

        let result = wallet.debit(amount(dec!(50)));
        assert!(matches!(result, Err(MarketError::InsufficientBalance { .. })));
        assert_eq!(wallet, before);
    }

    #[test]
    fn test_platform_wallet_has_no_user() {
        let wallet = Wallet::platform();
        assert!(wallet.is_platform);
        assert!(wallet.user_id.is_none());
        assert_eq!(wallet.wallet_ref(), WalletRef::Platform);
    }
}
