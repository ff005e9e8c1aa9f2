use super::coins::Amount;
use super::swap::ChatRoomId;
use super::user::UserId;
use crate::error::{MarketError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// US cents charged per coin.
pub const CENTS_PER_COIN: Decimal = dec!(10);

pub const META_USER_ID: &str = "userId";
pub const META_COINS: &str = "coinsNumber";
pub const META_CHAT_ROOM: &str = "chatRoomId";

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Price of `coins` in cents, rounded half away from zero.
pub fn amount_in_cents(coins: Amount) -> Result<i64> {
    (coins.value() * CENTS_PER_COIN)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| MarketError::ValidationError(format!("{coins} coins is too large")))
}

/// What the provider echoes back once a purchase completes.
///
/// Only this metadata is trusted when crediting; client-supplied amounts are
/// never re-read after checkout starts.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseMetadata {
    pub user_id: UserId,
    pub coins: Amount,
    /// Set when the purchase was made to unblock a swap payment.
    pub chat_room_id: Option<ChatRoomId>,
}

impl PurchaseMetadata {
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            (META_USER_ID.to_string(), self.user_id.to_string()),
            (META_COINS.to_string(), self.coins.value().to_string()),
        ];
        if let Some(room) = self.chat_room_id {
            pairs.push((META_CHAT_ROOM.to_string(), room.to_string()));
        }
        pairs
    }

    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let field = |key: &str| {
            map.get(key).ok_or_else(|| {
                MarketError::ValidationError(format!("Checkout metadata is missing {key}"))
            })
        };
        let user_id = field(META_USER_ID)?
            .parse()
            .map_err(|_| MarketError::ValidationError("Invalid userId metadata".to_string()))?;
        let coins: Decimal = field(META_COINS)?
            .parse()
            .map_err(|_| MarketError::ValidationError("Invalid coinsNumber metadata".to_string()))?;
        let chat_room_id = match map.get(META_CHAT_ROOM) {
            Some(raw) => Some(raw.parse().map_err(|_| {
                MarketError::ValidationError("Invalid chatRoomId metadata".to_string())
            })?),
            None => None,
        };
        Ok(Self {
            user_id,
            coins: Amount::new(coins)?,
            chat_room_id,
        })
    }
}

/// A hosted checkout page to request from the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub product_name: String,
    pub unit_amount_cents: i64,
    pub metadata: PurchaseMetadata,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// A verified provider event.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEvent {
    pub id: String,
    pub kind: ProviderEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEventKind {
    CheckoutCompleted {
        checkout_id: String,
        metadata: PurchaseMetadata,
    },
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_amount_in_cents_rounds() {
        assert_eq!(amount_in_cents(Amount::new(dec!(100)).unwrap()).unwrap(), 1000);
        assert_eq!(amount_in_cents(Amount::new(dec!(2.45)).unwrap()).unwrap(), 25);
        assert_eq!(amount_in_cents(Amount::new(dec!(0.04)).unwrap()).unwrap(), 0);
    }

    #[test]
    fn test_metadata_pairs_roundtrip_with_room() {
        let metadata = PurchaseMetadata {
            user_id: Uuid::new_v4(),
            coins: Amount::new(dec!(75)).unwrap(),
            chat_room_id: Some(Uuid::new_v4()),
        };
        let map: HashMap<String, String> = metadata.to_pairs().into_iter().collect();
        assert_eq!(PurchaseMetadata::from_map(&map).unwrap(), metadata);
    }

    #[test]
    fn test_metadata_requires_user() {
        let map = HashMap::from([(META_COINS.to_string(), "10".to_string())]);
        assert!(matches!(
            PurchaseMetadata::from_map(&map),
            Err(MarketError::ValidationError(_))
        ));
    }
}
