use super::ledger::LedgerEngine;
use super::swaps::{PaymentValidation, SwapPromoter};
use crate::domain::coins::Amount;
use crate::domain::payment::{
    CheckoutRequest, CheckoutSession, ProviderEventKind, PurchaseMetadata, amount_in_cents,
};
use crate::domain::ports::{PaymentProviderRef, UserDirectoryRef};
use crate::domain::settlement::coin_purchase;
use crate::domain::swap::ChatRoomId;
use crate::domain::transaction::{BatchOutcome, Transaction};
use crate::domain::user::UserId;
use crate::error::{MarketError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyCoinsRequest {
    pub coins_number: Decimal,
    /// Room whose swap payment this purchase is meant to unblock.
    pub chat_room_id: Option<ChatRoomId>,
}

/// What a verified webhook delivery did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum WebhookOutcome {
    #[serde(rename_all = "camelCase")]
    Credited {
        transaction: Transaction,
        validations: Vec<PaymentValidation>,
    },
    #[serde(rename_all = "camelCase")]
    AlreadyProcessed { event_id: String },
    #[serde(rename_all = "camelCase")]
    Ignored { event_type: String },
}

/// Bridges the payment provider and the wallet ledger.
#[derive(Clone)]
pub struct PaymentGateway {
    provider: PaymentProviderRef,
    users: UserDirectoryRef,
    ledger: LedgerEngine,
    promoter: SwapPromoter,
}

impl PaymentGateway {
    pub fn new(
        provider: PaymentProviderRef,
        users: UserDirectoryRef,
        ledger: LedgerEngine,
        promoter: SwapPromoter,
    ) -> Self {
        Self {
            provider,
            users,
            ledger,
            promoter,
        }
    }

    /// Opens a hosted checkout for `coins_number` coins at ten cents each.
    pub async fn create_payment_intent(
        &self,
        user: UserId,
        request: BuyCoinsRequest,
    ) -> Result<CheckoutSession> {
        let coins = Amount::new(request.coins_number)?;
        let cents = amount_in_cents(coins)?;
        if cents <= 0 {
            return Err(MarketError::ValidationError(format!(
                "{coins} coins is below the smallest chargeable amount"
            )));
        }
        if self.users.find_by_id(user).await?.is_none() {
            return Err(MarketError::not_found("User", user));
        }

        let checkout = self
            .provider
            .create_checkout_session(CheckoutRequest {
                product_name: format!("{coins} SkillSwap coins"),
                unit_amount_cents: cents,
                metadata: PurchaseMetadata {
                    user_id: user,
                    coins,
                    chat_room_id: request.chat_room_id,
                },
            })
            .await?;
        tracing::info!(
            user_id = %user,
            coins = %coins,
            amount_cents = cents,
            checkout_id = %checkout.id,
            "Checkout session created"
        );
        Ok(checkout)
    }

    /// Authenticates and applies one provider delivery.
    ///
    /// Replays of an already-credited event are acknowledged without touching
    /// any wallet or swap.
    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> Result<WebhookOutcome> {
        let event = self
            .provider
            .verify_webhook(payload, signature)
            .inspect_err(|err| tracing::warn!(error = %err, "Webhook rejected"))?;

        let (checkout_id, metadata) = match event.kind {
            ProviderEventKind::CheckoutCompleted {
                checkout_id,
                metadata,
            } => (checkout_id, metadata),
            ProviderEventKind::Other(event_type) => {
                tracing::debug!(event_id = %event.id, %event_type, "Webhook event ignored");
                return Ok(WebhookOutcome::Ignored { event_type });
            }
        };

        let batch = coin_purchase(&event.id, metadata.user_id, metadata.coins);
        let transaction = match self.ledger.apply(batch).await? {
            BatchOutcome::Applied(mut txs) => txs
                .pop()
                .ok_or_else(|| MarketError::internal("coin purchase wrote no transaction"))?,
            BatchOutcome::Duplicate => {
                tracing::info!(event_id = %event.id, "Webhook event already processed");
                return Ok(WebhookOutcome::AlreadyProcessed { event_id: event.id });
            }
        };
        tracing::info!(
            event_id = %event.id,
            checkout_id = %checkout_id,
            user_id = %metadata.user_id,
            coins = %metadata.coins,
            "Coins credited"
        );

        let validations = self
            .promoter
            .retry_pending(metadata.user_id, metadata.chat_room_id)
            .await?;
        Ok(WebhookOutcome::Credited {
            transaction,
            validations,
        })
    }
}
