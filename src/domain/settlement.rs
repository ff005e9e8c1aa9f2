//! Fixed coin prices and the postings each kind of payment produces.

use super::coins::{Amount, Coins};
use super::session::{Session, SessionType};
use super::swap::SwapId;
use super::transaction::{LedgerBatch, Posting};
use super::user::UserId;
use super::wallet::WalletRef;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Paid by each side of a skill exchange.
pub const EXCHANGE_FEE: Decimal = dec!(50);
/// Paid by the learner of a teaching session.
pub const TEACHING_PRICE: Decimal = dec!(150);
/// Part of the teaching price that reaches the host.
pub const TEACHER_SHARE: Decimal = dec!(50);
/// Part of the teaching price kept by the platform.
pub const PLATFORM_SHARE: Decimal = dec!(100);

const fn fixed(value: Decimal) -> Amount {
    Amount::constant(value)
}

pub fn settlement_key(session: &Session) -> String {
    format!("session-settlement:{}", session.id)
}

pub fn swap_payment_key(swap_id: SwapId, user: UserId) -> String {
    format!("swap-payment:{swap_id}:{user}")
}

pub fn provider_event_key(event_id: &str) -> String {
    format!("provider-event:{event_id}")
}

/// Price a session costs its payers, by session type.
pub fn session_price(session_type: SessionType) -> Coins {
    match session_type {
        SessionType::SkillExchange => Coins::new(EXCHANGE_FEE),
        SessionType::SkillTeaching => Coins::new(TEACHING_PRICE),
    }
}

/// Postings that settle payment for `session`.
///
/// * skill exchange: host and learner each pay the exchange fee; nobody is
///   credited.
/// * skill teaching: the learner pays the full price, which is split between
///   the host and the platform wallet.
pub fn session_settlement(session: &Session) -> LedgerBatch {
    let host = session.host_id;
    let learner = session.learner_id;
    let postings = match session.session_type {
        SessionType::SkillExchange => {
            let description = format!("Skill exchange session: {}", session.title);
            vec![
                Posting::debit(WalletRef::User(host), fixed(EXCHANGE_FEE), &description)
                    .for_session(session.id)
                    .between(Some(host), None),
                Posting::debit(WalletRef::User(learner), fixed(EXCHANGE_FEE), &description)
                    .for_session(session.id)
                    .between(Some(learner), None),
            ]
        }
        SessionType::SkillTeaching => {
            let platform_share = Coins::new(PLATFORM_SHARE);
            vec![
                Posting::debit(
                    WalletRef::User(learner),
                    fixed(TEACHING_PRICE),
                    format!("Payment for teaching session: {}", session.title),
                )
                .for_session(session.id)
                .between(Some(learner), Some(host))
                .with_platform_share(platform_share),
                Posting::credit(
                    WalletRef::User(host),
                    fixed(TEACHER_SHARE),
                    format!("Earnings from teaching session: {}", session.title),
                )
                .for_session(session.id)
                .between(Some(learner), Some(host)),
                Posting::credit(
                    WalletRef::Platform,
                    fixed(PLATFORM_SHARE),
                    format!("Platform share of teaching session: {}", session.title),
                )
                .for_session(session.id)
                .between(Some(learner), None)
                .with_platform_share(platform_share),
            ]
        }
    };
    LedgerBatch::keyed(settlement_key(session), postings)
}

/// One side's fee for a negotiated swap.
pub fn swap_payment(swap_id: SwapId, payer: UserId, counterpart: UserId) -> LedgerBatch {
    LedgerBatch::keyed(
        swap_payment_key(swap_id, payer),
        vec![
            Posting::debit(
                WalletRef::User(payer),
                fixed(EXCHANGE_FEE),
                format!("Skill swap payment for request {swap_id}"),
            )
            .between(Some(payer), Some(counterpart)),
        ],
    )
}

/// Coins bought through the payment provider.
pub fn coin_purchase(event_id: &str, user: UserId, coins: Amount) -> LedgerBatch {
    LedgerBatch::keyed(
        provider_event_key(event_id),
        vec![
            Posting::credit(
                WalletRef::User(user),
                coins,
                format!("Purchased {coins} coins"),
            )
            .between(None, Some(user)),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::NewSession;
    use crate::domain::transaction::TransactionType;
    use chrono::Utc;
    use uuid::Uuid;

    fn session(session_type: SessionType) -> Session {
        Session::new(NewSession {
            host_id: Uuid::new_v4(),
            learner_id: Uuid::new_v4(),
            scheduled_time: Utc::now(),
            title: "Watercolour".into(),
            description: None,
            session_type,
        })
    }

    #[test]
    fn test_teaching_split_balances() {
        let batch = session_settlement(&session(SessionType::SkillTeaching));
        let debited: Decimal = batch
            .postings
            .iter()
            .filter(|p| p.r#type == TransactionType::Debit)
            .map(|p| p.amount.value())
            .sum();
        let credited: Decimal = batch
            .postings
            .iter()
            .filter(|p| p.r#type == TransactionType::Credit)
            .map(|p| p.amount.value())
            .sum();
        assert_eq!(batch.postings.len(), 3);
        assert_eq!(debited, credited);
        assert_eq!(debited, TEACHING_PRICE);
    }

    #[test]
    fn test_exchange_is_two_debits() {
        let s = session(SessionType::SkillExchange);
        let batch = session_settlement(&s);
        assert_eq!(batch.postings.len(), 2);
        assert!(batch
            .postings
            .iter()
            .all(|p| p.r#type == TransactionType::Debit && p.amount.value() == EXCHANGE_FEE));
        assert_eq!(batch.idempotency_key, Some(settlement_key(&s)));
    }
}
