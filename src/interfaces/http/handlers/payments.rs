use crate::application::payments::{BuyCoinsRequest, WebhookOutcome};
use crate::domain::payment::CheckoutSession;
use crate::domain::session::{SessionId, SessionView};
use crate::domain::transaction::Transaction;
use crate::error::{MarketError, Result};
use crate::interfaces::http::auth::AuthUser;
use crate::interfaces::http::extract::ValidJson;
use crate::interfaces::http::{AppState, DataResponse};
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /payments/buy-coins
pub async fn buy_coins(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidJson(body): ValidJson<BuyCoinsRequest>,
) -> Result<Json<DataResponse<CheckoutSession>>> {
    let checkout = state
        .payments
        .create_payment_intent(auth.user_id, body)
        .await?;
    Ok(Json(DataResponse { data: checkout }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaySessionRequest {
    pub session_id: SessionId,
}

#[derive(Debug, Serialize)]
pub struct SessionPayment {
    pub session: SessionView,
    pub transactions: Vec<Transaction>,
}

/// POST /payments/session
pub async fn pay_for_session(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidJson(body): ValidJson<PaySessionRequest>,
) -> Result<Json<DataResponse<SessionPayment>>> {
    let (session, transactions) = state
        .sessions
        .pay_for_session(auth.user_id, body.session_id)
        .await?;
    Ok(Json(DataResponse {
        data: SessionPayment {
            session,
            transactions,
        },
    }))
}

/// POST /webhooks/stripe
///
/// Takes the body as raw bytes; the signature covers them exactly.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| MarketError::SignatureError(format!("Missing {SIGNATURE_HEADER} header")))?;
    let outcome = state.payments.handle_webhook(&body, signature).await?;
    Ok(Json(outcome))
}
