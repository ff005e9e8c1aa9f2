use crate::domain::transaction::Transaction;
use crate::domain::wallet::Wallet;
use crate::error::Result;
use crate::interfaces::http::auth::AuthUser;
use crate::interfaces::http::{AppState, DataResponse};
use axum::Json;
use axum::extract::State;

/// GET /wallet
///
/// A user who never transacted sees an empty wallet rather than a 404.
pub async fn get_wallet(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Wallet>>> {
    let wallet = state
        .ledger
        .wallet_of(auth.user_id)
        .await?
        .unwrap_or_else(|| Wallet::for_user(auth.user_id));
    Ok(Json(DataResponse { data: wallet }))
}

/// GET /wallet/transactions
pub async fn list_transactions(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<Transaction>>>> {
    let transactions = state.ledger.history(auth.user_id).await?;
    Ok(Json(DataResponse { data: transactions }))
}
