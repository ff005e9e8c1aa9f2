use crate::application::swaps::{CreateSwapRequest, PaymentValidation};
use crate::domain::swap::{ChatRoom, ChatRoomId, SwapId, SwapRequest};
use crate::error::Result;
use crate::interfaces::http::auth::AuthUser;
use crate::interfaces::http::extract::{ValidJson, ValidPath};
use crate::interfaces::http::{AppState, DataResponse};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

/// POST /swaps
pub async fn create_swap(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidJson(body): ValidJson<CreateSwapRequest>,
) -> Result<(StatusCode, Json<DataResponse<SwapRequest>>)> {
    let swap = state.swaps.create_swap_request(auth.user_id, body).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: swap })))
}

/// POST /swaps/{id}/accept
pub async fn accept_swap(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<SwapId>,
) -> Result<Json<DataResponse<ChatRoom>>> {
    let room = state.swaps.accept_swap_request(auth.user_id, id).await?;
    Ok(Json(DataResponse { data: room }))
}

/// POST /swaps/{id}/reject
pub async fn reject_swap(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<SwapId>,
) -> Result<Json<DataResponse<SwapRequest>>> {
    let swap = state.swaps.reject_swap_request(auth.user_id, id).await?;
    Ok(Json(DataResponse { data: swap }))
}

/// POST /chat-rooms/{id}/validate-payment
pub async fn validate_payment(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<ChatRoomId>,
) -> Result<Json<DataResponse<PaymentValidation>>> {
    let validation = state.swaps.validate_payment(auth.user_id, id).await?;
    Ok(Json(DataResponse { data: validation }))
}
