//! Handlers for the `/sessions` resource.
//!
//! Every route requires an [`AuthUser`]; the services decide whether that
//! user may act on the session.

use crate::application::sessions::CreateSessionRequest;
use crate::domain::session::{SessionId, SessionView};
use crate::error::Result;
use crate::interfaces::http::auth::AuthUser;
use crate::interfaces::http::extract::{ValidJson, ValidPath};
use crate::interfaces::http::{AppState, DataResponse};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

type SessionResponse = Json<DataResponse<SessionView>>;

fn respond(view: SessionView) -> SessionResponse {
    Json(DataResponse { data: view })
}

/// POST /sessions
pub async fn create_session(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidJson(body): ValidJson<CreateSessionRequest>,
) -> Result<(StatusCode, SessionResponse)> {
    let view = state.sessions.create_session(auth.user_id, body).await?;
    Ok((StatusCode::CREATED, respond(view)))
}

/// GET /sessions
pub async fn list_sessions(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<DataResponse<Vec<SessionView>>>> {
    let views = state.sessions.list_sessions(auth.user_id).await?;
    Ok(Json(DataResponse { data: views }))
}

/// GET /sessions/{id}
pub async fn get_session(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<SessionId>,
) -> Result<SessionResponse> {
    Ok(respond(state.sessions.get_session(auth.user_id, id).await?))
}

/// PATCH /sessions/{id}
pub async fn update_session(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<SessionId>,
) -> Result<SessionResponse> {
    Ok(respond(state.sessions.update_session(auth.user_id, id).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    pub session_id: SessionId,
    pub allowed: bool,
}

/// GET /sessions/{id}/access
pub async fn check_access(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<SessionId>,
) -> Result<Json<DataResponse<AccessResponse>>> {
    let allowed = state.sessions.is_participant(id, auth.user_id).await?;
    Ok(Json(DataResponse {
        data: AccessResponse {
            session_id: id,
            allowed,
        },
    }))
}

/// POST /sessions/{id}/mark-ready
pub async fn mark_ready(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<SessionId>,
) -> Result<SessionResponse> {
    Ok(respond(state.sessions.mark_ready(auth.user_id, id).await?))
}

/// POST /sessions/{id}/start-live
pub async fn start_live(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<SessionId>,
) -> Result<SessionResponse> {
    Ok(respond(state.sessions.start_live(auth.user_id, id).await?))
}

/// POST /sessions/{id}/end-live
pub async fn end_live(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<SessionId>,
) -> Result<SessionResponse> {
    Ok(respond(state.sessions.end_live(auth.user_id, id).await?))
}

/// POST /sessions/{id}/cancel
pub async fn cancel(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<SessionId>,
) -> Result<SessionResponse> {
    Ok(respond(state.sessions.cancel(auth.user_id, id).await?))
}

/// POST /sessions/{id}/no-show
pub async fn mark_no_show(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<SessionId>,
) -> Result<SessionResponse> {
    Ok(respond(state.sessions.mark_no_show(auth.user_id, id).await?))
}

/// POST /sessions/{id}/extend
pub async fn extend(
    auth: AuthUser,
    State(state): State<AppState>,
    ValidPath(id): ValidPath<SessionId>,
) -> Result<(StatusCode, SessionResponse)> {
    let view = state.sessions.extend_session(auth.user_id, id).await?;
    Ok((StatusCode::CREATED, respond(view)))
}
