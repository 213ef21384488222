use crate::{
    auth::middleware::BearerToken,
    types::{AnonymousHeartbeatRequest, Result},
    AppState,
};
use axum::{extract::State, http::StatusCode, Json};

/// Keep an authenticated session active
#[utoipa::path(
    post,
    path = "/api/sessions/heartbeat",
    responses(
        (status = 204, description = "Session refreshed"),
        (status = 401, description = "No bearer token"),
        (status = 404, description = "Session not found or expired")
    ),
    tag = "sessions",
    security(("bearer" = []))
)]
pub async fn heartbeat(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<StatusCode> {
    state.auth_service.heartbeat(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Record activity for an anonymous visitor
#[utoipa::path(
    post,
    path = "/api/sessions/anonymous/heartbeat",
    request_body = AnonymousHeartbeatRequest,
    responses(
        (status = 204, description = "Activity recorded"),
        (status = 400, description = "Missing or oversized session id")
    ),
    tag = "sessions"
)]
pub async fn anonymous_heartbeat(
    State(state): State<AppState>,
    Json(payload): Json<AnonymousHeartbeatRequest>,
) -> Result<StatusCode> {
    state
        .auth_service
        .anonymous_heartbeat(&payload.session_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
