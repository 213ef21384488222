//! Administrative handlers.
//!
//! Routes here sit behind `auth_middleware` plus an access level gate:
//! reports need `admin`, user management needs `super`.

use crate::{
    services::{session_stats, MetricsSnapshot, SessionStats},
    types::{PublicUser, RegisterRequest, Result, UpdateUserRequest},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

/// Session statistics report
#[utoipa::path(
    get,
    path = "/api/admin/session-stats",
    responses(
        (status = 200, description = "Session statistics", body = SessionStats),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Requires admin")
    ),
    tag = "admin",
    security(("bearer" = []))
)]
pub async fn get_session_stats(State(state): State<AppState>) -> Result<Json<SessionStats>> {
    let stats = session_stats(
        state.auth_service.store().as_ref(),
        state.auth_service.clock().as_ref(),
        state.config.sessions.active_window(),
    )
    .await?;

    Ok(Json(stats))
}

/// Latest background metrics sample
#[utoipa::path(
    get,
    path = "/api/admin/metrics",
    responses(
        (status = 200, description = "Most recent metrics snapshot", body = MetricsSnapshot),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Requires admin")
    ),
    tag = "admin",
    security(("bearer" = []))
)]
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.latest().as_ref().clone())
}

/// List every account, including deactivated ones
#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses(
        (status = 200, description = "All users, newest first", body = [PublicUser]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Requires super")
    ),
    tag = "admin",
    security(("bearer" = []))
)]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<PublicUser>>> {
    let users = state.auth_service.list_users().await?;
    Ok(Json(users))
}

/// Create a user with any access level
#[utoipa::path(
    post,
    path = "/api/admin/users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = PublicUser),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Requires super"),
        (status = 409, description = "Username already exists")
    ),
    tag = "admin",
    security(("bearer" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>)> {
    let user = state.auth_service.register(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Deactivate a user and end their sessions
#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    params(
        ("id" = String, Path, description = "User ID")
    ),
    responses(
        (status = 204, description = "User deactivated"),
        (status = 403, description = "Requires super"),
        (status = 404, description = "No active user with that id")
    ),
    tag = "admin",
    security(("bearer" = []))
)]
pub async fn deactivate_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.auth_service.deactivate_user(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Change email, access level or active flag of a user
#[utoipa::path(
    put,
    path = "/api/admin/users/{id}",
    params(
        ("id" = String, Path, description = "User ID")
    ),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = PublicUser),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Requires super"),
        (status = 404, description = "No user with that id")
    ),
    tag = "admin",
    security(("bearer" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<PublicUser>> {
    let user = state.auth_service.update_user(&id, payload).await?;
    Ok(Json(user))
}
