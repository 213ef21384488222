use crate::{
    auth::middleware::{AuthUser, BearerToken, MaybeUser},
    types::{
        ChangePasswordRequest, LoginRequest, LoginResponse, PublicUser, RegisterRequest, Result,
        SessionStatus, UserProfile,
    },
    AppState,
};
use axum::{extract::State, http::StatusCode, Json};

/// Register a new user
///
/// Public registration always creates a `user`-level account; any requested
/// access level is ignored here.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = PublicUser),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Username already exists")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>)> {
    payload.access_level = None;
    let user = state.auth_service.register(payload).await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Login with username and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let response = state.auth_service.login(payload).await?;
    Ok(Json(response))
}

/// End the session behind the bearer token
///
/// Succeeds even if the session already ended.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "No bearer token")
    ),
    tag = "auth",
    security(("bearer" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<StatusCode> {
    state.auth_service.logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// End every session of the authenticated user
#[utoipa::path(
    post,
    path = "/api/auth/logout-all",
    responses(
        (status = 204, description = "All sessions ended"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth",
    security(("bearer" = []))
)]
pub async fn logout_all(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<StatusCode> {
    state.auth_service.logout_all(&user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Profile of the authenticated user
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth",
    security(("bearer" = []))
)]
pub async fn me(AuthUser(user): AuthUser) -> Json<UserProfile> {
    Json(UserProfile::from(user))
}

/// Whether the caller is signed in
///
/// Never rejects: a missing, expired or revoked token reports an anonymous
/// caller.
#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Current identity, if any", body = SessionStatus)
    ),
    tag = "auth"
)]
pub async fn session_status(MaybeUser(user): MaybeUser) -> Json<SessionStatus> {
    Json(SessionStatus {
        authenticated: user.is_some(),
        user: user.map(UserProfile::from),
    })
}

/// Change the password of the authenticated user
///
/// Ends every session of the user, including the one making this request.
#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Current password incorrect or new password invalid"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth",
    security(("bearer" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode> {
    state
        .auth_service
        .change_password(&user.id, payload)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
