use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use crate::auth::access::AccessLevel;

// ============= User Types =============

/// A user as exposed outside the store: never carries the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub access_level: AccessLevel,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

/// Reduced profile returned by `/api/auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub access_level: AccessLevel,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

impl From<PublicUser> for UserProfile {
    fn from(user: PublicUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
            access_level: user.access_level,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

/// Fields a super user may change on an account. Absent fields are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_level: Option<AccessLevel>,
    /// `false` soft-deletes the account and ends its sessions; `true`
    /// restores it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

// ============= Authentication Types =============

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_level: Option<AccessLevel>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub user: PublicUser,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Who, if anyone, the caller's token belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub user: Option<UserProfile>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AnonymousHeartbeatRequest {
    pub session_id: String,
}

/// Signed token payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub username: String,
    pub access_level: AccessLevel,
    pub iat: i64,
    pub exp: i64,
    /// Unique token id; keeps two tokens issued in the same second distinct
    pub jti: String,
}

// ============= Error Types =============

/// Error kinds surfaced by the auth core.
///
/// Credential and token failures are deliberately coarse: `InvalidCredentials`
/// covers unknown user, inactive user and wrong password alike, and
/// `InvalidToken` covers every way a token can fail to resolve to a user.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Current password is incorrect")]
    IncorrectPassword,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Session not found or expired")]
    NotFoundOrExpired,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status the boundary reports for this kind.
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            AppError::DuplicateUsername => StatusCode::CONFLICT,
            AppError::InvalidCredentials
            | AppError::InvalidToken
            | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::IncorrectPassword | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFoundOrExpired | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Database(_) | AppError::Configuration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Database(_) | AppError::Configuration(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::DuplicateUsername.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::InvalidCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::InvalidToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::IncorrectPassword.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFoundOrExpired.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::NotFound("user".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::InvalidInput("email".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        for err in [
            AppError::Database("disk I/O error".into()),
            AppError::Configuration("JWT_SECRET is not set".into()),
            AppError::Internal("hashing failed".into()),
        ] {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_internal_details_are_not_sent_to_client() {
        let response = AppError::Database("no such table: users".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_public_user_omits_missing_last_login() {
        let user = PublicUser {
            id: "u1".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            access_level: AccessLevel::User,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login: None,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("last_login").is_none());
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["access_level"], "user");
    }
}
