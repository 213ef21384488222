use crate::auth::jwt::{hash_token, TokenService, DEFAULT_TOKEN_TTL_HOURS};
use crate::auth::password::{hash_password, verify_against_dummy, verify_password};
use crate::db::{NewSession, NewUser, SessionStore};
use crate::types::{
    AppError, ChangePasswordRequest, LoginRequest, LoginResponse, PublicUser, RegisterRequest,
    Result, UpdateUserRequest,
};
use crate::utils::clock::Clock;
use chrono::{DateTime, Duration};
use std::sync::Arc;
use uuid::Uuid;

pub const MIN_USERNAME_CHARS: usize = 3;
pub const MAX_USERNAME_CHARS: usize = 50;
pub const MIN_PASSWORD_BYTES: usize = 8;
pub const MAX_PASSWORD_BYTES: usize = 72;
pub const MAX_ANONYMOUS_ID_CHARS: usize = 128;

/// Orchestrates registration, login, token validation and session lifecycle.
///
/// Holds no mutable state of its own: everything that changes lives in the
/// [`SessionStore`], so one instance is shared by every request.
pub struct AuthService {
    store: Arc<dyn SessionStore>,
    tokens: TokenService,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("tokens", &self.tokens)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    /// Creates an auth service issuing tokens valid for 24 hours.
    pub fn new(
        store: Arc<dyn SessionStore>,
        jwt_secret: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_token_ttl(
            store,
            jwt_secret,
            Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
            clock,
        )
    }

    pub fn with_token_ttl(
        store: Arc<dyn SessionStore>,
        jwt_secret: impl Into<String>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tokens = TokenService::new(jwt_secret, ttl, clock.clone());
        Self {
            store,
            tokens,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Creates a user. The requested access level is honoured as given;
    /// callers exposing registration publicly must clear it first.
    pub async fn register(&self, request: RegisterRequest) -> Result<PublicUser> {
        validate_username(&request.username)?;
        validate_email(&request.email)?;
        validate_password(&request.password)?;

        let password_hash = hash_password(&request.password)?;
        let now = self.clock.now_secs();
        let new_user = NewUser {
            id: Uuid::new_v4().to_string(),
            username: request.username,
            email: request.email,
            password_hash,
            access_level: request.access_level.unwrap_or_default(),
            created_at: now,
        };

        if !self.store.create_user(&new_user).await? {
            return Err(AppError::DuplicateUsername);
        }

        tracing::info!(
            user_id = %new_user.id,
            username = %new_user.username,
            access_level = %new_user.access_level,
            "User registered"
        );

        Ok(PublicUser {
            id: new_user.id,
            username: new_user.username,
            email: new_user.email,
            access_level: new_user.access_level,
            is_active: true,
            created_at: DateTime::from_timestamp(now, 0).unwrap_or_default(),
            updated_at: DateTime::from_timestamp(now, 0).unwrap_or_default(),
            last_login: None,
        })
    }

    /// Verifies credentials and opens a new session.
    ///
    /// Unknown user, deactivated user and wrong password all fail with
    /// [`AppError::InvalidCredentials`].
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        let user = match self
            .store
            .get_active_user_by_username(&request.username)
            .await?
        {
            Some(user) => user,
            None => {
                verify_against_dummy(&request.password);
                return Err(AppError::InvalidCredentials);
            }
        };

        if !verify_password(&request.password, &user.password_hash) {
            tracing::debug!(user_id = %user.id, "Login rejected: wrong password");
            return Err(AppError::InvalidCredentials);
        }

        let now = self.clock.now_secs();
        let mut public = user.into_public();
        let issued = self.tokens.issue(&public)?;

        self.store
            .create_session(&NewSession {
                id: Uuid::new_v4().to_string(),
                user_id: public.id.clone(),
                token_hash: hash_token(&issued.token),
                expires_at: issued.claims.exp,
                created_at: now,
            })
            .await?;

        match self.store.update_last_login(&public.id, now).await {
            Ok(()) => public.last_login = DateTime::from_timestamp(now, 0),
            Err(e) => tracing::warn!(user_id = %public.id, "Failed to record last login: {}", e),
        }

        tracing::info!(user_id = %public.id, username = %public.username, "User logged in");

        let expires_at = issued.expires_at();
        Ok(LoginResponse {
            user: public,
            token: issued.token,
            expires_at,
        })
    }

    /// Resolves a bearer token to the user behind a live session.
    ///
    /// Every way the token can fail to resolve reports
    /// [`AppError::InvalidToken`]; store failures keep their own kind.
    pub async fn validate_token(&self, token: &str) -> Result<PublicUser> {
        let claims = self.tokens.validate(token)?;
        let now = self.clock.now_secs();

        let session = self
            .store
            .find_live_session(&hash_token(token), now)
            .await?
            .ok_or(AppError::InvalidToken)?;

        let user = self
            .store
            .get_active_user_by_id(&claims.sub)
            .await?
            .ok_or(AppError::InvalidToken)?;

        if session.user_id != user.id || user.id != claims.sub {
            tracing::warn!(
                session_id = %session.id,
                "Session owner does not match token subject"
            );
            return Err(AppError::InvalidToken);
        }

        Ok(user.into_public())
    }

    /// Ends the session for this token. Logging out twice is not an error.
    pub async fn logout(&self, token: &str) -> Result<()> {
        let ended = self
            .store
            .deactivate_session(&hash_token(token), self.clock.now_secs())
            .await?;

        if ended > 0 {
            tracing::info!("Session ended by logout");
        } else {
            tracing::debug!("Logout for a session that was already inactive");
        }

        Ok(())
    }

    /// Ends every session the user holds. Returns how many were live.
    pub async fn logout_all(&self, user_id: &str) -> Result<u64> {
        let ended = self
            .store
            .deactivate_user_sessions(user_id, self.clock.now_secs())
            .await?;

        tracing::info!(user_id = %user_id, sessions = ended, "All sessions ended");
        Ok(ended)
    }

    /// Replaces the password and revokes every session of the user, so all
    /// previously issued tokens stop validating.
    pub async fn change_password(
        &self,
        user_id: &str,
        request: ChangePasswordRequest,
    ) -> Result<()> {
        let user = self
            .store
            .get_active_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("user".to_string()))?;

        if !verify_password(&request.current_password, &user.password_hash) {
            return Err(AppError::IncorrectPassword);
        }

        validate_password(&request.new_password)?;
        let new_hash = hash_password(&request.new_password)?;

        let revoked = self
            .store
            .update_password_and_revoke_sessions(&user.id, &new_hash, self.clock.now_secs())
            .await?;

        tracing::info!(user_id = %user.id, revoked_sessions = revoked, "Password changed");
        Ok(())
    }

    /// Marks the token's session as seen now.
    pub async fn heartbeat(&self, token: &str) -> Result<()> {
        let touched = self
            .store
            .touch_session(&hash_token(token), self.clock.now_secs())
            .await?;

        if touched {
            Ok(())
        } else {
            Err(AppError::NotFoundOrExpired)
        }
    }

    /// Records activity for an anonymous visitor, creating the row on first
    /// sight.
    pub async fn anonymous_heartbeat(&self, session_id: &str) -> Result<()> {
        if session_id.is_empty() {
            return Err(AppError::InvalidInput("session_id is required".to_string()));
        }
        if session_id.chars().count() > MAX_ANONYMOUS_ID_CHARS {
            return Err(AppError::InvalidInput(format!(
                "session_id must be at most {} characters",
                MAX_ANONYMOUS_ID_CHARS
            )));
        }

        self.store
            .upsert_anonymous_session(session_id, self.clock.now_secs())
            .await
    }

    /// Soft-deletes a user and ends their sessions.
    pub async fn deactivate_user(&self, user_id: &str) -> Result<()> {
        if !self
            .store
            .deactivate_user(user_id, self.clock.now_secs())
            .await?
        {
            return Err(AppError::NotFound("user".to_string()));
        }

        tracing::info!(user_id = %user_id, "User deactivated");
        Ok(())
    }

    /// Every account, including deactivated ones, newest first.
    pub async fn list_users(&self) -> Result<Vec<PublicUser>> {
        let users = self.store.list_users().await?;
        Ok(users.into_iter().map(|user| user.into_public()).collect())
    }

    /// Changes email, access level or active flag of any account.
    ///
    /// Deactivating through here ends the user's sessions just like
    /// [`deactivate_user`](Self::deactivate_user). A new access level takes
    /// effect on the user's next request, since tokens are resolved against
    /// the stored row.
    pub async fn update_user(
        &self,
        user_id: &str,
        request: UpdateUserRequest,
    ) -> Result<PublicUser> {
        if let Some(email) = &request.email {
            validate_email(email)?;
        }

        let user = self
            .store
            .update_user(user_id, &request, self.clock.now_secs())
            .await?
            .ok_or_else(|| AppError::NotFound("user".to_string()))?;

        tracing::info!(
            user_id = %user.id,
            access_level = %user.access_level,
            is_active = user.is_active,
            "User updated"
        );
        Ok(user.into_public())
    }

    /// Deletes expired and inactive session rows.
    pub async fn purge_expired_sessions(&self) -> Result<u64> {
        let purged = self
            .store
            .purge_expired_sessions(self.clock.now_secs())
            .await?;

        if purged > 0 {
            tracing::info!(purged, "Purged expired sessions");
        }
        Ok(purged)
    }
}

fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(MIN_USERNAME_CHARS..=MAX_USERNAME_CHARS).contains(&len) {
        return Err(AppError::InvalidInput(format!(
            "Username must be between {} and {} characters",
            MIN_USERNAME_CHARS, MAX_USERNAME_CHARS
        )));
    }
    if username.trim() != username {
        return Err(AppError::InvalidInput(
            "Username must not start or end with whitespace".to_string(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::InvalidInput(
            "A valid email address is required".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if !(MIN_PASSWORD_BYTES..=MAX_PASSWORD_BYTES).contains(&password.len()) {
        return Err(AppError::InvalidInput(format!(
            "Password must be between {} and {} bytes",
            MIN_PASSWORD_BYTES, MAX_PASSWORD_BYTES
        )));
    }
    Ok(())
}
