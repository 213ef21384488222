//! Session store abstraction
//!
//! This module provides the `SessionStore` trait the auth core consumes, the
//! row types it exchanges, and `DatabaseProvider` for picking a backend
//! (in-memory SQLite, file-based SQLite, remote Turso).
//!
//! All timestamps are Unix seconds. Operations that depend on "now" take it as
//! an argument so the caller's clock decides liveness.
//!
//! # Example
//!
//! ```rust,ignore
//! use histmap::db::DatabaseProvider;
//!
//! // Use in-memory database (default for development/testing)
//! let db = DatabaseProvider::Memory.create_client().await?;
//!
//! // Use file-based SQLite
//! let db = DatabaseProvider::SQLite { path: "data.db".into() }.create_client().await?;
//! ```

use crate::types::{AccessLevel, PublicUser, Result, UpdateUserRequest};
use crate::utils::config::DatabaseConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Database provider configuration
#[derive(Debug, Clone, Default)]
pub enum DatabaseProvider {
    /// In-memory SQLite database (ephemeral, lost on restart)
    #[default]
    Memory,
    /// File-based SQLite database
    SQLite {
        /// Path to the SQLite database file
        path: String,
    },
    /// Remote Turso database (requires network access)
    #[cfg(feature = "turso")]
    Turso {
        /// The Turso database URL (e.g., `libsql://your-db.turso.io`)
        url: String,
        /// Authentication token for the Turso database
        auth_token: String,
    },
}

impl DatabaseProvider {
    /// Create a database client from this provider configuration
    pub async fn create_client(&self) -> Result<Arc<super::turso::TursoClient>> {
        let client = match self {
            DatabaseProvider::Memory => super::turso::TursoClient::new_memory().await?,
            DatabaseProvider::SQLite { path } => super::turso::TursoClient::new_local(path).await?,
            #[cfg(feature = "turso")]
            DatabaseProvider::Turso { url, auth_token } => {
                super::turso::TursoClient::new_remote(url.clone(), auth_token.clone()).await?
            }
        };
        Ok(Arc::new(client))
    }

    /// Pick a provider from the `[database]` config section.
    ///
    /// Turso wins when both of its environment variables are set and
    /// non-empty; otherwise `url` selects a file, or memory for `:memory:`.
    pub fn from_config(config: &DatabaseConfig) -> Self {
        #[cfg(feature = "turso")]
        {
            if let (Some(url_env), Some(token_env)) =
                (&config.turso_url_env, &config.turso_token_env)
            {
                if let (Ok(url), Ok(token)) = (std::env::var(url_env), std::env::var(token_env)) {
                    if !url.is_empty() && !token.is_empty() {
                        return DatabaseProvider::Turso {
                            url,
                            auth_token: token,
                        };
                    }
                }
            }
        }

        if config.url.is_empty() || config.url == ":memory:" {
            DatabaseProvider::Memory
        } else {
            DatabaseProvider::SQLite {
                path: config.url.clone(),
            }
        }
    }
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// User record from the database
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub access_level: AccessLevel,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_login: Option<i64>,
}

impl User {
    /// Drop the password hash and convert timestamps.
    pub fn into_public(self) -> PublicUser {
        PublicUser {
            id: self.id,
            username: self.username,
            email: self.email,
            access_level: self.access_level,
            is_active: self.is_active,
            created_at: from_unix(self.created_at),
            updated_at: from_unix(self.updated_at),
            last_login: self.last_login.map(from_unix),
        }
    }
}

/// Values for a new `users` row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub access_level: AccessLevel,
    pub created_at: i64,
}

/// Authenticated session row.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: i64,
    pub created_at: i64,
    pub last_seen_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub is_active: bool,
}

impl Session {
    /// The liveness predicate: active and not yet expired.
    pub fn is_live(&self, now: i64) -> bool {
        self.is_active && self.expires_at > now
    }
}

/// Values for a new `user_sessions` row.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: i64,
    pub created_at: i64,
}

/// Anonymous visitor session row.
#[derive(Debug, Clone, PartialEq)]
pub struct AnonymousSession {
    pub session_id: String,
    pub created_at: i64,
    pub last_seen_at: i64,
}

/// Whole-history aggregates over both session tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTotals {
    pub total_sessions: i64,
    pub avg_session_duration_secs: Option<f64>,
    pub anonymous_total: i64,
    pub avg_anonymous_duration_secs: Option<f64>,
}

/// Sessions (of either kind) started within one time bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitorBucket {
    /// Bucket start, Unix seconds
    pub bucket_start: i64,
    pub sessions: i64,
}

/// Persistent store consumed by the auth core.
///
/// Every mutation is a single statement except
/// [`update_password_and_revoke_sessions`](SessionStore::update_password_and_revoke_sessions),
/// [`deactivate_user`](SessionStore::deactivate_user) and
/// [`update_user`](SessionStore::update_user), which each run in one
/// transaction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    // ============== User Operations ==============

    /// Insert a user. Returns `false` if the username is already taken.
    async fn create_user(&self, user: &NewUser) -> Result<bool>;

    /// Get an active user by exact username
    async fn get_active_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get an active user by ID
    async fn get_active_user_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Stamp the last-login time
    async fn update_last_login(&self, user_id: &str, at: i64) -> Result<()>;

    /// Replace the password hash and deactivate every session of the user,
    /// atomically.
    async fn update_password_and_revoke_sessions(
        &self,
        user_id: &str,
        password_hash: &str,
        at: i64,
    ) -> Result<u64>;

    /// Soft-delete a user and deactivate their sessions. Returns `false` if no
    /// active user had that id.
    async fn deactivate_user(&self, user_id: &str, at: i64) -> Result<bool>;

    /// Count all users, active or not
    async fn count_users(&self) -> Result<i64>;

    /// Every user, active or not, newest first
    async fn list_users(&self) -> Result<Vec<User>>;

    /// Apply the present fields of `update` to any user, active or not.
    /// Setting `is_active` to false also ends the user's sessions.
    /// Returns the updated row, or `None` if no user had that id.
    async fn update_user(
        &self,
        user_id: &str,
        update: &UpdateUserRequest,
        at: i64,
    ) -> Result<Option<User>>;

    // ============== Authenticated Sessions ==============

    /// Insert a live session with `last_seen_at = created_at`
    async fn create_session(&self, session: &NewSession) -> Result<()>;

    /// Look up a session by token hash, returning it only if live at `now`
    async fn find_live_session(&self, token_hash: &str, now: i64) -> Result<Option<Session>>;

    /// Refresh `last_seen_at` on a live session. Returns `false` if none matched.
    async fn touch_session(&self, token_hash: &str, now: i64) -> Result<bool>;

    /// Deactivate the session with this token hash (idempotent)
    async fn deactivate_session(&self, token_hash: &str, now: i64) -> Result<u64>;

    /// Deactivate every session of a user (idempotent)
    async fn deactivate_user_sessions(&self, user_id: &str, now: i64) -> Result<u64>;

    /// Delete expired or inactive sessions
    async fn purge_expired_sessions(&self, now: i64) -> Result<u64>;

    // ============== Anonymous Sessions ==============

    /// Create the row or refresh `last_seen_at`, in one statement
    async fn upsert_anonymous_session(&self, session_id: &str, now: i64) -> Result<()>;

    /// Get an anonymous session by id
    async fn get_anonymous_session(&self, session_id: &str) -> Result<Option<AnonymousSession>>;

    /// Count anonymous sessions seen at or after `since`
    async fn count_active_anonymous(&self, since: i64) -> Result<i64>;

    /// Delete anonymous sessions last seen before `before`
    async fn purge_anonymous_sessions(&self, before: i64) -> Result<u64>;

    // ============== Aggregates ==============

    /// Live authenticated sessions seen at or after `since`
    async fn count_active_authenticated(&self, since: i64, now: i64) -> Result<i64>;

    /// Distinct users with a live session seen at or after `since`
    async fn count_active_users(&self, since: i64, now: i64) -> Result<i64>;

    /// Live authenticated plus anonymous sessions seen at or after `since`
    async fn count_all_active(&self, since: i64, now: i64) -> Result<i64>;

    /// Whole-history counts and average durations
    async fn session_totals(&self) -> Result<SessionTotals>;

    /// Sessions started at or after `from`, grouped into `bucket_secs` buckets
    async fn visitor_buckets(&self, from: i64, bucket_secs: i64) -> Result<Vec<VisitorBucket>>;

    // ============== Peak Statistic ==============

    /// Stored peak, or 0 if the row does not exist
    async fn peak_concurrent_sessions(&self) -> Result<i64>;

    /// Set the peak to `candidate` only if the stored value is lower.
    /// Returns whether the row changed.
    async fn raise_peak_if_higher(&self, candidate: i64, now: i64) -> Result<bool>;
}
