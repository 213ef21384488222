use super::traits::{
    AnonymousSession, NewSession, NewUser, Session, SessionStore, SessionTotals, User,
    VisitorBucket,
};
use crate::types::{AccessLevel, AppError, Result, UpdateUserRequest};
use async_trait::async_trait;
use libsql::{Builder, Connection, Database, Row};
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// How long a local connection waits on a locked database file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const USER_COLUMNS: &str = "id, username, email, password_hash, access_level, is_active,
                            created_at, updated_at, last_login";

const SESSION_COLUMNS: &str =
    "id, user_id, token_hash, expires_at, created_at, last_seen_at, ended_at, is_active";

/// libsql-backed session store (in-memory SQLite, local file, or Turso).
pub struct TursoClient {
    db: Database,
    /// In-memory databases live only as long as their connection, so every
    /// operation shares this one. The lock is held for a whole operation:
    /// a transaction on the shared connection would otherwise swallow
    /// statements issued by concurrent requests.
    shared: Option<Arc<Mutex<Connection>>>,
    local_file: bool,
}

/// A connection checked out for one store operation.
pub enum DbConn {
    Owned(Connection),
    Shared(OwnedMutexGuard<Connection>),
}

impl Deref for DbConn {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            DbConn::Owned(conn) => conn,
            DbConn::Shared(guard) => &**guard,
        }
    }
}

impl TursoClient {
    #[cfg(feature = "turso")]
    pub async fn new_remote(url: String, auth_token: String) -> Result<Self> {
        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Turso: {}", e)))?;

        let client = Self {
            db,
            shared: None,
            local_file: false,
        };
        client.initialize_schema().await?;

        Ok(client)
    }

    pub async fn new_local(path: &str) -> Result<Self> {
        if path == ":memory:" {
            return Self::new_memory().await;
        }

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Database(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to open database: {}", e)))?;

        let client = Self {
            db,
            shared: None,
            local_file: true,
        };
        client.initialize_schema().await?;

        Ok(client)
    }

    pub async fn new_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to open in-memory database: {}", e)))?;

        let shared = db
            .connect()
            .map_err(|e| AppError::Database(format!("Failed to get connection: {}", e)))?;

        let client = Self {
            db,
            shared: Some(Arc::new(Mutex::new(shared))),
            local_file: false,
        };
        client.initialize_schema().await?;

        Ok(client)
    }

    /// Check out a connection. For in-memory databases this waits for any
    /// other operation on the shared connection to finish.
    pub async fn connection(&self) -> Result<DbConn> {
        if let Some(shared) = &self.shared {
            return Ok(DbConn::Shared(shared.clone().lock_owned().await));
        }

        let conn = self
            .db
            .connect()
            .map_err(|e| AppError::Database(format!("Failed to get connection: {}", e)))?;

        if self.local_file {
            conn.busy_timeout(BUSY_TIMEOUT)
                .map_err(|e| AppError::Database(format!("Failed to set busy timeout: {}", e)))?;
        }

        Ok(DbConn::Owned(conn))
    }

    async fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection().await?;

        // Users table
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                access_level TEXT NOT NULL DEFAULT 'user',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                last_login INTEGER
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create users table: {}", e)))?;

        // Authenticated sessions
        conn.execute(
            "CREATE TABLE IF NOT EXISTS user_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                token_hash TEXT UNIQUE NOT NULL,
                expires_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                last_seen_at INTEGER,
                ended_at INTEGER,
                is_active INTEGER NOT NULL DEFAULT 1,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create user_sessions table: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_user_sessions_user_id ON user_sessions(user_id)",
            (),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create session index: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_user_sessions_liveness
             ON user_sessions(is_active, expires_at, last_seen_at)",
            (),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create session index: {}", e)))?;

        // Anonymous visitor sessions
        conn.execute(
            "CREATE TABLE IF NOT EXISTS anonymous_sessions (
                session_id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                last_seen_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to create anonymous_sessions table: {}", e))
        })?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_anonymous_sessions_last_seen
             ON anonymous_sessions(last_seen_at)",
            (),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create anonymous index: {}", e)))?;

        // Singleton peak statistic
        conn.execute(
            "CREATE TABLE IF NOT EXISTS peak_stats (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                peak_concurrent_sessions INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create peak_stats table: {}", e)))?;

        conn.execute(
            "INSERT OR IGNORE INTO peak_stats (id, peak_concurrent_sessions, updated_at)
             VALUES (1, 0, strftime('%s', 'now'))",
            (),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to seed peak_stats: {}", e)))?;

        Ok(())
    }

    async fn query_count(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<i64> {
        let conn = self.connection().await?;

        let mut rows = conn
            .query(sql, params)
            .await
            .map_err(|e| AppError::Database(format!("Failed to run count query: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            Some(row) => row.get::<i64>(0).map_err(|e| AppError::Database(e.to_string())),
            None => Ok(0),
        }
    }
}

fn user_from_row(row: &Row) -> Result<User> {
    let level: String = row.get(4).map_err(|e| AppError::Database(e.to_string()))?;
    let access_level = level
        .parse::<AccessLevel>()
        .map_err(|_| AppError::Database(format!("Unknown access level '{}' in users", level)))?;

    Ok(User {
        id: row.get(0).map_err(|e| AppError::Database(e.to_string()))?,
        username: row.get(1).map_err(|e| AppError::Database(e.to_string()))?,
        email: row.get(2).map_err(|e| AppError::Database(e.to_string()))?,
        password_hash: row.get(3).map_err(|e| AppError::Database(e.to_string()))?,
        access_level,
        is_active: row
            .get::<i64>(5)
            .map_err(|e| AppError::Database(e.to_string()))?
            != 0,
        created_at: row.get(6).map_err(|e| AppError::Database(e.to_string()))?,
        updated_at: row.get(7).map_err(|e| AppError::Database(e.to_string()))?,
        last_login: row
            .get::<Option<i64>>(8)
            .map_err(|e| AppError::Database(e.to_string()))?,
    })
}

fn session_from_row(row: &Row) -> Result<Session> {
    Ok(Session {
        id: row.get(0).map_err(|e| AppError::Database(e.to_string()))?,
        user_id: row.get(1).map_err(|e| AppError::Database(e.to_string()))?,
        token_hash: row.get(2).map_err(|e| AppError::Database(e.to_string()))?,
        expires_at: row.get(3).map_err(|e| AppError::Database(e.to_string()))?,
        created_at: row.get(4).map_err(|e| AppError::Database(e.to_string()))?,
        last_seen_at: row
            .get::<Option<i64>>(5)
            .map_err(|e| AppError::Database(e.to_string()))?,
        ended_at: row
            .get::<Option<i64>>(6)
            .map_err(|e| AppError::Database(e.to_string()))?,
        is_active: row
            .get::<i64>(7)
            .map_err(|e| AppError::Database(e.to_string()))?
            != 0,
    })
}

#[async_trait]
impl SessionStore for TursoClient {
    // ============== User Operations ==============

    async fn create_user(&self, user: &NewUser) -> Result<bool> {
        let conn = self.connection().await?;

        // The unique index on username decides duplicates, so two concurrent
        // registrations cannot both succeed.
        let inserted = conn
            .execute(
                "INSERT INTO users
                 (id, username, email, password_hash, access_level, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
                 ON CONFLICT(username) DO NOTHING",
                (
                    user.id.as_str(),
                    user.username.as_str(),
                    user.email.as_str(),
                    user.password_hash.as_str(),
                    user.access_level.as_str(),
                    user.created_at,
                ),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to create user: {}", e)))?;

        Ok(inserted > 0)
    }

    async fn get_active_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.connection().await?;

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM users WHERE username = ?1 AND is_active = 1",
                    USER_COLUMNS
                ),
                [username],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query user: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_active_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let conn = self.connection().await?;

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM users WHERE id = ?1 AND is_active = 1",
                    USER_COLUMNS
                ),
                [id],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query user: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_last_login(&self, user_id: &str, at: i64) -> Result<()> {
        let conn = self.connection().await?;

        conn.execute(
            "UPDATE users SET last_login = ?1, updated_at = ?1 WHERE id = ?2",
            (at, user_id),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to update last login: {}", e)))?;

        Ok(())
    }

    async fn update_password_and_revoke_sessions(
        &self,
        user_id: &str,
        password_hash: &str,
        at: i64,
    ) -> Result<u64> {
        let conn = self.connection().await?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let updated = tx
            .execute(
                "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
                (password_hash, at, user_id),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to update password: {}", e)))?;

        if updated == 0 {
            tx.rollback()
                .await
                .map_err(|e| AppError::Database(format!("Failed to roll back: {}", e)))?;
            return Err(AppError::NotFound(format!("user {}", user_id)));
        }

        let revoked = tx
            .execute(
                "UPDATE user_sessions SET is_active = 0, ended_at = COALESCE(ended_at, ?1)
                 WHERE user_id = ?2 AND is_active = 1",
                (at, user_id),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to deactivate sessions: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit password change: {}", e)))?;

        Ok(revoked)
    }

    async fn deactivate_user(&self, user_id: &str, at: i64) -> Result<bool> {
        let conn = self.connection().await?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let updated = tx
            .execute(
                "UPDATE users SET is_active = 0, updated_at = ?1 WHERE id = ?2 AND is_active = 1",
                (at, user_id),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to deactivate user: {}", e)))?;

        tx.execute(
            "UPDATE user_sessions SET is_active = 0, ended_at = COALESCE(ended_at, ?1)
             WHERE user_id = ?2 AND is_active = 1",
            (at, user_id),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to deactivate sessions: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit deactivation: {}", e)))?;

        Ok(updated > 0)
    }

    async fn count_users(&self) -> Result<i64> {
        self.query_count("SELECT COUNT(*) FROM users", ()).await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.connection().await?;

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM users ORDER BY created_at DESC, username",
                    USER_COLUMNS
                ),
                (),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to list users: {}", e)))?;

        let mut users = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            users.push(user_from_row(&row)?);
        }

        Ok(users)
    }

    async fn update_user(
        &self,
        user_id: &str,
        update: &UpdateUserRequest,
        at: i64,
    ) -> Result<Option<User>> {
        let conn = self.connection().await?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let updated = tx
            .execute(
                "UPDATE users SET
                    email = COALESCE(?1, email),
                    access_level = COALESCE(?2, access_level),
                    is_active = COALESCE(?3, is_active),
                    updated_at = ?4
                 WHERE id = ?5",
                (
                    update.email.as_deref(),
                    update.access_level.map(|level| level.as_str()),
                    update.is_active.map(i64::from),
                    at,
                    user_id,
                ),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to update user: {}", e)))?;

        if updated == 0 {
            tx.rollback()
                .await
                .map_err(|e| AppError::Database(format!("Failed to roll back: {}", e)))?;
            return Ok(None);
        }

        if update.is_active == Some(false) {
            tx.execute(
                "UPDATE user_sessions SET is_active = 0, ended_at = COALESCE(ended_at, ?1)
                 WHERE user_id = ?2 AND is_active = 1",
                (at, user_id),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to deactivate sessions: {}", e)))?;
        }

        let mut rows = tx
            .query(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                [user_id],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query user: {}", e)))?;

        let user = match rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            Some(row) => user_from_row(&row)?,
            None => return Err(AppError::Database(format!("user {} vanished", user_id))),
        };
        drop(rows);

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit user update: {}", e)))?;

        Ok(Some(user))
    }

    // ============== Authenticated Sessions ==============

    async fn create_session(&self, session: &NewSession) -> Result<()> {
        let conn = self.connection().await?;

        conn.execute(
            "INSERT INTO user_sessions
             (id, user_id, token_hash, expires_at, created_at, last_seen_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1)",
            (
                session.id.as_str(),
                session.user_id.as_str(),
                session.token_hash.as_str(),
                session.expires_at,
                session.created_at,
            ),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create session: {}", e)))?;

        Ok(())
    }

    async fn find_live_session(&self, token_hash: &str, now: i64) -> Result<Option<Session>> {
        let conn = self.connection().await?;

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM user_sessions
                     WHERE token_hash = ?1 AND is_active = 1 AND expires_at > ?2",
                    SESSION_COLUMNS
                ),
                (token_hash, now),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query session: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            Some(row) => Ok(Some(session_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn touch_session(&self, token_hash: &str, now: i64) -> Result<bool> {
        let conn = self.connection().await?;

        let updated = conn
            .execute(
                "UPDATE user_sessions SET last_seen_at = ?1
                 WHERE token_hash = ?2 AND is_active = 1 AND expires_at > ?1",
                (now, token_hash),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to update session heartbeat: {}", e)))?;

        Ok(updated > 0)
    }

    async fn deactivate_session(&self, token_hash: &str, now: i64) -> Result<u64> {
        let conn = self.connection().await?;

        conn.execute(
            "UPDATE user_sessions SET is_active = 0, ended_at = COALESCE(ended_at, ?1)
             WHERE token_hash = ?2 AND is_active = 1",
            (now, token_hash),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to deactivate session: {}", e)))
    }

    async fn deactivate_user_sessions(&self, user_id: &str, now: i64) -> Result<u64> {
        let conn = self.connection().await?;

        conn.execute(
            "UPDATE user_sessions SET is_active = 0, ended_at = COALESCE(ended_at, ?1)
             WHERE user_id = ?2 AND is_active = 1",
            (now, user_id),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to deactivate user sessions: {}", e)))
    }

    async fn purge_expired_sessions(&self, now: i64) -> Result<u64> {
        let conn = self.connection().await?;

        conn.execute(
            "DELETE FROM user_sessions WHERE expires_at <= ?1 OR is_active = 0",
            [now],
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to clean expired sessions: {}", e)))
    }

    // ============== Anonymous Sessions ==============

    async fn upsert_anonymous_session(&self, session_id: &str, now: i64) -> Result<()> {
        let conn = self.connection().await?;

        conn.execute(
            "INSERT INTO anonymous_sessions (session_id, created_at, last_seen_at)
             VALUES (?1, ?2, ?2)
             ON CONFLICT(session_id) DO UPDATE SET last_seen_at = excluded.last_seen_at",
            (session_id, now),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to create or update anonymous session: {}", e))
        })?;

        Ok(())
    }

    async fn get_anonymous_session(&self, session_id: &str) -> Result<Option<AnonymousSession>> {
        let conn = self.connection().await?;

        let mut rows = conn
            .query(
                "SELECT session_id, created_at, last_seen_at
                 FROM anonymous_sessions WHERE session_id = ?1",
                [session_id],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query anonymous session: {}", e)))?;

        if let Some(row) = rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            Ok(Some(AnonymousSession {
                session_id: row.get(0).map_err(|e| AppError::Database(e.to_string()))?,
                created_at: row.get(1).map_err(|e| AppError::Database(e.to_string()))?,
                last_seen_at: row.get(2).map_err(|e| AppError::Database(e.to_string()))?,
            }))
        } else {
            Ok(None)
        }
    }

    async fn count_active_anonymous(&self, since: i64) -> Result<i64> {
        self.query_count(
            "SELECT COUNT(*) FROM anonymous_sessions WHERE last_seen_at >= ?1",
            [since],
        )
        .await
    }

    async fn purge_anonymous_sessions(&self, before: i64) -> Result<u64> {
        let conn = self.connection().await?;

        conn.execute(
            "DELETE FROM anonymous_sessions WHERE last_seen_at < ?1",
            [before],
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to purge anonymous sessions: {}", e)))
    }

    // ============== Aggregates ==============

    async fn count_active_authenticated(&self, since: i64, now: i64) -> Result<i64> {
        self.query_count(
            "SELECT COUNT(*) FROM user_sessions
             WHERE is_active = 1 AND expires_at > ?1 AND last_seen_at >= ?2",
            (now, since),
        )
        .await
    }

    async fn count_active_users(&self, since: i64, now: i64) -> Result<i64> {
        self.query_count(
            "SELECT COUNT(DISTINCT user_id) FROM user_sessions
             WHERE is_active = 1 AND expires_at > ?1 AND last_seen_at >= ?2",
            (now, since),
        )
        .await
    }

    async fn count_all_active(&self, since: i64, now: i64) -> Result<i64> {
        self.query_count(
            "SELECT
                (SELECT COUNT(*) FROM user_sessions
                 WHERE is_active = 1 AND expires_at > ?1 AND last_seen_at >= ?2)
                +
                (SELECT COUNT(*) FROM anonymous_sessions WHERE last_seen_at >= ?2)",
            (now, since),
        )
        .await
    }

    async fn session_totals(&self) -> Result<SessionTotals> {
        let conn = self.connection().await?;

        let mut rows = conn
            .query(
                "SELECT
                    (SELECT COUNT(*) FROM user_sessions),
                    (SELECT AVG(COALESCE(ended_at, last_seen_at, created_at) - created_at)
                     FROM user_sessions),
                    (SELECT COUNT(*) FROM anonymous_sessions),
                    (SELECT AVG(last_seen_at - created_at) FROM anonymous_sessions)",
                (),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query session totals: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            Some(row) => Ok(SessionTotals {
                total_sessions: row.get(0).map_err(|e| AppError::Database(e.to_string()))?,
                avg_session_duration_secs: row
                    .get::<Option<f64>>(1)
                    .map_err(|e| AppError::Database(e.to_string()))?,
                anonymous_total: row.get(2).map_err(|e| AppError::Database(e.to_string()))?,
                avg_anonymous_duration_secs: row
                    .get::<Option<f64>>(3)
                    .map_err(|e| AppError::Database(e.to_string()))?,
            }),
            None => Ok(SessionTotals::default()),
        }
    }

    async fn visitor_buckets(&self, from: i64, bucket_secs: i64) -> Result<Vec<VisitorBucket>> {
        if bucket_secs <= 0 {
            return Err(AppError::InvalidInput(
                "bucket size must be positive".to_string(),
            ));
        }

        let conn = self.connection().await?;

        let mut rows = conn
            .query(
                "SELECT (created_at / ?1) * ?1 AS bucket, COUNT(*) FROM (
                    SELECT created_at FROM user_sessions WHERE created_at >= ?2
                    UNION ALL
                    SELECT created_at FROM anonymous_sessions WHERE created_at >= ?2
                 )
                 GROUP BY bucket
                 ORDER BY bucket",
                (bucket_secs, from),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query visitor buckets: {}", e)))?;

        let mut buckets = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            buckets.push(VisitorBucket {
                bucket_start: row.get(0).map_err(|e| AppError::Database(e.to_string()))?,
                sessions: row.get(1).map_err(|e| AppError::Database(e.to_string()))?,
            });
        }

        Ok(buckets)
    }

    // ============== Peak Statistic ==============

    async fn peak_concurrent_sessions(&self) -> Result<i64> {
        self.query_count(
            "SELECT peak_concurrent_sessions FROM peak_stats WHERE id = 1",
            (),
        )
        .await
    }

    async fn raise_peak_if_higher(&self, candidate: i64, now: i64) -> Result<bool> {
        let conn = self.connection().await?;

        // Compare-and-set in one statement: the WHERE clause is evaluated by
        // SQLite under its write lock, so concurrent writers cannot lower it.
        let updated = conn
            .execute(
                "INSERT INTO peak_stats (id, peak_concurrent_sessions, updated_at)
                 VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                    peak_concurrent_sessions = excluded.peak_concurrent_sessions,
                    updated_at = excluded.updated_at
                 WHERE peak_stats.peak_concurrent_sessions < excluded.peak_concurrent_sessions",
                (candidate, now),
            )
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to update peak concurrent sessions: {}", e))
            })?;

        Ok(updated > 0)
    }
}
