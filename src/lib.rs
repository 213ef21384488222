//! # histmap-server
//!
//! Authentication and session lifecycle backend for a historical events map.
//!
//! The crate covers credential verification, signed identity tokens backed by
//! a session registry, anonymous visitor tracking, a role hierarchy for access
//! control, and background tasks that keep concurrency statistics.
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use histmap::{
//!     auth::service::AuthService,
//!     db::DatabaseProvider,
//!     types::{LoginRequest, RegisterRequest},
//!     utils::clock::SystemClock,
//! };
//! use std::sync::Arc;
//!
//! let store = DatabaseProvider::Memory.create_client().await?;
//! let auth = AuthService::new(store, jwt_secret, Arc::new(SystemClock));
//!
//! auth.register(RegisterRequest {
//!     username: "alice".into(),
//!     email: "alice@example.com".into(),
//!     password: "Secret123".into(),
//!     access_level: None,
//! })
//! .await?;
//!
//! let login = auth
//!     .login(LoginRequest { username: "alice".into(), password: "Secret123".into() })
//!     .await?;
//! let me = auth.validate_token(&login.token).await?;
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `local-db` | Local SQLite database via libsql (default) |
//! | `turso` | Remote Turso database |
//!
//! ## Configuration
//!
//! The server reads `histmap.toml`; see [`utils::config::HistmapConfig`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Passwords, tokens, access levels and the auth orchestrator.
pub mod auth;
/// Command line interface definitions.
pub mod cli;
/// Session store trait and the libsql implementation.
pub mod db;
/// Background session services and reports.
pub mod services;
/// Core types (requests, responses, errors).
pub mod types;
/// Configuration and clock utilities.
pub mod utils;

// Re-export commonly used types
pub use auth::service::AuthService;
pub use db::{SessionStore, TursoClient};
pub use types::{AppError, Result};
pub use utils::config::HistmapConfig;

use services::{BackgroundTasks, MetricsHandle, MetricsSampler, PeakTracker};
use std::sync::Arc;
use utils::clock::Clock;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Validated configuration
    pub config: Arc<HistmapConfig>,
    /// Authentication service (owns the session store and clock)
    pub auth_service: Arc<AuthService>,
    /// Latest background metrics sample
    pub metrics: MetricsHandle,
}

impl AppState {
    pub fn new(
        config: HistmapConfig,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        jwt_secret: String,
    ) -> Self {
        let auth_service =
            AuthService::with_token_ttl(store, jwt_secret, config.token_ttl(), clock);

        Self {
            config: Arc::new(config),
            auth_service: Arc::new(auth_service),
            metrics: MetricsHandle::default(),
        }
    }

    /// Starts the peak tracker and the metrics sampler as configured.
    pub fn spawn_background_tasks(&self) -> BackgroundTasks {
        let sessions = &self.config.sessions;
        let store = self.auth_service.store().clone();
        let clock = self.auth_service.clock().clone();

        let peak = PeakTracker::new(
            store.clone(),
            clock.clone(),
            sessions.active_window(),
            sessions.peak_interval(),
        );

        let sampler = MetricsSampler::new(
            store,
            clock,
            sessions.active_window(),
            sessions.metrics_interval(),
            self.metrics.clone(),
        )
        .with_purge_expired(sessions.purge_expired)
        .with_anonymous_retention(sessions.anonymous_retention_days);

        BackgroundTasks::spawn(peak, sampler)
    }
}
