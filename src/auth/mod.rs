//! Authentication, sessions and access control
//!
//! # Module Structure
//!
//! - [`auth::password`](crate::auth::password) - Argon2id hashing and verification
//! - [`auth::jwt`](crate::auth::jwt) - HS256 token issue/validate and token hashing
//! - [`auth::access`](crate::auth::access) - The access level hierarchy
//! - [`auth::service`](crate::auth::service) - `AuthService`, the login/session orchestrator
//! - [`auth::middleware`](crate::auth::middleware) - Axum layers and extractors
//!
//! # Sessions
//!
//! A token alone is not enough to authenticate. Every login writes a session
//! row keyed by the SHA-256 of the token, and validation requires that row to
//! be active and unexpired. Logout and password change deactivate rows, which
//! revokes tokens that are still cryptographically valid.
//!
//! ```ignore
//! use histmap::auth::service::AuthService;
//! use histmap::types::LoginRequest;
//!
//! let service = AuthService::new(store, jwt_secret, clock);
//! let login = service
//!     .login(LoginRequest { username: "alice".into(), password: "Secret123".into() })
//!     .await?;
//! let user = service.validate_token(&login.token).await?;
//! service.logout(&login.token).await?;
//! ```
//!
//! # Protecting Routes
//!
//! ```ignore
//! use histmap::auth::middleware::{auth_middleware, require_access_level};
//! use histmap::types::AccessLevel;
//!
//! let admin = Router::new()
//!     .route("/admin/metrics", get(metrics))
//!     .layer(middleware::from_fn(|req, next| {
//!         require_access_level(AccessLevel::Admin, req, next)
//!     }))
//!     .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
//! ```

/// Access level hierarchy and authorization decisions.
pub mod access;
/// JWT token generation, validation and token hashing.
pub mod jwt;
/// Authentication middleware and extractors for protected routes.
pub mod middleware;
/// Argon2id password hashing.
pub mod password;
/// Registration, login and session lifecycle.
pub mod service;
