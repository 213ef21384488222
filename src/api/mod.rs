//! HTTP API Handlers and Routes
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//!
//! # API Endpoints
//!
//! ## Authentication (`/api/auth`)
//! - `POST /api/auth/register` - Register a new `user`-level account
//! - `POST /api/auth/login` - Login and receive a token
//! - `POST /api/auth/logout` - End the current session
//! - `POST /api/auth/logout-all` - End every session of the current user
//! - `GET /api/auth/me` - Current user profile
//! - `POST /api/auth/change-password` - Change password, ending all sessions
//!
//! ## Sessions (`/api/sessions`)
//! - `POST /api/sessions/heartbeat` - Keep an authenticated session active
//! - `POST /api/sessions/anonymous/heartbeat` - Record anonymous visitor activity
//!
//! ## Admin (`/api/admin`)
//! - `GET /api/admin/session-stats` - Session report (admin)
//! - `GET /api/admin/metrics` - Latest metrics sample (admin)
//! - `POST /api/admin/users` - Create a user at any level (super)
//! - `DELETE /api/admin/users/{id}` - Deactivate a user (super)
//!
//! ## Health (`/api/health`)
//! - `GET /api/health` - Health check endpoint
//!
//! # Authentication
//!
//! Protected endpoints require a token in the `Authorization` header:
//! ```text
//! Authorization: Bearer <token>
//! ```
//!
//! The OpenAPI document is served at `/api/openapi.json`.

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;
