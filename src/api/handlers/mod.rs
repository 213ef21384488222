//! API request handlers.
//!
//! This module contains all HTTP request handlers organized by functionality.

/// Session reports, metrics and user management.
pub mod admin;
/// Registration, login, logout and password handlers.
pub mod auth;
/// Health check handler.
pub mod health;
/// Authenticated and anonymous heartbeat handlers.
pub mod sessions;
