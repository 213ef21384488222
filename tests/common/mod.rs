//! Shared fixtures for integration tests.
//!
//! Everything runs against a fresh in-memory libsql database and a
//! `ManualClock`, so tests can move time forward without sleeping.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use histmap::{
    auth::service::AuthService,
    db::TursoClient,
    types::{AccessLevel, LoginRequest, LoginResponse, PublicUser, RegisterRequest},
    utils::clock::ManualClock,
    AppState, HistmapConfig,
};
use std::sync::Arc;

pub const TEST_SECRET: &str = "integration-test-secret-at-least-32-bytes";
pub const PASSWORD: &str = "Secret123";

/// Fixed start time: 2024-03-01T12:00:00Z.
pub fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_709_294_400, 0).expect("valid timestamp")
}

pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_time()))
}

pub async fn memory_store() -> Arc<TursoClient> {
    Arc::new(
        TursoClient::new_memory()
            .await
            .expect("Failed to create in-memory database"),
    )
}

pub struct Harness {
    pub service: AuthService,
    pub store: Arc<TursoClient>,
    pub clock: Arc<ManualClock>,
}

pub async fn harness() -> Harness {
    let store = memory_store().await;
    let clock = test_clock();
    let service = AuthService::new(store.clone(), TEST_SECRET, clock.clone());

    Harness {
        service,
        store,
        clock,
    }
}

pub fn register_request(username: &str, level: Option<AccessLevel>) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password: PASSWORD.to_string(),
        access_level: level,
    }
}

pub async fn register(service: &AuthService, username: &str) -> PublicUser {
    service
        .register(register_request(username, None))
        .await
        .expect("registration should succeed")
}

pub async fn login(service: &AuthService, username: &str, password: &str) -> LoginResponse {
    service
        .login(LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await
        .expect("login should succeed")
}

/// App state over a fresh database with default configuration.
pub async fn app_state() -> (AppState, Arc<TursoClient>, Arc<ManualClock>) {
    app_state_with(HistmapConfig::default()).await
}

pub async fn app_state_with(
    config: HistmapConfig,
) -> (AppState, Arc<TursoClient>, Arc<ManualClock>) {
    let store = memory_store().await;
    let clock = test_clock();
    let state = AppState::new(config, store.clone(), clock.clone(), TEST_SECRET.to_string());
    (state, store, clock)
}
