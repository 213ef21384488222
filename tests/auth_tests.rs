//! End-to-end tests of the auth service over a real (in-memory) store.

mod common;

use chrono::Duration;
use common::{harness, login, register, PASSWORD};
use histmap::auth::jwt::hash_token;
use histmap::db::SessionStore;
use histmap::utils::clock::Clock;
use histmap::types::{
    AccessLevel, AppError, ChangePasswordRequest, LoginRequest, UpdateUserRequest,
};

#[tokio::test]
async fn test_login_then_validate_round_trip() {
    let h = harness().await;
    let registered = register(&h.service, "alice").await;

    let response = login(&h.service, "alice", PASSWORD).await;
    assert_eq!(response.user.id, registered.id);
    assert_eq!(
        response.expires_at.timestamp(),
        h.clock.now_secs() + 24 * 3600
    );
    assert!(response.user.last_login.is_some());

    let user = h
        .service
        .validate_token(&response.token)
        .await
        .expect("token should validate");
    assert_eq!(user.id, registered.id);
    assert_eq!(user.username, "alice");
    assert_eq!(user.access_level, AccessLevel::User);

    let json = serde_json::to_value(&response).unwrap();
    assert!(json["user"].get("password_hash").is_none());
    assert!(!json.to_string().contains("$argon2"));
}

#[tokio::test]
async fn test_session_is_keyed_by_token_hash() {
    let h = harness().await;
    register(&h.service, "alice").await;
    let response = login(&h.service, "alice", PASSWORD).await;

    let now = h.clock.now_secs();
    let session = h
        .store
        .find_live_session(&hash_token(&response.token), now)
        .await
        .unwrap()
        .expect("login should create a session");
    assert_eq!(session.user_id, response.user.id);
    assert_eq!(session.last_seen_at, Some(now));
    assert!(h
        .store
        .find_live_session(&response.token, now)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_duplicate_registration() {
    let h = harness().await;
    register(&h.service, "alice").await;

    let err = h
        .service
        .register(common::register_request("alice", None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateUsername));

    // Usernames are case-sensitive.
    register(&h.service, "Alice").await;
}

#[tokio::test]
async fn test_requested_level_is_honoured_by_service() {
    let h = harness().await;
    let admin = h
        .service
        .register(common::register_request("root", Some(AccessLevel::Admin)))
        .await
        .unwrap();
    assert_eq!(admin.access_level, AccessLevel::Admin);

    let response = login(&h.service, "root", PASSWORD).await;
    let user = h.service.validate_token(&response.token).await.unwrap();
    assert_eq!(user.access_level, AccessLevel::Admin);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let h = harness().await;
    let alice = register(&h.service, "alice").await;
    register(&h.service, "carol").await;
    h.service.deactivate_user(&alice.id).await.unwrap();

    for (username, password) in [
        ("carol", "WrongPass1"),
        ("nobody", PASSWORD),
        ("alice", PASSWORD),
        ("CAROL", PASSWORD),
    ] {
        let err = h
            .service
            .login(LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await
            .unwrap_err();
        assert!(
            matches!(err, AppError::InvalidCredentials),
            "{} should fail with InvalidCredentials, got {:?}",
            username,
            err
        );
        assert_eq!(err.to_string(), "Invalid credentials");
    }
}

#[tokio::test]
async fn test_token_expires_after_24_hours() {
    let h = harness().await;
    register(&h.service, "alice").await;
    let response = login(&h.service, "alice", PASSWORD).await;

    h.clock.advance(Duration::hours(23) + Duration::minutes(59));
    h.service
        .validate_token(&response.token)
        .await
        .expect("still valid just before 24h");
    h.service.heartbeat(&response.token).await.unwrap();

    h.clock.advance(Duration::minutes(1) + Duration::seconds(1));
    assert!(matches!(
        h.service.validate_token(&response.token).await,
        Err(AppError::InvalidToken)
    ));
    assert!(matches!(
        h.service.heartbeat(&response.token).await,
        Err(AppError::NotFoundOrExpired)
    ));

    // A fresh login works as usual.
    let again = login(&h.service, "alice", PASSWORD).await;
    h.service.validate_token(&again.token).await.unwrap();
}

#[tokio::test]
async fn test_two_sessions_are_independent() {
    let h = harness().await;
    register(&h.service, "alice").await;

    let laptop = login(&h.service, "alice", PASSWORD).await;
    let phone = login(&h.service, "alice", PASSWORD).await;
    assert_ne!(laptop.token, phone.token);

    h.service.logout(&laptop.token).await.unwrap();

    assert!(matches!(
        h.service.validate_token(&laptop.token).await,
        Err(AppError::InvalidToken)
    ));
    h.service
        .validate_token(&phone.token)
        .await
        .expect("other session unaffected");
}

#[tokio::test]
async fn test_double_logout_is_safe() {
    let h = harness().await;
    register(&h.service, "alice").await;
    let response = login(&h.service, "alice", PASSWORD).await;

    h.service.logout(&response.token).await.unwrap();
    h.service
        .logout(&response.token)
        .await
        .expect("second logout is not an error");
    h.service
        .logout("never-issued")
        .await
        .expect("unknown token is not an error");

    assert!(matches!(
        h.service.validate_token(&response.token).await,
        Err(AppError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_logout_all() {
    let h = harness().await;
    let alice = register(&h.service, "alice").await;
    register(&h.service, "bob").await;

    let a1 = login(&h.service, "alice", PASSWORD).await;
    let a2 = login(&h.service, "alice", PASSWORD).await;
    let b1 = login(&h.service, "bob", PASSWORD).await;

    assert_eq!(h.service.logout_all(&alice.id).await.unwrap(), 2);
    assert_eq!(h.service.logout_all(&alice.id).await.unwrap(), 0);

    for token in [&a1.token, &a2.token] {
        assert!(h.service.validate_token(token).await.is_err());
    }
    h.service.validate_token(&b1.token).await.unwrap();
}

#[tokio::test]
async fn test_change_password_revokes_all_tokens() {
    let h = harness().await;
    let alice = register(&h.service, "alice").await;
    let first = login(&h.service, "alice", PASSWORD).await;
    let second = login(&h.service, "alice", PASSWORD).await;

    h.service
        .change_password(
            &alice.id,
            ChangePasswordRequest {
                current_password: PASSWORD.to_string(),
                new_password: "NewSecret456".to_string(),
            },
        )
        .await
        .expect("password change should succeed");

    for token in [&first.token, &second.token] {
        assert!(matches!(
            h.service.validate_token(token).await,
            Err(AppError::InvalidToken)
        ));
    }

    let err = h
        .service
        .login(LoginRequest {
            username: "alice".to_string(),
            password: PASSWORD.to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));

    let fresh = login(&h.service, "alice", "NewSecret456").await;
    h.service.validate_token(&fresh.token).await.unwrap();
}

#[tokio::test]
async fn test_change_password_rejections_keep_sessions() {
    let h = harness().await;
    let alice = register(&h.service, "alice").await;
    let response = login(&h.service, "alice", PASSWORD).await;

    let err = h
        .service
        .change_password(
            &alice.id,
            ChangePasswordRequest {
                current_password: "WrongPass1".to_string(),
                new_password: "NewSecret456".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::IncorrectPassword));

    let err = h
        .service
        .change_password(
            &alice.id,
            ChangePasswordRequest {
                current_password: PASSWORD.to_string(),
                new_password: "short".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    h.service.validate_token(&response.token).await.unwrap();
}

#[tokio::test]
async fn test_heartbeat_refreshes_last_seen() {
    let h = harness().await;
    register(&h.service, "alice").await;
    let response = login(&h.service, "alice", PASSWORD).await;

    h.clock.advance(Duration::minutes(10));
    h.service.heartbeat(&response.token).await.unwrap();

    let now = h.clock.now_secs();
    let session = h
        .store
        .find_live_session(&hash_token(&response.token), now)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.last_seen_at, Some(now));

    h.service.logout(&response.token).await.unwrap();
    assert!(matches!(
        h.service.heartbeat(&response.token).await,
        Err(AppError::NotFoundOrExpired)
    ));
}

#[tokio::test]
async fn test_anonymous_heartbeat_scenario() {
    let h = harness().await;
    let created = h.clock.now_secs();

    h.service.anonymous_heartbeat("anon-42").await.unwrap();
    h.clock.advance(Duration::minutes(2));
    h.service.anonymous_heartbeat("anon-42").await.unwrap();

    let now = h.clock.now_secs();
    let row = h
        .store
        .get_anonymous_session("anon-42")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.created_at, created);
    assert_eq!(row.last_seen_at, now);
    assert_eq!(h.store.count_active_anonymous(now - 300).await.unwrap(), 1);

    assert!(matches!(
        h.service.anonymous_heartbeat("").await,
        Err(AppError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_deactivated_user_loses_access() {
    let h = harness().await;
    let alice = register(&h.service, "alice").await;
    let response = login(&h.service, "alice", PASSWORD).await;

    h.service.deactivate_user(&alice.id).await.unwrap();

    assert!(matches!(
        h.service.validate_token(&response.token).await,
        Err(AppError::InvalidToken)
    ));
    assert!(matches!(
        h.service.deactivate_user(&alice.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_updated_access_level_applies_to_existing_token() {
    let h = harness().await;
    let alice = register(&h.service, "alice").await;
    let response = login(&h.service, "alice", PASSWORD).await;

    let updated = h
        .service
        .update_user(
            &alice.id,
            UpdateUserRequest {
                access_level: Some(AccessLevel::Admin),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.access_level, AccessLevel::Admin);

    let user = h.service.validate_token(&response.token).await.unwrap();
    assert_eq!(user.access_level, AccessLevel::Admin);

    let listed = h.service.list_users().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].access_level, AccessLevel::Admin);
}

#[tokio::test]
async fn test_deactivation_through_update_revokes_tokens() {
    let h = harness().await;
    let alice = register(&h.service, "alice").await;
    let response = login(&h.service, "alice", PASSWORD).await;

    h.service
        .update_user(
            &alice.id,
            UpdateUserRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        h.service.validate_token(&response.token).await,
        Err(AppError::InvalidToken)
    ));
    assert!(matches!(
        h.service
            .login(LoginRequest {
                username: "alice".to_string(),
                password: PASSWORD.to_string(),
            })
            .await,
        Err(AppError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_purge_expired_sessions() {
    let h = harness().await;
    register(&h.service, "alice").await;
    let old = login(&h.service, "alice", PASSWORD).await;
    let ended = login(&h.service, "alice", PASSWORD).await;
    h.service.logout(&ended.token).await.unwrap();

    h.clock.advance(Duration::hours(25));
    let current = login(&h.service, "alice", PASSWORD).await;

    assert_eq!(h.service.purge_expired_sessions().await.unwrap(), 2);
    assert_eq!(h.service.purge_expired_sessions().await.unwrap(), 0);

    assert!(h.service.validate_token(&old.token).await.is_err());
    h.service.validate_token(&current.token).await.unwrap();
}

#[tokio::test]
async fn test_token_from_other_secret_is_rejected() {
    let h = harness().await;
    register(&h.service, "alice").await;

    let foreign = histmap::AuthService::new(
        h.store.clone(),
        "a-different-secret-of-at-least-32-bytes",
        h.clock.clone(),
    );
    let response = login(&foreign, "alice", PASSWORD).await;

    assert!(matches!(
        h.service.validate_token(&response.token).await,
        Err(AppError::InvalidToken)
    ));
}
