use crate::types::{AppError, Claims, PublicUser, Result};
use crate::utils::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// A freshly signed token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

impl IssuedToken {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.claims.exp, 0).unwrap_or_default()
    }
}

/// Issues and validates HS256 identity tokens.
///
/// Tokens are self-contained; revocation is handled by the session registry,
/// not here.
pub struct TokenService {
    secret: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenService {
    /// Creates a token service.
    ///
    /// # Arguments
    /// * `secret` - HMAC signing secret (should be at least 32 bytes)
    /// * `ttl` - Token validity duration
    /// * `clock` - Time source for `iat`/`exp` and for the expiry check
    pub fn new(secret: impl Into<String>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: secret.into(),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Signs a token for the given user.
    pub fn issue(&self, user: &PublicUser) -> Result<IssuedToken> {
        let now = self.clock.now_secs();
        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            access_level: user.access_level,
            iat: now,
            exp: now + self.ttl.num_seconds(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))?;

        Ok(IssuedToken { token, claims })
    }

    /// Verifies signature, algorithm and expiry, returning the claims.
    ///
    /// Every failure is reported as [`AppError::InvalidToken`].
    pub fn validate(&self, token: &str) -> Result<Claims> {
        // Only HS256 is accepted; a header naming any other algorithm fails.
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against the injected clock.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("Token rejected: {:?}", e.kind());
            AppError::InvalidToken
        })?;

        if claims.exp <= self.clock.now_secs() {
            tracing::debug!("Token rejected: expired");
            return Err(AppError::InvalidToken);
        }

        Ok(claims)
    }
}

/// Hashes a token using SHA256 for storage as the session key.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccessLevel;
    use crate::utils::clock::ManualClock;

    const SECRET: &str = "test-secret-key-that-is-at-least-32-chars";

    fn test_user() -> PublicUser {
        PublicUser {
            id: "user-456".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            access_level: AccessLevel::Editor,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login: None,
        }
    }

    fn create_test_service() -> (TokenService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let service = TokenService::new(SECRET, Duration::hours(24), clock.clone());
        (service, clock)
    }

    #[test]
    fn test_issue_then_validate_round_trip() {
        let (service, _) = create_test_service();
        let user = test_user();

        let issued = service.issue(&user).expect("should issue token");
        let claims = service.validate(&issued.token).expect("should validate");

        assert_eq!(claims, issued.claims);
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.access_level, AccessLevel::Editor);
    }

    #[test]
    fn test_tokens_issued_in_same_second_differ() {
        let (service, _) = create_test_service();
        let user = test_user();

        let first = service.issue(&user).expect("should issue");
        let second = service.issue(&user).expect("should issue");

        assert_eq!(first.claims.iat, second.claims.iat);
        assert_ne!(first.token, second.token);
        assert_ne!(hash_token(&first.token), hash_token(&second.token));
    }

    #[test]
    fn test_expiry_is_iat_plus_ttl() {
        let (service, clock) = create_test_service();
        let issued = service.issue(&test_user()).expect("should issue");

        assert_eq!(issued.claims.iat, clock.now_secs());
        assert_eq!(issued.claims.exp - issued.claims.iat, 24 * 3600);
        assert_eq!(issued.expires_at().timestamp(), issued.claims.exp);
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let (service, clock) = create_test_service();
        let issued = service.issue(&test_user()).expect("should issue");

        clock.advance(Duration::hours(24) + Duration::seconds(1));

        assert!(matches!(
            service.validate(&issued.token),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_token_still_valid_just_before_expiry() {
        let (service, clock) = create_test_service();
        let issued = service.issue(&test_user()).expect("should issue");

        clock.advance(Duration::hours(24) - Duration::seconds(1));

        assert!(service.validate(&issued.token).is_ok());
    }

    #[test]
    fn test_garbage_token_is_invalid() {
        let (service, _) = create_test_service();

        assert!(matches!(
            service.validate("invalid.token.here"),
            Err(AppError::InvalidToken)
        ));
        assert!(matches!(service.validate(""), Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let service1 = TokenService::new(
            "secret-one-that-is-32-chars-long",
            Duration::hours(24),
            clock.clone(),
        );
        let service2 = TokenService::new(
            "secret-two-that-is-32-chars-long",
            Duration::hours(24),
            clock,
        );

        let issued = service1.issue(&test_user()).expect("should issue");

        assert!(matches!(
            service2.validate(&issued.token),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_unexpected_algorithm_is_rejected() {
        let (service, clock) = create_test_service();
        let now = clock.now_secs();
        let claims = Claims {
            sub: "user-456".into(),
            username: "alice".into(),
            access_level: AccessLevel::Super,
            iat: now,
            exp: now + 3600,
            jti: "forged".into(),
        };

        // Same secret, different HMAC variant.
        let forged = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("should encode");

        assert!(matches!(
            service.validate(&forged),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let (service, _) = create_test_service();
        let issued = service.issue(&test_user()).expect("should issue");

        let mut parts: Vec<&str> = issued.token.split('.').collect();
        let other = service
            .issue(&PublicUser {
                id: "someone-else".into(),
                ..test_user()
            })
            .expect("should issue");
        let other_payload = other.token.split('.').nth(1).expect("payload segment");
        parts[1] = other_payload;
        let spliced = parts.join(".");

        assert!(matches!(
            service.validate(&spliced),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let (service, _) = create_test_service();
        let rendered = format!("{:?}", service);
        assert!(!rendered.contains(SECRET));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_hash_token() {
        let hash1 = hash_token("some-token");
        let hash2 = hash_token("some-token");

        assert_eq!(hash1, hash2, "same token should hash to same value");
        assert_eq!(hash1.len(), 64, "SHA256 hash should be 64 hex characters");
        assert!(hash1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(hash_token("token-a"), hash_token("token-b"));
    }
}
