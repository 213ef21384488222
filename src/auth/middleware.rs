use crate::auth::access::authorize;
use crate::types::{AccessLevel, AppError, PublicUser};
use crate::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

/// Raw bearer token of the current request, as sent by the client.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Reads `Authorization: Bearer <token>`. The scheme is matched
/// case-insensitively; an empty token counts as absent.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Requires a valid token. Inserts the resolved [`PublicUser`] and the
/// [`BearerToken`] into the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())
        .ok_or(AppError::Unauthorized)?
        .to_string();

    let user = state.auth_service.validate_token(&token).await?;

    req.extensions_mut().insert(user);
    req.extensions_mut().insert(BearerToken(token));

    Ok(next.run(req).await)
}

/// Resolves the bearer token when one is sent, but never rejects: a
/// missing or unusable token leaves the request anonymous.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(req.headers()).map(str::to_string) {
        match state.auth_service.validate_token(&token).await {
            Ok(user) => {
                req.extensions_mut().insert(user);
                req.extensions_mut().insert(BearerToken(token));
            }
            Err(e) => tracing::debug!("Ignoring unusable bearer token: {}", e),
        }
    }

    next.run(req).await
}

/// Admits the request only if the identity placed by [`auth_middleware`]
/// holds at least `required`. Without an identity the request is
/// unauthorized; with a lower level it is forbidden.
pub async fn require_access_level(
    required: AccessLevel,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Err(e) = authorize(req.extensions().get::<PublicUser>(), required) {
        tracing::debug!(required = %required, "Access denied: {}", e);
        return Err(e);
    }

    Ok(next.run(req).await)
}

/// Extractor for the authenticated user.
pub struct AuthUser(pub PublicUser);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<PublicUser>()
            .cloned()
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}

/// Extractor for routes behind [`optional_auth_middleware`].
pub struct MaybeUser(pub Option<PublicUser>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<PublicUser>().cloned()))
    }
}

/// Prefers the token recorded by [`auth_middleware`], falling back to the
/// header so routes outside it can still read the token.
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(token) = parts.extensions.get::<BearerToken>() {
            return Ok(token.clone());
        }

        bearer_token(&parts.headers)
            .map(|t| BearerToken(t.to_string()))
            .ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use rstest::rstest;

    #[rstest]
    #[case("Bearer abc.def.ghi", Some("abc.def.ghi"))]
    #[case("bearer abc", Some("abc"))]
    #[case("BEARER  abc ", Some("abc"))]
    #[case("Basic dXNlcjpwYXNz", None)]
    #[case("Bearer ", None)]
    #[case("Bearer", None)]
    #[case("abc.def.ghi", None)]
    fn test_bearer_token_parsing(#[case] header_value: &str, #[case] expected: Option<&str>) {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(header_value).unwrap(),
        );
        assert_eq!(bearer_token(&headers), expected);
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
