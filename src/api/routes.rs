use crate::api::handlers::{admin, auth, health, sessions};
use crate::auth::middleware::{auth_middleware, optional_auth_middleware, require_access_level};
use crate::types::AccessLevel;
use crate::AppState;
use axum::{
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Request bodies are small JSON documents.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register,
        auth::login,
        auth::logout,
        auth::logout_all,
        auth::me,
        auth::session_status,
        auth::change_password,
        sessions::heartbeat,
        sessions::anonymous_heartbeat,
        admin::get_session_stats,
        admin::get_metrics,
        admin::list_users,
        admin::create_user,
        admin::update_user,
        admin::deactivate_user,
        health::health,
    ),
    components(schemas(
        crate::types::PublicUser,
        crate::types::UserProfile,
        crate::types::RegisterRequest,
        crate::types::LoginRequest,
        crate::types::LoginResponse,
        crate::types::ChangePasswordRequest,
        crate::types::UpdateUserRequest,
        crate::types::SessionStatus,
        crate::types::AnonymousHeartbeatRequest,
        crate::types::AccessLevel,
        crate::services::SessionStats,
        crate::services::VisitorCount,
        crate::services::MetricsSnapshot,
        health::HealthResponse,
    )),
    modifiers(&BearerSecurity),
    tags(
        (name = "auth", description = "Registration, login and sessions of a user"),
        (name = "sessions", description = "Activity heartbeats"),
        (name = "admin", description = "Reports and user management"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Routes under `/api`, without state or outer layers.
pub fn create_router(state: AppState) -> Router<AppState> {
    let public_routes = Router::new()
        // Public routes (no auth required)
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        // Logout and heartbeat read the bearer token directly: an ended
        // session answers 204 and 404 respectively, not 401.
        .route("/auth/logout", post(auth::logout))
        .route("/sessions/heartbeat", post(sessions::heartbeat))
        .route(
            "/sessions/anonymous/heartbeat",
            post(sessions::anonymous_heartbeat),
        )
        .route("/health", get(health::health))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }));

    let optional_routes = Router::new()
        .route("/auth/session", get(auth::session_status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            optional_auth_middleware,
        ));

    let protected_routes = Router::new()
        // Protected routes (auth required)
        .route("/auth/me", get(auth::me))
        .route("/auth/logout-all", post(auth::logout_all))
        .route("/auth/change-password", post(auth::change_password))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/admin/session-stats", get(admin::get_session_stats))
        .route("/admin/metrics", get(admin::get_metrics))
        .layer(middleware::from_fn(|req, next| {
            require_access_level(AccessLevel::Admin, req, next)
        }))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let super_routes = Router::new()
        .route(
            "/admin/users",
            get(admin::list_users).post(admin::create_user),
        )
        .route(
            "/admin/users/{id}",
            put(admin::update_user).delete(admin::deactivate_user),
        )
        .layer(middleware::from_fn(|req, next| {
            require_access_level(AccessLevel::Super, req, next)
        }))
        .layer(middleware::from_fn_with_state(state, auth_middleware));

    public_routes
        .merge(optional_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .merge(super_routes)
}

/// The complete application: `/api` routes with tracing, CORS and body limit.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api", create_router(state.clone()))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
