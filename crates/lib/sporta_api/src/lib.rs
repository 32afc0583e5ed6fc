//! # sporta_api
//!
//! HTTP API library for Sporta: router, middleware, handlers and the mapping
//! from domain errors to responses.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use sporta_core::auth::session::SessionService;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{auth, otp, users};
use crate::middleware::permission::{RequiredPermissions, enforce_permissions};

pub const PERMISSION_PROFILE_VIEW_OWN: &str = "profile.view.own";
pub const PERMISSION_PROFILE_DELETE_OWN: &str = "profile.delete.own";
pub const PERMISSION_SESSIONS_REVOKE_ANY: &str = "sessions.revoke.any";

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionService>,
    /// Fires on server shutdown; every request context is a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(session: Arc<SessionService>, shutdown: CancellationToken) -> Self {
        Self { session, shutdown }
    }

    /// Cancellation token for one request's store and cache calls.
    pub fn request_ctx(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

/// Run embedded database migrations.
///
/// Delegates to `sporta_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sporta_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let requires = |permission: &str| {
        axum::middleware::from_fn_with_state(
            RequiredPermissions::new([permission]),
            enforce_permissions,
        )
    };

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_AUTH_REGISTRATION, post(auth::register_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(routes::POST_AUTH_OTP_SEND, post(otp::send_otp_handler))
        .route(routes::POST_AUTH_OTP_CONFIRM, post(otp::confirm_otp_handler));

    // Protected routes (bearer token, then per-route permissions)
    let protected = Router::new()
        .route(
            routes::GET_USERS_ME,
            get(users::me_handler).route_layer(requires(PERMISSION_PROFILE_VIEW_OWN)),
        )
        .route(
            routes::DELETE_USERS_ME,
            delete(users::delete_me_handler).route_layer(requires(PERMISSION_PROFILE_DELETE_OWN)),
        )
        .route(
            routes::POST_ADMIN_USER_SESSIONS_REVOKE,
            post(users::revoke_sessions_handler)
                .route_layer(requires(PERMISSION_SESSIONS_REVOKE_ANY)),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
