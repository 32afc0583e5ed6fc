//! Authentication middleware: bearer token extraction, JWT verification and
//! the liveness cross-check against the ephemeral cache.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, warn};

use crate::AppState;
use crate::error::AppError;

/// The verified caller, stored in request extensions by [`require_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub email: String,
    pub permissions: Vec<String>,
}

/// Axum middleware: accepts a request only when its bearer token verifies,
/// its user still exists and it is the user's live access token. Injects
/// [`AuthenticatedUser`] into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))?;

    let claims = state.session.verify_access_token(token).map_err(|e| {
        debug!(error = %e, "access token rejected");
        AppError::Unauthorized("Invalid or expired token".into())
    })?;

    if claims.email.is_empty() {
        return Err(AppError::Unauthorized("Token carries no email".into()));
    }

    let ctx = state.request_ctx();
    match state.session.user_exists_by_email(&ctx, &claims.email).await {
        Ok(true) => {}
        Ok(false) => return Err(AppError::Unauthorized("User no longer exists".into())),
        Err(e) => {
            warn!(user_id = claims.user_id, error = %e, "user lookup failed during auth");
            return Err(AppError::Unauthorized("Unable to verify user".into()));
        }
    }

    match state
        .session
        .access_token_alive(&ctx, claims.user_id, &claims.jti)
        .await
    {
        Ok(true) => {}
        Ok(false) => return Err(AppError::Unauthorized("Session is no longer active".into())),
        Err(e) => {
            warn!(user_id = claims.user_id, error = %e, "liveness check failed during auth");
            return Err(AppError::Unauthorized("Unable to verify session".into()));
        }
    }

    if claims.exp <= Utc::now().timestamp() {
        return Err(AppError::Unauthorized("Token has expired".into()));
    }

    request.extensions_mut().insert(AuthenticatedUser {
        user_id: claims.user_id,
        email: claims.email,
        permissions: claims.permissions,
    });

    Ok(next.run(request).await)
}
