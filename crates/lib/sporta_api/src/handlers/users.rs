//! Account handlers behind authentication.

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{ProfileResponse, RevokeSessionsResponse};

/// `GET /users/me`
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<Json<ProfileResponse>> {
    let profile = state
        .session
        .profile(&state.request_ctx(), user.user_id)
        .await?;
    Ok(Json(profile.into()))
}

/// `DELETE /users/me`: soft-delete the caller's account and end its sessions.
pub async fn delete_me_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<StatusCode> {
    state
        .session
        .delete_account(&state.request_ctx(), user.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /admin/users/{user_id}/sessions/revoke`
pub async fn revoke_sessions_handler(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthenticatedUser>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<RevokeSessionsResponse>> {
    let revoked = state
        .session
        .revoke_all_sessions(&state.request_ctx(), user_id)
        .await?;
    info!(admin_id = admin.user_id, user_id, revoked, "sessions revoked by admin");
    Ok(Json(RevokeSessionsResponse { user_id, revoked }))
}
