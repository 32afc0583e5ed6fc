//! Registration, login, refresh and logout handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use sporta_core::auth::AuthError;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{
    LoginRequest, LogoutRequest, LogoutResponse, RefreshRequest, RegistrationRequest,
    TokenResponse,
};

/// `POST /auth/registration`: create an account and return its first token pair.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegistrationRequest>,
) -> AppResult<(StatusCode, Json<TokenResponse>)> {
    let pair = state
        .session
        .register(&state.request_ctx(), body.into())
        .await?;
    Ok((StatusCode::CREATED, Json(pair.into())))
}

/// Unknown email and wrong password must look the same to the caller.
fn login_error(e: AuthError) -> AppError {
    match e {
        AuthError::UserNotFound => AppError::InvalidCredentials,
        other => other.into(),
    }
}

/// `POST /auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let pair = state
        .session
        .login(&state.request_ctx(), body.into())
        .await
        .map_err(login_error)?;
    Ok(Json(pair.into()))
}

/// `POST /auth/refresh`: exchange a refresh token for a new pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let pair = state
        .session
        .refresh(&state.request_ctx(), body.refresh_token.trim())
        .await?;
    Ok(Json(pair.into()))
}

/// `POST /auth/logout`: revoke a refresh token and end the access session.
pub async fn logout_handler(
    State(state): State<AppState>,
    Json(body): Json<LogoutRequest>,
) -> AppResult<Json<LogoutResponse>> {
    state.session.logout(&state.request_ctx(), body.into()).await?;
    Ok(Json(LogoutResponse {
        message: "Logged out".into(),
    }))
}
