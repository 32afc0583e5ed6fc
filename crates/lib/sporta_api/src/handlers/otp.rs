//! Phone OTP handlers.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::AppResult;
use crate::models::{ConfirmOtpRequest, ConfirmOtpResponse, SendOtpRequest, SendOtpResponse};

/// `POST /auth/otp/send`
pub async fn send_otp_handler(
    State(state): State<AppState>,
    Json(body): Json<SendOtpRequest>,
) -> AppResult<Json<SendOtpResponse>> {
    state
        .session
        .send_otp(&state.request_ctx(), &body.identifier)
        .await?;
    Ok(Json(SendOtpResponse {
        otp_sent: true,
        message: "OTP sent".into(),
    }))
}

/// `POST /auth/otp/confirm`: consumes the challenge and signs in a known phone.
pub async fn confirm_otp_handler(
    State(state): State<AppState>,
    Json(body): Json<ConfirmOtpRequest>,
) -> AppResult<Json<ConfirmOtpResponse>> {
    let confirmation = state
        .session
        .confirm_otp(&state.request_ctx(), &body.identifier, &body.code)
        .await?;
    Ok(Json(confirmation.into()))
}
