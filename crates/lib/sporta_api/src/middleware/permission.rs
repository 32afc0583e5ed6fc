//! Per-route permission gate.
//!
//! Runs after [`super::auth::require_auth`] and checks the permissions
//! embedded in the access token. They are resolved when the token is issued
//! and not re-read per request, so a role change reaches a user at their
//! next login or refresh.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::auth::AuthenticatedUser;
use crate::error::AppError;

/// The permissions a route requires. Blank names are dropped.
#[derive(Debug, Clone, Default)]
pub struct RequiredPermissions(Arc<[String]>);

impl RequiredPermissions {
    pub fn new<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let perms: Vec<String> = permissions
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self(perms.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Required permissions absent from `held`, in declaration order.
    pub fn missing_from(&self, held: &[String]) -> Vec<String> {
        let held: HashSet<&str> = held.iter().map(String::as_str).collect();
        self.0
            .iter()
            .filter(|p| !held.contains(p.as_str()))
            .cloned()
            .collect()
    }
}

/// Axum middleware: rejects with 403 unless the authenticated caller holds
/// every permission in `required`.
pub async fn enforce_permissions(
    State(required): State<RequiredPermissions>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if required.is_empty() {
        return Ok(next.run(request).await);
    }

    let Some(user) = request.extensions().get::<AuthenticatedUser>() else {
        return Err(AppError::Forbidden("Permissions are missing in context".into()));
    };

    let missing = required.missing_from(&user.permissions);
    if !missing.is_empty() {
        warn!(user_id = user.user_id, ?missing, "insufficient permissions");
        return Err(AppError::MissingPermissions(missing));
    }

    Ok(next.run(request).await)
}
