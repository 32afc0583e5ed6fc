//! Credential store: users, refresh tokens and role permissions.
//!
//! The session service only sees the [`CredentialStore`] trait. Two
//! implementations ship with the crate: [`postgres::PgCredentialStore`] for
//! production and [`memory::MemoryCredentialStore`] for tests and local runs.

pub mod memory;
pub mod postgres;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::auth::{NewUser, RefreshTokenRecord, User, UserCredentials};

/// Credential store errors.
///
/// A missing row is never an error: lookups return `Ok(None)` instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}

/// Outcome of an atomic refresh token rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    /// The old row was revoked and the new row inserted.
    Rotated,
    /// No active row matched; nothing was written.
    Stale,
}

/// Persistent store for users, refresh tokens and role permissions.
///
/// Every method takes the caller's cancellation token. A token that has
/// already fired fails the call with [`StoreError::Cancelled`] before any I/O.
/// Refresh token values are opaque to callers; implementations may store a
/// digest instead of the raw string.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a user, returning the new ID.
    async fn create_user(&self, ctx: &CancellationToken, user: &NewUser)
    -> Result<i64, StoreError>;

    async fn find_user_by_id(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
    ) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(
        &self,
        ctx: &CancellationToken,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError>;

    async fn find_user_by_phone(
        &self,
        ctx: &CancellationToken,
        phone: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn user_exists_by_email(
        &self,
        ctx: &CancellationToken,
        email: &str,
    ) -> Result<bool, StoreError>;

    /// Mark a user deleted. Returns false when no live user matched.
    async fn soft_delete_user(&self, ctx: &CancellationToken, user_id: i64)
    -> Result<bool, StoreError>;

    /// Permission names granted to a role, sorted.
    async fn find_permissions_by_role(
        &self,
        ctx: &CancellationToken,
        role_id: i64,
    ) -> Result<Vec<String>, StoreError>;

    async fn create_refresh_token(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn find_refresh_token(
        &self,
        ctx: &CancellationToken,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Revoke `old_token` and insert `new_token` as one conditional write.
    ///
    /// The old row must belong to `user_id`, be unrevoked and unexpired. Of
    /// any number of concurrent calls with the same `old_token`, at most one
    /// returns [`RotateOutcome::Rotated`].
    async fn rotate_refresh_token(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
        old_token: &str,
        new_token: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<RotateOutcome, StoreError>;

    /// Revoke one token. Returns false when it was unknown or already revoked.
    async fn revoke_refresh_token(
        &self,
        ctx: &CancellationToken,
        token: &str,
    ) -> Result<bool, StoreError>;

    /// Revoke every active token of a user, returning how many were revoked.
    async fn revoke_all_refresh_tokens(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
    ) -> Result<u64, StoreError>;

    /// Delete rows revoked or expired more than `older_than` ago.
    async fn purge_refresh_tokens(
        &self,
        ctx: &CancellationToken,
        older_than: Duration,
    ) -> Result<u64, StoreError>;
}

/// Run a store call under the caller's cancellation token.
///
/// Fails fast when the token has already fired, and abandons the call if it
/// fires while the call is in flight.
pub(crate) async fn cancellable<T, F>(ctx: &CancellationToken, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    if ctx.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(StoreError::Cancelled),
        result = call => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_token_fails_before_running_call() {
        let ctx = CancellationToken::new();
        ctx.cancel();
        let mut ran = false;
        let result = cancellable(&ctx, async {
            ran = true;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Cancelled)));
        assert!(!ran);
    }

    #[tokio::test]
    async fn live_token_passes_result_through() {
        let ctx = CancellationToken::new();
        let result = cancellable(&ctx, async { Ok(5) }).await;
        assert_eq!(result.unwrap(), 5);
    }

    #[tokio::test]
    async fn cancellation_during_call_abandons_it() {
        let ctx = CancellationToken::new();
        let trigger = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let result: Result<(), StoreError> = cancellable(&ctx, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Cancelled)));
    }
}
