//! Session orchestration: registration, login, logout, refresh rotation and
//! OTP challenges.
//!
//! [`SessionService`] owns no mutable state of its own. Everything durable
//! lives in the [`CredentialStore`]; everything short-lived (access-token
//! liveness markers, OTP challenges) lives in the [`EphemeralCache`].
//!
//! The liveness marker for a user holds the `jti` of that user's most
//! recently issued access token. Issuing a new access token overwrites it,
//! so only the newest access token of a user is accepted.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::AuthError;
use super::jwt::TokenIssuer;
use super::otp::{LogOtpSender, OtpSender, generate_code};
use super::password::{hash_password_blocking, verify_password_blocking};
use crate::cache::{CacheError, EphemeralCache};
use crate::config::{AuthConfig, OTP_TTL};
use crate::models::auth::{
    IssuedToken, LoginRequest, LogoutRequest, NewUser, OtpConfirmation, Registration,
    TokenClaims, TokenPair, User,
};
use crate::store::{CredentialStore, RotateOutcome, StoreError};

/// Trim and lower-case an email or OTP identifier.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Parse a birth date strictly against `format`.
pub fn parse_birth_date(value: &str, format: &str) -> Result<NaiveDate, AuthError> {
    NaiveDate::parse_from_str(value.trim(), format)
        .map_err(|e| AuthError::Parse(format!("birth date {value:?}: {e}")))
}

/// Persistence and cache failures while minting tokens surface as
/// `TokenCreation`, except cancellation, which keeps its own kind.
fn store_to_creation(e: StoreError) -> AuthError {
    match e {
        StoreError::Cancelled => AuthError::Repository(e),
        other => AuthError::TokenCreation(format!("persist refresh token: {other}")),
    }
}

fn cache_to_creation(e: CacheError) -> AuthError {
    match e {
        CacheError::Cancelled => AuthError::Cache(e),
        other => AuthError::TokenCreation(format!("write liveness marker: {other}")),
    }
}

/// Token and session lifecycle on top of a credential store and a cache.
pub struct SessionService {
    store: Arc<dyn CredentialStore>,
    cache: Arc<dyn EphemeralCache>,
    otp_sender: Arc<dyn OtpSender>,
    issuer: TokenIssuer,
    config: AuthConfig,
}

impl SessionService {
    /// Build a service that delivers OTP codes through [`LogOtpSender`].
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn EphemeralCache>,
    ) -> Self {
        Self {
            store,
            cache,
            otp_sender: Arc::new(LogOtpSender),
            issuer: TokenIssuer::new(&config),
            config,
        }
    }

    pub fn with_otp_sender(mut self, sender: Arc<dyn OtpSender>) -> Self {
        self.otp_sender = sender;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    // -----------------------------------------------------------------------
    // Token primitives
    // -----------------------------------------------------------------------

    /// Issue and persist a fresh access + refresh pair for a user.
    ///
    /// Permissions come from the user's role (none without a role). The
    /// refresh token is stored before the liveness marker is written.
    pub async fn create_token_pair(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let user = self
            .store
            .find_user_by_id(ctx, user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let permissions = self.permissions_for(ctx, user.role_id).await?;

        let access = self
            .issuer
            .issue_access_token(user_id, email, &permissions, now)?;
        let refresh = self.issuer.issue_refresh_token(user_id, now)?;

        self.store
            .create_refresh_token(ctx, user_id, &refresh.token, refresh.expires_at)
            .await
            .map_err(store_to_creation)?;
        self.mark_live(ctx, user_id, &access, now).await?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    async fn permissions_for(
        &self,
        ctx: &CancellationToken,
        role_id: Option<i64>,
    ) -> Result<Vec<String>, AuthError> {
        match role_id {
            Some(role_id) => Ok(self.store.find_permissions_by_role(ctx, role_id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Record `access` as the user's live access token until it expires.
    async fn mark_live(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
        access: &IssuedToken,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let remaining = (access.expires_at - now)
            .to_std()
            .map_err(|_| AuthError::TokenCreation("access token already expired".into()))?;
        self.cache
            .set(
                ctx,
                &self.config.access_token_key(user_id),
                &access.jti,
                remaining,
            )
            .await
            .map_err(cache_to_creation)
    }

    /// Verify signature, algorithm, expiry and subject of an access token.
    pub fn verify_access_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.issuer.verify_access(token)
    }

    /// Whether the user's liveness marker exists, has TTL left and names `jti`.
    pub async fn access_token_alive(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
        jti: &str,
    ) -> Result<bool, AuthError> {
        let key = self.config.access_token_key(user_id);
        let Some(ttl) = self.cache.ttl(ctx, &key).await? else {
            return Ok(false);
        };
        if ttl.is_zero() {
            return Ok(false);
        }
        let marker = self.cache.get(ctx, &key).await?;
        Ok(marker.as_deref() == Some(jti))
    }

    // -----------------------------------------------------------------------
    // Credentials
    // -----------------------------------------------------------------------

    /// Create an account and sign it in.
    pub async fn register(
        &self,
        ctx: &CancellationToken,
        registration: Registration,
    ) -> Result<TokenPair, AuthError> {
        let email = normalize(&registration.email);
        if email.is_empty() {
            return Err(AuthError::Validation("email is required".into()));
        }
        if registration.password.is_empty() {
            return Err(AuthError::Validation("password is required".into()));
        }
        let birth_date =
            parse_birth_date(&registration.birth_date, &self.config.birth_date_format)?;
        let password_hash = hash_password_blocking(registration.password).await?;

        let new_user = NewUser {
            name: registration.name,
            surname: registration.surname,
            gender: registration.gender,
            birth_date,
            height_cm: registration.height_cm,
            weight_kg: registration.weight_kg,
            sport_activity_level_id: registration.sport_activity_level_id,
            town_id: registration.town_id,
            role_id: registration.role_id,
            phone_number: registration.phone_number.trim().to_string(),
            email,
            password_hash,
            is_have_injury: registration.is_have_injury,
            injury_description: registration.injury_description,
            photo: registration.photo,
        };
        let user_id = self.store.create_user(ctx, &new_user).await?;
        info!(user_id, email = %new_user.email, "user registered");

        self.create_token_pair(ctx, user_id, &new_user.email, Utc::now())
            .await
    }

    /// Email + password sign-in.
    pub async fn login(
        &self,
        ctx: &CancellationToken,
        request: LoginRequest,
    ) -> Result<TokenPair, AuthError> {
        let email = normalize(&request.email);
        let credentials = self
            .store
            .find_user_by_email(ctx, &email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !verify_password_blocking(request.password, credentials.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        let pair = self
            .create_token_pair(ctx, credentials.id, &credentials.email, Utc::now())
            .await?;
        info!(user_id = credentials.id, "user logged in");
        Ok(pair)
    }

    /// Revoke a refresh token and end the user's access-token session.
    ///
    /// Revoking a token that is unknown or already revoked is not an error.
    pub async fn logout(
        &self,
        ctx: &CancellationToken,
        request: LogoutRequest,
    ) -> Result<(), AuthError> {
        let token = request.refresh_token.trim();
        if token.is_empty() {
            return Err(AuthError::Validation("refresh token is required".into()));
        }
        let claims = self.issuer.verify_refresh(token)?;
        if claims.user_id != request.user_id {
            return Err(AuthError::TokenOwnership);
        }

        if !self.store.revoke_refresh_token(ctx, token).await? {
            debug!(user_id = request.user_id, "refresh token already revoked or unknown");
        }
        self.cache
            .delete(ctx, &self.config.access_token_key(request.user_id))
            .await?;
        info!(user_id = request.user_id, "user logged out");
        Ok(())
    }

    /// Exchange a refresh token for a new pair, revoking the old token.
    ///
    /// Of several concurrent calls with the same token, one succeeds and the
    /// rest fail with [`AuthError::RefreshTokenInvalid`].
    pub async fn refresh(
        &self,
        ctx: &CancellationToken,
        refresh_token: &str,
    ) -> Result<TokenPair, AuthError> {
        let claims = self.issuer.verify_refresh(refresh_token)?;
        let now = Utc::now();

        let record = self
            .store
            .find_refresh_token(ctx, refresh_token)
            .await?
            .ok_or(AuthError::RefreshTokenNotFound)?;
        if record.is_revoked() {
            return Err(AuthError::RefreshTokenRevoked);
        }
        if record.is_expired_at(now) {
            return Err(AuthError::RefreshTokenExpired);
        }

        let user = self
            .store
            .find_user_by_id(ctx, claims.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let refresh = self.issuer.issue_refresh_token(user.id, now)?;
        let outcome = self
            .store
            .rotate_refresh_token(
                ctx,
                claims.user_id,
                refresh_token,
                &refresh.token,
                refresh.expires_at,
            )
            .await?;
        if outcome == RotateOutcome::Stale {
            debug!(user_id = user.id, "refresh token lost rotation race");
            return Err(AuthError::RefreshTokenInvalid);
        }

        let access = self.issue_access_for(ctx, &user, now).await?;
        debug!(user_id = user.id, "refresh token rotated");
        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    async fn issue_access_for(
        &self,
        ctx: &CancellationToken,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        let permissions = self.permissions_for(ctx, user.role_id).await?;
        let access = self
            .issuer
            .issue_access_token(user.id, &user.email, &permissions, now)?;
        self.mark_live(ctx, user.id, &access, now).await?;
        Ok(access)
    }

    // -----------------------------------------------------------------------
    // OTP
    // -----------------------------------------------------------------------

    /// Store a fresh challenge for `identifier` and hand the code to the sender.
    pub async fn send_otp(
        &self,
        ctx: &CancellationToken,
        identifier: &str,
    ) -> Result<(), AuthError> {
        let identifier = normalize(identifier);
        if identifier.is_empty() {
            return Err(AuthError::Validation("identifier is required".into()));
        }
        let code = generate_code(self.config.otp_fixed_code.as_deref());
        self.cache
            .set(ctx, &self.config.otp_key(&identifier), &code, OTP_TTL)
            .await?;
        self.otp_sender
            .send(&identifier, &code)
            .await
            .map_err(|e| match e {
                AuthError::OtpDelivery(_) => e,
                other => AuthError::OtpDelivery(other.to_string()),
            })
    }

    /// Check a challenge code and sign in the phone's owner, if any.
    ///
    /// A wrong code leaves the challenge in place; a correct one consumes it.
    pub async fn confirm_otp(
        &self,
        ctx: &CancellationToken,
        identifier: &str,
        code: &str,
    ) -> Result<OtpConfirmation, AuthError> {
        let identifier = normalize(identifier);
        let code = normalize(code);
        if identifier.is_empty() || code.is_empty() {
            return Err(AuthError::Validation("identifier and code are required".into()));
        }

        let key = self.config.otp_key(&identifier);
        let stored = self
            .cache
            .get(ctx, &key)
            .await?
            .ok_or(AuthError::OtpInvalidOrExpired)?;
        if stored != code {
            return Err(AuthError::OtpMismatch);
        }
        // Only the caller that actually removes the challenge may use it.
        if !self.cache.delete(ctx, &key).await? {
            return Err(AuthError::OtpInvalidOrExpired);
        }

        let Some(user) = self.store.find_user_by_phone(ctx, &identifier).await? else {
            return Ok(OtpConfirmation {
                confirmed: true,
                registered: false,
                tokens: None,
            });
        };
        let tokens = self
            .create_token_pair(ctx, user.id, &user.email, Utc::now())
            .await?;
        info!(user_id = user.id, "user signed in with OTP");
        Ok(OtpConfirmation {
            confirmed: true,
            registered: true,
            tokens: Some(tokens),
        })
    }

    // -----------------------------------------------------------------------
    // Account management
    // -----------------------------------------------------------------------

    /// Revoke every refresh token of a user and drop the liveness marker.
    pub async fn revoke_all_sessions(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
    ) -> Result<u64, AuthError> {
        let revoked = self.store.revoke_all_refresh_tokens(ctx, user_id).await?;
        self.cache
            .delete(ctx, &self.config.access_token_key(user_id))
            .await?;
        info!(user_id, revoked, "all sessions revoked");
        Ok(revoked)
    }

    /// Soft-delete the account, then revoke all of its sessions.
    pub async fn delete_account(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
    ) -> Result<(), AuthError> {
        if !self.store.soft_delete_user(ctx, user_id).await? {
            return Err(AuthError::UserNotFound);
        }
        self.revoke_all_sessions(ctx, user_id).await?;
        info!(user_id, "account deleted");
        Ok(())
    }

    pub async fn profile(&self, ctx: &CancellationToken, user_id: i64) -> Result<User, AuthError> {
        self.store
            .find_user_by_id(ctx, user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn user_exists_by_email(
        &self,
        ctx: &CancellationToken,
        email: &str,
    ) -> Result<bool, AuthError> {
        Ok(self.store.user_exists_by_email(ctx, &normalize(email)).await?)
    }

    /// Delete refresh token rows past the configured retention window.
    pub async fn purge_refresh_tokens(&self, ctx: &CancellationToken) -> Result<u64, AuthError> {
        let purged = self
            .store
            .purge_refresh_tokens(ctx, self.config.refresh_token_retention)
            .await?;
        if purged > 0 {
            info!(purged, "purged old refresh tokens");
        }
        Ok(purged)
    }
}
