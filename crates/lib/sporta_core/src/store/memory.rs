//! In-memory credential store.
//!
//! Behaves like the Postgres store (soft deletes, unique email/phone,
//! conditional rotation) without a database. Used by tests and local runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::{CredentialStore, RotateOutcome, StoreError};
use crate::models::auth::{NewUser, RefreshTokenRecord, User, UserCredentials};

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    password_hash: String,
    deleted_at: Option<DateTime<Utc>>,
}

impl StoredUser {
    fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<i64, StoredUser>,
    next_user_id: i64,
    role_permissions: HashMap<i64, Vec<String>>,
    default_role_id: Option<i64>,
    /// Keyed by the raw token string.
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
    next_token_id: i64,
}

impl State {
    fn insert_token(&mut self, user_id: i64, token: &str, expires_at: DateTime<Utc>) {
        self.next_token_id += 1;
        self.refresh_tokens.insert(
            token.to_string(),
            RefreshTokenRecord {
                id: self.next_token_id,
                user_id,
                created_at: Utc::now(),
                expires_at,
                revoked_at: None,
            },
        );
    }
}

/// Mutex-guarded credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: Mutex<State>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `permissions` to `role_id`.
    pub fn with_role<I, S>(self, role_id: i64, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut state = self.lock();
            let mut perms: Vec<String> = permissions.into_iter().map(Into::into).collect();
            perms.sort();
            state.role_permissions.insert(role_id, perms);
        }
        self
    }

    /// Role assigned to users registered without one.
    pub fn with_default_role(self, role_id: i64) -> Self {
        self.lock().default_role_id = Some(role_id);
        self
    }

    /// Move a token's stored expiry into the past, leaving its signature valid.
    pub fn expire_refresh_token(&self, token: &str) {
        if let Some(record) = self.lock().refresh_tokens.get_mut(token) {
            record.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }

    /// Number of unrevoked, unexpired refresh tokens held by a user.
    pub fn active_refresh_tokens(&self, user_id: i64) -> usize {
        let now = Utc::now();
        self.lock()
            .refresh_tokens
            .values()
            .filter(|r| r.user_id == user_id && !r.is_revoked() && !r.is_expired_at(now))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-write; the map is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn ensure_live(ctx: &CancellationToken) -> Result<(), StoreError> {
    if ctx.is_cancelled() {
        Err(StoreError::Cancelled)
    } else {
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create_user(
        &self,
        ctx: &CancellationToken,
        new_user: &NewUser,
    ) -> Result<i64, StoreError> {
        ensure_live(ctx)?;
        let mut state = self.lock();

        let taken = state.users.values().any(|u| {
            u.is_live()
                && (u.user.email == new_user.email || u.user.phone_number == new_user.phone_number)
        });
        if taken {
            return Err(StoreError::Conflict(
                "email or phone number already registered".into(),
            ));
        }

        state.next_user_id += 1;
        let id = state.next_user_id;
        let now = Utc::now();
        let role_id = new_user.role_id.or(state.default_role_id);
        let user = User {
            id,
            name: new_user.name.clone(),
            surname: new_user.surname.clone(),
            gender: new_user.gender.clone(),
            birth_date: new_user.birth_date,
            height_cm: new_user.height_cm,
            weight_kg: new_user.weight_kg,
            sport_activity_level_id: new_user.sport_activity_level_id,
            town_id: new_user.town_id,
            role_id,
            phone_number: new_user.phone_number.clone(),
            is_phone_verified: false,
            email: new_user.email.clone(),
            is_email_verified: false,
            is_have_injury: new_user.is_have_injury,
            injury_description: new_user.injury_description.clone(),
            photo: new_user.photo.clone(),
            created_at: now,
            updated_at: now,
        };
        state.users.insert(
            id,
            StoredUser {
                user,
                password_hash: new_user.password_hash.clone(),
                deleted_at: None,
            },
        );
        Ok(id)
    }

    async fn find_user_by_id(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
    ) -> Result<Option<User>, StoreError> {
        ensure_live(ctx)?;
        Ok(self
            .lock()
            .users
            .get(&user_id)
            .filter(|u| u.is_live())
            .map(|u| u.user.clone()))
    }

    async fn find_user_by_email(
        &self,
        ctx: &CancellationToken,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        ensure_live(ctx)?;
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.is_live() && u.user.email == email)
            .map(|u| UserCredentials {
                id: u.user.id,
                email: u.user.email.clone(),
                password_hash: u.password_hash.clone(),
            }))
    }

    async fn find_user_by_phone(
        &self,
        ctx: &CancellationToken,
        phone: &str,
    ) -> Result<Option<User>, StoreError> {
        ensure_live(ctx)?;
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.is_live() && u.user.phone_number == phone)
            .map(|u| u.user.clone()))
    }

    async fn user_exists_by_email(
        &self,
        ctx: &CancellationToken,
        email: &str,
    ) -> Result<bool, StoreError> {
        ensure_live(ctx)?;
        Ok(self
            .lock()
            .users
            .values()
            .any(|u| u.is_live() && u.user.email == email))
    }

    async fn soft_delete_user(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
    ) -> Result<bool, StoreError> {
        ensure_live(ctx)?;
        let mut state = self.lock();
        match state.users.get_mut(&user_id) {
            Some(stored) if stored.is_live() => {
                let now = Utc::now();
                stored.deleted_at = Some(now);
                stored.user.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_permissions_by_role(
        &self,
        ctx: &CancellationToken,
        role_id: i64,
    ) -> Result<Vec<String>, StoreError> {
        ensure_live(ctx)?;
        Ok(self
            .lock()
            .role_permissions
            .get(&role_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_refresh_token(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        ensure_live(ctx)?;
        let mut state = self.lock();
        if state.refresh_tokens.contains_key(token) {
            return Err(StoreError::Conflict("refresh token already stored".into()));
        }
        state.insert_token(user_id, token, expires_at);
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        ctx: &CancellationToken,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        ensure_live(ctx)?;
        Ok(self.lock().refresh_tokens.get(token).cloned())
    }

    async fn rotate_refresh_token(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
        old_token: &str,
        new_token: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<RotateOutcome, StoreError> {
        ensure_live(ctx)?;
        let now = Utc::now();
        // The whole check-revoke-insert runs under one lock acquisition.
        let mut state = self.lock();
        let Some(old) = state.refresh_tokens.get_mut(old_token) else {
            return Ok(RotateOutcome::Stale);
        };
        if old.user_id != user_id || old.is_revoked() || old.is_expired_at(now) {
            return Ok(RotateOutcome::Stale);
        }
        old.revoked_at = Some(now);
        state.insert_token(user_id, new_token, new_expires_at);
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke_refresh_token(
        &self,
        ctx: &CancellationToken,
        token: &str,
    ) -> Result<bool, StoreError> {
        ensure_live(ctx)?;
        match self.lock().refresh_tokens.get_mut(token) {
            Some(record) if !record.is_revoked() => {
                record.revoked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_refresh_tokens(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
    ) -> Result<u64, StoreError> {
        ensure_live(ctx)?;
        let now = Utc::now();
        let mut revoked = 0;
        for record in self.lock().refresh_tokens.values_mut() {
            if record.user_id == user_id && !record.is_revoked() {
                record.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_refresh_tokens(
        &self,
        ctx: &CancellationToken,
        older_than: Duration,
    ) -> Result<u64, StoreError> {
        ensure_live(ctx)?;
        let window = chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut state = self.lock();
        let before = state.refresh_tokens.len();
        state.refresh_tokens.retain(|_, r| {
            let revoked_long_ago = r.revoked_at.is_some_and(|at| at < cutoff);
            !(revoked_long_ago || r.expires_at < cutoff)
        });
        Ok((before - state.refresh_tokens.len()) as u64)
    }
}
