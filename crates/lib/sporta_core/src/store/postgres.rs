//! PostgreSQL-backed credential store.
//!
//! Refresh tokens are stored as SHA-256 digests; the raw token string never
//! reaches the database.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use super::{CredentialStore, RotateOutcome, StoreError, cancellable};
use crate::models::auth::{NewUser, RefreshTokenRecord, User, UserCredentials};

/// Postgres unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

const USER_COLUMNS: &str = "id, name, surname, gender, birth_date, height_cm, weight_kg, \
     sport_activity_level_id, town_id, role_id, phone_number, is_phone_verified, \
     email, is_email_verified, is_have_injury, injury_description, photo, \
     created_at, updated_at";

/// SHA-256 hash a refresh token for storage.
fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Map a unique violation to [`StoreError::Conflict`], anything else to `DbError`.
fn classify(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e
        && db.code().as_deref() == Some(UNIQUE_VIOLATION)
    {
        return StoreError::Conflict(db.message().to_string());
    }
    StoreError::DbError(e)
}

/// Credential store on a pooled Postgres connection.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create_user(
        &self,
        ctx: &CancellationToken,
        user: &NewUser,
    ) -> Result<i64, StoreError> {
        cancellable(ctx, async {
            let id = sqlx::query_scalar::<_, i64>(
                "INSERT INTO users (name, surname, gender, birth_date, height_cm, weight_kg, \
                 sport_activity_level_id, town_id, role_id, phone_number, email, password, \
                 is_have_injury, injury_description, photo) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, \
                 COALESCE($9, (SELECT id FROM roles WHERE name = 'guest')), \
                 $10, $11, $12, $13, $14, $15) \
                 RETURNING id",
            )
            .bind(&user.name)
            .bind(&user.surname)
            .bind(&user.gender)
            .bind(user.birth_date)
            .bind(user.height_cm)
            .bind(user.weight_kg)
            .bind(user.sport_activity_level_id)
            .bind(user.town_id)
            .bind(user.role_id)
            .bind(&user.phone_number)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.is_have_injury)
            .bind(&user.injury_description)
            .bind(&user.photo)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
            Ok(id)
        })
        .await
    }

    async fn find_user_by_id(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
    ) -> Result<Option<User>, StoreError> {
        cancellable(ctx, async {
            let sql =
                format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
            let user = sqlx::query_as::<_, User>(&sql)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(user)
        })
        .await
    }

    async fn find_user_by_email(
        &self,
        ctx: &CancellationToken,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        cancellable(ctx, async {
            let row = sqlx::query_as::<_, (i64, String, String)>(
                "SELECT id, email, password FROM users WHERE email = $1 AND deleted_at IS NULL",
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|(id, email, password_hash)| UserCredentials {
                id,
                email,
                password_hash,
            }))
        })
        .await
    }

    async fn find_user_by_phone(
        &self,
        ctx: &CancellationToken,
        phone: &str,
    ) -> Result<Option<User>, StoreError> {
        cancellable(ctx, async {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE phone_number = $1 AND deleted_at IS NULL"
            );
            let user = sqlx::query_as::<_, User>(&sql)
                .bind(phone)
                .fetch_optional(&self.pool)
                .await?;
            Ok(user)
        })
        .await
    }

    async fn user_exists_by_email(
        &self,
        ctx: &CancellationToken,
        email: &str,
    ) -> Result<bool, StoreError> {
        cancellable(ctx, async {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 AND deleted_at IS NULL)",
            )
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        })
        .await
    }

    async fn soft_delete_user(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
    ) -> Result<bool, StoreError> {
        cancellable(ctx, async {
            let result = sqlx::query(
                "UPDATE users SET deleted_at = now(), updated_at = now() \
                 WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(user_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn find_permissions_by_role(
        &self,
        ctx: &CancellationToken,
        role_id: i64,
    ) -> Result<Vec<String>, StoreError> {
        cancellable(ctx, async {
            let rows = sqlx::query_scalar::<_, String>(
                "SELECT p.name FROM role_permissions rp \
                 JOIN permissions p ON p.id = rp.permission_id \
                 WHERE rp.role_id = $1 \
                 ORDER BY p.name",
            )
            .bind(role_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn create_refresh_token(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        cancellable(ctx, async {
            sqlx::query(
                "INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3)",
            )
            .bind(user_id)
            .bind(hash_refresh_token(token))
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
            Ok(())
        })
        .await
    }

    async fn find_refresh_token(
        &self,
        ctx: &CancellationToken,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        cancellable(ctx, async {
            let row = sqlx::query_as::<
                _,
                (
                    i64,
                    i64,
                    DateTime<Utc>,
                    DateTime<Utc>,
                    Option<DateTime<Utc>>,
                ),
            >(
                "SELECT id, user_id, created_at, expires_at, revoked_at \
                 FROM refresh_tokens WHERE token_hash = $1",
            )
            .bind(hash_refresh_token(token))
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(
                |(id, user_id, created_at, expires_at, revoked_at)| RefreshTokenRecord {
                    id,
                    user_id,
                    created_at,
                    expires_at,
                    revoked_at,
                },
            ))
        })
        .await
    }

    async fn rotate_refresh_token(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
        old_token: &str,
        new_token: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<RotateOutcome, StoreError> {
        cancellable(ctx, async {
            let mut tx = self.pool.begin().await?;

            // A concurrent rotation blocks on the row lock, then re-checks
            // `revoked_at IS NULL` and matches nothing.
            let result = sqlx::query(
                "WITH revoked AS ( \
                     UPDATE refresh_tokens SET revoked_at = now() \
                     WHERE user_id = $1 AND token_hash = $2 \
                       AND revoked_at IS NULL AND expires_at > now() \
                     RETURNING id \
                 ) \
                 INSERT INTO refresh_tokens (user_id, token_hash, expires_at) \
                 SELECT $1, $3, $4 WHERE EXISTS (SELECT 1 FROM revoked)",
            )
            .bind(user_id)
            .bind(hash_refresh_token(old_token))
            .bind(hash_refresh_token(new_token))
            .bind(new_expires_at)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(RotateOutcome::Stale);
            }

            tx.commit().await?;
            Ok(RotateOutcome::Rotated)
        })
        .await
    }

    async fn revoke_refresh_token(
        &self,
        ctx: &CancellationToken,
        token: &str,
    ) -> Result<bool, StoreError> {
        cancellable(ctx, async {
            let result = sqlx::query(
                "UPDATE refresh_tokens SET revoked_at = now() \
                 WHERE token_hash = $1 AND revoked_at IS NULL",
            )
            .bind(hash_refresh_token(token))
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn revoke_all_refresh_tokens(
        &self,
        ctx: &CancellationToken,
        user_id: i64,
    ) -> Result<u64, StoreError> {
        cancellable(ctx, async {
            let result = sqlx::query(
                "UPDATE refresh_tokens SET revoked_at = now() \
                 WHERE user_id = $1 AND revoked_at IS NULL",
            )
            .bind(user_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn purge_refresh_tokens(
        &self,
        ctx: &CancellationToken,
        older_than: Duration,
    ) -> Result<u64, StoreError> {
        let secs = i64::try_from(older_than.as_secs()).unwrap_or(i64::MAX);
        cancellable(ctx, async {
            let result = sqlx::query(
                "DELETE FROM refresh_tokens \
                 WHERE (revoked_at IS NOT NULL AND revoked_at < now() - make_interval(secs => $1)) \
                    OR expires_at < now() - make_interval(secs => $1)",
            )
            .bind(secs as f64)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await
    }
}
