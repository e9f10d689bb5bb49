//! PostgreSQL implementation of [`TokenStore`].
//!
//! Expects the `validation_tokens` table from `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use super::{TokenStore, used_token_cutoff};
use crate::auth::{AuthError, AuthResult};
use crate::context::ClientContext;
use crate::token::{NewToken, TokenKind, ValidationToken};
use crate::users::UserId;

const COLUMNS: &str = "id, validation_id, secret, kind, user_id, email, context, \
                       created_at, expires_at, used_at, attempts, max_attempts";

/// Token store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn token_from_row(r: &PgRow) -> AuthResult<ValidationToken> {
    let kind: String = r.get("kind");
    let kind = kind
        .parse::<TokenKind>()
        .map_err(|e| AuthError::Store(e.to_string()))?;
    let Json(context): Json<ClientContext> = r.get("context");

    Ok(ValidationToken {
        id: r.get("id"),
        validation_id: r.get("validation_id"),
        secret: r.get("secret"),
        kind,
        user_id: r.get("user_id"),
        email: r.get("email"),
        created_at: r.get("created_at"),
        expires_at: r.get("expires_at"),
        used_at: r.get("used_at"),
        attempts: r.get("attempts"),
        max_attempts: r.get("max_attempts"),
        context,
    })
}

fn optional_token(row: Option<PgRow>) -> AuthResult<Option<ValidationToken>> {
    row.as_ref().map(token_from_row).transpose()
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, token: NewToken) -> AuthResult<ValidationToken> {
        let row = sqlx::query(
            r#"
            INSERT INTO validation_tokens
                (validation_id, secret, kind, user_id, email, context,
                 created_at, expires_at, attempts, max_attempts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9)
            RETURNING id
            "#,
        )
        .bind(&token.validation_id)
        .bind(&token.secret)
        .bind(token.kind.as_str())
        .bind(token.user_id)
        .bind(&token.email)
        .bind(Json(&token.context))
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.max_attempts)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AuthError::TokenCollision
            }
            other => AuthError::Database(other),
        })?;

        Ok(token.into_token(row.get("id")))
    }

    async fn find_by_validation_id(
        &self,
        validation_id: &str,
    ) -> AuthResult<Option<ValidationToken>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM validation_tokens WHERE validation_id = $1"
        ))
        .bind(validation_id)
        .fetch_optional(&self.pool)
        .await?;

        optional_token(row)
    }

    async fn find_latest_for_user(
        &self,
        user_id: UserId,
        kind: TokenKind,
    ) -> AuthResult<Option<ValidationToken>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM validation_tokens
             WHERE user_id = $1 AND kind = $2
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        optional_token(row)
    }

    async fn try_record_attempt(
        &self,
        validation_id: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<ValidationToken>> {
        // Row-level compare-and-increment: the ceiling check and the write
        // are one statement.
        let row = sqlx::query(&format!(
            "UPDATE validation_tokens
             SET attempts = attempts + 1
             WHERE validation_id = $1
               AND used_at IS NULL
               AND expires_at >= $2
               AND attempts < max_attempts
             RETURNING {COLUMNS}"
        ))
        .bind(validation_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        optional_token(row)
    }

    async fn try_mark_used(
        &self,
        validation_id: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<ValidationToken>> {
        let row = sqlx::query(&format!(
            "UPDATE validation_tokens
             SET used_at = $2
             WHERE validation_id = $1
               AND used_at IS NULL
               AND expires_at >= $2
             RETURNING {COLUMNS}"
        ))
        .bind(validation_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        optional_token(row)
    }

    async fn release_claim(&self, validation_id: &str, used_at: DateTime<Utc>) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE validation_tokens SET used_at = NULL
             WHERE validation_id = $1 AND used_at = $2",
        )
        .bind(validation_id)
        .bind(used_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, validation_id: &str) -> AuthResult<bool> {
        let result = sqlx::query("DELETE FROM validation_tokens WHERE validation_id = $1")
            .bind(validation_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_unused_for_user(&self, user_id: UserId, kind: TokenKind) -> AuthResult<u64> {
        let result = sqlx::query(
            "DELETE FROM validation_tokens
             WHERE user_id = $1 AND kind = $2 AND used_at IS NULL",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let result = sqlx::query(
            "DELETE FROM validation_tokens
             WHERE (used_at IS NULL AND expires_at < $1)
                OR (used_at IS NOT NULL AND expires_at < $2)",
        )
        .bind(now)
        .bind(used_token_cutoff(now))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> AuthResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
