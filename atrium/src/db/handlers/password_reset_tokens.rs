//! Database repository for password reset tokens.

use chrono::Utc;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::password,
    config::Config,
    db::{
        errors::{DbError, Result},
        models::password_reset_tokens::{PasswordResetToken, PasswordResetTokenCreateRequest},
    },
    types::{abbrev_uuid, UserId},
};

pub struct PasswordResetTokens<'c> {
    db: &'c mut PgConnection,
}

impl<'c> PasswordResetTokens<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), err)]
    pub async fn create(&mut self, request: &PasswordResetTokenCreateRequest) -> Result<PasswordResetToken> {
        let token_hash = password::hash_string_with_params(&request.raw_token, Some(request.argon2_params))
            .map_err(|e| DbError::Other(anyhow::anyhow!(e)))?;

        let token = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            INSERT INTO password_reset_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token_hash, expires_at, created_at, used_at
            "#,
        )
        .bind(request.user_id)
        .bind(&token_hash)
        .bind(request.expires_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(token)
    }

    /// Create a password reset token for a user
    #[instrument(skip(self, config), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn create_for_user(&mut self, user_id: UserId, config: &Config) -> Result<(String, PasswordResetToken)> {
        let raw_token = password::generate_token();
        let expires_at = Utc::now()
            + chrono::Duration::from_std(config.auth.native.password_reset_token_duration).unwrap_or(chrono::Duration::minutes(30));

        let request = PasswordResetTokenCreateRequest {
            user_id,
            raw_token: raw_token.clone(),
            expires_at,
            argon2_params: config.auth.native.password.argon2_params(),
        };

        let token = self.create(&request).await?;
        Ok((raw_token, token))
    }

    /// Find a valid token by ID and verify the raw token
    #[instrument(skip(self, raw_token), err)]
    pub async fn find_valid_token_by_id(&mut self, token_id: Uuid, raw_token: &str) -> Result<Option<PasswordResetToken>> {
        let token = sqlx::query_as::<_, PasswordResetToken>(
            "SELECT id, user_id, token_hash, expires_at, created_at, used_at FROM password_reset_tokens WHERE id = $1",
        )
        .bind(token_id)
        .fetch_optional(&mut *self.db)
        .await?;

        let Some(token) = token else {
            return Ok(None);
        };

        // Valid means unused and unexpired
        if token.used_at.is_some() || Utc::now() > token.expires_at {
            return Ok(None);
        }

        match password::verify_string(raw_token, &token.token_hash) {
            Ok(true) => Ok(Some(token)),
            Ok(false) => Ok(None),
            Err(e) => {
                tracing::error!("Token verification error for token {}: {:?}", token_id, e);
                Ok(None)
            }
        }
    }

    /// Invalidate all tokens for a user
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn invalidate_for_user(&mut self, user_id: UserId) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE password_reset_tokens SET used_at = NOW() WHERE user_id = $1 AND used_at IS NULL",
        )
        .bind(user_id)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_reset_token_single_use(pool: PgPool) {
        let config = crate::test_utils::create_test_config();
        let user = crate::test_utils::create_test_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = PasswordResetTokens::new(&mut conn);

        let (raw, token) = repo.create_for_user(user.id, &config).await.unwrap();
        assert!(repo.find_valid_token_by_id(token.id, &raw).await.unwrap().is_some());

        let invalidated = repo.invalidate_for_user(user.id).await.unwrap();
        assert_eq!(invalidated, 1);
        assert!(repo.find_valid_token_by_id(token.id, &raw).await.unwrap().is_none());
    }
}
