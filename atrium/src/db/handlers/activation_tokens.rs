//! Database repository for account activation tokens.

use chrono::Utc;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::password,
    config::Config,
    db::{
        errors::{DbError, Result},
        models::activation_tokens::{ActivationToken, ActivationTokenCreateRequest},
    },
    types::{abbrev_uuid, UserId},
};

pub struct ActivationTokens<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ActivationTokens<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    pub async fn create(&mut self, request: &ActivationTokenCreateRequest) -> Result<ActivationToken> {
        let token_hash = password::hash_string_with_params(&request.raw_token, Some(request.argon2_params))
            .map_err(|e| DbError::Other(anyhow::anyhow!(e)))?;

        let token = sqlx::query_as::<_, ActivationToken>(
            r#"
            INSERT INTO activation_tokens (email, user_id, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, user_id, token_hash, expires_at, created_at
            "#,
        )
        .bind(&request.email)
        .bind(request.user_id)
        .bind(&token_hash)
        .bind(request.expires_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(token)
    }

    /// Mint a token for a freshly provisioned account. Returns the raw token
    /// (for the activation link) alongside the stored row.
    #[instrument(skip(self, config), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn create_for_user(&mut self, user_id: UserId, email: &str, config: &Config) -> Result<(String, ActivationToken)> {
        let raw_token = password::generate_token();
        let expires_at = Utc::now()
            + chrono::Duration::from_std(config.auth.native.activation_token_duration).unwrap_or(chrono::Duration::hours(48));

        let request = ActivationTokenCreateRequest {
            email: email.to_string(),
            user_id,
            raw_token: raw_token.clone(),
            expires_at,
            argon2_params: config.auth.native.password.argon2_params(),
        };

        let token = self.create(&request).await?;
        Ok((raw_token, token))
    }

    /// Find a live token by ID and verify the raw token against its hash.
    /// Expired tokens are treated as absent.
    #[instrument(skip(self, raw_token), err)]
    pub async fn find_valid_token_by_id(&mut self, token_id: Uuid, raw_token: &str) -> Result<Option<ActivationToken>> {
        let token = sqlx::query_as::<_, ActivationToken>(
            "SELECT id, email, user_id, token_hash, expires_at, created_at FROM activation_tokens WHERE id = $1",
        )
        .bind(token_id)
        .fetch_optional(&mut *self.db)
        .await?;

        let Some(token) = token else {
            return Ok(None);
        };

        if Utc::now() > token.expires_at {
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

    /// Consume a token. Tokens are single-use; consumption deletes the row.
    #[instrument(skip(self), err)]
    pub async fn consume(&mut self, token_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM activation_tokens WHERE id = $1")
            .bind(token_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop any outstanding invitation for an email before issuing a new one.
    #[instrument(skip(self, email), err)]
    pub async fn delete_for_email(&mut self, email: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM activation_tokens WHERE email = $1")
            .bind(email)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
