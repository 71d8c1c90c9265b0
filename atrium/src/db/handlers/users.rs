//! Database repository for users.

use crate::types::{abbrev_uuid, UserId};
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing users
#[derive(Debug, Clone)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
    pub is_admin: Option<bool>,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            is_admin: None,
        }
    }

    pub fn admins() -> Self {
        Self {
            skip: 0,
            limit: 1000,
            is_admin: Some(true),
        }
    }
}

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let user_id = Uuid::new_v4();

        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            INSERT INTO users (id, email, first_name, last_name, is_active, is_admin, role_id, invited_by, auth_source, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&request.email)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(request.is_active)
        .bind(request.is_admin)
        .bind(request.role_id)
        .bind(request.invited_by)
        .bind(&request.auth_source)
        .bind(&request.password_hash)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<UserId>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let users = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let users = sqlx::query_as::<_, UserDBResponse>(
            r#"
            SELECT * FROM users
            WHERE ($3::boolean IS NULL OR is_admin = $3)
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(filter.limit)
        .bind(filter.skip)
        .bind(filter.is_admin)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(users)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        // Atomic update with conditional field updates
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                is_active = COALESCE($4, is_active),
                role_id = COALESCE($5, role_id),
                password_hash = COALESCE($6, password_hash),
                last_login = COALESCE($7, last_login),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(request.is_active)
        .bind(request.role_id)
        .bind(&request.password_hash)
        .bind(request.last_login)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(user)
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    /// Every account with administrative capability, for notification fan-out.
    #[instrument(skip(self), err)]
    pub async fn list_admins(&mut self) -> Result<Vec<UserDBResponse>> {
        self.list(&UserFilter::admins()).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::repository::Repository;
    use super::*;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_fetch_user(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let request = UserCreateDBRequest {
            email: "test@example.com".to_string(),
            first_name: "Test".to_string(),
            last_name: "Member".to_string(),
            is_active: false,
            is_admin: false,
            role_id: None,
            invited_by: None,
            auth_source: "native".to_string(),
            password_hash: None,
        };

        let user = repo.create(&request).await.unwrap();
        assert_eq!(user.email, "test@example.com");
        assert!(!user.is_active);

        let found = repo.get_user_by_email("test@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.full_name(), "Test Member");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_email_is_unique_violation(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let request = UserCreateDBRequest {
            email: "dup@example.com".to_string(),
            first_name: "First".to_string(),
            last_name: "User".to_string(),
            is_active: true,
            is_admin: false,
            role_id: None,
            invited_by: None,
            auth_source: "native".to_string(),
            password_hash: None,
        };

        repo.create(&request).await.unwrap();
        let err = repo.create(&request).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_admins_filters(pool: PgPool) {
        let admin = crate::test_utils::create_test_admin_user(&pool).await;
        let _member = crate::test_utils::create_test_user(&pool).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);
        let admins = repo.list_admins().await.unwrap();

        assert!(admins.iter().any(|u| u.id == admin.id));
        assert!(admins.iter().all(|u| u.is_admin));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_activation_update(pool: PgPool) {
        let user = crate::test_utils::create_test_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let updated = repo
            .update(
                user.id,
                &UserUpdateDBRequest {
                    is_active: Some(true),
                    password_hash: Some("fake-hash".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(updated.is_active);
        assert_eq!(updated.password_hash.as_deref(), Some("fake-hash"));
        // Untouched fields survive
        assert_eq!(updated.email, user.email);
    }
}
