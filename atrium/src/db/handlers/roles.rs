//! Database repository for the role catalog.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::roles::{RoleCreateDBRequest, RoleDBResponse, RoleUpdateDBRequest},
};
use crate::types::{abbrev_uuid, RoleId};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;

/// Roles are a small catalog; listing is unpaginated.
#[derive(Debug, Clone, Default)]
pub struct RoleFilter;

pub struct Roles<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Roles<'c> {
    type CreateRequest = RoleCreateDBRequest;
    type UpdateRequest = RoleUpdateDBRequest;
    type Response = RoleDBResponse;
    type Id = RoleId;
    type Filter = RoleFilter;

    #[instrument(skip(self, request), fields(code = %request.code), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let role = sqlx::query_as::<_, RoleDBResponse>(
            "INSERT INTO roles (code, name, description) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&request.code)
        .bind(&request.name)
        .bind(&request.description)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(role)
    }

    #[instrument(skip(self), fields(role_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let role = sqlx::query_as::<_, RoleDBResponse>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(role)
    }

    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let roles = sqlx::query_as::<_, RoleDBResponse>("SELECT * FROM roles WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(roles.into_iter().map(|r| (r.id, r)).collect())
    }

    #[instrument(skip_all, err)]
    async fn list(&mut self, _filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let roles = sqlx::query_as::<_, RoleDBResponse>("SELECT * FROM roles ORDER BY code")
            .fetch_all(&mut *self.db)
            .await?;

        Ok(roles)
    }

    #[instrument(skip(self), fields(role_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(role_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let role = sqlx::query_as::<_, RoleDBResponse>(
            r#"
            UPDATE roles SET
                name = COALESCE($2, name),
                description = COALESCE($3, description)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.description)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(role)
    }
}

impl<'c> Roles<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, code), err)]
    pub async fn get_by_code(&mut self, code: &str) -> Result<Option<RoleDBResponse>> {
        let role = sqlx::query_as::<_, RoleDBResponse>("SELECT * FROM roles WHERE code = $1")
            .bind(code)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::super::repository::Repository;
    use super::*;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_seeded_roles_present(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Roles::new(&mut conn);

        let member = repo.get_by_code("member").await.unwrap();
        assert!(member.is_some());
        let moderator = repo.get_by_code("moderator").await.unwrap();
        assert!(moderator.is_some());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_list(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Roles::new(&mut conn);

        repo.create(&RoleCreateDBRequest {
            code: "curator".to_string(),
            name: "Curator".to_string(),
            description: None,
        })
        .await
        .unwrap();

        let roles = repo.list(&RoleFilter).await.unwrap();
        assert!(roles.iter().any(|r| r.code == "curator"));
    }
}
