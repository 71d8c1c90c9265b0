//! Database repository for moderation teams and memberships.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::teams::{TeamCreateDBRequest, TeamDBResponse, TeamMemberDBResponse, TeamMembershipCreateDBRequest, TeamUpdateDBRequest},
};
use crate::types::{abbrev_uuid, TeamId, UserId};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing teams
#[derive(Debug, Clone)]
pub struct TeamFilter {
    pub skip: i64,
    pub limit: i64,
}

impl TeamFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }
}

pub struct Teams<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Teams<'c> {
    type CreateRequest = TeamCreateDBRequest;
    type UpdateRequest = TeamUpdateDBRequest;
    type Response = TeamDBResponse;
    type Id = TeamId;
    type Filter = TeamFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let team = sqlx::query_as::<_, TeamDBResponse>(
            "INSERT INTO teams (id, name, description) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.description)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(team)
    }

    #[instrument(skip(self), fields(team_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let team = sqlx::query_as::<_, TeamDBResponse>("SELECT * FROM teams WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(team)
    }

    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let teams = sqlx::query_as::<_, TeamDBResponse>("SELECT * FROM teams WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(teams.into_iter().map(|t| (t.id, t)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let teams = sqlx::query_as::<_, TeamDBResponse>("SELECT * FROM teams ORDER BY name LIMIT $1 OFFSET $2")
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(teams)
    }

    #[instrument(skip(self), fields(team_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(team_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let team = sqlx::query_as::<_, TeamDBResponse>(
            r#"
            UPDATE teams SET
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

        Ok(team)
    }
}

impl<'c> Teams<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(team_id = %abbrev_uuid(&request.team_id)), err)]
    pub async fn add_member(&mut self, request: &TeamMembershipCreateDBRequest) -> Result<TeamMemberDBResponse> {
        let membership_id: Uuid = sqlx::query_scalar(
            "INSERT INTO team_memberships (team_id, user_id, role_id) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(request.team_id)
        .bind(request.user_id)
        .bind(request.role_id)
        .fetch_one(&mut *self.db)
        .await?;

        self.get_member(membership_id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), err)]
    async fn get_member(&mut self, membership_id: Uuid) -> Result<Option<TeamMemberDBResponse>> {
        let member = sqlx::query_as::<_, TeamMemberDBResponse>(
            r#"
            SELECT m.id, m.team_id, m.user_id, u.first_name, u.last_name, u.email, u.is_active,
                   r.code AS role_code, r.name AS role_name, m.joined_at
            FROM team_memberships m
            JOIN users u ON u.id = m.user_id
            JOIN roles r ON r.id = m.role_id
            WHERE m.id = $1
            "#,
        )
        .bind(membership_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(member)
    }

    /// Members of a team with their account and role details.
    #[instrument(skip(self), fields(team_id = %abbrev_uuid(&team_id)), err)]
    pub async fn list_members(&mut self, team_id: TeamId) -> Result<Vec<TeamMemberDBResponse>> {
        let members = sqlx::query_as::<_, TeamMemberDBResponse>(
            r#"
            SELECT m.id, m.team_id, m.user_id, u.first_name, u.last_name, u.email, u.is_active,
                   r.code AS role_code, r.name AS role_name, m.joined_at
            FROM team_memberships m
            JOIN users u ON u.id = m.user_id
            JOIN roles r ON r.id = m.role_id
            WHERE m.team_id = $1
            ORDER BY m.joined_at
            "#,
        )
        .bind(team_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(members)
    }

    #[instrument(skip(self), fields(team_id = %abbrev_uuid(&team_id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn remove_member(&mut self, team_id: TeamId, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM team_memberships WHERE team_id = $1 AND user_id = $2")
            .bind(team_id)
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::repository::Repository;
    use super::*;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_membership_is_unique_per_team(pool: PgPool) {
        let user = crate::test_utils::create_test_user(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        let role_id = {
            let mut roles = super::super::roles::Roles::new(&mut conn);
            roles.get_by_code("moderator").await.unwrap().unwrap().id
        };

        let mut repo = Teams::new(&mut conn);
        let team = repo
            .create(&TeamCreateDBRequest {
                name: "Safety".to_string(),
                description: "Content review".to_string(),
            })
            .await
            .unwrap();

        let request = TeamMembershipCreateDBRequest {
            team_id: team.id,
            user_id: user.id,
            role_id,
        };

        let member = repo.add_member(&request).await.unwrap();
        assert_eq!(member.role_code, "moderator");
        assert_eq!(member.email, user.email);

        let err = repo.add_member(&request).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        assert!(repo.remove_member(team.id, user.id).await.unwrap());
        assert!(repo.list_members(team.id).await.unwrap().is_empty());
    }
}
