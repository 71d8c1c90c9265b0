//! Database repository for membership plans.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::plans::{PlanCreateDBRequest, PlanDBResponse, PlanUpdateDBRequest},
};
use crate::types::{abbrev_uuid, PlanId};
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing plans
#[derive(Debug, Clone)]
pub struct PlanFilter {
    pub only_active: bool,
}

impl PlanFilter {
    pub fn active() -> Self {
        Self { only_active: true }
    }

    pub fn all() -> Self {
        Self { only_active: false }
    }
}

pub struct Plans<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Plans<'c> {
    type CreateRequest = PlanCreateDBRequest;
    type UpdateRequest = PlanUpdateDBRequest;
    type Response = PlanDBResponse;
    type Id = PlanId;
    type Filter = PlanFilter;

    #[instrument(skip(self, request), fields(price_id = %request.price_id), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let plan = sqlx::query_as::<_, PlanDBResponse>(
            r#"
            INSERT INTO plans (id, title, description, price_id, amount_minor, currency, billing_interval, features, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.price_id)
        .bind(request.amount_minor)
        .bind(&request.currency)
        .bind(&request.billing_interval)
        .bind(&request.features)
        .bind(request.is_active)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(plan)
    }

    #[instrument(skip(self), fields(plan_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let plan = sqlx::query_as::<_, PlanDBResponse>("SELECT * FROM plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(plan)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let plans = sqlx::query_as::<_, PlanDBResponse>("SELECT * FROM plans WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(plans.into_iter().map(|p| (p.id, p)).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let plans = sqlx::query_as::<_, PlanDBResponse>(
            "SELECT * FROM plans WHERE ($1 = FALSE OR is_active) ORDER BY amount_minor ASC",
        )
        .bind(filter.only_active)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(plans)
    }

    #[instrument(skip(self), fields(plan_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM plans WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(plan_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let plan = sqlx::query_as::<_, PlanDBResponse>(
            r#"
            UPDATE plans SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                amount_minor = COALESCE($4, amount_minor),
                billing_interval = COALESCE($5, billing_interval),
                features = COALESCE($6, features),
                is_active = COALESCE($7, is_active)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.amount_minor)
        .bind(&request.billing_interval)
        .bind(&request.features)
        .bind(request.is_active)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(plan)
    }
}

impl<'c> Plans<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Resolve a plan by the processor's price id (webhook path).
    #[instrument(skip(self, price_id), err)]
    pub async fn get_by_price_id(&mut self, price_id: &str) -> Result<Option<PlanDBResponse>> {
        let plan = sqlx::query_as::<_, PlanDBResponse>("SELECT * FROM plans WHERE price_id = $1")
            .bind(price_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(plan)
    }
}
