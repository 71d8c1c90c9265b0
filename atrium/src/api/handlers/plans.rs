use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    api::models::plans::{PlanCreate, PlanResponse, PlanUpdate},
    auth::permissions::{operation, resource, RequiresPermission},
    db::handlers::{plans::PlanFilter, Plans, Repository},
    errors::{Error, Result},
    types::PlanId,
    AppState,
};

/// Public plan catalog: active plans only.
#[utoipa::path(
    get,
    path = "/plans",
    tag = "plans",
    responses(
        (status = 200, description = "Available membership plans", body = Vec<PlanResponse>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<PlanResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Plans::new(&mut conn);

    let plans = repo.list(&PlanFilter::active()).await?;
    Ok(Json(plans.into_iter().map(PlanResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/plans",
    tag = "plans",
    request_body = PlanCreate,
    responses(
        (status = 201, description = "Plan created", body = PlanResponse),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "A plan with this price already exists"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_plan(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Plans, operation::CreateAll>,
    Json(create): Json<PlanCreate>,
) -> Result<(StatusCode, Json<PlanResponse>)> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Plans::new(&mut conn);

    let plan = repo.create(&create.into()).await?;
    Ok((StatusCode::CREATED, Json(PlanResponse::from(plan))))
}

#[utoipa::path(
    patch,
    path = "/plans/{id}",
    tag = "plans",
    request_body = PlanUpdate,
    params(("id" = uuid::Uuid, Path, description = "Plan ID")),
    responses(
        (status = 200, description = "Plan updated", body = PlanResponse),
        (status = 404, description = "Plan not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_plan(
    State(state): State<AppState>,
    Path(id): Path<PlanId>,
    _: RequiresPermission<resource::Plans, operation::UpdateAll>,
    Json(update): Json<PlanUpdate>,
) -> Result<Json<PlanResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Plans::new(&mut conn);

    let plan = repo.update(id, &update.into()).await?;
    Ok(Json(PlanResponse::from(plan)))
}
