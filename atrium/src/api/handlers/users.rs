use axum::{extract::State, Json};

use crate::{
    api::models::{
        profiles::{ProfileResponse, ProfileUpdate},
        users::{CurrentUser, RoleCreate, RoleResponse, RoleUpdate, UserResponse},
    },
    auth::permissions::{operation, resource, RequiresPermission},
    db::{
        handlers::{roles::RoleFilter, Profiles, Repository, Roles, Users},
        models::roles::{RoleCreateDBRequest, RoleUpdateDBRequest},
    },
    errors::{Error, Result},
    types::RoleId,
    AppState,
};

#[utoipa::path(
    get,
    path = "/users/current",
    tag = "users",
    responses(
        (status = 200, description = "The authenticated user", body = UserResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn current_user(State(state): State<AppState>, user: CurrentUser) -> Result<Json<UserResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut pool_conn);

    match repo.get_by_id(user.id).await? {
        Some(user) => Ok(Json(UserResponse::from(user))),
        None => Err(Error::NotFound {
            resource: "User".to_string(),
            detail: user.id.to_string(),
        }),
    }
}

#[utoipa::path(
    get,
    path = "/profile",
    tag = "profiles",
    responses(
        (status = 200, description = "The caller's profile", body = ProfileResponse),
        (status = 404, description = "Profile not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_profile(
    State(state): State<AppState>,
    user: RequiresPermission<resource::Profiles, operation::ReadOwn>,
) -> Result<Json<ProfileResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Profiles::new(&mut pool_conn);

    match repo.get_by_user(user.id).await? {
        Some(profile) => Ok(Json(ProfileResponse::from(profile))),
        None => Err(Error::NotFound {
            resource: "Profile".to_string(),
            detail: user.id.to_string(),
        }),
    }
}

#[utoipa::path(
    patch,
    path = "/profile",
    tag = "profiles",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Profile updated", body = ProfileResponse),
        (status = 404, description = "Profile not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    user: RequiresPermission<resource::Profiles, operation::UpdateOwn>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<ProfileResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Profiles::new(&mut pool_conn);

    let profile = repo.update(user.id, &update.into()).await?;
    Ok(Json(ProfileResponse::from(profile)))
}

#[utoipa::path(
    get,
    path = "/roles",
    tag = "roles",
    responses(
        (status = 200, description = "Role catalog", body = Vec<RoleResponse>),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_roles(State(state): State<AppState>, _user: CurrentUser) -> Result<Json<Vec<RoleResponse>>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Roles::new(&mut pool_conn);

    let roles = repo.list(&RoleFilter).await?;
    Ok(Json(roles.into_iter().map(RoleResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/roles",
    tag = "roles",
    request_body = RoleCreate,
    responses(
        (status = 201, description = "Role created", body = RoleResponse),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Role code already exists"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_role(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Roles, operation::CreateAll>,
    Json(create): Json<RoleCreate>,
) -> Result<(axum::http::StatusCode, Json<RoleResponse>)> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Roles::new(&mut pool_conn);

    let role = repo
        .create(&RoleCreateDBRequest {
            code: create.code,
            name: create.name,
            description: create.description,
        })
        .await?;

    Ok((axum::http::StatusCode::CREATED, Json(RoleResponse::from(role))))
}

#[utoipa::path(
    patch,
    path = "/roles/{id}",
    tag = "roles",
    request_body = RoleUpdate,
    params(("id" = uuid::Uuid, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role updated", body = RoleResponse),
        (status = 404, description = "Role not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_role(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<RoleId>,
    _: RequiresPermission<resource::Roles, operation::UpdateAll>,
    Json(update): Json<RoleUpdate>,
) -> Result<Json<RoleResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Roles::new(&mut pool_conn);

    let role = repo
        .update(
            id,
            &RoleUpdateDBRequest {
                name: update.name,
                description: update.description,
            },
        )
        .await?;

    Ok(Json(RoleResponse::from(role)))
}

#[utoipa::path(
    delete,
    path = "/roles/{id}",
    tag = "roles",
    params(("id" = uuid::Uuid, Path, description = "Role ID")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_role(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<RoleId>,
    _: RequiresPermission<resource::Roles, operation::DeleteAll>,
) -> Result<axum::http::StatusCode> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Roles::new(&mut pool_conn);

    if repo.delete(id).await? {
        Ok(axum::http::StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            resource: "Role".to_string(),
            detail: id.to_string(),
        })
    }
}
