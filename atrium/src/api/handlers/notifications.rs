use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{
    api::models::{
        notifications::{MarkReadResponse, NotificationResponse},
        pagination::Pagination,
        users::CurrentUser,
    },
    db::handlers::Notifications,
    errors::{Error, Result},
    types::NotificationId,
    AppState,
};

#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notifications",
    params(Pagination),
    responses(
        (status = 200, description = "The caller's notifications, newest first", body = Vec<NotificationResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn list_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<NotificationResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Notifications::new(&mut conn);

    let notifications = repo
        .list_for_recipient(user.id, pagination.skip(), pagination.limit())
        .await?;
    Ok(Json(notifications.into_iter().map(NotificationResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    tag = "notifications",
    params(("id" = uuid::Uuid, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification marked read", body = MarkReadResponse),
        (status = 404, description = "Not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<NotificationId>,
) -> Result<Json<MarkReadResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Notifications::new(&mut conn);

    if repo.mark_read(id, user.id).await? {
        Ok(Json(MarkReadResponse {
            status: "ok".to_string(),
            updated: 1,
        }))
    } else {
        Err(Error::NotFound {
            resource: "Notification".to_string(),
            detail: id.to_string(),
        })
    }
}

/// Mark every unread notification read. Idempotent: a second call reports
/// zero updates.
#[utoipa::path(
    post,
    path = "/notifications/read-all",
    tag = "notifications",
    responses(
        (status = 200, description = "All notifications marked read", body = MarkReadResponse),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn mark_all_read(State(state): State<AppState>, user: CurrentUser) -> Result<Json<MarkReadResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Notifications::new(&mut conn);

    let updated = repo.mark_all_read(user.id).await?;
    Ok(Json(MarkReadResponse {
        status: "ok".to_string(),
        updated,
    }))
}
