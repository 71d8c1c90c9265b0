use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    admission,
    api::models::applicants::{
        ApplicantResponse, ApplicantSubmission, ExistsQuery, ExistsResponse, ListApplicantsQuery, RejectRequest,
        RejectionReasonResponse,
    },
    auth::permissions::{operation, resource, RequiresPermission},
    db::handlers::{applicants::ApplicantFilter, Applicants, Repository},
    email::EmailService,
    errors::{Error, Result},
    types::ApplicantId,
    AppState,
};

/// Public waiting-list submission.
#[utoipa::path(
    post,
    path = "/waitinglist",
    tag = "waitinglist",
    request_body = ApplicantSubmission,
    responses(
        (status = 201, description = "Application received", body = ApplicantResponse),
        (status = 400, description = "Missing or malformed fields"),
        (status = 409, description = "An approved application already exists for this email"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn submit(
    State(state): State<AppState>,
    Json(submission): Json<ApplicantSubmission>,
) -> Result<(StatusCode, Json<ApplicantResponse>)> {
    let request = submission.into();
    let applicant = admission::submit(&state.db, &state.notifier, &request).await?;
    Ok((StatusCode::CREATED, Json(ApplicantResponse::from(applicant))))
}

/// Public predicate: has this email already been approved? Clients use it to
/// avoid duplicate submissions before hitting the submit path.
#[utoipa::path(
    get,
    path = "/waitinglist/exists",
    tag = "waitinglist",
    params(ExistsQuery),
    responses(
        (status = 200, description = "Whether an approved entry exists", body = ExistsResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn check_existing(State(state): State<AppState>, Query(query): Query<ExistsQuery>) -> Result<Json<ExistsResponse>> {
    let exists = admission::check_existing(&state.db, &query.email).await?;
    Ok(Json(ExistsResponse { exists }))
}

#[utoipa::path(
    get,
    path = "/waitinglist",
    tag = "waitinglist",
    params(ListApplicantsQuery),
    responses(
        (status = 200, description = "Waiting-list entries", body = Vec<ApplicantResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_applicants(
    State(state): State<AppState>,
    Query(query): Query<ListApplicantsQuery>,
    _: RequiresPermission<resource::Applicants, operation::ReadAll>,
) -> Result<Json<Vec<ApplicantResponse>>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Applicants::new(&mut pool_conn);

    let mut filter = ApplicantFilter::new(query.pagination.skip(), query.pagination.limit());
    if let Some(status) = query.status {
        filter = filter.with_status(status);
    }

    let applicants = repo.list(&filter).await?;
    Ok(Json(applicants.into_iter().map(ApplicantResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/waitinglist/{id}",
    tag = "waitinglist",
    params(("id" = uuid::Uuid, Path, description = "Applicant ID")),
    responses(
        (status = 200, description = "Applicant detail", body = ApplicantResponse),
        (status = 404, description = "Applicant not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_applicant(
    State(state): State<AppState>,
    Path(id): Path<ApplicantId>,
    _: RequiresPermission<resource::Applicants, operation::ReadAll>,
) -> Result<Json<ApplicantResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Applicants::new(&mut pool_conn);

    match repo.get_by_id(id).await? {
        Some(applicant) => Ok(Json(ApplicantResponse::from(applicant))),
        None => Err(Error::NotFound {
            resource: "Applicant".to_string(),
            detail: id.to_string(),
        }),
    }
}

/// Approve a pending applicant: provisions the inactive account and emails
/// the activation link.
#[utoipa::path(
    post,
    path = "/waitinglist/{id}/approve",
    tag = "waitinglist",
    params(("id" = uuid::Uuid, Path, description = "Applicant ID")),
    responses(
        (status = 200, description = "Applicant approved, activation email sent"),
        (status = 404, description = "Applicant not found"),
        (status = 409, description = "Already processed, or an account already exists"),
        (status = 502, description = "Approval committed but the activation email could not be delivered"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn approve_applicant(
    State(state): State<AppState>,
    Path(id): Path<ApplicantId>,
    reviewer: RequiresPermission<resource::Applicants, operation::UpdateAll>,
) -> Result<Json<serde_json::Value>> {
    let email_service = EmailService::new(&state.config)?;
    let member = admission::approve(&state.db, &email_service, &state.config, id, reviewer.id).await?;

    Ok(Json(serde_json::json!({
        "status": "approved",
        "user_id": member.user.id,
        "email": member.user.email,
        "message": "Activation email sent",
    })))
}

/// Reject a pending applicant with a catalog reason.
#[utoipa::path(
    post,
    path = "/waitinglist/{id}/reject",
    tag = "waitinglist",
    request_body = RejectRequest,
    params(("id" = uuid::Uuid, Path, description = "Applicant ID")),
    responses(
        (status = 200, description = "Applicant rejected", body = ApplicantResponse),
        (status = 400, description = "Unknown rejection reason"),
        (status = 409, description = "Already processed"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn reject_applicant(
    State(state): State<AppState>,
    Path(id): Path<ApplicantId>,
    reviewer: RequiresPermission<resource::Applicants, operation::UpdateAll>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<ApplicantResponse>> {
    let email_service = EmailService::new(&state.config)?;
    let applicant = admission::reject(
        &state.db,
        &email_service,
        id,
        reviewer.id,
        request.reason_id,
        request.notes.as_deref(),
    )
    .await?;

    Ok(Json(ApplicantResponse::from(applicant)))
}

/// The rejection reason catalog, for the review UI.
#[utoipa::path(
    get,
    path = "/waitinglist/rejection-reasons",
    tag = "waitinglist",
    responses(
        (status = 200, description = "Rejection reason catalog", body = Vec<RejectionReasonResponse>),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_rejection_reasons(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Applicants, operation::ReadAll>,
) -> Result<Json<Vec<RejectionReasonResponse>>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Applicants::new(&mut pool_conn);

    let reasons = repo.list_rejection_reasons().await?;
    Ok(Json(reasons.into_iter().map(RejectionReasonResponse::from).collect()))
}
