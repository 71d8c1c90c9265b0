use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    admission,
    api::models::{
        pagination::Pagination,
        teams::{ModeratorInvite, ModeratorInviteResponse, TeamCreate, TeamMemberAdd, TeamMemberResponse, TeamResponse, TeamUpdate},
    },
    auth::permissions::{operation, resource, RequiresPermission},
    db::{
        handlers::{teams::TeamFilter, ActivationTokens, Profiles, Repository, Roles, Teams, Users},
        models::{
            roles::MODERATOR_ROLE_CODE,
            teams::TeamMembershipCreateDBRequest,
            users::UserCreateDBRequest,
        },
    },
    email::EmailService,
    errors::{Error, Result},
    types::{TeamId, UserId},
    AppState,
};

#[utoipa::path(
    get,
    path = "/teams",
    tag = "teams",
    params(Pagination),
    responses(
        (status = 200, description = "Moderation teams", body = Vec<TeamResponse>),
        (status = 403, description = "Forbidden"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_teams(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    _: RequiresPermission<resource::Teams, operation::ReadAll>,
) -> Result<Json<Vec<TeamResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Teams::new(&mut conn);

    let teams = repo.list(&TeamFilter::new(pagination.skip(), pagination.limit())).await?;
    Ok(Json(teams.into_iter().map(TeamResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/teams",
    tag = "teams",
    request_body = TeamCreate,
    responses(
        (status = 201, description = "Team created", body = TeamResponse),
        (status = 409, description = "Team name already exists"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_team(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Teams, operation::CreateAll>,
    Json(create): Json<TeamCreate>,
) -> Result<(StatusCode, Json<TeamResponse>)> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Teams::new(&mut conn);

    let team = repo.create(&create.into()).await?;
    Ok((StatusCode::CREATED, Json(TeamResponse::from(team))))
}

/// Team detail including its members.
#[utoipa::path(
    get,
    path = "/teams/{team_id}",
    tag = "teams",
    params(("team_id" = uuid::Uuid, Path, description = "Team ID")),
    responses(
        (status = 200, description = "Team with members", body = TeamResponse),
        (status = 404, description = "Team not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_team(
    State(state): State<AppState>,
    Path(team_id): Path<TeamId>,
    _: RequiresPermission<resource::Teams, operation::ReadAll>,
) -> Result<Json<TeamResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Teams::new(&mut conn);

    let team = repo.get_by_id(team_id).await?.ok_or_else(|| Error::NotFound {
        resource: "Team".to_string(),
        detail: team_id.to_string(),
    })?;

    let members = repo.list_members(team_id).await?;
    let response = TeamResponse::from(team).with_members(members.into_iter().map(TeamMemberResponse::from).collect());
    Ok(Json(response))
}

#[utoipa::path(
    patch,
    path = "/teams/{team_id}",
    tag = "teams",
    request_body = TeamUpdate,
    params(("team_id" = uuid::Uuid, Path, description = "Team ID")),
    responses(
        (status = 200, description = "Team updated", body = TeamResponse),
        (status = 404, description = "Team not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_team(
    State(state): State<AppState>,
    Path(team_id): Path<TeamId>,
    _: RequiresPermission<resource::Teams, operation::UpdateAll>,
    Json(update): Json<TeamUpdate>,
) -> Result<Json<TeamResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Teams::new(&mut conn);

    let team = repo.update(team_id, &update.into()).await?;
    Ok(Json(TeamResponse::from(team)))
}

#[utoipa::path(
    delete,
    path = "/teams/{team_id}",
    tag = "teams",
    params(("team_id" = uuid::Uuid, Path, description = "Team ID")),
    responses(
        (status = 204, description = "Team deleted"),
        (status = 404, description = "Team not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_team(
    State(state): State<AppState>,
    Path(team_id): Path<TeamId>,
    _: RequiresPermission<resource::Teams, operation::DeleteAll>,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Teams::new(&mut conn);

    if repo.delete(team_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            resource: "Team".to_string(),
            detail: team_id.to_string(),
        })
    }
}

#[utoipa::path(
    get,
    path = "/teams/{team_id}/members",
    tag = "teams",
    params(("team_id" = uuid::Uuid, Path, description = "Team ID")),
    responses(
        (status = 200, description = "Team members", body = Vec<TeamMemberResponse>),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_members(
    State(state): State<AppState>,
    Path(team_id): Path<TeamId>,
    _: RequiresPermission<resource::Teams, operation::ReadAll>,
) -> Result<Json<Vec<TeamMemberResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Teams::new(&mut conn);

    let members = repo.list_members(team_id).await?;
    Ok(Json(members.into_iter().map(TeamMemberResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/teams/{team_id}/members",
    tag = "teams",
    request_body = TeamMemberAdd,
    params(("team_id" = uuid::Uuid, Path, description = "Team ID")),
    responses(
        (status = 201, description = "Member added", body = TeamMemberResponse),
        (status = 400, description = "Unknown user or role"),
        (status = 409, description = "Already a member of this team"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn add_member(
    State(state): State<AppState>,
    Path(team_id): Path<TeamId>,
    _: RequiresPermission<resource::Teams, operation::UpdateAll>,
    Json(add): Json<TeamMemberAdd>,
) -> Result<(StatusCode, Json<TeamMemberResponse>)> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Teams::new(&mut conn);

    let member = repo
        .add_member(&TeamMembershipCreateDBRequest {
            team_id,
            user_id: add.user_id,
            role_id: add.role_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(TeamMemberResponse::from(member))))
}

#[utoipa::path(
    delete,
    path = "/teams/{team_id}/members/{user_id}",
    tag = "teams",
    params(
        ("team_id" = uuid::Uuid, Path, description = "Team ID"),
        ("user_id" = uuid::Uuid, Path, description = "User ID"),
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 404, description = "No such membership"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn remove_member(
    State(state): State<AppState>,
    Path((team_id, user_id)): Path<(TeamId, UserId)>,
    _: RequiresPermission<resource::Teams, operation::UpdateAll>,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Teams::new(&mut conn);

    if repo.remove_member(team_id, user_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            resource: "Team membership".to_string(),
            detail: format!("{team_id}/{user_id}"),
        })
    }
}

/// Invite an outside collaborator as a moderator on this team.
///
/// Provisions an inactive account (with `invited_by` set), joins it to the
/// team with the moderator role and emails an activation link - all in one
/// transaction, with the email sent after commit.
#[utoipa::path(
    post,
    path = "/teams/{team_id}/invitations",
    tag = "teams",
    request_body = ModeratorInvite,
    params(("team_id" = uuid::Uuid, Path, description = "Team ID")),
    responses(
        (status = 201, description = "Invitation sent", body = ModeratorInviteResponse),
        (status = 400, description = "Invalid email"),
        (status = 409, description = "An account with this email already exists"),
        (status = 502, description = "Invitation committed but the email could not be delivered"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn invite_moderator(
    State(state): State<AppState>,
    Path(team_id): Path<TeamId>,
    inviter: RequiresPermission<resource::Teams, operation::UpdateAll>,
    Json(invite): Json<ModeratorInvite>,
) -> Result<(StatusCode, Json<ModeratorInviteResponse>)> {
    if !admission::is_valid_email(&invite.email) {
        return Err(Error::BadRequest {
            message: "A valid email address is required".to_string(),
        });
    }

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    {
        let mut teams = Teams::new(&mut tx);
        teams.get_by_id(team_id).await?.ok_or_else(|| Error::NotFound {
            resource: "Team".to_string(),
            detail: team_id.to_string(),
        })?;
    }

    let existing = {
        let mut users = Users::new(&mut tx);
        users.get_user_by_email(&invite.email).await?
    };
    if existing.is_some() {
        return Err(Error::Conflict {
            message: "An account with this email address already exists".to_string(),
        });
    }

    let moderator_role = {
        let mut roles = Roles::new(&mut tx);
        roles.get_by_code(MODERATOR_ROLE_CODE).await?.ok_or_else(|| Error::Internal {
            operation: format!("load seeded role '{MODERATOR_ROLE_CODE}'"),
        })?
    };

    let user = {
        let mut users = Users::new(&mut tx);
        users
            .create(&UserCreateDBRequest {
                email: invite.email.clone(),
                first_name: invite.first_name.clone(),
                last_name: invite.last_name.clone(),
                is_active: false,
                is_admin: false,
                role_id: Some(moderator_role.id),
                invited_by: Some(inviter.id),
                auth_source: "invitation".to_string(),
                password_hash: None,
            })
            .await?
    };

    {
        let mut profiles = Profiles::new(&mut tx);
        profiles.create(user.id).await?;
    }

    {
        let mut teams = Teams::new(&mut tx);
        teams
            .add_member(&TeamMembershipCreateDBRequest {
                team_id,
                user_id: user.id,
                role_id: moderator_role.id,
            })
            .await?;
    }

    let (raw_token, token) = {
        let mut tokens = ActivationTokens::new(&mut tx);
        tokens.create_for_user(user.id, &user.email, &state.config).await?
    };

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    // Delivery failure is distinct from request errors; the invitation stands
    let email_service = EmailService::new(&state.config)?;
    email_service
        .send_activation_email(&user.email, Some(&user.full_name()), &token.id, &raw_token)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ModeratorInviteResponse {
            user_id: user.id,
            email: user.email,
            message: "Invitation sent".to_string(),
        }),
    ))
}
