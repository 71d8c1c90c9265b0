use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    api::models::{
        auth::{
            ActivateAccountRequest, ActivateAccountResponse, AuthResponse, AuthSuccessResponse, ChangePasswordRequest, LoginRequest,
            LoginResponse, LogoutResponse, PasswordResetConfirmRequest, PasswordResetRequest, PasswordResetResponse,
        },
        users::{CurrentUser, UserResponse},
    },
    auth::{password, session},
    db::{
        handlers::{ActivationTokens, PasswordResetTokens, Repository, Users},
        models::users::UserUpdateDBRequest,
    },
    email::EmailService,
    errors::Error,
    AppState,
};

fn create_session_cookie(token: &str, config: &crate::config::Config) -> String {
    let session = &config.auth.native.session;
    let secure = if session.cookie_secure { "; Secure" } else { "" };
    format!("{}={}; Path=/; HttpOnly; SameSite=Strict{}", session.cookie_name, token, secure)
}

fn validate_password(password: &str, config: &crate::config::Config) -> Result<(), Error> {
    let password_config = &config.auth.native.password;
    if password.len() < password_config.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", password_config.min_length),
        });
    }
    if password.len() > password_config.max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be no more than {} characters", password_config.max_length),
        });
    }
    Ok(())
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<LoginResponse, Error> {
    if !state.config.auth.native.enabled {
        return Err(Error::BadRequest {
            message: "Native authentication is disabled".to_string(),
        });
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut pool_conn);

    let user = user_repo
        .get_user_by_email(&request.email)
        .await?
        .ok_or_else(|| Error::Unauthenticated {
            message: Some("Invalid email or password".to_string()),
        })?;

    // Accounts stay inactive until the activation token is consumed
    if !user.is_active {
        return Err(Error::Unauthenticated {
            message: Some("This account has not been activated yet".to_string()),
        });
    }

    let password_hash = user.password_hash.clone().ok_or_else(|| Error::Unauthenticated {
        message: Some("Invalid email or password".to_string()),
    })?;

    // Verify on a blocking thread to avoid stalling the async runtime
    let candidate = request.password.clone();
    let is_valid = tokio::task::spawn_blocking(move || password::verify_string(&candidate, &password_hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })??;

    if !is_valid {
        return Err(Error::Unauthenticated {
            message: Some("Invalid email or password".to_string()),
        });
    }

    let user = user_repo
        .update(
            user.id,
            &UserUpdateDBRequest {
                last_login: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;

    let user_response = UserResponse::from(user.clone());
    let current_user = CurrentUser::from(user);
    let token = session::create_session_token(&current_user, &state.config)?;
    let cookie = create_session_cookie(&token, &state.config);

    Ok(LoginResponse {
        auth_response: AuthResponse {
            user: user_response,
            token,
            message: "Login successful".to_string(),
        },
        cookie,
    })
}

/// Logout (clear session)
#[utoipa::path(
    post,
    path = "/authentication/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logout successful", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> Result<LogoutResponse, Error> {
    // Expired cookie clears the session client-side
    let cookie = format!(
        "{}=; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age=0",
        state.config.auth.native.session.cookie_name
    );

    Ok(LogoutResponse {
        auth_response: AuthSuccessResponse {
            message: "Logout successful".to_string(),
        },
        cookie,
    })
}

/// Activate a provisioned account: consume the activation token, set the
/// password, flip the account active and log the member in.
#[utoipa::path(
    post,
    path = "/authentication/activate",
    request_body = ActivateAccountRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Account activated", body = AuthResponse),
        (status = 400, description = "Invalid or expired activation token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn activate_account(
    State(state): State<AppState>,
    Json(request): Json<ActivateAccountRequest>,
) -> Result<ActivateAccountResponse, Error> {
    if !state.config.auth.native.enabled {
        return Err(Error::BadRequest {
            message: "Native authentication is disabled".to_string(),
        });
    }

    validate_password(&request.new_password, &state.config)?;

    let password_hash = tokio::task::spawn_blocking({
        let password = request.new_password.clone();
        move || password::hash_string(&password)
    })
    .await
    .map_err(|e| Error::Internal {
        operation: format!("spawn password hashing task: {e}"),
    })??;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let token = {
        let mut token_repo = ActivationTokens::new(&mut tx);
        token_repo
            .find_valid_token_by_id(request.token_id, &request.token)
            .await?
            .ok_or_else(|| Error::BadRequest {
                message: "Invalid or expired activation token".to_string(),
            })?
    };

    let user = {
        let mut user_repo = Users::new(&mut tx);
        user_repo
            .update(
                token.user_id,
                &UserUpdateDBRequest {
                    is_active: Some(true),
                    password_hash: Some(password_hash),
                    last_login: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?
    };

    {
        // Single-use: consuming the token deletes it
        let mut token_repo = ActivationTokens::new(&mut tx);
        token_repo.consume(token.id).await?;
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    let user_response = UserResponse::from(user.clone());
    let current_user = CurrentUser::from(user);
    let session_token = session::create_session_token(&current_user, &state.config)?;
    let cookie = create_session_cookie(&session_token, &state.config);

    Ok(ActivateAccountResponse {
        auth_response: AuthResponse {
            user: user_response,
            token: session_token,
            message: "Account activated".to_string(),
        },
        cookie,
    })
}

/// Request password reset (send email)
#[utoipa::path(
    post,
    path = "/authentication/password-resets",
    request_body = PasswordResetRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Password reset email sent", body = PasswordResetResponse),
        (status = 400, description = "Invalid request"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Json<PasswordResetResponse>, Error> {
    if !state.config.auth.native.enabled {
        return Err(Error::BadRequest {
            message: "Native authentication is disabled".to_string(),
        });
    }

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    // Same response whether or not the account exists, to avoid enumeration
    let user = {
        let mut user_repo = Users::new(&mut tx);
        user_repo.get_user_by_email(&request.email).await?
    };

    if let Some(user) = user {
        if user.password_hash.is_some() {
            let (raw_token, token) = {
                let mut token_repo = PasswordResetTokens::new(&mut tx);
                token_repo.create_for_user(user.id, &state.config).await?
            };

            let email_service = EmailService::new(&state.config)?;
            email_service
                .send_password_reset_email(&user.email, Some(&user.full_name()), &token.id, &raw_token)
                .await?;
        }
    }
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(PasswordResetResponse {
        message: "If an account with that email exists, a password reset link has been sent.".to_string(),
    }))
}

/// Confirm password reset with token
#[utoipa::path(
    post,
    path = "/authentication/password-resets/{token_id}/confirm",
    request_body = PasswordResetConfirmRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Password reset successful", body = PasswordResetResponse),
        (status = 400, description = "Invalid or expired token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Path(token_id): Path<Uuid>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> Result<Json<PasswordResetResponse>, Error> {
    if !state.config.auth.native.enabled {
        return Err(Error::BadRequest {
            message: "Native authentication is disabled".to_string(),
        });
    }

    validate_password(&request.new_password, &state.config)?;

    let new_password_hash = tokio::task::spawn_blocking({
        let password = request.new_password.clone();
        move || password::hash_string(&password)
    })
    .await
    .map_err(|e| Error::Internal {
        operation: format!("spawn password hashing task: {e}"),
    })??;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let token = {
        let mut token_repo = PasswordResetTokens::new(&mut tx);
        token_repo
            .find_valid_token_by_id(token_id, &request.token)
            .await?
            .ok_or_else(|| Error::BadRequest {
                message: "Invalid or expired reset token".to_string(),
            })?
    };

    {
        let mut user_repo = Users::new(&mut tx);
        user_repo
            .update(
                token.user_id,
                &UserUpdateDBRequest {
                    password_hash: Some(new_password_hash),
                    ..Default::default()
                },
            )
            .await?;
    }

    {
        // Invalidate every outstanding token for this user, this one included
        let mut token_repo = PasswordResetTokens::new(&mut tx);
        token_repo.invalidate_for_user(token.user_id).await?;
    }
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(PasswordResetResponse {
        message: "Password has been reset successfully".to_string(),
    }))
}

/// Change password for authenticated user
#[utoipa::path(
    post,
    path = "/authentication/password-change",
    request_body = ChangePasswordRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Password changed successfully", body = AuthSuccessResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Current password is incorrect"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<AuthSuccessResponse>, Error> {
    validate_password(&request.new_password, &state.config)?;

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut pool_conn);

    let user = user_repo.get_by_id(current_user.id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        detail: current_user.id.to_string(),
    })?;

    let password_hash = user.password_hash.clone().ok_or_else(|| Error::BadRequest {
        message: "This account has no password set".to_string(),
    })?;

    let candidate = request.current_password.clone();
    let is_valid = tokio::task::spawn_blocking(move || password::verify_string(&candidate, &password_hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })??;

    if !is_valid {
        return Err(Error::Unauthenticated {
            message: Some("Current password is incorrect".to_string()),
        });
    }

    let new_password_hash = tokio::task::spawn_blocking({
        let password = request.new_password.clone();
        move || password::hash_string(&password)
    })
    .await
    .map_err(|e| Error::Internal {
        operation: format!("spawn password hashing task: {e}"),
    })??;

    user_repo
        .update(
            user.id,
            &UserUpdateDBRequest {
                password_hash: Some(new_password_hash),
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(AuthSuccessResponse {
        message: "Password changed successfully".to_string(),
    }))
}
