//! Shared fixtures for integration tests.

use axum_test::TestServer;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    api::models::users::CurrentUser,
    auth::session,
    db::{
        handlers::{Profiles, Repository, Users},
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
};

pub fn create_test_config() -> crate::config::Config {
    // Shared temp directory for the file email transport
    let temp_dir = std::env::temp_dir().join(format!("atrium-test-emails-{}", std::process::id()));

    crate::config::Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        dashboard_url: "http://localhost:3000".to_string(),
        admin_email: "admin@test.com".to_string(),
        admin_password: None,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        email: crate::config::EmailConfig {
            transport: crate::config::EmailTransportConfig::File {
                path: temp_dir.to_string_lossy().to_string(),
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

pub async fn create_test_app(pool: PgPool) -> TestServer {
    let config = create_test_config();

    let app = crate::Application::new_with_pool(config, pool)
        .await
        .expect("Failed to create application");

    app.into_test_server()
}

/// Session token for the bootstrap admin created by application startup.
/// For repository-level tests (no app), use [`create_test_admin_user`] and
/// [`session_token_for`] instead.
pub async fn login_admin_token(pool: &PgPool) -> String {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut users = Users::new(&mut conn);
    let admin = users
        .get_user_by_email("admin@test.com")
        .await
        .expect("Failed to look up bootstrap admin")
        .expect("Bootstrap admin should exist");

    session_token_for(&admin)
}

pub fn session_token_for(user: &UserDBResponse) -> String {
    let config = create_test_config();
    let current_user = CurrentUser::from(user.clone());
    session::create_session_token(&current_user, &config).expect("Failed to create session token")
}

pub async fn create_test_user(pool: &PgPool) -> UserDBResponse {
    create_user_with_flags(pool, false).await
}

pub async fn create_test_admin_user(pool: &PgPool) -> UserDBResponse {
    create_user_with_flags(pool, true).await
}

async fn create_user_with_flags(pool: &PgPool, is_admin: bool) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut users_repo = Users::new(&mut conn);
    let tag = Uuid::new_v4().simple().to_string();

    let user = users_repo
        .create(&UserCreateDBRequest {
            email: format!("test-{tag}@example.com"),
            first_name: "Test".to_string(),
            last_name: if is_admin { "Admin" } else { "Member" }.to_string(),
            is_active: true,
            is_admin,
            role_id: None,
            invited_by: None,
            auth_source: "test".to_string(),
            password_hash: None,
        })
        .await
        .expect("Failed to create test user");

    let mut profiles_repo = Profiles::new(&mut conn);
    profiles_repo.create(user.id).await.expect("Failed to create test profile");

    user
}
