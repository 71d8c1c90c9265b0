//! # atrium: Membership Platform Backend
//!
//! `atrium` is the backend for a members-only social platform: prospective
//! members apply through a public waiting list, administrators admit or
//! reject them, admitted members activate their account via an emailed
//! single-use token, maintain a profile, and pay for membership through a
//! subscription billed by an external payment processor. Administrators
//! additionally manage moderation teams and can invite outside
//! collaborators.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for
//! the HTTP layer and uses PostgreSQL (via SQLx) for all persistence.
//!
//! Two workflows carry the interesting state:
//!
//! - **Admission** ([`admission`]): waiting-list entries move
//!   `pending -> approved` or `pending -> rejected`, exactly once, enforced
//!   with conditional updates. Approval provisions an inactive account, its
//!   profile and a time-limited activation token in one transaction, then
//!   emails the activation link.
//! - **Subscription synchronization** ([`billing`]): the payment processor
//!   is the source of truth; the per-profile cache and the durable
//!   subscription records are kept in sync through three paths - direct API
//!   actions, processor webhooks, and lazy reconciliation on status reads.
//!
//! Notifications ([`notify`]) are stored rows first; a per-recipient
//! broadcast hub pushes them over a WebSocket channel when the recipient is
//! connected.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use atrium::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = atrium::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     atrium::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod api;
pub mod auth;
pub mod billing;
pub mod config;
pub mod db;
pub mod email;
pub mod errors;
pub mod notify;
mod openapi;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, patch, post},
    Router,
};
use bon::Builder;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info, instrument, Level};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    auth::password,
    billing::BillingProvider,
    config::CorsOrigin,
    db::handlers::{Profiles, Repository, Users},
    db::models::users::UserCreateDBRequest,
    notify::{NotificationHub, Notifier},
    openapi::ApiDoc,
};
pub use config::Config;
pub use types::{ApplicantId, NotificationId, PlanId, RoleId, TeamId, UserId};

/// Application state shared across all request handlers.
///
/// - `db`: PostgreSQL connection pool
/// - `config`: application configuration
/// - `billing`: payment processor gateway, absent when billing is not configured
/// - `notifier`: notification persistence + realtime fan-out hub
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub billing: Option<Arc<dyn BillingProvider>>,
    pub notifier: Notifier,
}

/// Get the database migrator (embedded `migrations/` directory).
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin user if it doesn't exist.
///
/// Idempotent: creates the account (active, admin) on first startup, updates
/// the password if one is supplied later. Ensures there is always an
/// administrator able to review the waiting list.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(email: &str, admin_password: Option<&str>, db: &PgPool) -> Result<UserId, anyhow::Error> {
    let password_hash = match admin_password {
        Some(pwd) => Some(password::hash_string(pwd).map_err(|e| anyhow::anyhow!("Failed to hash admin password: {e}"))?),
        None => None,
    };

    let mut tx = db.begin().await?;
    let mut user_repo = Users::new(&mut tx);

    if let Some(existing_user) = user_repo
        .get_user_by_email(email)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to check existing admin user: {e}"))?
    {
        if let Some(password_hash) = password_hash {
            sqlx::query("UPDATE users SET password_hash = $1 WHERE email = $2")
                .bind(password_hash)
                .bind(email)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        return Ok(existing_user.id);
    }

    let created_user = user_repo
        .create(&UserCreateDBRequest {
            email: email.to_string(),
            first_name: "Admin".to_string(),
            last_name: "".to_string(),
            is_active: true,
            is_admin: true,
            role_id: None,
            invited_by: None,
            auth_source: "system".to_string(),
            password_hash,
        })
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create admin user: {e}"))?;

    let mut profile_repo = Profiles::new(&mut tx);
    profile_repo
        .create(created_user.id)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create admin profile: {e}"))?;

    tx.commit().await?;
    Ok(created_user.id)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.security.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.auth.security.cors.allow_credentials))
}

/// Build the application router with all endpoints and middleware.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    use api::handlers::{applicants, auth, notifications, plans, subscriptions, teams, users, webhooks, ws};

    // Authentication routes (root level)
    let auth_routes = Router::new()
        .route("/authentication/login", post(auth::login))
        .route("/authentication/logout", post(auth::logout))
        .route("/authentication/activate", post(auth::activate_account))
        .route("/authentication/password-resets", post(auth::request_password_reset))
        .route(
            "/authentication/password-resets/{token_id}/confirm",
            post(auth::confirm_password_reset),
        )
        .route("/authentication/password-change", post(auth::change_password))
        .with_state(state.clone());

    // API routes
    let api_routes = Router::new()
        // Waiting list: public submission + exists-check, admin review
        .route("/waitinglist", post(applicants::submit).get(applicants::list_applicants))
        .route("/waitinglist/exists", get(applicants::check_existing))
        .route("/waitinglist/rejection-reasons", get(applicants::list_rejection_reasons))
        .route("/waitinglist/{id}", get(applicants::get_applicant))
        .route("/waitinglist/{id}/approve", post(applicants::approve_applicant))
        .route("/waitinglist/{id}/reject", post(applicants::reject_applicant))
        // Accounts and profiles
        .route("/users/current", get(users::current_user))
        .route("/profile", get(users::get_profile).patch(users::update_profile))
        // Role catalog
        .route("/roles", get(users::list_roles).post(users::create_role))
        .route("/roles/{id}", patch(users::update_role).delete(users::delete_role))
        // Plans
        .route("/plans", get(plans::list_plans).post(plans::create_plan))
        .route("/plans/{id}", patch(plans::update_plan))
        // Subscriptions
        .route(
            "/subscriptions",
            post(subscriptions::create_subscription).get(subscriptions::list_subscriptions),
        )
        .route("/subscriptions/status", get(subscriptions::subscription_status))
        .route("/subscriptions/cancel", post(subscriptions::cancel_subscription))
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        // Moderation teams
        .route("/teams", get(teams::list_teams).post(teams::create_team))
        .route(
            "/teams/{team_id}",
            get(teams::get_team).patch(teams::update_team).delete(teams::delete_team),
        )
        .route("/teams/{team_id}/members", get(teams::list_members).post(teams::add_member))
        .route("/teams/{team_id}/members/{user_id}", axum::routing::delete(teams::remove_member))
        .route("/teams/{team_id}/invitations", post(teams::invite_moderator))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        // Webhook route (external services, not part of the client API)
        .route("/webhooks/billing", post(webhooks::billing_webhook))
        // Realtime notification channel
        .route("/ws/notifications", get(ws::notifications_ws))
        .with_state(state.clone())
        .merge(auth_routes)
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;

    let router = router.layer(cors_layer).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct owning all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects to the database, runs
///    migrations, bootstraps the initial admin user and builds the router
/// 2. **Serve**: [`Application::serve`] binds a TCP port and handles
///    requests until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database.pool.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.database.pool.acquire_timeout_secs))
            .connect(&config.database.url)
            .await?;

        Self::new_with_pool(config, pool).await
    }

    /// Create an application over an existing pool (tests hand in the
    /// per-test database here).
    pub async fn new_with_pool(config: Config, pool: PgPool) -> anyhow::Result<Self> {
        migrator().run(&pool).await?;

        create_initial_admin_user(&config.admin_email, config.admin_password.as_deref(), &pool).await?;

        let billing = config.billing.as_ref().map(billing::create_provider);
        let notifier = Notifier::new(pool.clone(), Arc::new(NotificationHub::new()));

        let state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .maybe_billing(billing)
            .notifier(notifier)
            .build();

        let router = build_router(&state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Atrium listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::test_utils::*;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_health_and_public_surface(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;

        let health = server.get("/healthz").await;
        assert_eq!(health.status_code().as_u16(), 200);

        // Public plan catalog requires no auth
        let plans = server.get("/api/v1/plans").await;
        assert_eq!(plans.status_code().as_u16(), 200);

        // Admin surface requires auth
        let list = server.get("/api/v1/waitinglist").await;
        assert_eq!(list.status_code().as_u16(), 401);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_submission_approval_activation_roundtrip(pool: PgPool) {
        let server = create_test_app(pool.clone()).await;

        // Public submission
        let submitted = server
            .post("/api/v1/waitinglist")
            .json(&serde_json::json!({
                "first_name": "Ada",
                "last_name": "Lovelace",
                "email": "ada@example.com",
                "phone_number": "+44-555-0101"
            }))
            .await;
        assert_eq!(submitted.status_code().as_u16(), 201);
        let applicant: serde_json::Value = submitted.json();
        assert_eq!(applicant["status"], "pending");

        // The bootstrap admin reviews it
        let admin_token = login_admin_token(&pool).await;
        let applicant_id = applicant["id"].as_str().unwrap();

        let approved = server
            .post(&format!("/api/v1/waitinglist/{applicant_id}/approve"))
            .add_header("authorization", format!("Bearer {admin_token}"))
            .await;
        assert_eq!(approved.status_code().as_u16(), 200);

        // Approving again conflicts
        let again = server
            .post(&format!("/api/v1/waitinglist/{applicant_id}/approve"))
            .add_header("authorization", format!("Bearer {admin_token}"))
            .await;
        assert_eq!(again.status_code().as_u16(), 409);

        // The exists-check now reports the approved email
        let exists = server.get("/api/v1/waitinglist/exists?email=ada@example.com").await;
        let body: serde_json::Value = exists.json();
        assert_eq!(body["exists"], serde_json::json!(true));

        // Login is refused until activation
        let login = server
            .post("/authentication/login")
            .json(&serde_json::json!({"email": "ada@example.com", "password": "irrelevant-password"}))
            .await;
        assert_eq!(login.status_code().as_u16(), 401);
    }
}
