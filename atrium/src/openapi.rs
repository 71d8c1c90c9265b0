//! OpenAPI document assembly.

use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::api::models::{
    applicants::{ApplicantResponse, ApplicantSubmission, ExistsResponse, RejectRequest, RejectionReasonResponse},
    auth::{
        ActivateAccountRequest, AuthResponse, AuthSuccessResponse, ChangePasswordRequest, LoginRequest, PasswordResetConfirmRequest,
        PasswordResetRequest, PasswordResetResponse,
    },
    notifications::{MarkReadResponse, NotificationResponse},
    plans::{PlanCreate, PlanResponse, PlanUpdate},
    profiles::{ProfileResponse, ProfileUpdate},
    subscriptions::{
        SubscriptionCancelResponse, SubscriptionCreateRequest, SubscriptionCreateResponse, SubscriptionRecordResponse,
        SubscriptionStatusResponse,
    },
    teams::{ModeratorInvite, ModeratorInviteResponse, TeamCreate, TeamMemberAdd, TeamMemberResponse, TeamResponse, TeamUpdate},
    users::{CurrentUser, RoleCreate, RoleResponse, RoleUpdate, UserResponse},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "BearerAuth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
            components.add_security_scheme("CookieAuth", SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("atrium_session"))));
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Atrium API",
        description = "Membership platform backend: waiting-list admission, profiles, teams, notifications and subscription billing"
    ),
    paths(
        crate::api::handlers::auth::login,
        crate::api::handlers::auth::logout,
        crate::api::handlers::auth::activate_account,
        crate::api::handlers::auth::request_password_reset,
        crate::api::handlers::auth::confirm_password_reset,
        crate::api::handlers::auth::change_password,
        crate::api::handlers::applicants::submit,
        crate::api::handlers::applicants::check_existing,
        crate::api::handlers::applicants::list_applicants,
        crate::api::handlers::applicants::get_applicant,
        crate::api::handlers::applicants::approve_applicant,
        crate::api::handlers::applicants::reject_applicant,
        crate::api::handlers::applicants::list_rejection_reasons,
        crate::api::handlers::users::current_user,
        crate::api::handlers::users::get_profile,
        crate::api::handlers::users::update_profile,
        crate::api::handlers::users::list_roles,
        crate::api::handlers::users::create_role,
        crate::api::handlers::users::update_role,
        crate::api::handlers::users::delete_role,
        crate::api::handlers::plans::list_plans,
        crate::api::handlers::plans::create_plan,
        crate::api::handlers::plans::update_plan,
        crate::api::handlers::subscriptions::create_subscription,
        crate::api::handlers::subscriptions::subscription_status,
        crate::api::handlers::subscriptions::cancel_subscription,
        crate::api::handlers::subscriptions::list_subscriptions,
        crate::api::handlers::notifications::list_notifications,
        crate::api::handlers::notifications::mark_read,
        crate::api::handlers::notifications::mark_all_read,
        crate::api::handlers::teams::list_teams,
        crate::api::handlers::teams::create_team,
        crate::api::handlers::teams::get_team,
        crate::api::handlers::teams::update_team,
        crate::api::handlers::teams::delete_team,
        crate::api::handlers::teams::list_members,
        crate::api::handlers::teams::add_member,
        crate::api::handlers::teams::remove_member,
        crate::api::handlers::teams::invite_moderator,
        crate::api::handlers::webhooks::billing_webhook,
    ),
    components(schemas(
        ApplicantSubmission,
        ApplicantResponse,
        RejectRequest,
        RejectionReasonResponse,
        ExistsResponse,
        LoginRequest,
        AuthResponse,
        AuthSuccessResponse,
        ActivateAccountRequest,
        PasswordResetRequest,
        PasswordResetResponse,
        PasswordResetConfirmRequest,
        ChangePasswordRequest,
        CurrentUser,
        UserResponse,
        RoleCreate,
        RoleUpdate,
        RoleResponse,
        ProfileResponse,
        ProfileUpdate,
        PlanCreate,
        PlanUpdate,
        PlanResponse,
        SubscriptionCreateRequest,
        SubscriptionCreateResponse,
        SubscriptionStatusResponse,
        SubscriptionCancelResponse,
        SubscriptionRecordResponse,
        NotificationResponse,
        MarkReadResponse,
        TeamCreate,
        TeamUpdate,
        TeamResponse,
        TeamMemberAdd,
        TeamMemberResponse,
        ModeratorInvite,
        ModeratorInviteResponse,
    )),
    tags(
        (name = "authentication", description = "Login, activation and password management"),
        (name = "waitinglist", description = "Waiting-list submission and review"),
        (name = "users", description = "Accounts"),
        (name = "profiles", description = "Member profiles"),
        (name = "roles", description = "Role catalog"),
        (name = "plans", description = "Membership plans"),
        (name = "subscriptions", description = "Subscription billing"),
        (name = "notifications", description = "Notifications"),
        (name = "teams", description = "Moderation teams"),
        (name = "webhooks", description = "Processor webhooks"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::OpenApi as _;

    #[test]
    fn test_openapi_document_builds() {
        let doc = ApiDoc::openapi();
        let json = doc.to_json().expect("OpenAPI document serializes");
        assert!(json.contains("/waitinglist"));
        assert!(json.contains("/subscriptions/status"));
    }
}
