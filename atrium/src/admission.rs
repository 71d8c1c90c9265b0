//! Waiting-list admission workflow.
//!
//! A public submission becomes a pending entry; an administrator then either
//! approves it (provisioning an inactive, activation-pending account) or
//! rejects it with a catalog reason. Entries transition exactly once:
//! pending -> approved or pending -> rejected, enforced with conditional
//! updates so concurrent reviewers cannot both win.
//!
//! Approval creates the account, its profile and the activation token in a
//! single transaction, then sends the activation email after commit. A
//! failed send surfaces as a delivery error distinct from request errors:
//! the approval stands and the invitation can be re-issued.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    config::Config,
    db::{
        handlers::{Applicants, Profiles, Repository, Roles, Users},
        models::{
            activation_tokens::ActivationToken,
            applicants::{ApplicantCreateDBRequest, ApplicantDBResponse, ApplicantStatus},
            profiles::ProfileDBResponse,
            roles::MEMBER_ROLE_CODE,
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
    email::EmailService,
    errors::{Error, Result},
    notify::Notifier,
    types::{ApplicantId, RoleId, UserId},
};

/// Everything the member-provisioning factory creates, returned together so
/// the caller owns the transactional boundary.
#[derive(Debug)]
pub struct ProvisionedMember {
    pub user: UserDBResponse,
    pub profile: ProfileDBResponse,
    pub token: ActivationToken,
    pub raw_token: String,
}

/// Minimal structural validation for an email address. Real validation is
/// the activation roundtrip; this only rejects obvious garbage.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && !domain.is_empty() && domain.contains('.') && !email.contains(char::is_whitespace)
}

fn validate_submission(request: &ApplicantCreateDBRequest) -> Result<()> {
    if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "First and last name are required".to_string(),
        });
    }
    if request.phone_number.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "A phone number is required".to_string(),
        });
    }
    if !is_valid_email(&request.email) {
        return Err(Error::BadRequest {
            message: "A valid email address is required".to_string(),
        });
    }
    Ok(())
}

/// Public submission path: validate, reject duplicates of already-approved
/// entries, persist a pending entry, then fan out one notification per
/// administrator (best-effort, after commit).
#[tracing::instrument(skip_all, fields(email = %request.email))]
pub async fn submit(pool: &PgPool, notifier: &Notifier, request: &ApplicantCreateDBRequest) -> Result<ApplicantDBResponse> {
    validate_submission(request)?;

    let applicant = {
        let mut tx = pool.begin().await.map_err(|e| Error::Database(e.into()))?;
        let mut applicants = Applicants::new(&mut tx);

        if applicants.approved_exists(&request.email).await? {
            return Err(Error::Conflict {
                message: "An approved application already exists for this email".to_string(),
            });
        }

        let applicant = applicants.create(request).await?;
        tx.commit().await.map_err(|e| Error::Database(e.into()))?;
        applicant
    };

    // Admin fan-out happens after commit; a notification failure must not
    // unwind the submission.
    if let Err(e) = notifier
        .notify_admins(
            None,
            "applicant.submitted",
            &format!("{} {} joined the waiting list", applicant.first_name, applicant.last_name),
            Some("applicant"),
            Some(applicant.id),
        )
        .await
    {
        tracing::error!(applicant = %applicant.id, error = %e, "Failed to notify administrators of new applicant");
    }

    Ok(applicant)
}

/// Read-only predicate: does an approved entry exist for this email?
#[tracing::instrument(skip_all)]
pub async fn check_existing(pool: &PgPool, email: &str) -> Result<bool> {
    let mut conn = pool.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut applicants = Applicants::new(&mut conn);
    Ok(applicants.approved_exists(email).await?)
}

/// Create the inactive account, its profile and an activation token as one
/// unit. Runs inside the caller's transaction; returns all created
/// aggregates together.
async fn provision_member(
    conn: &mut sqlx::PgConnection,
    applicant: &ApplicantDBResponse,
    role_id: RoleId,
    invited_by: Option<UserId>,
    config: &Config,
) -> Result<ProvisionedMember> {
    let user = {
        let mut users = Users::new(&mut *conn);
        users
            .create(&UserCreateDBRequest {
                email: applicant.email.clone(),
                first_name: applicant.first_name.clone(),
                last_name: applicant.last_name.clone(),
                is_active: false,
                is_admin: false,
                role_id: Some(role_id),
                invited_by,
                auth_source: "admission".to_string(),
                password_hash: None,
            })
            .await?
    };

    // Seed the profile from what the applicant told us
    let profile = {
        let mut profiles = Profiles::new(&mut *conn);
        profiles.create(user.id).await?;
        profiles
            .update(
                user.id,
                &crate::db::models::profiles::ProfileUpdateDBRequest {
                    phone_number: Some(applicant.phone_number.clone()),
                    occupation: applicant.occupation.clone(),
                    city: applicant.city.clone(),
                    ..Default::default()
                },
            )
            .await?
    };

    let (raw_token, token) = {
        let mut tokens = crate::db::handlers::ActivationTokens::new(&mut *conn);
        tokens.create_for_user(user.id, &user.email, config).await?
    };

    Ok(ProvisionedMember {
        user,
        profile,
        token,
        raw_token,
    })
}

/// Approve a pending entry: provision the account and mark the entry
/// approved in one transaction, then email the activation link.
///
/// If an account already exists for the entry's email, the entry is marked
/// rejected instead (never approved, never a second account) and the call
/// fails with a conflict.
#[tracing::instrument(skip(pool, email_service, config), fields(applicant = %applicant_id))]
pub async fn approve(
    pool: &PgPool,
    email_service: &EmailService,
    config: &Config,
    applicant_id: ApplicantId,
    performed_by: UserId,
) -> Result<ProvisionedMember> {
    let mut tx = pool.begin().await.map_err(|e| Error::Database(e.into()))?;

    let applicant = {
        let mut applicants = Applicants::new(&mut tx);
        applicants.get_by_id(applicant_id).await?.ok_or_else(|| Error::NotFound {
            resource: "Applicant".to_string(),
            detail: applicant_id.to_string(),
        })?
    };

    if applicant.status != ApplicantStatus::Pending {
        return Err(Error::Conflict {
            message: "This application has already been processed".to_string(),
        });
    }

    // Duplicate-account guard: an existing account means the entry closes as
    // rejected, and no second account is ever created.
    let existing = {
        let mut users = Users::new(&mut tx);
        users.get_user_by_email(&applicant.email).await?
    };
    if existing.is_some() {
        let rejected = {
            let mut applicants = Applicants::new(&mut tx);
            let reason = applicants.get_rejection_reason_by_code("duplicate_account").await?;
            match reason {
                Some(reason) => applicants
                    .transition_to_rejected(applicant_id, performed_by, reason.id, Some("account already exists"))
                    .await?
                    .is_some(),
                None => false,
            }
        };
        if rejected {
            tx.commit().await.map_err(|e| Error::Database(e.into()))?;
        }
        return Err(Error::Conflict {
            message: "An account with this email already exists; the application has been rejected".to_string(),
        });
    }

    // Conditional transition first: the winning transaction holds the row
    // until commit, the loser matches zero rows and reports a conflict.
    let approved = {
        let mut applicants = Applicants::new(&mut tx);
        applicants.transition_to_approved(applicant_id, performed_by).await?
    };
    let Some(applicant) = approved else {
        return Err(Error::Conflict {
            message: "This application has already been processed".to_string(),
        });
    };

    let member_role = {
        let mut roles = Roles::new(&mut tx);
        roles.get_by_code(MEMBER_ROLE_CODE).await?.ok_or_else(|| Error::Internal {
            operation: format!("load seeded role '{MEMBER_ROLE_CODE}'"),
        })?
    };

    let member = provision_member(&mut tx, &applicant, member_role.id, None, config).await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    // Post-commit: the approval stands regardless of delivery. A failed send
    // is reported as a delivery error, distinct from request errors, so the
    // admin knows to re-issue the invitation rather than retry the approval.
    email_service
        .send_activation_email(
            &member.user.email,
            Some(&member.user.full_name()),
            &member.token.id,
            &member.raw_token,
        )
        .await?;

    Ok(member)
}

/// Reject a pending entry with a catalog reason and optional notes. The
/// notification email is best-effort and never rolls back the rejection.
#[tracing::instrument(skip(pool, email_service, notes), fields(applicant = %applicant_id))]
pub async fn reject(
    pool: &PgPool,
    email_service: &EmailService,
    applicant_id: ApplicantId,
    performed_by: UserId,
    reason_id: Uuid,
    notes: Option<&str>,
) -> Result<ApplicantDBResponse> {
    let mut tx = pool.begin().await.map_err(|e| Error::Database(e.into()))?;

    let (applicant, reason_label) = {
        let mut applicants = Applicants::new(&mut tx);

        let reason = applicants.get_rejection_reason(reason_id).await?.ok_or_else(|| Error::BadRequest {
            message: "Unknown rejection reason".to_string(),
        })?;

        let applicant = applicants
            .transition_to_rejected(applicant_id, performed_by, reason.id, notes)
            .await?
            .ok_or_else(|| Error::Conflict {
                message: "This application has already been processed".to_string(),
            })?;

        (applicant, reason.label)
    };

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    if let Err(e) = email_service
        .send_rejection_email(
            &applicant.email,
            Some(&format!("{} {}", applicant.first_name, applicant.last_name)),
            &reason_label,
        )
        .await
    {
        tracing::error!(applicant = %applicant.id, error = %e, "Failed to send rejection email");
    }

    Ok(applicant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationHub;
    use sqlx::PgPool;
    use std::sync::Arc;

    fn submission(email: &str) -> ApplicantCreateDBRequest {
        ApplicantCreateDBRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            phone_number: "+44-555-0101".to_string(),
            city: Some("London".to_string()),
            occupation: Some("Mathematician".to_string()),
            referred_by: None,
            survey: None,
        }
    }

    fn notifier(pool: &PgPool) -> Notifier {
        Notifier::new(pool.clone(), Arc::new(NotificationHub::new()))
    }

    fn email_service() -> EmailService {
        EmailService::new(&crate::test_utils::create_test_config()).unwrap()
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("a@example.com"));
        assert!(is_valid_email("user.name+tag@sub.example.co.uk"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a@"));
        assert!(!is_valid_email("a@nodot"));
        assert!(!is_valid_email("a b@example.com"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_submit_validates_required_fields(pool: PgPool) {
        let notifier = notifier(&pool);

        let mut bad = submission("a@example.com");
        bad.first_name = "".to_string();
        assert!(matches!(
            submit(&pool, &notifier, &bad).await.unwrap_err(),
            Error::BadRequest { .. }
        ));

        let mut bad = submission("not-an-email");
        bad.email = "not-an-email".to_string();
        assert!(matches!(
            submit(&pool, &notifier, &bad).await.unwrap_err(),
            Error::BadRequest { .. }
        ));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_submit_notifies_every_admin(pool: PgPool) {
        let admin = crate::test_utils::create_test_admin_user(&pool).await;
        let notifier = notifier(&pool);

        let applicant = submit(&pool, &notifier, &submission("new@example.com")).await.unwrap();
        assert_eq!(applicant.status, ApplicantStatus::Pending);

        let mut conn = pool.acquire().await.unwrap();
        let mut notifications = crate::db::handlers::Notifications::new(&mut conn);
        let rows = notifications.list_for_recipient(admin.id, 0, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].verb, "applicant.submitted");
        assert_eq!(rows[0].target_id, Some(applicant.id));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_approve_provisions_inactive_account_once(pool: PgPool) {
        let reviewer = crate::test_utils::create_test_admin_user(&pool).await;
        let config = crate::test_utils::create_test_config();
        let notifier = notifier(&pool);
        let email = email_service();

        let applicant = submit(&pool, &notifier, &submission("a@example.com")).await.unwrap();

        // Approve: account created inactive, one activation token exists
        let member = approve(&pool, &email, &config, applicant.id, reviewer.id).await.unwrap();
        assert_eq!(member.user.email, "a@example.com");
        assert!(!member.user.is_active);
        assert!(member.user.password_hash.is_none());
        assert_eq!(member.profile.user_id, member.user.id);

        // Second approve: conflict, and still exactly one account
        let err = approve(&pool, &email, &config, applicant.id, reviewer.id).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = 'a@example.com'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_approve_existing_account_rejects_entry(pool: PgPool) {
        let reviewer = crate::test_utils::create_test_admin_user(&pool).await;
        let config = crate::test_utils::create_test_config();
        let notifier = notifier(&pool);
        let email = email_service();

        let existing = crate::test_utils::create_test_user(&pool).await;
        let applicant = submit(&pool, &notifier, &submission(&existing.email)).await.unwrap();

        let err = approve(&pool, &email, &config, applicant.id, reviewer.id).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));

        // Marked rejected, never approved, no second account
        let mut conn = pool.acquire().await.unwrap();
        let mut applicants = Applicants::new(&mut conn);
        let entry = applicants.get_by_id(applicant.id).await.unwrap().unwrap();
        assert_eq!(entry.status, ApplicantStatus::Rejected);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = $1")
            .bind(&existing.email)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_check_existing_tracks_approval(pool: PgPool) {
        let reviewer = crate::test_utils::create_test_admin_user(&pool).await;
        let config = crate::test_utils::create_test_config();
        let notifier = notifier(&pool);
        let email = email_service();

        let first = submit(&pool, &notifier, &submission("first@example.com")).await.unwrap();
        let _second = submit(&pool, &notifier, &submission("second@example.com")).await.unwrap();

        assert!(!check_existing(&pool, "first@example.com").await.unwrap());
        assert!(!check_existing(&pool, "second@example.com").await.unwrap());

        approve(&pool, &email, &config, first.id, reviewer.id).await.unwrap();

        assert!(check_existing(&pool, "first@example.com").await.unwrap());
        assert!(!check_existing(&pool, "second@example.com").await.unwrap());

        // A fresh submission for the approved email now conflicts
        let err = submit(&pool, &notifier, &submission("first@example.com")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_reject_requires_catalog_reason_and_is_terminal(pool: PgPool) {
        let reviewer = crate::test_utils::create_test_admin_user(&pool).await;
        let notifier = notifier(&pool);
        let email = email_service();

        let applicant = submit(&pool, &notifier, &submission("maybe@example.com")).await.unwrap();

        // Unknown reason is a request error, nothing mutated
        let err = reject(&pool, &email, applicant.id, reviewer.id, Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));

        let reason_id = {
            let mut conn = pool.acquire().await.unwrap();
            let mut applicants = Applicants::new(&mut conn);
            applicants.get_rejection_reason_by_code("not_a_fit").await.unwrap().unwrap().id
        };

        let rejected = reject(&pool, &email, applicant.id, reviewer.id, reason_id, Some("not yet"))
            .await
            .unwrap();
        assert_eq!(rejected.status, ApplicantStatus::Rejected);

        // Terminal: a second rejection conflicts
        let err = reject(&pool, &email, applicant.id, reviewer.id, reason_id, None).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }
}
