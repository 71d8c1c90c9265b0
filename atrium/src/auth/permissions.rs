//! Typed permission checking at the route boundary.
//!
//! Handlers declare what they need in their signature:
//!
//! ```ignore
//! async fn list_applicants(
//!     State(state): State<AppState>,
//!     admin: RequiresPermission<resource::Applicants, operation::ReadAll>,
//! ) -> Result<...> { ... }
//! ```
//!
//! Extraction authenticates the caller and verifies the permission in one
//! step; the extractor derefs to [`CurrentUser`] for the handler body.

use std::marker::PhantomData;
use std::ops::Deref;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    api::models::users::CurrentUser,
    errors::{Error, Result},
    types::{Operation, Permission, Resource},
    AppState,
};

/// Marker types naming a [`Resource`] at the type level.
pub mod resource {
    use crate::types::Resource;

    pub trait ResourceMarker: Send + Sync + 'static {
        const RESOURCE: Resource;
    }

    macro_rules! resource_marker {
        ($name:ident) => {
            pub struct $name;
            impl ResourceMarker for $name {
                const RESOURCE: Resource = Resource::$name;
            }
        };
    }

    resource_marker!(Users);
    resource_marker!(Profiles);
    resource_marker!(Applicants);
    resource_marker!(Roles);
    resource_marker!(Plans);
    resource_marker!(Subscriptions);
    resource_marker!(Notifications);
    resource_marker!(Teams);
}

/// Marker types naming an [`Operation`] at the type level.
pub mod operation {
    use crate::types::Operation;

    pub trait OperationMarker: Send + Sync + 'static {
        const OPERATION: Operation;
    }

    macro_rules! operation_marker {
        ($name:ident) => {
            pub struct $name;
            impl OperationMarker for $name {
                const OPERATION: Operation = Operation::$name;
            }
        };
    }

    operation_marker!(CreateAll);
    operation_marker!(CreateOwn);
    operation_marker!(ReadAll);
    operation_marker!(ReadOwn);
    operation_marker!(UpdateAll);
    operation_marker!(UpdateOwn);
    operation_marker!(DeleteAll);
    operation_marker!(DeleteOwn);
}

/// Whether a user may perform an operation on a resource class.
///
/// Admins can do everything. Everyone else is limited to own-scoped
/// operations; the handlers then constrain queries to the caller's rows.
pub fn has_permission(user: &CurrentUser, _resource: Resource, operation: Operation) -> bool {
    if user.is_admin {
        return true;
    }

    matches!(
        operation,
        Operation::CreateOwn | Operation::ReadOwn | Operation::UpdateOwn | Operation::DeleteOwn
    )
}

/// Extractor that authenticates and authorizes in one step.
pub struct RequiresPermission<R, O> {
    pub user: CurrentUser,
    _marker: PhantomData<fn() -> (R, O)>,
}

impl<R, O> Deref for RequiresPermission<R, O> {
    type Target = CurrentUser;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl<R, O> FromRequestParts<AppState> for RequiresPermission<R, O>
where
    R: resource::ResourceMarker,
    O: operation::OperationMarker,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = CurrentUser::from_request_parts(parts, state).await?;

        if !has_permission(&user, R::RESOURCE, O::OPERATION) {
            return Err(Error::InsufficientPermissions {
                required: Permission::Allow(R::RESOURCE, O::OPERATION),
                action: O::OPERATION,
                resource: R::RESOURCE.to_string(),
            });
        }

        Ok(Self {
            user,
            _marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(is_admin: bool) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "perm@example.com".to_string(),
            first_name: "Perm".to_string(),
            last_name: "Check".to_string(),
            is_admin,
        }
    }

    #[test]
    fn test_admin_can_do_everything() {
        let admin = user(true);
        for op in [Operation::CreateAll, Operation::ReadAll, Operation::UpdateAll, Operation::DeleteAll] {
            assert!(has_permission(&admin, Resource::Applicants, op));
        }
    }

    #[test]
    fn test_member_is_own_scoped() {
        let member = user(false);
        assert!(has_permission(&member, Resource::Notifications, Operation::ReadOwn));
        assert!(has_permission(&member, Resource::Profiles, Operation::UpdateOwn));
        assert!(!has_permission(&member, Resource::Applicants, Operation::ReadAll));
        assert!(!has_permission(&member, Resource::Teams, Operation::CreateAll));
    }
}
