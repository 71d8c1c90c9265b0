//! Common type definitions and permission system types.
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`UserId`]: member/account identifier
//! - [`ApplicantId`]: waiting-list entry identifier
//! - [`PlanId`], [`TeamId`], [`NotificationId`], [`RoleId`]
//!
//! The permission system combines a [`Resource`] (what is accessed) with an
//! [`Operation`] (what is done to it). Operations come in `All` and `Own`
//! flavors: `ReadAll` is unrestricted, `ReadOwn` is limited to the caller's
//! own rows.

use std::fmt;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type ApplicantId = Uuid;
pub type PlanId = Uuid;
pub type TeamId = Uuid;
pub type NotificationId = Uuid;
pub type RoleId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

// Operations that can be performed on resources
// *-All means unrestricted access, *-Own means restricted to own resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAll,
    CreateOwn,
    ReadAll,
    ReadOwn,
    UpdateAll,
    UpdateOwn,
    DeleteAll,
    DeleteOwn,
}

// Resources that can be operated on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    Profiles,
    Applicants,
    Roles,
    Plans,
    Subscriptions,
    Notifications,
    Teams,
}

// Permission types for authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    /// Simple permission: (Resource, Operation)
    Allow(Resource, Operation),
    /// Logical combinator: any of the listed permissions suffices
    Any(Vec<Permission>),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateAll | Operation::CreateOwn => write!(f, "Create"),
            Operation::ReadAll | Operation::ReadOwn => write!(f, "Read"),
            Operation::UpdateAll | Operation::UpdateOwn => write!(f, "Update"),
            Operation::DeleteAll | Operation::DeleteOwn => write!(f, "Delete"),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Users => "users",
            Resource::Profiles => "profiles",
            Resource::Applicants => "applicants",
            Resource::Roles => "roles",
            Resource::Plans => "plans",
            Resource::Subscriptions => "subscriptions",
            Resource::Notifications => "notifications",
            Resource::Teams => "teams",
        };
        write!(f, "{name}")
    }
}
