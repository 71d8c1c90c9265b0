//! Repository implementations for database access.
//!
//! One repository per table. Each wraps a `&mut PgConnection`, provides
//! strongly-typed operations, and returns models from [`crate::db::models`].
//! Most implement the common [`Repository`] trait; tables with a lifecycle
//! that doesn't fit CRUD (activation tokens, the durable subscription
//! record, profiles keyed by user) expose purpose-built methods instead.

pub mod activation_tokens;
pub mod applicants;
pub mod notifications;
pub mod password_reset_tokens;
pub mod plans;
pub mod profiles;
pub mod repository;
pub mod roles;
pub mod subscriptions;
pub mod teams;
pub mod users;

pub use activation_tokens::ActivationTokens;
pub use applicants::Applicants;
pub use notifications::Notifications;
pub use password_reset_tokens::PasswordResetTokens;
pub use plans::Plans;
pub use profiles::Profiles;
pub use repository::Repository;
pub use roles::Roles;
pub use subscriptions::Subscriptions;
pub use teams::Teams;
pub use users::Users;
