//! Database record models matching table schemas.
//!
//! Structs here correspond to table rows (deriving `sqlx::FromRow` for the
//! runtime query API) plus the create/update request shapes repositories
//! accept. They are deliberately distinct from the API models in
//! [`crate::api::models`] so storage and API representations can evolve
//! independently; repositories return these and handlers convert with
//! `From` impls.

pub mod activation_tokens;
pub mod applicants;
pub mod notifications;
pub mod password_reset_tokens;
pub mod plans;
pub mod profiles;
pub mod roles;
pub mod subscriptions;
pub mod teams;
pub mod users;
