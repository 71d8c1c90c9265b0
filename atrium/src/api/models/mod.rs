//! API request and response data models.
//!
//! These define the public API contract and are deliberately separate from
//! the database models in [`crate::db::models`], converted via `From` impls
//! at the handler boundary. All models carry `utoipa` schema annotations
//! for the generated OpenAPI document.

pub mod applicants;
pub mod auth;
pub mod notifications;
pub mod pagination;
pub mod plans;
pub mod profiles;
pub mod subscriptions;
pub mod teams;
pub mod users;
