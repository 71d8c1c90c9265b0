//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! The API splits into the public surface (waiting-list submission and the
//! exists-check, plan catalog, authentication), the member surface
//! (profile, subscriptions, notifications) and the admin surface
//! (waiting-list review, roles, teams, plan management). All endpoints are
//! documented with OpenAPI annotations via `utoipa`; the rendered docs are
//! served at `/docs`.

pub mod handlers;
pub mod models;
