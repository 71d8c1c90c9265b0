//! HTTP request handlers for all API endpoints.
//!
//! Handlers validate and deserialize the request, check authentication and
//! authorization, execute business logic through the repositories (and the
//! workflow modules [`crate::admission`] and [`crate::billing::sync`]), and
//! serialize the response. Errors bubble as [`crate::errors::Error`], which
//! maps to status codes and a JSON error envelope in one place.
//!
//! # Handler Modules
//!
//! - [`applicants`]: waiting-list submission, review and the exists-check
//! - [`auth`]: login, activation, password management
//! - [`notifications`]: notification list and read-state
//! - [`plans`]: plan catalog
//! - [`subscriptions`]: subscription create/status/cancel
//! - [`teams`]: moderation teams, memberships and invitations
//! - [`users`]: current user and profile
//! - [`webhooks`]: processor-signed billing webhook
//! - [`ws`]: realtime notification channel

pub mod applicants;
pub mod auth;
pub mod notifications;
pub mod plans;
pub mod subscriptions;
pub mod teams;
pub mod users;
pub mod webhooks;
pub mod ws;
