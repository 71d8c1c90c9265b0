//! Authentication and authorization.
//!
//! Authentication is JWT-based: a successful login issues a session token
//! that travels either as an HTTP-only cookie (browsers) or a bearer token
//! (API clients and the realtime channel, which passes it as a query
//! parameter at connect time). [`current_user`] tries both.
//!
//! Authorization is deliberately small: accounts with `is_admin` can do
//! everything, everyone else is limited to own-scoped operations, enforced
//! by the typed [`permissions::RequiresPermission`] extractor at the route
//! boundary and ownership checks in the repositories.
//!
//! # Modules
//!
//! - [`current_user`]: extractor for the authenticated user
//! - [`password`]: Argon2 hashing and random token generation
//! - [`permissions`]: typed permission extractor
//! - [`session`]: JWT session token creation and verification

pub mod current_user;
pub mod password;
pub mod permissions;
pub mod session;
