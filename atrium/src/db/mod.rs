//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with PostgreSQL,
//! following the repository pattern: each table gets a repository in
//! [`handlers`] that encapsulates its queries, returning the record structs
//! in [`models`]. Constraint violations are categorized into
//! [`errors::DbError`] so application code can react to conflicts without
//! string-matching driver messages.
//!
//! Repositories are constructed over a `&mut PgConnection`, which lets the
//! caller decide the transactional boundary:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let mut users = Users::new(&mut tx);
//! let user = users.create(&request).await?;
//! tx.commit().await?;
//! ```
//!
//! Migrations live in `migrations/` and are embedded via
//! [`crate::migrator`]; they run automatically at startup.

pub mod errors;
pub mod handlers;
pub mod models;
