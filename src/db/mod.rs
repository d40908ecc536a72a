//! Database access layer.
//!
//! Repositories are plain async functions over a `PgPool` (or a transaction
//! where atomicity matters). Schema lives in `migrations/` and is applied
//! with `sqlx::migrate!` at startup.

pub mod batch_repo;
pub mod post_repo;
pub mod subscriber_repo;
