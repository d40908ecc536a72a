//! Mars Journal
//!
//! Backend for a single-author research blog: a password-gated admin API for
//! writing and publishing posts, and a public read API with archive, search,
//! RSS, and subscriber notifications.
//!
//! # Modules
//!
//! - `handlers`: HTTP request handlers (public, admin, ops)
//! - `models`: Data structures for posts, subscribers, notification batches
//! - `services`: Business logic layer (lifecycle, counters, dispatch, feed)
//! - `db`: Database access layer and repositories
//! - `middleware`: Admin authentication middleware
//! - `events`: In-process post lifecycle event bus
//! - `auth`: Admin credential verification and session tokens
//! - `error`: Error types and handling
//! - `config`: Configuration management
//! - `metrics`: Prometheus collectors

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
