//! View/like counters.
//!
//! Every increment is a single SQL statement, so concurrent requests cannot
//! lose updates. Views are best-effort by policy: the handler logs and
//! swallows a failed view increment instead of failing the page read. Likes
//! are exactly-once per client token when one is supplied, and best-effort
//! otherwise.

use crate::db::post_repo;
use crate::error::{AppError, Result};
use crate::metrics;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct CounterService {
    pool: PgPool,
}

impl CounterService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record one view. Errors out only when the post does not exist.
    pub async fn record_view(&self, post_id: Uuid) -> Result<()> {
        if !post_repo::increment_view_count(&self.pool, post_id).await? {
            return Err(AppError::NotFound(format!("post {}", post_id)));
        }
        metrics::VIEWS_RECORDED_TOTAL.inc();
        Ok(())
    }

    /// Record one like. With a client token the like is deduplicated: the
    /// first call counts, repeats are accepted but change nothing. Returns
    /// whether the counter actually moved.
    pub async fn record_like(&self, post_id: Uuid, client_token: Option<&str>) -> Result<bool> {
        match client_token {
            Some(token) if !token.trim().is_empty() => {
                match post_repo::increment_like_count_deduped(&self.pool, post_id, token.trim())
                    .await
                {
                    Ok(true) => Ok(true),
                    // Token already claimed: idempotent success, confirm the
                    // post exists so a dead id still 404s.
                    Ok(false) => {
                        post_repo::find_post_by_id(&self.pool, post_id)
                            .await?
                            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;
                        Ok(false)
                    }
                    // The token insert references the posts table; a foreign
                    // key violation means the post is gone.
                    Err(err) if is_missing_post(&err) => {
                        Err(AppError::NotFound(format!("post {}", post_id)))
                    }
                    Err(err) => Err(err.into()),
                }
            }
            _ => {
                if !post_repo::increment_like_count(&self.pool, post_id).await? {
                    return Err(AppError::NotFound(format!("post {}", post_id)));
                }
                Ok(true)
            }
        }
    }
}

fn is_missing_post(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.constraint() == Some("post_likes_post_id_fkey"),
        _ => false,
    }
}
