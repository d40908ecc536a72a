//! Post lifecycle manager.
//!
//! Owns the draft -> published state machine, slug assignment, and the
//! publish-readiness validation. The precondition check and the status flip
//! run inside one transaction with a row lock, so a reader can never observe
//! a half-published post.

use crate::config::PublishConfig;
use crate::db::post_repo;
use crate::error::{AppError, Result};
use crate::events::{EventBus, PostEvent};
use crate::metrics;
use crate::models::{Post, PostStatus};
use crate::services::media::MediaValidator;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Slug collision retries before giving up. Collisions are resolved by
/// deterministic numeric suffixing, so hitting this cap means something is
/// pathological about the title space.
const MAX_SLUG_ATTEMPTS: u32 = 100;

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub media_key: Option<String>,
    pub media_kind: Option<String>,
    pub tags: Vec<String>,
}

/// Partial update; `None` fields are left as they are.
#[derive(Debug, Clone, Default)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub content: Option<String>,
    pub media_key: Option<Option<String>>,
    pub media_kind: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct PostService {
    pool: PgPool,
    events: EventBus,
    validator: Arc<MediaValidator>,
    policy: PublishConfig,
}

impl PostService {
    pub fn new(
        pool: PgPool,
        events: EventBus,
        validator: Arc<MediaValidator>,
        policy: PublishConfig,
    ) -> Self {
        Self {
            pool,
            events,
            validator,
            policy,
        }
    }

    pub async fn get(&self, post_id: Uuid) -> Result<Post> {
        post_repo::find_post_by_id(&self.pool, post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))
    }

    pub async fn list_all(&self, limit: i64, offset: i64) -> Result<Vec<Post>> {
        Ok(post_repo::list_all(&self.pool, limit, offset).await?)
    }

    /// Create a draft. The slug is derived from the title; collisions get a
    /// deterministic numeric suffix so creation is retryable without manual
    /// intervention.
    pub async fn create(&self, req: NewPost) -> Result<Post> {
        let title = req.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("title must not be empty".to_string()));
        }

        if let (Some(key), Some(kind)) = (&req.media_key, &req.media_kind) {
            MediaValidator::validate_reference(key, kind)?;
        } else if req.media_key.is_some() != req.media_kind.is_some() {
            return Err(AppError::Validation(
                "media reference and media kind must be set together".to_string(),
            ));
        }

        let tags = normalize_tags(&req.tags);
        let base = slugify(title);

        for attempt in 1..=MAX_SLUG_ATTEMPTS {
            let slug = slug_candidate(&base, attempt);
            match post_repo::insert_post(
                &self.pool,
                title,
                &slug,
                &req.content,
                req.media_key.as_deref(),
                req.media_kind.as_deref(),
                &tags,
            )
            .await
            {
                Ok(post) => {
                    tracing::info!(post_id = %post.id, slug = %post.slug, "draft created");
                    return Ok(post);
                }
                Err(err) if post_repo::is_slug_collision(&err) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(AppError::Internal(format!(
            "could not find a free slug for '{}'",
            base
        )))
    }

    /// Edit a post. Drafts may change anything, including the slug when the
    /// title changes. Published posts accept content edits but keep their
    /// slug, `published_at`, and counters; with `demote_on_edit` set the
    /// edit reverts them to draft instead.
    ///
    /// Runs under the same row lock as the publish transition, so an edit
    /// and a concurrent publish serialize instead of racing on a stale
    /// status read.
    pub async fn edit(&self, post_id: Uuid, req: UpdatePost) -> Result<Post> {
        for attempt in 1..=MAX_SLUG_ATTEMPTS {
            match self.try_edit(post_id, &req, attempt).await {
                Err(AppError::Database(err)) if post_repo::is_slug_collision(&err) => continue,
                other => return other,
            }
        }

        Err(AppError::Internal(format!(
            "could not find a free slug for post {}",
            post_id
        )))
    }

    /// One edit attempt inside its own transaction. A slug collision aborts
    /// the transaction, so the caller retries with the next candidate.
    async fn try_edit(&self, post_id: Uuid, req: &UpdatePost, attempt: u32) -> Result<Post> {
        let mut tx = self.pool.begin().await?;

        let current = post_repo::find_post_for_update(&mut tx, post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;
        let was_published = current.is_published();

        let title = match &req.title {
            Some(t) if t.trim().is_empty() => {
                return Err(AppError::Validation("title must not be empty".to_string()))
            }
            Some(t) => t.trim().to_string(),
            None => current.title.clone(),
        };
        let content = req
            .content
            .clone()
            .unwrap_or_else(|| current.content.clone());
        let media_key = req
            .media_key
            .clone()
            .unwrap_or_else(|| current.media_key.clone());
        let media_kind = req
            .media_kind
            .clone()
            .unwrap_or_else(|| current.media_kind.clone());
        let tags = req
            .tags
            .as_deref()
            .map(normalize_tags)
            .unwrap_or_else(|| current.tags.clone());

        if let (Some(key), Some(kind)) = (&media_key, &media_kind) {
            MediaValidator::validate_reference(key, kind)?;
        } else if media_key.is_some() != media_kind.is_some() {
            return Err(AppError::Validation(
                "media reference and media kind must be set together".to_string(),
            ));
        }

        let demote = was_published && self.policy.demote_on_edit;
        let status = if was_published && !demote {
            PostStatus::Published
        } else {
            PostStatus::Draft
        };

        // Slug is immutable once published; drafts follow the title.
        let slug = if !was_published && title != current.title {
            slug_candidate(&slugify(&title), attempt)
        } else {
            current.slug.clone()
        };

        let post = post_repo::update_post(
            &mut tx,
            post_id,
            &title,
            &slug,
            &content,
            media_key.as_deref(),
            media_kind.as_deref(),
            &tags,
            status,
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;

        tx.commit().await?;

        if demote {
            tracing::info!(post_id = %post.id, "published post demoted to draft by edit");
            self.events.publish(PostEvent::Unpublished { post_id });
        }

        Ok(post)
    }

    /// Publish a draft. Validates title, media reference (including the
    /// storage reachability probe), and tags; flips status and
    /// `published_at` atomically; publishing an already-published post is a
    /// no-op success.
    pub async fn publish(&self, post_id: Uuid, notify: bool) -> Result<Post> {
        let mut tx = self.pool.begin().await?;

        let post = post_repo::find_post_for_update(&mut tx, post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;

        if post.is_published() {
            // Idempotent: no field changes, no event, no second notification.
            tx.commit().await?;
            return Ok(post);
        }

        let missing = missing_publish_fields(&post);
        if !missing.is_empty() {
            return Err(AppError::PreconditionFailed { missing });
        }

        // Both present: the missing-field check above guarantees it.
        if let (Some(key), Some(kind)) = (&post.media_key, &post.media_kind) {
            self.validator.validate(key, kind).await?;
        }

        let post = post_repo::mark_published(&mut tx, post_id).await?;
        tx.commit().await?;

        metrics::POSTS_PUBLISHED_TOTAL.inc();
        tracing::info!(post_id = %post.id, slug = %post.slug, notify, "post published");
        self.events.publish(PostEvent::Published { post_id, notify });

        Ok(post)
    }

    /// Revert a published post to draft. Clears `published_at`, leaves
    /// counters untouched.
    pub async fn unpublish(&self, post_id: Uuid) -> Result<Post> {
        let post = post_repo::mark_unpublished(&self.pool, post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;

        tracing::info!(post_id = %post.id, slug = %post.slug, "post unpublished");
        self.events.publish(PostEvent::Unpublished { post_id });
        Ok(post)
    }

    /// Delete a post and release its media object. Deleting twice yields
    /// NotFound the second time.
    pub async fn delete(&self, post_id: Uuid) -> Result<()> {
        let media_key = post_repo::delete_post(&self.pool, post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;

        if let Some(key) = media_key {
            // The row is already gone; a storage failure here is not
            // surfaced, so delete stays idempotent for the caller. The key
            // lands in orphaned_media so a later sweep can retry.
            if let Err(err) = self.validator.release(&key).await {
                tracing::warn!(post_id = %post_id, media_key = %key, "media release failed: {}", err);
                if let Err(err) = post_repo::record_orphaned_media(&self.pool, &key).await {
                    tracing::error!(media_key = %key, "orphan record failed: {}", err);
                }
            }
        }

        tracing::info!(post_id = %post_id, "post deleted");
        self.events.publish(PostEvent::Deleted { post_id });
        Ok(())
    }
}

/// Required fields that are absent, in a stable order for error messages.
pub fn missing_publish_fields(post: &Post) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if post.title.trim().is_empty() {
        missing.push("title");
    }
    if post.media_key.is_none() || post.media_kind.is_none() {
        missing.push("media");
    }
    if post.tags.is_empty() {
        missing.push("tags");
    }
    missing
}

/// Derive a URL-safe slug from a title: lowercase alphanumeric runs joined
/// by single hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    if slug.is_empty() {
        "post".to_string()
    } else {
        slug
    }
}

fn slug_candidate(base: &str, attempt: u32) -> String {
    if attempt == 1 {
        base.to_string()
    } else {
        format!("{}-{}", base, attempt)
    }
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn draft(title: &str) -> Post {
        Post {
            id: Uuid::new_v4(),
            title: title.to_string(),
            slug: slugify(title),
            content: String::new(),
            media_key: None,
            media_kind: None,
            tags: Vec::new(),
            status: PostStatus::Draft.as_str().to_string(),
            views: 0,
            likes: 0,
            created_at: Utc::now(),
            published_at: None,
        }
    }

    #[test]
    fn slugify_basic_titles() {
        assert_eq!(slugify("Mars Rover Update"), "mars-rover-update");
        assert_eq!(slugify("  Dust!! Storm:  Sol 1043  "), "dust-storm-sol-1043");
        assert_eq!(slugify("CO2 & H2O"), "co2-h2o");
    }

    #[test]
    fn slugify_never_returns_empty() {
        assert_eq!(slugify("!!!"), "post");
        assert_eq!(slugify(""), "post");
    }

    #[test]
    fn slug_candidates_are_deterministic() {
        assert_eq!(slug_candidate("mars-rover-update", 1), "mars-rover-update");
        assert_eq!(slug_candidate("mars-rover-update", 2), "mars-rover-update-2");
        assert_eq!(slug_candidate("mars-rover-update", 3), "mars-rover-update-3");
    }

    #[test]
    fn missing_fields_are_listed_in_stable_order() {
        let post = draft("");
        assert_eq!(missing_publish_fields(&post), vec!["title", "media", "tags"]);

        let mut post = draft("Perchlorates in the regolith");
        post.media_key = Some("regolith.jpg".to_string());
        post.media_kind = Some("image".to_string());
        assert_eq!(missing_publish_fields(&post), vec!["tags"]);

        post.tags = vec!["geology".to_string()];
        assert!(missing_publish_fields(&post).is_empty());
    }

    #[test]
    fn media_key_without_kind_still_counts_as_missing_media() {
        let mut post = draft("Untyped upload");
        post.media_key = Some("mystery.bin".to_string());
        post.tags = vec!["misc".to_string()];
        assert_eq!(missing_publish_fields(&post), vec!["media"]);
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let tags = vec![
            " geology ".to_string(),
            "geology".to_string(),
            String::new(),
            "water".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["geology", "water"]);
    }
}
