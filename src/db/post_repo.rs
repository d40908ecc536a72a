use crate::models::{Post, PostStatus, SiteStats};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

const POST_COLUMNS: &str = "id, title, slug, content, media_key, media_kind, tags, status, \
                            views, likes, created_at, published_at";

/// Insert a new draft post. Fails with a unique violation on `posts_slug_key`
/// when the slug is taken; the service layer resolves collisions by suffixing.
pub async fn insert_post(
    pool: &PgPool,
    title: &str,
    slug: &str,
    content: &str,
    media_key: Option<&str>,
    media_kind: Option<&str>,
    tags: &[String],
) -> Result<Post, sqlx::Error> {
    let post = sqlx::query_as::<_, Post>(&format!(
        r#"
        INSERT INTO posts (title, slug, content, media_key, media_kind, tags, status)
        VALUES ($1, $2, $3, $4, $5, $6, 'draft')
        RETURNING {POST_COLUMNS}
        "#,
    ))
    .bind(title)
    .bind(slug)
    .bind(content)
    .bind(media_key)
    .bind(media_kind)
    .bind(tags)
    .fetch_one(pool)
    .await?;

    Ok(post)
}

/// True when the error is a unique violation on the post slug constraint.
pub fn is_slug_collision(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.constraint() == Some("posts_slug_key"),
        _ => false,
    }
}

pub async fn find_post_by_id(pool: &PgPool, post_id: Uuid) -> Result<Option<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
    ))
    .bind(post_id)
    .fetch_optional(pool)
    .await
}

pub async fn find_post_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE slug = $1"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await
}

/// Lock a post row for the duration of a transaction. Used by the publish
/// transition so the precondition check and the status flip are atomic.
pub async fn find_post_for_update(
    tx: &mut Transaction<'_, Postgres>,
    post_id: Uuid,
) -> Result<Option<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE id = $1 FOR UPDATE"
    ))
    .bind(post_id)
    .fetch_optional(&mut **tx)
    .await
}

/// Flip a locked draft to published. Caller owns the transaction.
pub async fn mark_published(
    tx: &mut Transaction<'_, Postgres>,
    post_id: Uuid,
) -> Result<Post, sqlx::Error> {
    sqlx::query_as::<_, Post>(&format!(
        r#"
        UPDATE posts
        SET status = 'published', published_at = NOW()
        WHERE id = $1
        RETURNING {POST_COLUMNS}
        "#,
    ))
    .bind(post_id)
    .fetch_one(&mut **tx)
    .await
}

/// Revert a published post to draft. Counters are left untouched.
pub async fn mark_unpublished(pool: &PgPool, post_id: Uuid) -> Result<Option<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(&format!(
        r#"
        UPDATE posts
        SET status = 'draft', published_at = NULL
        WHERE id = $1
        RETURNING {POST_COLUMNS}
        "#,
    ))
    .bind(post_id)
    .fetch_optional(pool)
    .await
}

/// Apply a content edit to a locked row. `published_at`, `views` and
/// `likes` are never written here, and the slug only changes for drafts
/// (service layer rule). Caller owns the transaction.
#[allow(clippy::too_many_arguments)]
pub async fn update_post(
    tx: &mut Transaction<'_, Postgres>,
    post_id: Uuid,
    title: &str,
    slug: &str,
    content: &str,
    media_key: Option<&str>,
    media_kind: Option<&str>,
    tags: &[String],
    status: PostStatus,
) -> Result<Option<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(&format!(
        r#"
        UPDATE posts
        SET title = $2,
            slug = $3,
            content = $4,
            media_key = $5,
            media_kind = $6,
            tags = $7,
            status = $8,
            published_at = CASE WHEN $8 = 'draft' THEN NULL ELSE published_at END
        WHERE id = $1
        RETURNING {POST_COLUMNS}
        "#,
    ))
    .bind(post_id)
    .bind(title)
    .bind(slug)
    .bind(content)
    .bind(media_key)
    .bind(media_kind)
    .bind(tags)
    .bind(status.as_str())
    .fetch_optional(&mut **tx)
    .await
}

/// Remember a media key whose storage delete failed after the owning post
/// row was removed, so a later sweep can retry the release.
pub async fn record_orphaned_media(pool: &PgPool, media_key: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO orphaned_media (media_key) VALUES ($1) ON CONFLICT (media_key) DO NOTHING",
    )
    .bind(media_key)
    .execute(pool)
    .await?;

    Ok(())
}

/// Hard-delete a post, returning its media key so the caller can release
/// the stored object.
pub async fn delete_post(
    pool: &PgPool,
    post_id: Uuid,
) -> Result<Option<Option<String>>, sqlx::Error> {
    let row = sqlx::query("DELETE FROM posts WHERE id = $1 RETURNING media_key")
        .bind(post_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.get::<Option<String>, _>("media_key")))
}

/// All posts for the admin dashboard, newest first, drafts included.
pub async fn list_all(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(&format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts
        ORDER BY created_at DESC
        LIMIT $1 OFFSET $2
        "#,
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Published posts in strictly descending `published_at` order. Drafts
/// never appear here; this is the projector's base query.
pub async fn list_published(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(&format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts
        WHERE status = 'published'
        ORDER BY published_at DESC
        LIMIT $1 OFFSET $2
        "#,
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Case-insensitive title/content search over published posts.
pub async fn search_published(pool: &PgPool, query: &str) -> Result<Vec<Post>, sqlx::Error> {
    let pattern = format!("%{}%", query);

    sqlx::query_as::<_, Post>(&format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts
        WHERE status = 'published'
          AND (title ILIKE $1 OR content ILIKE $1)
        ORDER BY published_at DESC
        "#,
    ))
    .bind(pattern)
    .fetch_all(pool)
    .await
}

pub async fn get_stats(pool: &PgPool) -> Result<SiteStats, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS published_count,
               COALESCE(SUM(views), 0)::BIGINT AS total_views
        FROM posts
        WHERE status = 'published'
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(SiteStats {
        published_count: row.get("published_count"),
        total_views: row.get("total_views"),
    })
}

/// Atomic view increment. Single SQL statement, no application-level
/// read-modify-write, so concurrent requests never lose updates.
pub async fn increment_view_count(pool: &PgPool, post_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE posts SET views = views + 1 WHERE id = $1")
        .bind(post_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Atomic like increment without a dedup token (best-effort).
pub async fn increment_like_count(pool: &PgPool, post_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE posts SET likes = likes + 1 WHERE id = $1")
        .bind(post_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Like increment deduplicated by a client token: the counter only moves
/// when the (post, token) pair is seen for the first time. One statement,
/// so the insert and the increment cannot be split by a concurrent caller.
pub async fn increment_like_count_deduped(
    pool: &PgPool,
    post_id: Uuid,
    client_token: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        WITH claimed AS (
            INSERT INTO post_likes (post_id, client_token)
            VALUES ($1, $2)
            ON CONFLICT (post_id, client_token) DO NOTHING
            RETURNING post_id
        )
        UPDATE posts
        SET likes = likes + 1
        WHERE id = $1 AND EXISTS (SELECT 1 FROM claimed)
        "#,
    )
    .bind(post_id)
    .bind(client_token)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
