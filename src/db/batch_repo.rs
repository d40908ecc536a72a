use crate::models::{BatchRecipient, BatchStatus, DeliveryOutcome, NotificationBatch};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Create a batch with its recipient snapshot in one transaction. Every
/// recipient starts as `skipped`; outcomes are updated as sends are
/// attempted, so cancellation simply leaves the tail recorded as skipped.
pub async fn create_batch(
    pool: &PgPool,
    batch_id: Uuid,
    post_id: Uuid,
    recipients: &[String],
) -> Result<NotificationBatch, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let batch = sqlx::query_as::<_, NotificationBatch>(
        r#"
        INSERT INTO notification_batches (id, post_id, status)
        VALUES ($1, $2, 'running')
        RETURNING id, post_id, status, started_at, completed_at
        "#,
    )
    .bind(batch_id)
    .bind(post_id)
    .fetch_one(&mut *tx)
    .await?;

    for (position, email) in recipients.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO notification_recipients (batch_id, email, position)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(batch_id)
        .bind(email)
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(batch)
}

pub async fn record_outcome(
    pool: &PgPool,
    batch_id: Uuid,
    email: &str,
    outcome: DeliveryOutcome,
    error_message: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE notification_recipients
        SET outcome = $3, error_message = $4
        WHERE batch_id = $1 AND email = $2
        "#,
    )
    .bind(batch_id)
    .bind(email)
    .bind(outcome.as_str())
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn finalize_batch(
    pool: &PgPool,
    batch_id: Uuid,
    status: BatchStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE notification_batches
        SET status = $2, completed_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(batch_id)
    .bind(status.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_batch(
    pool: &PgPool,
    batch_id: Uuid,
) -> Result<Option<NotificationBatch>, sqlx::Error> {
    sqlx::query_as::<_, NotificationBatch>(
        r#"
        SELECT id, post_id, status, started_at, completed_at
        FROM notification_batches
        WHERE id = $1
        "#,
    )
    .bind(batch_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_batches_for_post(
    pool: &PgPool,
    post_id: Uuid,
) -> Result<Vec<NotificationBatch>, sqlx::Error> {
    sqlx::query_as::<_, NotificationBatch>(
        r#"
        SELECT id, post_id, status, started_at, completed_at
        FROM notification_batches
        WHERE post_id = $1
        ORDER BY started_at DESC
        "#,
    )
    .bind(post_id)
    .fetch_all(pool)
    .await
}

pub async fn list_recipients(
    pool: &PgPool,
    batch_id: Uuid,
) -> Result<Vec<BatchRecipient>, sqlx::Error> {
    sqlx::query_as::<_, BatchRecipient>(
        r#"
        SELECT batch_id, email, position, outcome, error_message
        FROM notification_recipients
        WHERE batch_id = $1
        ORDER BY position ASC
        "#,
    )
    .bind(batch_id)
    .fetch_all(pool)
    .await
}

/// Addresses whose delivery failed in a batch, in snapshot order. Input to
/// a manual re-dispatch.
pub async fn failed_recipients(
    pool: &PgPool,
    batch_id: Uuid,
) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT email
        FROM notification_recipients
        WHERE batch_id = $1 AND outcome = 'failed'
        ORDER BY position ASC
        "#,
    )
    .bind(batch_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.get("email")).collect())
}

/// Outcome counts for one batch: (sent, failed, skipped).
pub async fn outcome_counts(
    pool: &PgPool,
    batch_id: Uuid,
) -> Result<(i64, i64, i64), sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) FILTER (WHERE outcome = 'sent') AS sent,
               COUNT(*) FILTER (WHERE outcome = 'failed') AS failed,
               COUNT(*) FILTER (WHERE outcome = 'skipped') AS skipped
        FROM notification_recipients
        WHERE batch_id = $1
        "#,
    )
    .bind(batch_id)
    .fetch_one(pool)
    .await?;

    Ok((row.get("sent"), row.get("failed"), row.get("skipped")))
}
