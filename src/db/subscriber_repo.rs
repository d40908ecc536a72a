use crate::models::Subscriber;
use sqlx::PgPool;

/// Upsert a subscriber as active. Resubscribing an inactive address
/// reactivates the original row; `subscribed_at` is never overwritten, so
/// there is exactly one row per normalized email.
pub async fn upsert_active(pool: &PgPool, email: &str) -> Result<Subscriber, sqlx::Error> {
    sqlx::query_as::<_, Subscriber>(
        r#"
        INSERT INTO subscribers (email)
        VALUES ($1)
        ON CONFLICT (email) DO UPDATE SET is_active = TRUE
        RETURNING email, subscribed_at, is_active
        "#,
    )
    .bind(email)
    .fetch_one(pool)
    .await
}

/// Deactivate a subscriber. Returns false when the address is unknown.
pub async fn deactivate(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE subscribers SET is_active = FALSE WHERE email = $1")
        .bind(email)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Active subscribers in stable `subscribed_at` order. A single SELECT, so
/// the dispatcher's snapshot is one consistent read.
pub async fn list_active(pool: &PgPool) -> Result<Vec<Subscriber>, sqlx::Error> {
    sqlx::query_as::<_, Subscriber>(
        r#"
        SELECT email, subscribed_at, is_active
        FROM subscribers
        WHERE is_active
        ORDER BY subscribed_at ASC, email ASC
        "#,
    )
    .fetch_all(pool)
    .await
}
