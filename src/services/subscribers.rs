//! Subscriber registry.
//!
//! Addresses are case/whitespace-normalized before they touch the database,
//! so the email column's primary key is the dedup. Unsubscribing only
//! deactivates; resubscribing reactivates the original row.

use crate::db::subscriber_repo;
use crate::error::{AppError, Result};
use crate::models::Subscriber;
use sqlx::PgPool;
use validator::ValidateEmail;

#[derive(Clone)]
pub struct SubscriberService {
    pool: PgPool,
}

impl SubscriberService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn subscribe(&self, raw_email: &str) -> Result<Subscriber> {
        let email = normalize_email(raw_email);
        if !email.validate_email() {
            return Err(AppError::Validation(format!(
                "invalid email address: {}",
                raw_email.trim()
            )));
        }

        let subscriber = subscriber_repo::upsert_active(&self.pool, &email).await?;
        tracing::info!(email = %subscriber.email, "subscriber active");
        Ok(subscriber)
    }

    pub async fn unsubscribe(&self, raw_email: &str) -> Result<()> {
        let email = normalize_email(raw_email);
        if !subscriber_repo::deactivate(&self.pool, &email).await? {
            return Err(AppError::NotFound(format!("subscriber {}", email)));
        }
        tracing::info!(email = %email, "subscriber deactivated");
        Ok(())
    }

    /// Active subscribers in stable `subscribed_at` order, for the admin
    /// dashboard and for deterministic batch snapshotting.
    pub async fn list_active(&self) -> Result<Vec<Subscriber>> {
        Ok(subscriber_repo::list_active(&self.pool).await?)
    }

    /// Deactivate on a hard bounce reported by the mail transport. Unknown
    /// addresses are ignored.
    pub async fn mark_bounced(&self, raw_email: &str) -> Result<()> {
        let email = normalize_email(raw_email);
        if subscriber_repo::deactivate(&self.pool, &email).await? {
            tracing::warn!(email = %email, "subscriber deactivated after hard bounce");
        }
        Ok(())
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_trims_and_lowercases() {
        assert_eq!(normalize_email("  Foo@Bar.COM "), "foo@bar.com");
        assert_eq!(normalize_email("already@lower.org"), "already@lower.org");
    }

    #[test]
    fn validator_rejects_junk_addresses() {
        assert!(!normalize_email("not-an-email").validate_email());
        assert!(!normalize_email("@missing-local.org").validate_email());
        assert!(normalize_email(" Curiosity@Gale-Crater.org ").validate_email());
    }
}
