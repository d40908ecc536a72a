//! Notification dispatcher.
//!
//! On a publish event (when the admin asked to notify) the dispatcher
//! snapshots the active subscriber list in one read, then drives a fan-out
//! of individual SMTP sends with per-recipient outcome tracking. A failed
//! recipient is recorded and the batch continues; nothing is retried
//! automatically. Manual retry is a re-dispatch against the failed subset.
//!
//! Dispatch runs on a background task: it never blocks the publish request,
//! and shutdown cancels it cooperatively, preserving recorded outcomes and
//! finalizing the batch as cancelled rather than rolling it back.

use crate::config::{SiteConfig, SmtpConfig};
use crate::db::{batch_repo, post_repo};
use crate::error::{AppError, Result};
use crate::events::{EventBus, PostEvent};
use crate::metrics;
use crate::models::{
    BatchRecipient, BatchStatus, BatchSummary, DeliveryOutcome, NotificationBatch, Post,
};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Mail transport collaborator: one call per recipient.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// SMTP implementation over lettre.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let builder = if config.allow_insecure {
            tracing::warn!("SMTP transport running without TLS");
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        } else if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| AppError::Internal(format!("SMTP TLS setup failed: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| AppError::Internal(format!("SMTP TLS setup failed: {}", e)))?
        };

        let builder = builder.port(config.port);
        let builder = if config.username.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
        };

        let from = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .map_err(|e| AppError::Internal(format!("invalid SMTP from address: {}", e)))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to
                .parse()
                .map_err(|e| AppError::Transport(format!("invalid recipient {}: {}", to, e)))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::Transport(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?;

        Ok(())
    }
}

pub struct NotificationDispatcher {
    pool: PgPool,
    transport: Option<Arc<dyn MailTransport>>,
    site: SiteConfig,
    events: EventBus,
    shutdown: broadcast::Sender<()>,
}

impl NotificationDispatcher {
    pub fn new(
        pool: PgPool,
        transport: Option<Arc<dyn MailTransport>>,
        site: SiteConfig,
        events: EventBus,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            pool,
            transport,
            site,
            events,
            shutdown,
        }
    }

    /// Background worker: consumes publish events until shutdown.
    pub async fn run(self: Arc<Self>) {
        let mut events = self.events.subscribe();
        let mut shutdown = self.shutdown.subscribe();

        tracing::info!("notification dispatcher worker started");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(PostEvent::Published { post_id, notify: true }) => {
                        match self.dispatch(post_id).await {
                            Ok(summary) => tracing::info!(
                                %post_id,
                                batch_id = %summary.batch.id,
                                sent = summary.sent,
                                failed = summary.failed,
                                skipped = summary.skipped,
                                "notification batch finished"
                            ),
                            Err(err) => tracing::error!(%post_id, "notification dispatch failed: {}", err),
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("dispatcher lagged, {} events dropped", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("notification dispatcher worker stopped");
    }

    /// Run one batch for a published post against the current active
    /// subscriber set. Each call produces a distinct batch; prior history
    /// is available via `list_batches` for callers that care.
    pub async fn dispatch(&self, post_id: Uuid) -> Result<BatchSummary> {
        let post = post_repo::find_post_by_id(&self.pool, post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;

        if !post.is_published() {
            return Err(AppError::Validation(
                "only published posts can be announced".to_string(),
            ));
        }

        // Snapshot: one consistent read; later subscribe/unsubscribe calls
        // cannot change this batch's membership.
        let recipients: Vec<String> = crate::db::subscriber_repo::list_active(&self.pool)
            .await?
            .into_iter()
            .map(|s| s.email)
            .collect();

        self.run_batch(&post, recipients).await
    }

    /// Re-dispatch against only the failed subset of an earlier batch.
    pub async fn redispatch_failed(&self, batch_id: Uuid) -> Result<BatchSummary> {
        let batch = batch_repo::find_batch(&self.pool, batch_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("batch {}", batch_id)))?;

        let post = post_repo::find_post_by_id(&self.pool, batch.post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", batch.post_id)))?;

        let recipients = batch_repo::failed_recipients(&self.pool, batch_id).await?;
        if recipients.is_empty() {
            return Err(AppError::Validation(format!(
                "batch {} has no failed recipients",
                batch_id
            )));
        }

        self.run_batch(&post, recipients).await
    }

    pub async fn batch_summary(&self, batch_id: Uuid) -> Result<BatchSummary> {
        let batch = batch_repo::find_batch(&self.pool, batch_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("batch {}", batch_id)))?;
        self.summarize(batch).await
    }

    pub async fn list_batches(&self, post_id: Uuid) -> Result<Vec<NotificationBatch>> {
        Ok(batch_repo::list_batches_for_post(&self.pool, post_id).await?)
    }

    /// Per-recipient outcome rows in snapshot order.
    pub async fn batch_recipients(&self, batch_id: Uuid) -> Result<Vec<BatchRecipient>> {
        batch_repo::find_batch(&self.pool, batch_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("batch {}", batch_id)))?;
        Ok(batch_repo::list_recipients(&self.pool, batch_id).await?)
    }

    async fn run_batch(&self, post: &Post, recipients: Vec<String>) -> Result<BatchSummary> {
        let batch_id = Uuid::new_v4();
        let batch = batch_repo::create_batch(&self.pool, batch_id, post.id, &recipients).await?;

        tracing::info!(
            %batch_id,
            post_id = %post.id,
            recipients = recipients.len(),
            "notification batch started"
        );

        let transport = match &self.transport {
            Some(transport) => transport,
            None => {
                // No transport configured: the snapshot stays recorded as
                // skipped and the batch completes immediately.
                tracing::warn!(%batch_id, "mail transport disabled, recipients skipped");
                batch_repo::finalize_batch(&self.pool, batch_id, BatchStatus::Complete).await?;
                return self.summarize(batch).await;
            }
        };

        let (subject, body) = compose_email(&self.site, post);
        let mut shutdown = self.shutdown.subscribe();
        let mut cancelled = false;

        for email in &recipients {
            let outcome = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    cancelled = true;
                    break;
                }
                result = transport.send(email, &subject, &body) => result,
            };

            match outcome {
                Ok(()) => {
                    batch_repo::record_outcome(
                        &self.pool,
                        batch_id,
                        email,
                        DeliveryOutcome::Sent,
                        None,
                    )
                    .await?;
                    metrics::NOTIFICATIONS_SENT_TOTAL.inc();
                }
                Err(err) => {
                    tracing::warn!(%batch_id, recipient = %email, "delivery failed: {}", err);
                    batch_repo::record_outcome(
                        &self.pool,
                        batch_id,
                        email,
                        DeliveryOutcome::Failed,
                        Some(&err.to_string()),
                    )
                    .await?;
                    metrics::NOTIFICATIONS_FAILED_TOTAL.inc();
                }
            }
        }

        let status = if cancelled {
            tracing::warn!(%batch_id, "batch cancelled mid-run, recorded outcomes preserved");
            BatchStatus::Cancelled
        } else {
            BatchStatus::Complete
        };
        batch_repo::finalize_batch(&self.pool, batch_id, status).await?;

        self.summarize(batch).await
    }

    async fn summarize(&self, batch: NotificationBatch) -> Result<BatchSummary> {
        let refreshed = batch_repo::find_batch(&self.pool, batch.id)
            .await?
            .unwrap_or(batch);
        let (sent, failed, skipped) = batch_repo::outcome_counts(&self.pool, refreshed.id).await?;

        Ok(BatchSummary {
            batch: refreshed,
            sent,
            failed,
            skipped,
        })
    }
}

/// Announcement email for a newly published post.
pub fn compose_email(site: &SiteConfig, post: &Post) -> (String, String) {
    let subject = format!("New research: {}", post.title);
    let link = format!("{}/post/{}", site.base_url.trim_end_matches('/'), post.slug);
    let body = format!(
        "New research has been published on {}:\n\n{}\n\nRead the full report here: {}\n\n-- {}\n",
        site.title, post.title, link, site.title
    );
    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PostStatus;
    use chrono::Utc;

    fn published_post() -> Post {
        Post {
            id: Uuid::new_v4(),
            title: "Dust Storm Season".to_string(),
            slug: "dust-storm-season".to_string(),
            content: "<p>It begins.</p>".to_string(),
            media_key: Some("storm.jpg".to_string()),
            media_kind: Some("image".to_string()),
            tags: vec!["weather".to_string()],
            status: PostStatus::Published.as_str().to_string(),
            views: 0,
            likes: 0,
            created_at: Utc::now(),
            published_at: Some(Utc::now()),
        }
    }

    fn smtp_config(use_starttls: bool, allow_insecure: bool) -> SmtpConfig {
        SmtpConfig {
            host: "smtp.the-planet-mars.org".to_string(),
            port: 587,
            use_starttls,
            allow_insecure,
            username: "mission-control".to_string(),
            password: "secret".to_string(),
            from_email: "mission-control@the-planet-mars.org".to_string(),
            from_name: "Mission Control".to_string(),
        }
    }

    #[test]
    fn mailer_builds_tls_transports_and_the_dev_fallback() {
        assert!(SmtpMailer::new(&smtp_config(true, false)).is_ok());
        assert!(SmtpMailer::new(&smtp_config(false, false)).is_ok());
        assert!(SmtpMailer::new(&smtp_config(true, true)).is_ok());
    }

    #[test]
    fn email_links_to_the_post_slug() {
        let site = SiteConfig {
            title: "the-planet-mars.org".to_string(),
            base_url: "https://the-planet-mars.org/".to_string(),
            description: "Scientific news from Mars.".to_string(),
        };
        let (subject, body) = compose_email(&site, &published_post());

        assert_eq!(subject, "New research: Dust Storm Season");
        assert!(body.contains("https://the-planet-mars.org/post/dust-storm-season"));
        assert!(!body.contains("//post"), "double slash in link: {}", body);
    }
}
