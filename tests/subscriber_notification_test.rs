//! Integration tests for the subscriber registry, notification batches with
//! partial failure, re-dispatch, and the published-post projections.

mod common;

use async_trait::async_trait;
use common::{ready_draft, setup_test_db, test_post_service, test_site};
use mars_journal::error::{AppError, Result};
use mars_journal::events::EventBus;
use mars_journal::services::{
    FeedProjector, MailTransport, NotificationDispatcher, SubscriberService,
};
use sqlx::{Pool, Postgres};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};

/// Test transport: records deliveries, fails for a configurable set of
/// addresses.
struct FlakyTransport {
    failing: Mutex<HashSet<String>>,
    delivered: Mutex<Vec<String>>,
}

impl FlakyTransport {
    fn new(failing: &[&str]) -> Self {
        Self {
            failing: Mutex::new(failing.iter().map(|s| s.to_string()).collect()),
            delivered: Mutex::new(Vec::new()),
        }
    }

    fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for FlakyTransport {
    async fn send(&self, to: &str, _subject: &str, _body: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(to) {
            return Err(AppError::Transport(format!("mailbox unavailable: {}", to)));
        }
        self.delivered.lock().unwrap().push(to.to_string());
        Ok(())
    }
}

/// Test transport: delivers the first message, signals, then stalls
/// forever so the batch can be interrupted mid-run.
struct StallingTransport {
    first_sent: Notify,
    calls: Mutex<usize>,
}

impl StallingTransport {
    fn new() -> Self {
        Self {
            first_sent: Notify::new(),
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl MailTransport for StallingTransport {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<()> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if call == 1 {
            self.first_sent.notify_one();
            return Ok(());
        }
        std::future::pending::<()>().await;
        unreachable!()
    }
}

fn dispatcher_with(
    pool: &Pool<Postgres>,
    transport: Option<Arc<dyn MailTransport>>,
) -> NotificationDispatcher {
    let (shutdown_tx, _) = broadcast::channel(1);
    NotificationDispatcher::new(
        pool.clone(),
        transport,
        test_site(),
        EventBus::new(16),
        shutdown_tx,
    )
}

#[tokio::test]
async fn resubscribing_reactivates_the_original_row() {
    let pool = setup_test_db().await.expect("test db");
    let subscribers = SubscriberService::new(pool.clone());

    let first = subscribers
        .subscribe(" Reader@Example.ORG ")
        .await
        .expect("subscribe");
    assert_eq!(first.email, "reader@example.org");

    subscribers
        .unsubscribe("reader@example.org")
        .await
        .expect("unsubscribe");
    assert!(subscribers.list_active().await.expect("list").is_empty());

    let again = subscribers
        .subscribe("READER@example.org")
        .await
        .expect("resubscribe");

    assert_eq!(again.subscribed_at, first.subscribed_at);
    assert_eq!(subscribers.list_active().await.expect("list").len(), 1);
}

#[tokio::test]
async fn rejects_malformed_addresses() {
    let pool = setup_test_db().await.expect("test db");
    let subscribers = SubscriberService::new(pool.clone());

    assert!(matches!(
        subscribers.subscribe("not-an-email").await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        subscribers.unsubscribe("never@signed.up").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn a_failed_recipient_does_not_stop_the_batch() {
    let pool = setup_test_db().await.expect("test db");
    let posts = test_post_service(&pool);
    let subscribers = SubscriberService::new(pool.clone());

    for email in ["a@crater.org", "b@crater.org", "c@crater.org"] {
        subscribers.subscribe(email).await.expect("subscribe");
    }

    let post = ready_draft(&posts, "Seismic Event on Sol 4200").await;
    posts.publish(post.id, false).await.expect("publish");

    let transport = Arc::new(FlakyTransport::new(&["b@crater.org"]));
    let dispatcher = dispatcher_with(&pool, Some(transport.clone()));

    let summary = dispatcher.dispatch(post.id).await.expect("dispatch");

    assert_eq!(summary.batch.status, "complete");
    assert!(summary.batch.completed_at.is_some());
    assert_eq!(summary.sent, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 0);

    let delivered = transport.delivered();
    assert!(delivered.contains(&"a@crater.org".to_string()));
    assert!(delivered.contains(&"c@crater.org".to_string()));
}

#[tokio::test]
async fn redispatch_targets_only_the_failed_subset() {
    let pool = setup_test_db().await.expect("test db");
    let posts = test_post_service(&pool);
    let subscribers = SubscriberService::new(pool.clone());

    for email in ["a@crater.org", "b@crater.org", "c@crater.org"] {
        subscribers.subscribe(email).await.expect("subscribe");
    }

    let post = ready_draft(&posts, "Aquifer Confirmed").await;
    posts.publish(post.id, false).await.expect("publish");

    let transport = Arc::new(FlakyTransport::new(&["b@crater.org"]));
    let dispatcher = dispatcher_with(&pool, Some(transport.clone()));

    let first = dispatcher.dispatch(post.id).await.expect("dispatch");
    assert_eq!(first.failed, 1);

    transport.heal();
    let retry = dispatcher
        .redispatch_failed(first.batch.id)
        .await
        .expect("redispatch");

    // The retry batch holds exactly the previously failed recipient.
    assert_ne!(retry.batch.id, first.batch.id);
    assert_eq!(retry.sent, 1);
    assert_eq!(retry.failed, 0);
    assert_eq!(retry.skipped, 0);

    let deliveries_to_b = transport
        .delivered()
        .iter()
        .filter(|e| e.as_str() == "b@crater.org")
        .count();
    assert_eq!(deliveries_to_b, 1);

    // A fully recovered batch has nothing left to re-dispatch.
    assert!(matches!(
        dispatcher.redispatch_failed(retry.batch.id).await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn disabled_transport_records_everyone_as_skipped() {
    let pool = setup_test_db().await.expect("test db");
    let posts = test_post_service(&pool);
    let subscribers = SubscriberService::new(pool.clone());

    subscribers.subscribe("a@crater.org").await.expect("subscribe");
    subscribers.subscribe("b@crater.org").await.expect("subscribe");

    let post = ready_draft(&posts, "Quiet Launch").await;
    posts.publish(post.id, false).await.expect("publish");

    let dispatcher = dispatcher_with(&pool, None);
    let summary = dispatcher.dispatch(post.id).await.expect("dispatch");

    assert_eq!(summary.batch.status, "complete");
    assert_eq!(summary.sent, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 2);
}

#[tokio::test]
async fn shutdown_mid_batch_finalizes_as_cancelled_with_outcomes_preserved() {
    let pool = setup_test_db().await.expect("test db");
    let posts = test_post_service(&pool);
    let subscribers = SubscriberService::new(pool.clone());

    for email in ["a@crater.org", "b@crater.org", "c@crater.org"] {
        subscribers.subscribe(email).await.expect("subscribe");
    }

    let post = ready_draft(&posts, "Interrupted Broadcast").await;
    posts.publish(post.id, false).await.expect("publish");

    let transport = Arc::new(StallingTransport::new());
    let (shutdown_tx, _) = broadcast::channel(1);
    let dispatcher = Arc::new(NotificationDispatcher::new(
        pool.clone(),
        Some(transport.clone() as Arc<dyn MailTransport>),
        test_site(),
        EventBus::new(16),
        shutdown_tx.clone(),
    ));

    let runner = dispatcher.clone();
    let post_id = post.id;
    let batch = tokio::spawn(async move { runner.dispatch(post_id).await });

    // First delivery lands, then the transport wedges; shut down while the
    // second send is in flight.
    transport.first_sent.notified().await;
    shutdown_tx.send(()).expect("signal shutdown");

    let summary = batch.await.expect("join").expect("dispatch");
    assert_eq!(summary.batch.status, "cancelled");
    assert!(summary.batch.completed_at.is_some());
    assert_eq!(summary.sent, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 2);
}

#[tokio::test]
async fn dispatch_requires_a_published_post() {
    let pool = setup_test_db().await.expect("test db");
    let posts = test_post_service(&pool);

    let draft = ready_draft(&posts, "Not Announced Yet").await;
    let dispatcher = dispatcher_with(&pool, None);

    assert!(matches!(
        dispatcher.dispatch(draft.id).await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn projections_exclude_drafts_and_order_newest_first() {
    let pool = setup_test_db().await.expect("test db");
    let posts = test_post_service(&pool);
    let projector = FeedProjector::new(pool.clone(), test_site());

    let older = ready_draft(&posts, "First Light").await;
    posts.publish(older.id, false).await.expect("publish");

    // Distinct published_at timestamps so the ordering is deterministic.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let newer = ready_draft(&posts, "Second Sunrise").await;
    posts.publish(newer.id, false).await.expect("publish");

    ready_draft(&posts, "Still Cooking").await;

    let recent = projector.recent(10).await.expect("recent");
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].slug, "second-sunrise");
    assert_eq!(recent[1].slug, "first-light");

    let found = projector.search("sunrise").await.expect("search");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].slug, "second-sunrise");
    assert!(projector.search("   ").await.expect("blank").is_empty());

    let xml = projector.rss(10).await.expect("rss");
    assert!(xml.contains("<guid isPermaLink=\"false\">second-sunrise</guid>"));
    assert!(!xml.contains("still-cooking"));

    let stats = projector.stats().await.expect("stats");
    assert_eq!(stats.published_count, 2);
}
