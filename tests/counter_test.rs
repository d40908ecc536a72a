//! Integration tests for atomic view/like counters under concurrency.

mod common;

use common::{ready_draft, setup_test_db, test_post_service};
use mars_journal::error::AppError;
use mars_journal::services::CounterService;
use uuid::Uuid;

#[tokio::test]
async fn concurrent_views_never_lose_updates() {
    let pool = setup_test_db().await.expect("test db");
    let posts = test_post_service(&pool);
    let counters = CounterService::new(pool.clone());

    let post = ready_draft(&posts, "Viewed Often").await;

    let mut tasks = Vec::new();
    for _ in 0..25 {
        let counters = counters.clone();
        let post_id = post.id;
        tasks.push(tokio::spawn(async move {
            counters.record_view(post_id).await
        }));
    }
    for task in tasks {
        task.await.expect("join").expect("record view");
    }

    let refreshed = posts.get(post.id).await.expect("get");
    assert_eq!(refreshed.views, 25);
}

#[tokio::test]
async fn likes_with_the_same_token_count_once() {
    let pool = setup_test_db().await.expect("test db");
    let posts = test_post_service(&pool);
    let counters = CounterService::new(pool.clone());

    let post = ready_draft(&posts, "Well Liked").await;

    let first = counters
        .record_like(post.id, Some("reader-a"))
        .await
        .expect("first like");
    let repeat = counters
        .record_like(post.id, Some("reader-a"))
        .await
        .expect("repeat like");
    let other = counters
        .record_like(post.id, Some("reader-b"))
        .await
        .expect("other like");

    assert!(first);
    assert!(!repeat);
    assert!(other);

    let refreshed = posts.get(post.id).await.expect("get");
    assert_eq!(refreshed.likes, 2);
}

#[tokio::test]
async fn anonymous_likes_always_count() {
    let pool = setup_test_db().await.expect("test db");
    let posts = test_post_service(&pool);
    let counters = CounterService::new(pool.clone());

    let post = ready_draft(&posts, "Anonymous Fans").await;

    for _ in 0..3 {
        assert!(counters.record_like(post.id, None).await.expect("like"));
    }

    let refreshed = posts.get(post.id).await.expect("get");
    assert_eq!(refreshed.likes, 3);
}

#[tokio::test]
async fn counters_on_unknown_posts_are_not_found() {
    let pool = setup_test_db().await.expect("test db");
    let counters = CounterService::new(pool.clone());

    let ghost = Uuid::new_v4();
    assert!(matches!(
        counters.record_view(ghost).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        counters.record_like(ghost, Some("reader-a")).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        counters.record_like(ghost, None).await,
        Err(AppError::NotFound(_))
    ));
}
