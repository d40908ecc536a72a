//! Public site endpoints: reads, counters, subscriptions, RSS.

use crate::error::Result;
use crate::services::{CounterService, FeedProjector, SubscriberService};
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

/// Items served by the landing page and the RSS feed.
const FEED_LIMIT: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct ArchiveQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct LikeRequest {
    pub client_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub counted: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub email: String,
}

pub async fn get_recent(feed: web::Data<FeedProjector>) -> Result<HttpResponse> {
    let posts = feed.recent(FEED_LIMIT).await?;
    Ok(HttpResponse::Ok().json(posts))
}

/// Published post by slug. The view counter is best effort: a failed
/// increment is logged and the page is still served.
pub async fn get_published_post(
    feed: web::Data<FeedProjector>,
    counters: web::Data<CounterService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let post = feed.published_by_slug(&path.into_inner()).await?;

    if let Err(err) = counters.record_view(post.id).await {
        tracing::warn!(post_id = %post.id, "view increment failed: {}", err);
    }

    Ok(HttpResponse::Ok().json(post))
}

/// Like a published post, addressed by slug like the read endpoint.
pub async fn like_post(
    feed: web::Data<FeedProjector>,
    counters: web::Data<CounterService>,
    path: web::Path<String>,
    req: Option<web::Json<LikeRequest>>,
) -> Result<HttpResponse> {
    let post = feed.published_by_slug(&path.into_inner()).await?;
    let token = req.as_ref().and_then(|r| r.client_token.as_deref());
    let counted = counters.record_like(post.id, token).await?;
    Ok(HttpResponse::Ok().json(LikeResponse { counted }))
}

pub async fn get_archive(
    feed: web::Data<FeedProjector>,
    query: web::Query<ArchiveQuery>,
) -> Result<HttpResponse> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    let posts = feed.archive(limit, offset).await?;
    Ok(HttpResponse::Ok().json(posts))
}

pub async fn search_posts(
    feed: web::Data<FeedProjector>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse> {
    let posts = feed.search(&query.q).await?;
    Ok(HttpResponse::Ok().json(posts))
}

pub async fn get_stats(feed: web::Data<FeedProjector>) -> Result<HttpResponse> {
    let stats = feed.stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}

pub async fn subscribe(
    subscribers: web::Data<SubscriberService>,
    req: web::Json<SubscriptionRequest>,
) -> Result<HttpResponse> {
    let subscriber = subscribers.subscribe(&req.email).await?;
    Ok(HttpResponse::Ok().json(subscriber))
}

pub async fn unsubscribe(
    subscribers: web::Data<SubscriberService>,
    req: web::Json<SubscriptionRequest>,
) -> Result<HttpResponse> {
    subscribers.unsubscribe(&req.email).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn get_rss(feed: web::Data<FeedProjector>) -> Result<HttpResponse> {
    let xml = feed.rss(FEED_LIMIT).await?;
    Ok(HttpResponse::Ok()
        .content_type("application/rss+xml; charset=utf-8")
        .body(xml))
}
