//! Admin post lifecycle endpoints.

use crate::config::Config;
use crate::error::Result;
use crate::services::{NewPost, PostService, UpdatePost};
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    pub media_key: Option<String>,
    pub media_kind: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update. Media fields distinguish "absent" (leave as is) from
/// `null` (clear the attachment).
#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub media_key: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub media_kind: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub notify: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Create a new draft.
pub async fn create_post(
    service: web::Data<PostService>,
    req: web::Json<CreatePostRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let post = service
        .create(NewPost {
            title: req.title,
            content: req.content,
            media_key: req.media_key,
            media_kind: req.media_kind,
            tags: req.tags,
        })
        .await?;

    Ok(HttpResponse::Created().json(post))
}

/// All posts for the dashboard, drafts included.
pub async fn list_posts(
    service: web::Data<PostService>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    let posts = service.list_all(limit, offset).await?;
    Ok(HttpResponse::Ok().json(posts))
}

pub async fn get_post(
    service: web::Data<PostService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let post = service.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn update_post(
    service: web::Data<PostService>,
    path: web::Path<Uuid>,
    req: web::Json<UpdatePostRequest>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    let post = service
        .edit(
            path.into_inner(),
            UpdatePost {
                title: req.title,
                content: req.content,
                media_key: req.media_key,
                media_kind: req.media_kind,
                tags: req.tags,
            },
        )
        .await?;

    Ok(HttpResponse::Ok().json(post))
}

/// Draft to published transition. `notify` falls back to the configured
/// default when the request leaves it out.
pub async fn publish_post(
    service: web::Data<PostService>,
    config: web::Data<Config>,
    path: web::Path<Uuid>,
    req: Option<web::Json<PublishRequest>>,
) -> Result<HttpResponse> {
    let notify = req
        .and_then(|r| r.notify)
        .unwrap_or(config.publish.notify_default);

    let post = service.publish(path.into_inner(), notify).await?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn unpublish_post(
    service: web::Data<PostService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let post = service.unpublish(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn delete_post(
    service: web::Data<PostService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    service.delete(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
