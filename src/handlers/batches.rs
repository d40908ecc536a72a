//! Admin notification batch endpoints.

use crate::error::Result;
use crate::services::NotificationDispatcher;
use actix_web::{web, HttpResponse};
use std::sync::Arc;
use uuid::Uuid;

/// Batch history for one post, newest first.
pub async fn list_post_batches(
    dispatcher: web::Data<Arc<NotificationDispatcher>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let batches = dispatcher.list_batches(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(batches))
}

/// Per-recipient outcome totals for one batch.
pub async fn get_batch_summary(
    dispatcher: web::Data<Arc<NotificationDispatcher>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let summary = dispatcher.batch_summary(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// Per-recipient outcome rows for one batch, in snapshot order.
pub async fn list_batch_recipients(
    dispatcher: web::Data<Arc<NotificationDispatcher>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let recipients = dispatcher.batch_recipients(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(recipients))
}

/// Re-run delivery against the failed subset of an earlier batch. Runs
/// inline; the response carries the new batch's summary.
pub async fn redispatch_batch(
    dispatcher: web::Data<Arc<NotificationDispatcher>>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let summary = dispatcher.redispatch_failed(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(summary))
}
