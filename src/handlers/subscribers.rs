//! Admin subscriber dashboard.

use crate::error::Result;
use crate::services::SubscriberService;
use actix_web::{web, HttpResponse};

pub async fn list_subscribers(subscribers: web::Data<SubscriberService>) -> Result<HttpResponse> {
    let active = subscribers.list_active().await?;
    Ok(HttpResponse::Ok().json(active))
}
