//! Admin media upload endpoint.

use crate::error::Result;
use crate::services::MediaValidator;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct PresignRequest {
    pub key: String,
    pub kind: String,
    pub content_type: String,
}

#[derive(Debug, Serialize)]
pub struct PresignResponse {
    pub upload_url: String,
    pub public_url: String,
}

/// Presigned PUT URL so the editor uploads media straight to storage.
pub async fn presign_upload(
    validator: web::Data<Arc<MediaValidator>>,
    req: web::Json<PresignRequest>,
) -> Result<HttpResponse> {
    let (upload_url, public_url) = validator
        .presign_upload(&req.key, &req.kind, &req.content_type)
        .await?;

    Ok(HttpResponse::Ok().json(PresignResponse {
        upload_url,
        public_url,
    }))
}
