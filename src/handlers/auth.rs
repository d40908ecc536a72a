//! Admin login.

use crate::auth;
use crate::config::Config;
use crate::error::Result;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in_hours: i64,
}

/// Exchange the admin password for a session token.
pub async fn login(
    config: web::Data<Config>,
    req: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    auth::verify_password(&config.auth, &req.password)?;
    let token = auth::issue_token(&config.auth)?;

    tracing::info!("admin session issued");

    Ok(HttpResponse::Ok().json(LoginResponse {
        token,
        expires_in_hours: config.auth.token_ttl_hours,
    }))
}
