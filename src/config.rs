//! Configuration management.
//!
//! Everything is loaded from environment variables with development-friendly
//! defaults; production refuses to start with missing or default secrets.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Public site identity used by the feed projector and emails
    pub site: SiteConfig,
    /// Admin credential and session token settings
    pub auth: AuthConfig,
    /// SMTP mail transport; `None` disables subscriber notifications
    pub smtp: Option<SmtpConfig>,
    /// S3-compatible media storage; `None` disables reachability checks
    pub storage: Option<StorageConfig>,
    /// Publication policy knobs
    pub publish: PublishConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated list of allowed origins
    pub allowed_origins: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    pub max_connections: u32,
}

/// Public identity of the site, used for RSS channel metadata and
/// notification email bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub title: String,
    pub base_url: String,
    pub description: String,
}

/// Admin credential and session token settings.
///
/// There is a single shared admin credential; the password hash is argon2
/// and sessions are stateless HS256 tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub admin_password_hash: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

/// SMTP mail transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// STARTTLS upgrade (true) or implicit TLS on connect (false)
    pub use_starttls: bool,
    /// Plaintext transport for local mailcatchers; rejected in production
    pub allow_insecure: bool,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

/// S3-compatible media storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible providers (MinIO, Spaces)
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Base URL media objects are served from (CDN or bucket endpoint)
    pub public_base_url: String,
}

/// Publication policy knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// When true, editing a published post demotes it back to draft
    pub demote_on_edit: bool,
    /// Default for the publish request's `notify` flag
    pub notify_default: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let is_production = app_env.eq_ignore_ascii_case("production");

        let auth = {
            let admin_password_hash = match std::env::var("ADMIN_PASSWORD_HASH") {
                Ok(value) if !value.trim().is_empty() => value,
                _ if is_production => {
                    return Err("ADMIN_PASSWORD_HASH must be set in production".to_string())
                }
                // Empty hash means the admin login is disabled until one is
                // generated with `mars-journal hash-password`.
                _ => String::new(),
            };

            let jwt_secret = match std::env::var("JWT_SECRET") {
                Ok(value) if !value.trim().is_empty() => value,
                _ if is_production => return Err("JWT_SECRET must be set in production".to_string()),
                _ => "dev-only-journal-secret".to_string(),
            };

            AuthConfig {
                admin_password_hash,
                jwt_secret,
                token_ttl_hours: std::env::var("ADMIN_TOKEN_TTL_HOURS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(12),
            }
        };

        Ok(Config {
            app: AppConfig {
                env: app_env.clone(),
                host: std::env::var("JOURNAL_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("JOURNAL_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
            },
            cors: {
                let allowed_origins = match std::env::var("CORS_ALLOWED_ORIGINS") {
                    Ok(value) => value,
                    Err(_) if is_production => {
                        return Err("CORS_ALLOWED_ORIGINS must be set in production".to_string())
                    }
                    Err(_) => "http://localhost:3000".to_string(),
                };

                if is_production && allowed_origins.trim() == "*" {
                    return Err("CORS_ALLOWED_ORIGINS cannot be '*' in production".to_string());
                }

                CorsConfig { allowed_origins }
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost/mars_journal".to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(10),
            },
            site: SiteConfig {
                title: std::env::var("SITE_TITLE")
                    .unwrap_or_else(|_| "the-planet-mars.org".to_string()),
                base_url: std::env::var("SITE_BASE_URL")
                    .unwrap_or_else(|_| "https://the-planet-mars.org".to_string()),
                description: std::env::var("SITE_DESCRIPTION")
                    .unwrap_or_else(|_| "Scientific news from Mars.".to_string()),
            },
            auth,
            smtp: parse_smtp_config(is_production)?,
            storage: parse_storage_config()?,
            publish: PublishConfig {
                demote_on_edit: std::env::var("PUBLISH_DEMOTE_ON_EDIT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(false),
                notify_default: std::env::var("PUBLISH_NOTIFY_DEFAULT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(true),
            },
        })
    }
}

/// SMTP is optional: with no SMTP_HOST the dispatcher records every
/// recipient as skipped instead of failing.
fn parse_smtp_config(is_production: bool) -> Result<Option<SmtpConfig>, String> {
    let host = match std::env::var("SMTP_HOST") {
        Ok(value) => value,
        Err(_) => return Ok(None),
    };

    let allow_insecure = std::env::var("SMTP_ALLOW_INSECURE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);
    if is_production && allow_insecure {
        return Err("SMTP_ALLOW_INSECURE cannot be set in production".to_string());
    }

    Ok(Some(SmtpConfig {
        host,
        port: std::env::var("SMTP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(587),
        use_starttls: std::env::var("SMTP_USE_STARTTLS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(true),
        allow_insecure,
        username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
        password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
        from_email: std::env::var("SMTP_FROM_EMAIL")
            .unwrap_or_else(|_| "mission-control@the-planet-mars.org".to_string()),
        from_name: std::env::var("SMTP_FROM_NAME")
            .unwrap_or_else(|_| "Mission Control".to_string()),
    }))
}

fn parse_storage_config() -> Result<Option<StorageConfig>, String> {
    let bucket = match std::env::var("S3_BUCKET") {
        Ok(value) if !value.trim().is_empty() => value,
        _ => return Ok(None),
    };

    let endpoint = std::env::var("S3_ENDPOINT").ok();
    let public_base_url = match std::env::var("S3_PUBLIC_BASE_URL") {
        Ok(value) => value.trim_end_matches('/').to_string(),
        Err(_) => match &endpoint {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
            None => return Err("S3_PUBLIC_BASE_URL must be set when S3_ENDPOINT is not".to_string()),
        },
    };

    Ok(Some(StorageConfig {
        bucket,
        region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        endpoint,
        access_key_id: std::env::var("S3_ACCESS_KEY_ID").ok(),
        secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY").ok(),
        public_base_url,
    }))
}
