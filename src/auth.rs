//! Admin credential verification and session tokens.
//!
//! There is a single shared admin credential. The password is checked against
//! an argon2 hash held in configuration, and a successful login issues a
//! short-lived HS256 token; the boundary check is stateless.

use crate::config::AuthConfig;
use crate::error::{AppError, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

const ADMIN_SUBJECT: &str = "admin";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Verify the shared admin password against the configured argon2 hash.
pub fn verify_password(config: &AuthConfig, password: &str) -> Result<()> {
    if config.admin_password_hash.trim().is_empty() {
        return Err(AppError::Authentication(
            "admin credential not configured; set ADMIN_PASSWORD_HASH".to_string(),
        ));
    }

    let parsed = PasswordHash::new(&config.admin_password_hash)
        .map_err(|e| AppError::Internal(format!("invalid ADMIN_PASSWORD_HASH: {}", e)))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AppError::Authentication("invalid credentials".to_string()))
}

/// Hash a password for ADMIN_PASSWORD_HASH (used by the CLI subcommand).
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Issue a session token for the admin.
pub fn issue_token(config: &AuthConfig) -> Result<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: ADMIN_SUBJECT.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(config.token_ttl_hours)).timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;
    Ok(token)
}

/// Validate a bearer token and confirm it carries the admin subject.
pub fn validate_token(config: &AuthConfig, token: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    if data.claims.sub != ADMIN_SUBJECT {
        return Err(AppError::Authentication("unknown subject".to_string()));
    }
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig {
            admin_password_hash: hash_password("correct horse").unwrap(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_hours: 1,
        }
    }

    #[test]
    fn correct_password_verifies() {
        let config = test_config();
        assert!(verify_password(&config, "correct horse").is_ok());
    }

    #[test]
    fn wrong_password_is_rejected() {
        let config = test_config();
        assert!(matches!(
            verify_password(&config, "battery staple"),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn empty_hash_means_login_disabled() {
        let config = AuthConfig {
            admin_password_hash: String::new(),
            jwt_secret: "test-secret".to_string(),
            token_ttl_hours: 1,
        };
        assert!(matches!(
            verify_password(&config, "anything"),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn issued_token_round_trips() {
        let config = test_config();
        let token = issue_token(&config).unwrap();
        let claims = validate_token(&config, &token).unwrap();
        assert_eq!(claims.sub, "admin");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let config = test_config();
        let other = AuthConfig {
            jwt_secret: "different-secret".to_string(),
            ..test_config()
        };
        let token = issue_token(&other).unwrap();
        assert!(validate_token(&config, &token).is_err());
    }
}
