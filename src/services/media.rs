//! Media reference validation and the storage collaborator seam.
//!
//! The core never touches raw media bytes; it stores object keys and checks
//! them. Uploads go straight to storage through a presigned URL, the same
//! shape the admin editor expects.

use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use crate::models::MediaKind;
use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use std::time::Duration;

/// Presigned upload URLs expire after 15 minutes.
const PRESIGNED_URL_EXPIRY_SECS: u64 = 900;

/// Opaque put/get/delete-by-reference storage collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check whether the object exists. `Ok(false)` means a clean miss;
    /// `Err(StorageUnavailable)` means storage could not be reached.
    async fn head(&self, key: &str) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Presigned PUT URL for a direct browser upload.
    async fn presign_put(&self, key: &str, content_type: &str) -> Result<String>;

    /// Public URL the object is served from once uploaded.
    fn public_url(&self, key: &str) -> String;
}

/// S3-compatible implementation (AWS, MinIO, Spaces).
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3ObjectStore {
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        use aws_sdk_s3::config::{Credentials, Region};

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "mars_journal_s3",
            ));
        }

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let aws_config = loader.load().await;

        Ok(Self {
            client: Client::new(&aws_config),
            bucket: config.bucket.clone(),
            public_base_url: config.public_base_url.clone(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(AppError::StorageUnavailable(service_err.to_string()))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;

        Ok(())
    }

    async fn presign_put(&self, key: &str, content_type: &str) -> Result<String> {
        let presigning_config =
            PresigningConfig::expires_in(Duration::from_secs(PRESIGNED_URL_EXPIRY_SECS))
                .map_err(|e| AppError::Internal(format!("presigning config: {}", e)))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning_config)
            .await
            .map_err(|e| AppError::StorageUnavailable(e.to_string()))?;

        Ok(request.uri().to_string())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

/// Validates a candidate media reference before a post may publish.
///
/// The format check is always applied; the eager reachability probe only
/// runs when a store is configured.
pub struct MediaValidator {
    store: Option<std::sync::Arc<dyn ObjectStore>>,
}

impl MediaValidator {
    pub fn new(store: Option<std::sync::Arc<dyn ObjectStore>>) -> Self {
        Self { store }
    }

    /// Well-formedness check on the reference and declared kind.
    pub fn validate_reference(key: &str, kind: &str) -> Result<MediaKind> {
        let kind = MediaKind::parse(kind)
            .ok_or_else(|| AppError::Validation(format!("unsupported media kind: {}", kind)))?;

        if key.is_empty() || key.len() > 1024 {
            return Err(AppError::Validation(
                "media reference must be between 1 and 1024 characters".to_string(),
            ));
        }
        if key.chars().any(|c| c.is_whitespace() || c == '\\') {
            return Err(AppError::Validation(
                "media reference contains invalid characters".to_string(),
            ));
        }
        if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
            return Err(AppError::Validation(
                "media reference must be a relative object key".to_string(),
            ));
        }

        Ok(kind)
    }

    /// Full check used by the publish transition: format plus an eager
    /// reachability probe against storage. Read-only; no side effects.
    pub async fn validate(&self, key: &str, kind: &str) -> Result<()> {
        Self::validate_reference(key, kind)?;

        if let Some(store) = &self.store {
            if !store.head(key).await? {
                return Err(AppError::Validation(format!(
                    "media object not found in storage: {}",
                    key
                )));
            }
        }

        Ok(())
    }

    /// Release a stored media object. Failures are surfaced to the caller;
    /// post deletion logs and continues since the row is already gone.
    pub async fn release(&self, key: &str) -> Result<()> {
        if let Some(store) = &self.store {
            store.delete(key).await?;
        }
        Ok(())
    }

    /// Presigned upload URL for a direct-to-storage PUT, plus the public
    /// URL the object will be served from. Requires a configured store.
    pub async fn presign_upload(
        &self,
        key: &str,
        kind: &str,
        content_type: &str,
    ) -> Result<(String, String)> {
        Self::validate_reference(key, kind)?;

        let store = self.store.as_ref().ok_or_else(|| {
            AppError::StorageUnavailable("object storage is not configured".to_string())
        })?;

        let upload_url = store.presign_put(key, content_type).await?;
        Ok((upload_url, store.public_url(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn accepts_well_formed_references() {
        assert_eq!(
            MediaValidator::validate_reference("uploads/2026/dust-storm.jpg", "image").unwrap(),
            MediaKind::Image
        );
        assert_eq!(
            MediaValidator::validate_reference("rover-flyby.mp4", "video").unwrap(),
            MediaKind::Video
        );
    }

    #[test]
    fn rejects_unsupported_kind() {
        let err = MediaValidator::validate_reference("clip.gif", "animation").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn rejects_malformed_references() {
        for key in ["", "has space.jpg", "/absolute.jpg", "a/../b.jpg", "back\\slash.jpg"] {
            assert!(
                MediaValidator::validate_reference(key, "image").is_err(),
                "expected rejection for {:?}",
                key
            );
        }
    }

    #[tokio::test]
    async fn missing_object_fails_validation() {
        let mut store = MockObjectStore::new();
        store.expect_head().returning(|_| Ok(false));

        let validator = MediaValidator::new(Some(Arc::new(store)));
        let err = validator.validate("gone.jpg", "image").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn unreachable_storage_is_a_transient_error() {
        let mut store = MockObjectStore::new();
        store
            .expect_head()
            .returning(|_| Err(AppError::StorageUnavailable("timeout".to_string())));

        let validator = MediaValidator::new(Some(Arc::new(store)));
        let err = validator.validate("fine.jpg", "image").await.unwrap_err();
        assert!(matches!(err, AppError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn no_store_skips_the_reachability_probe() {
        let validator = MediaValidator::new(None);
        validator.validate("fine.jpg", "image").await.unwrap();
    }
}
