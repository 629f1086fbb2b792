//! Object storage over Cloudflare R2
//!
//! The server never proxies file bodies. Clients upload and download
//! directly against R2 using presigned URLs minted here; signing is a local
//! computation, so no storage round trip happens on the ticket path.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client as S3Client;

use crate::config::{CloudflareConfig, StorageConfig};
use crate::data::StorageRealm;
use crate::error::{AppError, Result};

/// Signed-URL issuing storage backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Presign a PUT for a direct client upload.
    ///
    /// `protected` stamps the object with `x-amz-meta-protected: true`;
    /// the private bucket's access rules key off it.
    async fn issue_put_url(
        &self,
        realm: StorageRealm,
        key: &str,
        content_type: &str,
        ttl: Duration,
        protected: bool,
    ) -> Result<String>;

    /// Presign a GET against the private bucket.
    async fn issue_get_url(&self, key: &str, ttl: Duration) -> Result<String>;

    /// Delete an object from the realm's bucket.
    async fn delete_object(&self, realm: StorageRealm, key: &str) -> Result<()>;

    /// Deterministic custom-domain URL for a public-realm key.
    fn public_url(&self, key: &str) -> String;
}

/// R2-backed implementation
pub struct R2Store {
    client: S3Client,
    public_bucket: String,
    private_bucket: String,
    /// Custom-domain base for the public bucket, e.g. "https://assets.example.com"
    public_base_url: String,
}

impl R2Store {
    /// Create a new R2 client over both realm buckets.
    pub fn new(storage: &StorageConfig, cloudflare: &CloudflareConfig) -> Self {
        use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

        // R2 endpoint: https://{account_id}.r2.cloudflarestorage.com
        let endpoint = format!(
            "https://{}.r2.cloudflarestorage.com",
            cloudflare.account_id
        );

        let credentials = Credentials::new(
            &cloudflare.r2_access_key_id,
            &cloudflare.r2_secret_access_key,
            None,
            None,
            "tradepost-r2",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            .http_client(super::build_r2_http_client())
            .build();

        Self {
            client: S3Client::from_conf(s3_config),
            public_bucket: storage.public.bucket.clone(),
            private_bucket: storage.private.bucket.clone(),
            public_base_url: storage.public.public_url.trim_end_matches('/').to_string(),
        }
    }

    fn bucket_for(&self, realm: StorageRealm) -> &str {
        match realm {
            StorageRealm::Public => &self.public_bucket,
            StorageRealm::Private => &self.private_bucket,
        }
    }
}

#[async_trait]
impl ObjectStore for R2Store {
    async fn issue_put_url(
        &self,
        realm: StorageRealm,
        key: &str,
        content_type: &str,
        ttl: Duration,
        protected: bool,
    ) -> Result<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| AppError::Storage(format!("invalid presign TTL: {}", e)))?;

        let mut request = self
            .client
            .put_object()
            .bucket(self.bucket_for(realm))
            .key(key)
            .content_type(content_type);
        if protected {
            request = request.metadata("protected", "true");
        }

        let presigned = request
            .presigned(presigning)
            .await
            .map_err(|e| AppError::Storage(format!("R2 presign failed: {}", e)))?;

        Ok(presigned.uri().to_string())
    }

    async fn issue_get_url(&self, key: &str, ttl: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| AppError::Storage(format!("invalid presign TTL: {}", e)))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.private_bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| AppError::Storage(format!("R2 presign failed: {}", e)))?;

        Ok(presigned.uri().to_string())
    }

    async fn delete_object(&self, realm: StorageRealm, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(self.bucket_for(realm))
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("R2 delete failed: {}", e)))?;

        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}
