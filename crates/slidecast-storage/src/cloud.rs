//! Bucket-backed storage over the S3 API.
//!
//! Amazon S3 uses the SDK defaults; Alibaba OSS is served through its
//! S3-compatible endpoint, so both share one client. The only behavioral
//! difference between the two is the URI scheme recorded in state.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use slidecast_config::{BucketConfig, StorageProviderKind};
use tokio::fs;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::paths::build_storage_uri;
use crate::StorageProvider;

/// Storage backend for S3 and S3-compatible (OSS) buckets.
#[derive(Debug, Clone)]
pub struct CloudStorage {
    kind: StorageProviderKind,
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl CloudStorage {
    /// Connect to Amazon S3 using the ambient AWS credential chain.
    ///
    /// # Errors
    ///
    /// Returns an error when the bucket configuration is incomplete.
    pub async fn connect_s3(config: &BucketConfig) -> StorageResult<Self> {
        Self::connect(StorageProviderKind::S3, config).await
    }

    /// Connect to Alibaba OSS through its S3-compatible endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error when the bucket configuration is incomplete.
    pub async fn connect_oss(config: &BucketConfig) -> StorageResult<Self> {
        if config.endpoint.is_none() {
            return Err(StorageError::Config {
                detail: "oss storage requires an endpoint".to_string(),
            });
        }
        Self::connect(StorageProviderKind::Oss, config).await
    }

    async fn connect(kind: StorageProviderKind, config: &BucketConfig) -> StorageResult<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::Config {
                detail: "bucket name is required for cloud storage".to_string(),
            });
        }
        let base = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        let mut builder = aws_sdk_s3::config::Builder::from(&base);
        if let Some(region) = &config.region {
            builder = builder.region(aws_sdk_s3::config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint.clone()).force_path_style(true);
        }
        let client = aws_sdk_s3::Client::from_conf(builder.build());
        debug!(bucket = %config.bucket, provider = kind.scheme(), "cloud storage connected");
        Ok(Self {
            kind,
            client,
            bucket: config.bucket.clone(),
        })
    }

    fn provider_error(
        op: &'static str,
        key: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> StorageError {
        StorageError::Provider {
            op,
            key: key.to_string(),
            source: Box::new(source),
        }
    }
}

#[async_trait]
impl StorageProvider for CloudStorage {
    fn kind(&self) -> StorageProviderKind {
        self.kind
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(error) => {
                let service_error = error.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(Self::provider_error("head_object", key, service_error))
                }
            }
        }
    }

    async fn put_file(&self, path: &Path, key: &str, content_type: &str)
        -> StorageResult<String> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|source| Self::provider_error("put_object.read", key, source))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|source| Self::provider_error("put_object", key, source))?;
        Ok(self.uri_for(key))
    }

    async fn put_bytes(&self, bytes: &[u8], key: &str, content_type: &str)
        -> StorageResult<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|source| Self::provider_error("put_object", key, source))?;
        Ok(self.uri_for(key))
    }

    async fn get_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(error) => {
                let service_error = error.into_service_error();
                return if service_error.is_no_such_key() {
                    Err(StorageError::NotFound {
                        key: key.to_string(),
                    })
                } else {
                    Err(Self::provider_error("get_object", key, service_error))
                };
            }
        };
        let collected = output
            .body
            .collect()
            .await
            .map_err(|source| Self::provider_error("get_object.collect", key, source))?;
        Ok(collected.into_bytes().to_vec())
    }

    async fn get_file(&self, key: &str, dest: &Path) -> StorageResult<()> {
        let bytes = self.get_bytes(key).await?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    op: "get_file.create_dirs",
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        fs::write(dest, bytes)
            .await
            .map_err(|source| StorageError::Io {
                op: "get_file.write",
                path: dest.to_path_buf(),
                source,
            })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|source| Self::provider_error("delete_object", key, source))?;
        Ok(())
    }

    async fn presign(
        &self,
        key: &str,
        ttl: Duration,
        disposition: Option<&str>,
        content_type: Option<&str>,
    ) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|source| Self::provider_error("presign.config", key, source))?;
        let mut request = self.client.get_object().bucket(&self.bucket).key(key);
        if let Some(disposition) = disposition {
            request = request.response_content_disposition(disposition);
        }
        if let Some(content_type) = content_type {
            request = request.response_content_type(content_type);
        }
        let presigned = request
            .presigned(presigning)
            .await
            .map_err(|source| Self::provider_error("presign", key, source))?;
        Ok(presigned.uri().to_string())
    }

    fn uri_for(&self, key: &str) -> String {
        build_storage_uri(self.kind, &self.bucket, key)
    }

    fn supports_presign(&self) -> bool {
        true
    }
}
