#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Uniform object storage for Slidecast artifacts.
//!
//! One trait covers the capability surface the pipeline needs
//! (`exists`/`put`/`get`/`delete`/`presign`), with three backends: the local
//! filesystem, Amazon S3, and Alibaba OSS (through its S3-compatible
//! endpoint). Writes always use the canonical key layout from [`paths`];
//! reads probe canonical keys first and then a fixed list of legacy flat
//! keys so pre-existing data stays reachable.

pub mod backfill;
pub mod cloud;
pub mod error;
pub mod local;
pub mod paths;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use slidecast_config::{AppConfig, StorageProviderKind};

pub use backfill::{backfill_legacy_objects, BackfillReport, BackfillTarget};
pub use cloud::CloudStorage;
pub use error::{StorageError, StorageResult};
pub use local::LocalStorage;

/// Capability surface implemented by every storage backend.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Which backend this is; determines the URI scheme.
    fn kind(&self) -> StorageProviderKind;

    /// Whether an object exists under the key.
    ///
    /// # Errors
    ///
    /// Returns an error when the probe itself fails (not when the object is
    /// merely absent).
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Upload a local file, returning the provider-qualified URI.
    ///
    /// # Errors
    ///
    /// Returns an error when the source cannot be read or the write fails.
    async fn put_file(&self, path: &Path, key: &str, content_type: &str)
        -> StorageResult<String>;

    /// Upload in-memory bytes, returning the provider-qualified URI.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    async fn put_bytes(&self, bytes: &[u8], key: &str, content_type: &str)
        -> StorageResult<String>;

    /// Download an object into memory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the object is absent.
    async fn get_bytes(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Download an object to a local path, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the object is absent.
    async fn get_file(&self, key: &str, dest: &Path) -> StorageResult<()>;

    /// Delete an object. Deleting an absent object is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error when the delete call itself fails.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Produce a time-limited direct-download URL.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PresignUnsupported`] for backends without
    /// presigning (local); callers fall back to proxying bytes.
    async fn presign(
        &self,
        key: &str,
        ttl: Duration,
        disposition: Option<&str>,
        content_type: Option<&str>,
    ) -> StorageResult<String>;

    /// Provider-qualified URI for a key (`local://…`, `s3://bucket/…`,
    /// `oss://bucket/…`).
    fn uri_for(&self, key: &str) -> String;

    /// Whether [`StorageProvider::presign`] produces usable URLs.
    fn supports_presign(&self) -> bool {
        false
    }
}

/// Construct the storage backend selected by the process configuration.
///
/// # Errors
///
/// Returns an error when a cloud client cannot be constructed.
pub async fn provider_from_config(
    config: &AppConfig,
) -> StorageResult<std::sync::Arc<dyn StorageProvider>> {
    match config.storage_provider {
        StorageProviderKind::Local => Ok(std::sync::Arc::new(LocalStorage::new(
            config.output_dir.clone(),
        ))),
        StorageProviderKind::S3 => Ok(std::sync::Arc::new(
            CloudStorage::connect_s3(&config.bucket).await?,
        )),
        StorageProviderKind::Oss => Ok(std::sync::Arc::new(
            CloudStorage::connect_oss(&config.bucket).await?,
        )),
    }
}
