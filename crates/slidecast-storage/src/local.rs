//! Filesystem-backed storage under a configured root directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use slidecast_config::StorageProviderKind;
use tokio::fs;

use crate::error::{StorageError, StorageResult};
use crate::StorageProvider;

/// Storage backend that keeps objects as plain files under a root directory.
///
/// Object keys map directly to relative paths; the API layer serves these
/// objects itself, so presigning is unsupported.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create a backend rooted at `root`. The directory is created lazily on
    /// first write.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Absolute path an object key maps to.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }

    async fn prepare_parent(&self, target: &Path) -> StorageResult<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    op: "put.create_dirs",
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    fn kind(&self) -> StorageProviderKind {
        StorageProviderKind::Local
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(fs::try_exists(self.path_for(key)).await.unwrap_or(false))
    }

    async fn put_file(
        &self,
        path: &Path,
        key: &str,
        _content_type: &str,
    ) -> StorageResult<String> {
        let target = self.path_for(key);
        self.prepare_parent(&target).await?;
        // Same-filesystem rename would break callers that reuse the source
        // file afterwards, so always copy.
        fs::copy(path, &target)
            .await
            .map_err(|source| StorageError::Io {
                op: "put_file.copy",
                path: path.to_path_buf(),
                source,
            })?;
        Ok(self.uri_for(key))
    }

    async fn put_bytes(
        &self,
        bytes: &[u8],
        key: &str,
        _content_type: &str,
    ) -> StorageResult<String> {
        let target = self.path_for(key);
        self.prepare_parent(&target).await?;
        fs::write(&target, bytes)
            .await
            .map_err(|source| StorageError::Io {
                op: "put_bytes.write",
                path: target.clone(),
                source,
            })?;
        Ok(self.uri_for(key))
    }

    async fn get_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        let target = self.path_for(key);
        match fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound {
                    key: key.to_string(),
                })
            }
            Err(source) => Err(StorageError::Io {
                op: "get_bytes.read",
                path: target,
                source,
            }),
        }
    }

    async fn get_file(&self, key: &str, dest: &Path) -> StorageResult<()> {
        let source_path = self.path_for(key);
        if !fs::try_exists(&source_path).await.unwrap_or(false) {
            return Err(StorageError::NotFound {
                key: key.to_string(),
            });
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    op: "get_file.create_dirs",
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        fs::copy(&source_path, dest)
            .await
            .map_err(|source| StorageError::Io {
                op: "get_file.copy",
                path: dest.to_path_buf(),
                source,
            })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let target = self.path_for(key);
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                op: "delete.remove",
                path: target,
                source,
            }),
        }
    }

    async fn presign(
        &self,
        key: &str,
        _ttl: Duration,
        _disposition: Option<&str>,
        _content_type: Option<&str>,
    ) -> StorageResult<String> {
        Err(StorageError::PresignUnsupported {
            key: key.to_string(),
        })
    }

    fn uri_for(&self, key: &str) -> String {
        format!("local://{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new(dir.path().to_path_buf());
        (dir, storage)
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let (_dir, storage) = storage();
        let key = "outputs/task/audio/final.mp3";

        assert!(!storage.exists(key).await.expect("exists"));
        let uri = storage
            .put_bytes(b"audio-bytes", key, "audio/mpeg")
            .await
            .expect("put");
        assert_eq!(uri, format!("local://{key}"));
        assert!(storage.exists(key).await.expect("exists"));
        assert_eq!(
            storage.get_bytes(key).await.expect("get"),
            b"audio-bytes".to_vec()
        );

        storage.delete(key).await.expect("delete");
        assert!(!storage.exists(key).await.expect("exists"));
        assert!(storage
            .get_bytes(key)
            .await
            .expect_err("gone")
            .is_not_found());
        // Deleting again is a no-op.
        storage.delete(key).await.expect("idempotent delete");
    }

    #[tokio::test]
    async fn put_file_copies_without_consuming_source() {
        let (dir, storage) = storage();
        let source = dir.path().join("source.pdf");
        tokio::fs::write(&source, b"%PDF-1.7").await.expect("write");

        storage
            .put_file(&source, "uploads/abc.pdf", "application/pdf")
            .await
            .expect("put_file");
        assert!(tokio::fs::try_exists(&source).await.expect("source kept"));

        let dest = dir.path().join("fetched.pdf");
        storage
            .get_file("uploads/abc.pdf", &dest)
            .await
            .expect("get_file");
        assert_eq!(
            tokio::fs::read(&dest).await.expect("read"),
            b"%PDF-1.7".to_vec()
        );
    }

    #[tokio::test]
    async fn presign_is_unsupported() {
        let (_dir, storage) = storage();
        assert!(!storage.supports_presign());
        let err = storage
            .presign("uploads/abc.pdf", Duration::from_secs(60), None, None)
            .await
            .expect_err("unsupported");
        assert!(matches!(err, StorageError::PresignUnsupported { .. }));
    }
}
