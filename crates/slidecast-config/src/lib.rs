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

//! Process configuration for Slidecast services.
//!
//! Configuration is sourced from the environment once at startup and handed
//! to components as an immutable snapshot. Validation happens here so the
//! rest of the workspace can assume a coherent configuration.

pub mod error;

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use error::{ConfigError, ConfigResult};

/// Which object-storage backend the process uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageProviderKind {
    /// Filesystem-backed storage under the output directory.
    #[default]
    Local,
    /// Amazon S3 (or API-compatible endpoint).
    S3,
    /// Alibaba OSS through its S3-compatible endpoint.
    Oss,
}

impl StorageProviderKind {
    /// URI scheme emitted for this provider.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::S3 => "s3",
            Self::Oss => "oss",
        }
    }
}

impl FromStr for StorageProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" | "" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            "oss" => Ok(Self::Oss),
            other => Err(ConfigError::InvalidValue {
                key: "STORAGE_PROVIDER",
                value: other.to_string(),
            }),
        }
    }
}

/// Bucket-backed provider settings shared by S3 and OSS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BucketConfig {
    /// Bucket name.
    pub bucket: String,
    /// Region, when the provider requires one.
    pub region: Option<String>,
    /// Endpoint override (required for OSS, optional for S3-compatible stores).
    pub endpoint: Option<String>,
}

/// Redis connection settings for the queue and state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Host name.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Logical database index.
    pub db: u32,
    /// Optional password.
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

impl RedisConfig {
    /// Connection URL understood by the redis client.
    #[must_use]
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => {
                format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db)
            }
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Immutable process configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Selected object-storage backend.
    pub storage_provider: StorageProviderKind,
    /// Bucket settings when a cloud provider is selected.
    pub bucket: BucketConfig,
    /// Redis settings for queue and state store.
    pub redis: RedisConfig,
    /// Postgres connection string for task/upload rows.
    pub database_url: Option<String>,
    /// Directory where uploads land before processing.
    pub uploads_dir: PathBuf,
    /// Directory for generated artifacts and local storage.
    pub output_dir: PathBuf,
    /// Whether slide images are sent through the vision engine.
    pub enable_visual_analysis: bool,
    /// Proxy cloud media through the API instead of redirecting to presigned URLs.
    pub proxy_cloud_media: bool,
    /// Number of worker loops to run in this process.
    pub worker_count: usize,
    /// Bind address for the HTTP API.
    pub api_bind_addr: SocketAddr,
    /// Run with the in-memory substrate and stub engines (no Redis/Postgres).
    pub standalone: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_provider: StorageProviderKind::Local,
            bucket: BucketConfig::default(),
            redis: RedisConfig::default(),
            database_url: None,
            uploads_dir: PathBuf::from("./uploads"),
            output_dir: PathBuf::from("./output"),
            enable_visual_analysis: false,
            proxy_cloud_media: false,
            worker_count: 1,
            api_bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            standalone: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a recognized key holds an unparsable value or a
    /// cloud provider is selected without its bucket settings.
    pub fn from_env() -> ConfigResult<Self> {
        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_map(&vars)
    }

    /// Load configuration from an explicit key/value map (used by tests).
    ///
    /// # Errors
    ///
    /// Returns an error when a recognized key holds an unparsable value or a
    /// cloud provider is selected without its bucket settings.
    pub fn from_map(vars: &HashMap<String, String>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(raw) = non_empty(vars, "STORAGE_PROVIDER") {
            config.storage_provider = raw.parse()?;
        }
        config.bucket = match config.storage_provider {
            StorageProviderKind::Local => BucketConfig::default(),
            StorageProviderKind::S3 => BucketConfig {
                bucket: require(vars, "S3_BUCKET")?,
                region: non_empty(vars, "S3_REGION"),
                endpoint: non_empty(vars, "S3_ENDPOINT"),
            },
            StorageProviderKind::Oss => BucketConfig {
                bucket: require(vars, "OSS_BUCKET")?,
                region: non_empty(vars, "OSS_REGION"),
                endpoint: Some(require(vars, "OSS_ENDPOINT")?),
            },
        };

        if let Some(host) = non_empty(vars, "REDIS_HOST") {
            config.redis.host = host;
        }
        if let Some(port) = non_empty(vars, "REDIS_PORT") {
            config.redis.port = parse(&port, "REDIS_PORT")?;
        }
        if let Some(db) = non_empty(vars, "REDIS_DB") {
            config.redis.db = parse(&db, "REDIS_DB")?;
        }
        config.redis.password = non_empty(vars, "REDIS_PASSWORD");

        config.database_url = non_empty(vars, "DATABASE_URL");

        if let Some(dir) = non_empty(vars, "UPLOADS_DIR") {
            config.uploads_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty(vars, "OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }

        config.enable_visual_analysis = flag(vars, "ENABLE_VISUAL_ANALYSIS")?;
        config.proxy_cloud_media = flag(vars, "PROXY_CLOUD_MEDIA")?;
        config.standalone = flag(vars, "STANDALONE")?;

        if let Some(count) = non_empty(vars, "WORKER_COUNT") {
            config.worker_count = parse(&count, "WORKER_COUNT")?;
            if config.worker_count == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "WORKER_COUNT",
                    value: count,
                });
            }
        }
        if let Some(addr) = non_empty(vars, "API_BIND_ADDR") {
            config.api_bind_addr = parse(&addr, "API_BIND_ADDR")?;
        }

        Ok(config)
    }
}

fn non_empty(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn require(vars: &HashMap<String, String>, key: &'static str) -> ConfigResult<String> {
    non_empty(vars, key).ok_or(ConfigError::Missing { key })
}

fn parse<T>(raw: &str, key: &'static str) -> ConfigResult<T>
where
    T: FromStr,
{
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

fn flag(vars: &HashMap<String, String>, key: &'static str) -> ConfigResult<bool> {
    match non_empty(vars, key) {
        None => Ok(false),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { key, value: raw }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_with_empty_environment() {
        let config = AppConfig::from_map(&HashMap::new()).expect("config");
        assert_eq!(config.storage_provider, StorageProviderKind::Local);
        assert_eq!(config.redis.url(), "redis://127.0.0.1:6379/0");
        assert_eq!(config.worker_count, 1);
        assert!(!config.standalone);
    }

    #[test]
    fn s3_requires_bucket() {
        let err = AppConfig::from_map(&map(&[("STORAGE_PROVIDER", "s3")]))
            .expect_err("bucket missing");
        assert!(matches!(err, ConfigError::Missing { key: "S3_BUCKET" }));

        let config = AppConfig::from_map(&map(&[
            ("STORAGE_PROVIDER", "s3"),
            ("S3_BUCKET", "media"),
            ("S3_REGION", "us-east-1"),
        ]))
        .expect("config");
        assert_eq!(config.bucket.bucket, "media");
        assert_eq!(config.bucket.region.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn oss_requires_endpoint() {
        let err = AppConfig::from_map(&map(&[
            ("STORAGE_PROVIDER", "oss"),
            ("OSS_BUCKET", "media"),
        ]))
        .expect_err("endpoint missing");
        assert!(matches!(err, ConfigError::Missing { key: "OSS_ENDPOINT" }));
    }

    #[test]
    fn redis_url_includes_password() {
        let config = AppConfig::from_map(&map(&[
            ("REDIS_HOST", "cache.internal"),
            ("REDIS_PORT", "6380"),
            ("REDIS_DB", "2"),
            ("REDIS_PASSWORD", "hunter2"),
        ]))
        .expect("config");
        assert_eq!(config.redis.url(), "redis://:hunter2@cache.internal:6380/2");
    }

    #[test]
    fn flags_reject_garbage() {
        assert!(AppConfig::from_map(&map(&[("ENABLE_VISUAL_ANALYSIS", "maybe")])).is_err());
        let config = AppConfig::from_map(&map(&[
            ("ENABLE_VISUAL_ANALYSIS", "true"),
            ("PROXY_CLOUD_MEDIA", "1"),
            ("STANDALONE", "on"),
        ]))
        .expect("config");
        assert!(config.enable_visual_analysis);
        assert!(config.proxy_cloud_media);
        assert!(config.standalone);
    }

    #[test]
    fn worker_count_must_be_positive() {
        assert!(AppConfig::from_map(&map(&[("WORKER_COUNT", "0")])).is_err());
        let config = AppConfig::from_map(&map(&[("WORKER_COUNT", "4")])).expect("config");
        assert_eq!(config.worker_count, 4);
    }
}
