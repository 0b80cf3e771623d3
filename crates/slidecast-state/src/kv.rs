//! The key/value capability surface the state store and queue are built on.

use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a key/value backend.
#[derive(Debug, Error)]
pub enum KvError {
    /// The backend call failed.
    #[error("key/value operation failed")]
    Backend {
        /// Operation identifier (`get`, `set`, `rpush`, ...).
        op: &'static str,
        /// Underlying backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The backend connection could not be established.
    #[error("key/value backend is unreachable")]
    Connect {
        /// Underlying backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

/// Convenience alias for key/value results.
pub type KvResult<T> = Result<T, KvError>;

/// Minimal Redis-shaped substrate: strings with TTL, lists, and sets.
///
/// All operations are atomic per call; multi-key read-modify-write sequences
/// are the caller's concern (single-writer-per-task makes conflicts rare).
#[async_trait]
pub trait KeyValue: Send + Sync {
    /// Read a string value.
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Write a string value, with an optional TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<()>;

    /// Delete a key of any type; returns whether it existed.
    async fn delete(&self, key: &str) -> KvResult<bool>;

    /// Whether a key of any type exists.
    async fn exists(&self, key: &str) -> KvResult<bool>;

    /// Refresh a key's TTL; returns whether the key existed.
    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<bool>;

    /// Append to the tail of a list, returning the new length.
    async fn push_back(&self, key: &str, value: &str) -> KvResult<u64>;

    /// Pop from the head of a list.
    async fn pop_front(&self, key: &str) -> KvResult<Option<String>>;

    /// Current list length (zero for absent keys).
    async fn list_len(&self, key: &str) -> KvResult<u64>;

    /// Remove every occurrence of a value from a list, returning the count.
    async fn list_remove(&self, key: &str, value: &str) -> KvResult<u64>;

    /// Add a member to a set; returns whether it was newly inserted.
    async fn set_add(&self, key: &str, member: &str) -> KvResult<bool>;

    /// Remove a member from a set; returns whether it was present.
    async fn set_remove(&self, key: &str, member: &str) -> KvResult<bool>;

    /// Current set cardinality (zero for absent keys).
    async fn set_len(&self, key: &str) -> KvResult<u64>;

    /// All members of a set.
    async fn set_members(&self, key: &str) -> KvResult<Vec<String>>;

    /// Keys matching a literal prefix, sorted for determinism.
    async fn scan_prefix(&self, prefix: &str) -> KvResult<Vec<String>>;
}
