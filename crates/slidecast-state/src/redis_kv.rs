//! Redis-backed key/value substrate.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use crate::kv::{KeyValue, KvError, KvResult};

/// [`KeyValue`] backend over a multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisKv {
    manager: ConnectionManager,
}

impl RedisKv {
    /// Connect to Redis at the given URL (`redis://[:password@]host:port/db`).
    ///
    /// # Errors
    ///
    /// Returns an error when the URL is malformed or the server is
    /// unreachable.
    pub async fn connect(url: &str) -> KvResult<Self> {
        let client = redis::Client::open(url).map_err(|source| KvError::Connect {
            source: Box::new(source),
        })?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|source| KvError::Connect {
                source: Box::new(source),
            })?;
        debug!("redis substrate connected");
        Ok(Self { manager })
    }

    fn backend(op: &'static str, source: redis::RedisError) -> KvError {
        KvError::Backend {
            op,
            source: Box::new(source),
        }
    }
}

#[async_trait]
impl KeyValue for RedisKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(key)
            .await
            .map_err(|source| Self::backend("get", source))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<()> {
        let mut conn = self.manager.clone();
        match ttl {
            Some(ttl) => conn
                .set_ex(key, value, ttl.as_secs().max(1))
                .await
                .map_err(|source| Self::backend("set_ex", source)),
            None => conn
                .set(key, value)
                .await
                .map_err(|source| Self::backend("set", source)),
        }
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        let mut conn = self.manager.clone();
        let removed: u64 = conn
            .del(key)
            .await
            .map_err(|source| Self::backend("del", source))?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        let mut conn = self.manager.clone();
        conn.exists(key)
            .await
            .map_err(|source| Self::backend("exists", source))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<bool> {
        let mut conn = self.manager.clone();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        conn.expire(key, ttl_secs)
            .await
            .map_err(|source| Self::backend("expire", source))
    }

    async fn push_back(&self, key: &str, value: &str) -> KvResult<u64> {
        let mut conn = self.manager.clone();
        conn.rpush(key, value)
            .await
            .map_err(|source| Self::backend("rpush", source))
    }

    async fn pop_front(&self, key: &str) -> KvResult<Option<String>> {
        let mut conn = self.manager.clone();
        conn.lpop(key, None)
            .await
            .map_err(|source| Self::backend("lpop", source))
    }

    async fn list_len(&self, key: &str) -> KvResult<u64> {
        let mut conn = self.manager.clone();
        conn.llen(key)
            .await
            .map_err(|source| Self::backend("llen", source))
    }

    async fn list_remove(&self, key: &str, value: &str) -> KvResult<u64> {
        let mut conn = self.manager.clone();
        conn.lrem(key, 0, value)
            .await
            .map_err(|source| Self::backend("lrem", source))
    }

    async fn set_add(&self, key: &str, member: &str) -> KvResult<bool> {
        let mut conn = self.manager.clone();
        let added: u64 = conn
            .sadd(key, member)
            .await
            .map_err(|source| Self::backend("sadd", source))?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> KvResult<bool> {
        let mut conn = self.manager.clone();
        let removed: u64 = conn
            .srem(key, member)
            .await
            .map_err(|source| Self::backend("srem", source))?;
        Ok(removed > 0)
    }

    async fn set_len(&self, key: &str) -> KvResult<u64> {
        let mut conn = self.manager.clone();
        conn.scard(key)
            .await
            .map_err(|source| Self::backend("scard", source))
    }

    async fn set_members(&self, key: &str) -> KvResult<Vec<String>> {
        let mut conn = self.manager.clone();
        let mut members: Vec<String> = conn
            .smembers(key)
            .await
            .map_err(|source| Self::backend("smembers", source))?;
        members.sort();
        Ok(members)
    }

    async fn scan_prefix(&self, prefix: &str) -> KvResult<Vec<String>> {
        let mut conn = self.manager.clone();
        let pattern = format!("{prefix}*");
        let mut keys = Vec::new();
        {
            let mut iter = conn
                .scan_match::<_, String>(&pattern)
                .await
                .map_err(|source| Self::backend("scan", source))?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
