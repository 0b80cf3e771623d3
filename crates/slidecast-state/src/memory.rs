//! In-process key/value backend with TTL semantics.
//!
//! Used by tests and by standalone (single-process) deployments. Behaves
//! like the Redis backend for the operations the workspace uses; expiry is
//! enforced lazily on access.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::error;

use crate::kv::{KeyValue, KvResult};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    List(VecDeque<String>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-memory [`KeyValue`] backend.
#[derive(Clone, Default)]
pub struct MemoryKv {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryKv {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("memory kv mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }

    fn prune(entries: &mut HashMap<String, Entry>, key: &str) {
        let now = Instant::now();
        if entries.get(key).is_some_and(|entry| entry.expired(now)) {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl KeyValue for MemoryKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut entries = self.lock();
        Self::prune(&mut entries, key);
        Ok(entries.get(key).and_then(|entry| match &entry.value {
            Value::Text(text) => Some(text.clone()),
            _ => None,
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<()> {
        let mut entries = self.lock();
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        let mut entries = self.lock();
        Self::prune(&mut entries, key);
        Ok(entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        let mut entries = self.lock();
        Self::prune(&mut entries, key);
        Ok(entries.contains_key(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<bool> {
        let mut entries = self.lock();
        Self::prune(&mut entries, key);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn push_back(&self, key: &str, value: &str) -> KvResult<u64> {
        let mut entries = self.lock();
        Self::prune(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });
        if let Value::List(list) = &mut entry.value {
            list.push_back(value.to_string());
            Ok(list.len() as u64)
        } else {
            entry.value = Value::List(VecDeque::from([value.to_string()]));
            Ok(1)
        }
    }

    async fn pop_front(&self, key: &str) -> KvResult<Option<String>> {
        let mut entries = self.lock();
        Self::prune(&mut entries, key);
        let popped = match entries.get_mut(key) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => list.pop_front(),
            _ => None,
        };
        let drained = matches!(
            entries.get(key),
            Some(Entry {
                value: Value::List(list),
                ..
            }) if list.is_empty()
        );
        if drained {
            entries.remove(key);
        }
        Ok(popped)
    }

    async fn list_len(&self, key: &str) -> KvResult<u64> {
        let mut entries = self.lock();
        Self::prune(&mut entries, key);
        Ok(match entries.get(key) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => list.len() as u64,
            _ => 0,
        })
    }

    async fn list_remove(&self, key: &str, value: &str) -> KvResult<u64> {
        let mut entries = self.lock();
        Self::prune(&mut entries, key);
        let mut removed = 0;
        let mut drained = false;
        if let Some(Entry {
            value: Value::List(list),
            ..
        }) = entries.get_mut(key)
        {
            let before = list.len();
            list.retain(|item| item != value);
            removed = (before - list.len()) as u64;
            drained = list.is_empty();
        }
        if drained {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn set_add(&self, key: &str, member: &str) -> KvResult<bool> {
        let mut entries = self.lock();
        Self::prune(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        if let Value::Set(set) = &mut entry.value {
            Ok(set.insert(member.to_string()))
        } else {
            entry.value = Value::Set(HashSet::from([member.to_string()]));
            Ok(true)
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> KvResult<bool> {
        let mut entries = self.lock();
        Self::prune(&mut entries, key);
        let mut removed = false;
        let mut drained = false;
        if let Some(Entry {
            value: Value::Set(set),
            ..
        }) = entries.get_mut(key)
        {
            removed = set.remove(member);
            drained = set.is_empty();
        }
        if drained {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn set_len(&self, key: &str) -> KvResult<u64> {
        let mut entries = self.lock();
        Self::prune(&mut entries, key);
        Ok(match entries.get(key) {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => set.len() as u64,
            _ => 0,
        })
    }

    async fn set_members(&self, key: &str) -> KvResult<Vec<String>> {
        let mut entries = self.lock();
        Self::prune(&mut entries, key);
        let mut members = match entries.get(key) {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => set.iter().cloned().collect::<Vec<_>>(),
            _ => Vec::new(),
        };
        members.sort();
        Ok(members)
    }

    async fn scan_prefix(&self, prefix: &str) -> KvResult<Vec<String>> {
        let mut entries = self.lock();
        let now = Instant::now();
        entries.retain(|_, entry| !entry.expired(now));
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn strings_respect_ttl() {
        let kv = MemoryKv::new();
        kv.set("a", "1", Some(Duration::from_millis(20)))
            .await
            .expect("set");
        assert_eq!(kv.get("a").await.expect("get"), Some("1".to_string()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(kv.get("a").await.expect("get"), None);
        assert!(!kv.exists("a").await.expect("exists"));
    }

    #[tokio::test]
    async fn lists_are_fifo() {
        let kv = MemoryKv::new();
        kv.push_back("q", "one").await.expect("push");
        kv.push_back("q", "two").await.expect("push");
        assert_eq!(kv.list_len("q").await.expect("len"), 2);
        assert_eq!(
            kv.pop_front("q").await.expect("pop"),
            Some("one".to_string())
        );
        assert_eq!(
            kv.pop_front("q").await.expect("pop"),
            Some("two".to_string())
        );
        assert_eq!(kv.pop_front("q").await.expect("pop"), None);
    }

    #[tokio::test]
    async fn list_remove_drops_all_occurrences() {
        let kv = MemoryKv::new();
        for value in ["a", "b", "a"] {
            kv.push_back("q", value).await.expect("push");
        }
        assert_eq!(kv.list_remove("q", "a").await.expect("remove"), 2);
        assert_eq!(kv.list_len("q").await.expect("len"), 1);
    }

    #[tokio::test]
    async fn sets_track_membership() {
        let kv = MemoryKv::new();
        assert!(kv.set_add("s", "x").await.expect("add"));
        assert!(!kv.set_add("s", "x").await.expect("add again"));
        assert!(kv.set_add("s", "y").await.expect("add"));
        assert_eq!(kv.set_len("s").await.expect("len"), 2);
        assert_eq!(
            kv.set_members("s").await.expect("members"),
            vec!["x".to_string(), "y".to_string()]
        );
        assert!(kv.set_remove("s", "x").await.expect("remove"));
        assert_eq!(kv.set_len("s").await.expect("len"), 1);
    }

    #[tokio::test]
    async fn scan_prefix_filters_and_sorts() {
        let kv = MemoryKv::new();
        for key in ["ss:state:b", "ss:state:a", "ss:task:1"] {
            kv.set(key, "{}", None).await.expect("set");
        }
        assert_eq!(
            kv.scan_prefix("ss:state:").await.expect("scan"),
            vec!["ss:state:a".to_string(), "ss:state:b".to_string()]
        );
    }
}
