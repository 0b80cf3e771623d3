//! HTTP session records stored on the same substrate.
//!
//! Sessions are minted by the authentication front-end; this service only
//! reads them to resolve the requesting user. They share the `ss:` keyspace
//! (`ss:session:{session_id}`) with a 7-day sliding TTL.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};
use crate::kv::KeyValue;

/// Sliding TTL applied to session records on write.
pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// One authenticated HTTP session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque session identifier presented by the client.
    pub session_id: String,
    /// Authenticated user.
    pub user_id: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

/// Reader/writer for session records.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValue>,
}

fn session_key(session_id: &str) -> String {
    format!("ss:session:{session_id}")
}

impl SessionStore {
    /// Create a store over the given substrate.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValue>) -> Self {
        Self { kv }
    }

    /// Look up a session by id.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or the record is malformed.
    pub async fn get(&self, session_id: &str) -> StateResult<Option<SessionRecord>> {
        let key = session_key(session_id);
        let Some(raw) = self.kv.get(&key).await? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&raw).map_err(|source| StateError::Codec {
            key,
            source,
        })?;
        Ok(Some(record))
    }

    /// Persist a session record, refreshing its TTL.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn put(&self, record: &SessionRecord) -> StateResult<()> {
        let payload = serde_json::to_string(record).map_err(|source| StateError::Codec {
            key: session_key(&record.session_id),
            source,
        })?;
        self.kv
            .set(&session_key(&record.session_id), &payload, Some(SESSION_TTL))
            .await?;
        Ok(())
    }

    /// Remove a session record.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn delete(&self, session_id: &str) -> StateResult<bool> {
        Ok(self.kv.delete(&session_key(session_id)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKv;

    #[tokio::test]
    async fn sessions_round_trip() {
        let store = SessionStore::new(Arc::new(MemoryKv::new()));
        assert!(store.get("sid-1").await.expect("get").is_none());

        let record = SessionRecord {
            session_id: "sid-1".to_string(),
            user_id: "user-9".to_string(),
            created_at: Utc::now(),
        };
        store.put(&record).await.expect("put");
        let loaded = store.get("sid-1").await.expect("get").expect("record");
        assert_eq!(loaded.user_id, "user-9");

        assert!(store.delete("sid-1").await.expect("delete"));
        assert!(store.get("sid-1").await.expect("get").is_none());
    }
}
