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

//! Durable FIFO task queue for Slidecast workers.
//!
//! The queue is a list of task ids (`ss:queue`) plus one JSON record per
//! task (`ss:task:{task_id}`) and a short-lived cancellation flag
//! (`ss:task:{task_id}:cancelled`). Delivery is at-least-once: a worker that
//! dies after popping leaves the record in `processing`, and recovery
//! re-enqueues the id; step-level idempotence upstream makes duplicate
//! delivery harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use slidecast_core::{SourceType, TaskKnobs, TaskStatus, TaskType};
use slidecast_state::{KeyValue, KvError};

/// Queue list key.
const QUEUE_KEY: &str = "ss:queue";
/// TTL for task records.
const RECORD_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// TTL for cancellation flags.
const CANCEL_FLAG_TTL: Duration = Duration::from_secs(60 * 60);
/// Poll interval used while waiting for work.
const POP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors raised by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The key/value substrate failed.
    #[error("queue substrate operation failed")]
    Kv(#[from] KvError),
    /// A persisted task record could not be decoded.
    #[error("persisted task record is malformed")]
    Codec {
        /// Key holding the malformed record.
        key: String,
        /// Underlying serde failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience alias for queue results.
pub type QueueResult<T> = Result<T, QueueError>;

/// Extra payload carried by `file_purge` tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeRequest {
    /// Task whose artifacts should be purged, when scoped to one task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_task_id: Option<Uuid>,
    /// Pre-collected storage keys to delete.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storage_keys: Vec<String>,
    /// Pre-collected local paths to delete.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_paths: Vec<String>,
}

/// Work description handed to the dispatching worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Upload/file identifier the task operates on.
    pub file_id: String,
    /// Local path of the uploaded document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Upload extension including the dot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ext: Option<String>,
    /// Original filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Kind of source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
    /// User-supplied knobs.
    #[serde(default)]
    pub knobs: TaskKnobs,
    /// Purge details for `file_purge` tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purge: Option<PurgeRequest>,
}

/// One persisted task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task identifier.
    pub task_id: Uuid,
    /// What the task produces.
    pub task_type: TaskType,
    /// Queue-visible lifecycle status.
    pub status: TaskStatus,
    /// Work description.
    pub kwargs: TaskPayload,
    /// Owner of the task when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Failure message for failed tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

/// Durable FIFO of task ids with cancellation flags.
#[derive(Clone)]
pub struct TaskQueue {
    kv: Arc<dyn KeyValue>,
}

fn record_key(task_id: Uuid) -> String {
    format!("ss:task:{task_id}")
}

fn cancel_key(task_id: Uuid) -> String {
    format!("ss:task:{task_id}:cancelled")
}

impl TaskQueue {
    /// Create a queue over the given substrate.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValue>) -> Self {
        Self { kv }
    }

    /// Submit a new task: persist its record as `queued` and push the id to
    /// the tail of the queue. Returns the generated task id.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn submit(
        &self,
        task_type: TaskType,
        kwargs: TaskPayload,
        user_id: Option<String>,
    ) -> QueueResult<Uuid> {
        let task_id = Uuid::new_v4();
        self.submit_with_id(task_id, task_type, kwargs, user_id)
            .await?;
        Ok(task_id)
    }

    /// Submit a task under a caller-chosen id, so row and state writes can
    /// share the identifier before the push.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn submit_with_id(
        &self,
        task_id: Uuid,
        task_type: TaskType,
        kwargs: TaskPayload,
        user_id: Option<String>,
    ) -> QueueResult<()> {
        let now = Utc::now();
        let record = TaskRecord {
            task_id,
            task_type,
            status: TaskStatus::Queued,
            kwargs,
            user_id,
            error: None,
            created_at: now,
            updated_at: now,
        };
        self.write_record(&record).await?;
        let _ = self.kv.push_back(QUEUE_KEY, &task_id.to_string()).await?;
        info!(task_id = %task_id, task_type = %task_type, "task submitted");
        Ok(())
    }

    /// Pop the next task id, waiting up to `timeout`. Returns `None` when
    /// the queue stays empty for the full window.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn pop(&self, timeout: Duration) -> QueueResult<Option<Uuid>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(raw) = self.kv.pop_front(QUEUE_KEY).await? {
                match raw.parse::<Uuid>() {
                    Ok(task_id) => return Ok(Some(task_id)),
                    Err(_) => {
                        debug!(value = %raw, "dropping malformed queue entry");
                        continue;
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POP_POLL_INTERVAL).await;
        }
    }

    /// Load a task record.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or the record is malformed.
    pub async fn get_task(&self, task_id: Uuid) -> QueueResult<Option<TaskRecord>> {
        let key = record_key(task_id);
        let Some(raw) = self.kv.get(&key).await? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&raw)
            .map_err(|source| QueueError::Codec { key, source })?;
        Ok(Some(record))
    }

    /// Update a task's queue-visible status. Setting `cancelled` also raises
    /// the cancellation flag. Returns `false` when the record is absent.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or the record is malformed.
    pub async fn update_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        error: Option<&str>,
    ) -> QueueResult<bool> {
        let Some(mut record) = self.get_task(task_id).await? else {
            return Ok(false);
        };
        record.status = status;
        record.error = error.map(str::to_string);
        record.updated_at = Utc::now();
        self.write_record(&record).await?;
        if status == TaskStatus::Cancelled {
            self.kv
                .set(&cancel_key(task_id), "1", Some(CANCEL_FLAG_TTL))
                .await?;
        }
        Ok(true)
    }

    /// Cancel a task that is still `queued` or `processing`: set the flag
    /// and flip the record to `cancelled`. Returns `false` for absent or
    /// already-terminal tasks.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or the record is malformed.
    pub async fn cancel(&self, task_id: Uuid) -> QueueResult<bool> {
        let Some(record) = self.get_task(task_id).await? else {
            return Ok(false);
        };
        if !matches!(record.status, TaskStatus::Queued | TaskStatus::Processing) {
            return Ok(false);
        }
        self.kv
            .set(&cancel_key(task_id), "1", Some(CANCEL_FLAG_TTL))
            .await?;
        self.update_status(task_id, TaskStatus::Cancelled, None)
            .await?;
        info!(task_id = %task_id, "task cancelled");
        Ok(true)
    }

    /// Hot-path cancellation probe used inside long-running steps.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn is_cancelled(&self, task_id: Uuid) -> QueueResult<bool> {
        Ok(self.kv.exists(&cancel_key(task_id)).await?)
    }

    /// Re-push an existing task for retry. The record must already be in
    /// `processing` (the retry flow moves it there after resetting state).
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or the record is malformed.
    pub async fn enqueue_existing(&self, task_id: Uuid) -> QueueResult<bool> {
        let Some(record) = self.get_task(task_id).await? else {
            return Ok(false);
        };
        if record.status != TaskStatus::Processing {
            return Ok(false);
        }
        let _ = self.kv.delete(&cancel_key(task_id)).await?;
        let _ = self.kv.push_back(QUEUE_KEY, &task_id.to_string()).await?;
        info!(task_id = %task_id, "task re-enqueued");
        Ok(true)
    }

    /// Remove a task's record, cancellation flag, and any queued entries.
    /// Returns whether a record existed.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn delete_task(&self, task_id: Uuid) -> QueueResult<bool> {
        let task = task_id.to_string();
        let _ = self.kv.list_remove(QUEUE_KEY, &task).await?;
        let _ = self.kv.delete(&cancel_key(task_id)).await?;
        Ok(self.kv.delete(&record_key(task_id)).await?)
    }

    /// Number of task ids currently queued.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn queue_length(&self) -> QueueResult<u64> {
        Ok(self.kv.list_len(QUEUE_KEY).await?)
    }

    async fn write_record(&self, record: &TaskRecord) -> QueueResult<()> {
        let key = record_key(record.task_id);
        let payload = serde_json::to_string(record).map_err(|source| QueueError::Codec {
            key: key.clone(),
            source,
        })?;
        self.kv.set(&key, &payload, Some(RECORD_TTL)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slidecast_state::MemoryKv;

    fn queue() -> TaskQueue {
        TaskQueue::new(Arc::new(MemoryKv::new()))
    }

    fn payload(file_id: &str) -> TaskPayload {
        TaskPayload {
            file_id: file_id.to_string(),
            file_path: None,
            file_ext: Some(".pdf".to_string()),
            filename: None,
            source_type: Some(SourceType::Pdf),
            knobs: TaskKnobs::default(),
            purge: None,
        }
    }

    #[tokio::test]
    async fn submit_and_pop_preserve_fifo_order() {
        let queue = queue();
        let first = queue
            .submit(TaskType::Video, payload("f1"), None)
            .await
            .expect("submit");
        let second = queue
            .submit(TaskType::Podcast, payload("f2"), None)
            .await
            .expect("submit");

        assert_eq!(queue.queue_length().await.expect("len"), 2);
        assert_eq!(
            queue.pop(Duration::from_millis(50)).await.expect("pop"),
            Some(first)
        );
        assert_eq!(
            queue.pop(Duration::from_millis(50)).await.expect("pop"),
            Some(second)
        );
    }

    #[tokio::test]
    async fn empty_pop_returns_none_within_timeout() {
        let queue = queue();
        let started = std::time::Instant::now();
        let popped = queue.pop(Duration::from_millis(150)).await.expect("pop");
        assert!(popped.is_none());
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn cancel_flags_running_tasks_only() {
        let queue = queue();
        let task_id = queue
            .submit(TaskType::Video, payload("f1"), None)
            .await
            .expect("submit");

        assert!(!queue.is_cancelled(task_id).await.expect("probe"));
        assert!(queue.cancel(task_id).await.expect("cancel"));
        assert!(queue.is_cancelled(task_id).await.expect("probe"));
        let record = queue.get_task(task_id).await.expect("get").expect("record");
        assert_eq!(record.status, TaskStatus::Cancelled);

        // Cancelling a terminal task is refused and does not change state.
        assert!(!queue.cancel(task_id).await.expect("cancel again"));

        let completed = queue
            .submit(TaskType::Video, payload("f2"), None)
            .await
            .expect("submit");
        queue
            .update_status(completed, TaskStatus::Completed, None)
            .await
            .expect("complete");
        assert!(!queue.cancel(completed).await.expect("cancel completed"));
    }

    #[tokio::test]
    async fn enqueue_existing_requires_processing_status() {
        let queue = queue();
        let task_id = queue
            .submit(TaskType::Video, payload("f1"), None)
            .await
            .expect("submit");
        let _ = queue.pop(Duration::from_millis(50)).await.expect("pop");

        // Still queued in the record; re-enqueue is refused.
        assert!(!queue.enqueue_existing(task_id).await.expect("refused"));

        queue
            .update_status(task_id, TaskStatus::Processing, None)
            .await
            .expect("processing");
        assert!(queue.enqueue_existing(task_id).await.expect("enqueued"));
        assert_eq!(
            queue.pop(Duration::from_millis(50)).await.expect("pop"),
            Some(task_id)
        );
    }

    #[tokio::test]
    async fn delete_task_removes_record_flag_and_queue_entries() {
        let queue = queue();
        let task_id = queue
            .submit(TaskType::Video, payload("f1"), None)
            .await
            .expect("submit");
        queue.cancel(task_id).await.expect("cancel");

        assert!(queue.delete_task(task_id).await.expect("delete"));
        assert!(queue.get_task(task_id).await.expect("get").is_none());
        assert!(!queue.is_cancelled(task_id).await.expect("flag gone"));
        assert_eq!(queue.queue_length().await.expect("len"), 0);
        assert!(!queue.delete_task(task_id).await.expect("second delete"));
    }

    #[tokio::test]
    async fn failed_status_records_error_message() {
        let queue = queue();
        let task_id = queue
            .submit(TaskType::Video, payload("f1"), None)
            .await
            .expect("submit");
        queue
            .update_status(task_id, TaskStatus::Failed, Some("speech synthesis failed"))
            .await
            .expect("fail");
        let record = queue.get_task(task_id).await.expect("get").expect("record");
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("speech synthesis failed"));
    }
}
