//! Row types exposed by the repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use slidecast_core::{SourceType, TaskStatus, TaskType};

/// One persisted upload row. The upload id is the first sixteen hex
/// characters of the content's SHA-256, so identical bytes always map to the
/// same row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRow {
    /// Content-derived identifier.
    pub id: String,
    /// Owner of the upload.
    pub user_id: Option<String>,
    /// Original filename.
    pub filename: String,
    /// Extension including the leading dot.
    pub file_ext: String,
    /// Kind of source document.
    pub source_type: SourceType,
    /// MIME type reported at upload time.
    pub content_type: Option<String>,
    /// Full SHA-256 checksum of the content.
    pub checksum: String,
    /// Size of the upload in bytes.
    pub size_bytes: i64,
    /// Provider-qualified URI of the stored original.
    pub storage_uri: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last metadata update.
    pub updated_at: DateTime<Utc>,
}

/// One persisted task row, joined with the owning upload's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRow {
    /// Task identifier.
    pub id: Uuid,
    /// Owning upload.
    pub upload_id: String,
    /// What the task produces.
    pub task_type: TaskType,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Task-scoped options as submitted.
    pub kwargs: serde_json::Value,
    /// Narration language.
    pub voice_language: Option<String>,
    /// Subtitle language.
    pub subtitle_language: Option<String>,
    /// Failure message for failed tasks.
    pub error: Option<String>,
    /// Owner, derived from the upload row.
    pub user_id: Option<String>,
    /// Filename, derived from the upload row.
    pub filename: Option<String>,
    /// Extension, derived from the upload row.
    pub file_ext: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Filter and pagination for task listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskListFilter {
    /// Maximum rows to return.
    pub limit: i64,
    /// Rows to skip.
    pub offset: i64,
    /// Restrict to one status.
    pub status: Option<TaskStatus>,
    /// Restrict to one owner.
    pub user_id: Option<String>,
    /// Restrict to one upload.
    pub upload_id: Option<String>,
}

/// Per-status task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatistics {
    /// All tasks in scope.
    pub total: i64,
    /// Tasks waiting in the queue.
    pub queued: i64,
    /// Tasks currently running.
    pub processing: i64,
    /// Tasks that finished successfully.
    pub completed: i64,
    /// Tasks that failed.
    pub failed: i64,
    /// Tasks cancelled by their owner.
    pub cancelled: i64,
}

impl TaskStatistics {
    /// Fold one status count into the totals.
    pub fn absorb(&mut self, status: TaskStatus, count: i64) {
        self.total += count;
        match status {
            TaskStatus::Queued | TaskStatus::Uploaded => self.queued += count,
            TaskStatus::Processing => self.processing += count,
            TaskStatus::Completed => self.completed += count,
            TaskStatus::Failed => self.failed += count,
            TaskStatus::Cancelled => self.cancelled += count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_absorb_counts_by_status() {
        let mut stats = TaskStatistics::default();
        stats.absorb(TaskStatus::Queued, 2);
        stats.absorb(TaskStatus::Completed, 5);
        stats.absorb(TaskStatus::Failed, 1);
        assert_eq!(stats.total, 8);
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.completed, 5);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.cancelled, 0);
    }
}
