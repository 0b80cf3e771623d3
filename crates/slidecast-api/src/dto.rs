//! Request and response payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use slidecast_core::{TaskErrorEntry, TaskKnobs, TaskState, TaskStatus, TaskType};
use slidecast_data::TaskRow;
use slidecast_pipeline::artifacts::DownloadEntry;
use slidecast_queue::TaskRecord;

/// Response to an accepted upload or rerun.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Content-derived upload identifier.
    pub file_id: String,
    /// Identifier of the queued task.
    pub task_id: Uuid,
}

/// Knobs accepted by upload and rerun requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitOptions {
    /// Narration language.
    #[serde(default)]
    pub voice_language: Option<String>,
    /// Subtitle language.
    #[serde(default)]
    pub subtitle_language: Option<String>,
    /// Podcast transcript language.
    #[serde(default)]
    pub transcript_language: Option<String>,
    /// Target video resolution label.
    #[serde(default)]
    pub video_resolution: Option<String>,
    /// Whether to render presenter avatar clips.
    #[serde(default)]
    pub generate_avatar: Option<bool>,
    /// Whether to produce subtitle tracks.
    #[serde(default)]
    pub generate_subtitles: Option<bool>,
    /// Whether to produce the video output.
    #[serde(default)]
    pub generate_video: Option<bool>,
    /// Whether to produce the podcast output.
    #[serde(default)]
    pub generate_podcast: Option<bool>,
    /// Narration voice override.
    #[serde(default)]
    pub voice_id: Option<String>,
    /// Podcast host voice override.
    #[serde(default)]
    pub podcast_host_voice: Option<String>,
    /// Podcast guest voice override.
    #[serde(default)]
    pub podcast_guest_voice: Option<String>,
}

impl SubmitOptions {
    /// Fold the submitted options over the default knobs.
    #[must_use]
    pub fn into_knobs(self) -> TaskKnobs {
        let mut knobs = TaskKnobs::default();
        if let Some(value) = self.voice_language {
            knobs.voice_language = value;
        }
        knobs.subtitle_language = self.subtitle_language.or(knobs.subtitle_language);
        knobs.transcript_language = self.transcript_language.or(knobs.transcript_language);
        if let Some(value) = self.video_resolution {
            knobs.video_resolution = value;
        }
        if let Some(value) = self.generate_avatar {
            knobs.generate_avatar = value;
        }
        if let Some(value) = self.generate_subtitles {
            knobs.generate_subtitles = value;
        }
        if let Some(value) = self.generate_video {
            knobs.generate_video = value;
        }
        if let Some(value) = self.generate_podcast {
            knobs.generate_podcast = value;
        }
        knobs.voice_id = self.voice_id.or(knobs.voice_id);
        knobs.podcast_host_voice = self.podcast_host_voice.or(knobs.podcast_host_voice);
        knobs.podcast_guest_voice = self.podcast_guest_voice.or(knobs.podcast_guest_voice);
        knobs
    }
}

/// Unified task view assembled from the row (preferred) or queue record.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    /// Task identifier.
    pub task_id: Uuid,
    /// Owning upload.
    pub upload_id: String,
    /// What the task produces.
    pub task_type: TaskType,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Owner when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Subtitle language recorded at submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_language: Option<String>,
    /// Original filename.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Upload extension.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ext: Option<String>,
    /// Failure message for failed tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl TaskView {
    /// Build the view from a database row.
    #[must_use]
    pub fn from_row(row: &TaskRow) -> Self {
        Self {
            task_id: row.id,
            upload_id: row.upload_id.clone(),
            task_type: row.task_type,
            status: row.status,
            user_id: row.user_id.clone(),
            subtitle_language: row.subtitle_language.clone(),
            filename: row.filename.clone(),
            file_ext: row.file_ext.clone(),
            error: row.error.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    /// Build the view from a queue record (standalone mode).
    #[must_use]
    pub fn from_record(record: &TaskRecord) -> Self {
        Self {
            task_id: record.task_id,
            upload_id: record.kwargs.file_id.clone(),
            task_type: record.task_type,
            status: record.status,
            user_id: record.user_id.clone(),
            subtitle_language: record.kwargs.knobs.subtitle_language.clone(),
            filename: record.kwargs.filename.clone(),
            file_ext: record.kwargs.file_ext.clone(),
            error: record.error.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// One step in the progress view.
#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    /// Stable step name.
    pub name: String,
    /// Human-readable label.
    pub label: String,
    /// Canonical step status.
    pub status: String,
}

/// Progress payload for a running or finished task.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressResponse {
    /// Task identifier.
    pub task_id: Uuid,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Completion percentage (0–100).
    pub progress: u8,
    /// Step currently (or most recently) executing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    /// Steps in execution order.
    pub steps: Vec<StepView>,
    /// Errors collected so far.
    pub errors: Vec<TaskErrorEntry>,
}

impl ProgressResponse {
    /// Assemble the progress view from task state.
    #[must_use]
    pub fn from_state(task_id: Uuid, state: &TaskState) -> Self {
        Self {
            task_id,
            status: state.status,
            progress: state.progress_percent(),
            current_step: state.current_step.map(|step| step.to_string()),
            steps: state
                .ordered_steps()
                .map(|(name, snapshot)| StepView {
                    name: name.to_string(),
                    label: name.display_label().to_string(),
                    status: snapshot.status.as_str().to_string(),
                })
                .collect(),
            errors: state.errors.clone(),
        }
    }
}

/// Full task detail: the row view plus live state when available.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetailResponse {
    /// Row-level task view.
    #[serde(flatten)]
    pub task: TaskView,
    /// Live progress when runtime state exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressResponse>,
}

/// Request body for retrying a failed task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryRequest {
    /// Step to resume from; resolved automatically when omitted.
    #[serde(default)]
    pub step: Option<String>,
}

/// Response to a retry request.
#[derive(Debug, Clone, Serialize)]
pub struct RetryResponse {
    /// Acknowledgement message.
    pub message: String,
    /// Step the task will resume from.
    pub step: String,
    /// Status after the reset.
    pub status: TaskStatus,
}

/// Response to a cancel request.
#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    /// Whether the cancellation took effect.
    pub cancelled: bool,
}

/// Response to a delete request.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Whether a task was deleted.
    pub deleted: bool,
    /// Purge task queued when this was the upload's last task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purge_task_id: Option<Uuid>,
}

/// Download listing for a task.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadsResponse {
    /// Task identifier.
    pub task_id: Uuid,
    /// Available artifacts.
    pub downloads: Vec<DownloadEntry>,
}

/// Paged task listing.
#[derive(Debug, Clone, Serialize)]
pub struct TaskListResponse {
    /// Tasks in the requested page.
    pub tasks: Vec<TaskView>,
    /// Page size requested.
    pub limit: i64,
    /// Page offset requested.
    pub offset: i64,
}

/// Listing/pagination query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskListQuery {
    /// Maximum rows to return (default 50, capped at 200).
    #[serde(default)]
    pub limit: Option<i64>,
    /// Rows to skip.
    #[serde(default)]
    pub offset: Option<i64>,
    /// Restrict to one status.
    #[serde(default)]
    pub status: Option<String>,
}

/// Query parameters for subtitle downloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubtitleQuery {
    /// Requested locale; falls back to the task's configured language.
    #[serde(default)]
    pub language: Option<String>,
}
