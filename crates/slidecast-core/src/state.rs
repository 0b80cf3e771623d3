//! The per-task runtime state shared between pipeline steps.
//!
//! One [`TaskState`] exists per task in the state store. It owns the step
//! snapshots, collected errors, and the artifact map; every mutation bumps
//! `updated_at`. The declared execution order is persisted alongside the
//! steps map so retry resets and progress views never depend on map
//! iteration order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::{ArtifactRef, StepData};
use crate::plan::StepPlan;
use crate::status::{StepStatus, TaskStatus};
use crate::step::StepName;
use crate::task::{SourceType, TaskKnobs, TaskType};

/// Structured view of a single pipeline step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepSnapshot {
    /// Current step status.
    #[serde(default = "default_step_status")]
    pub status: StepStatus,
    /// Typed output payload once the step has produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StepData>,
    /// Rendered transcript markdown, for transcript-producing steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
}

const fn default_step_status() -> StepStatus {
    StepStatus::Pending
}

/// One error collected while processing a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskErrorEntry {
    /// Step the error belongs to.
    pub step: StepName,
    /// Human-readable message.
    pub error: String,
    /// When the error was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Downloadable artifacts grouped by category, keyed by a category-specific
/// label (locale for subtitles, `final` for composed outputs, the unit index
/// for images).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtifactMap {
    /// Subtitle tracks keyed by locale.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subtitles: BTreeMap<String, ArtifactRef>,
    /// Audio artifacts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub audio: BTreeMap<String, ArtifactRef>,
    /// Video artifacts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub video: BTreeMap<String, ArtifactRef>,
    /// Podcast artifacts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub podcast: BTreeMap<String, ArtifactRef>,
    /// Image artifacts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub images: BTreeMap<String, ArtifactRef>,
    /// Transcript documents (markdown, JSON).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transcripts: BTreeMap<String, ArtifactRef>,
}

impl ArtifactMap {
    /// Iterate every artifact reference across all categories.
    pub fn iter_all(&self) -> impl Iterator<Item = &ArtifactRef> {
        self.subtitles
            .values()
            .chain(self.audio.values())
            .chain(self.video.values())
            .chain(self.podcast.values())
            .chain(self.images.values())
            .chain(self.transcripts.values())
    }

    /// Whether no artifacts have been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter_all().next().is_none()
    }
}

/// Category labels used by [`TaskState::record_artifact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactCategory {
    /// Subtitle tracks.
    Subtitles,
    /// Audio outputs.
    Audio,
    /// Video outputs.
    Video,
    /// Podcast outputs.
    Podcast,
    /// Image outputs.
    Images,
    /// Transcript documents.
    Transcripts,
}

/// Structured snapshot of the shared task state persisted between steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    /// Upload/file identifier (16-hex content hash).
    pub file_id: String,
    /// Owning task when the state is task-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    /// Owner of the upload when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Local path of the uploaded source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Original filename of the upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Upload extension including the leading dot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ext: Option<String>,
    /// Kind of source document.
    pub source_type: SourceType,
    /// What the task produces.
    pub task_type: TaskType,
    /// Top-level lifecycle status.
    pub status: TaskStatus,
    /// Step currently (or most recently) executing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<StepName>,
    /// Declared execution order for this task.
    pub step_order: Vec<StepName>,
    /// Per-step snapshots.
    pub steps: BTreeMap<StepName, StepSnapshot>,
    /// Errors collected during processing, oldest first.
    #[serde(default)]
    pub errors: Vec<TaskErrorEntry>,
    /// Sanitized copy of the user-supplied knobs.
    pub knobs: TaskKnobs,
    /// Downloadable artifacts recorded by steps.
    #[serde(default)]
    pub artifacts: ArtifactMap,
    /// When the state was created.
    pub created_at: DateTime<Utc>,
    /// Last mutation time; strictly non-decreasing.
    pub updated_at: DateTime<Utc>,
}

impl TaskState {
    /// Materialize a fresh state from a step plan.
    #[must_use]
    pub fn new(
        file_id: impl Into<String>,
        source_type: SourceType,
        plan: &StepPlan,
        knobs: TaskKnobs,
        task_id: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        let mut steps = BTreeMap::new();
        let mut step_order = Vec::with_capacity(plan.steps().len());
        for planned in plan.steps() {
            step_order.push(planned.name);
            steps.insert(
                planned.name,
                StepSnapshot {
                    status: planned.initial,
                    data: None,
                    markdown: None,
                },
            );
        }
        let task_type = knobs.task_type();
        let current_step = plan.first_runnable();
        Self {
            file_id: file_id.into(),
            task_id,
            user_id: None,
            file_path: None,
            filename: None,
            file_ext: None,
            source_type,
            task_type,
            status: TaskStatus::Uploaded,
            current_step,
            step_order,
            steps,
            errors: Vec::new(),
            knobs,
            artifacts: ArtifactMap::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Snapshot for one step.
    #[must_use]
    pub fn step(&self, name: StepName) -> Option<&StepSnapshot> {
        self.steps.get(&name)
    }

    /// Steps in declared execution order.
    pub fn ordered_steps(&self) -> impl Iterator<Item = (StepName, &StepSnapshot)> {
        self.step_order
            .iter()
            .filter_map(|name| self.steps.get(name).map(|snap| (*name, snap)))
    }

    /// Update one step's status (and optionally its payload), bumping
    /// `current_step` and `updated_at`. Re-writing an identical status is a
    /// no-op apart from the timestamp. Returns `false` when the step is not
    /// part of this task's plan.
    pub fn set_step_status(
        &mut self,
        name: StepName,
        status: StepStatus,
        data: Option<StepData>,
    ) -> bool {
        let Some(snapshot) = self.steps.get_mut(&name) else {
            return false;
        };
        snapshot.status = status;
        if let Some(payload) = data {
            snapshot.data = Some(payload);
        }
        self.current_step = Some(name);
        self.touch();
        true
    }

    /// Attach rendered markdown to a step.
    pub fn set_step_markdown(&mut self, name: StepName, markdown: String) -> bool {
        let Some(snapshot) = self.steps.get_mut(&name) else {
            return false;
        };
        snapshot.markdown = Some(markdown);
        self.touch();
        true
    }

    /// Record an error entry for a step.
    pub fn add_error(&mut self, step: StepName, error: impl Into<String>) {
        self.errors.push(TaskErrorEntry {
            step,
            error: error.into(),
            timestamp: Utc::now(),
        });
        self.touch();
    }

    /// Record a downloadable artifact under the given category and label.
    pub fn record_artifact(
        &mut self,
        category: ArtifactCategory,
        label: impl Into<String>,
        artifact: ArtifactRef,
    ) {
        let bucket = match category {
            ArtifactCategory::Subtitles => &mut self.artifacts.subtitles,
            ArtifactCategory::Audio => &mut self.artifacts.audio,
            ArtifactCategory::Video => &mut self.artifacts.video,
            ArtifactCategory::Podcast => &mut self.artifacts.podcast,
            ArtifactCategory::Images => &mut self.artifacts.images,
            ArtifactCategory::Transcripts => &mut self.artifacts.transcripts,
        };
        bucket.insert(label.into(), artifact);
        self.touch();
    }

    /// Mark the task completed.
    pub fn mark_completed(&mut self) {
        self.status = TaskStatus::Completed;
        self.touch();
    }

    /// Mark the task failed.
    pub fn mark_failed(&mut self) {
        self.status = TaskStatus::Failed;
        self.touch();
    }

    /// Mark the task cancelled, cancelling the named step and every step
    /// still pending or processing.
    pub fn mark_cancelled(&mut self, cancelled_step: Option<StepName>) {
        self.status = TaskStatus::Cancelled;
        if let Some(step) = cancelled_step {
            if let Some(snapshot) = self.steps.get_mut(&step) {
                snapshot.status = StepStatus::Cancelled;
            }
        }
        for snapshot in self.steps.values_mut() {
            if matches!(
                snapshot.status,
                StepStatus::Pending | StepStatus::Processing
            ) {
                snapshot.status = StepStatus::Cancelled;
            }
        }
        self.touch();
    }

    /// Reset `start_step` and every later step in declared order back to
    /// `pending` (skipped steps stay skipped), clear their payloads, drop
    /// error entries referencing reset steps, and put the task back into
    /// `processing`. Returns `false` when `start_step` is not in the plan.
    pub fn reset_from(&mut self, start_step: StepName) -> bool {
        let Some(start_index) = self
            .step_order
            .iter()
            .position(|name| *name == start_step)
        else {
            return false;
        };

        let reset_set: Vec<StepName> = self.step_order[start_index..].to_vec();
        for name in &reset_set {
            if let Some(snapshot) = self.steps.get_mut(name) {
                if snapshot.status == StepStatus::Skipped {
                    continue;
                }
                snapshot.status = StepStatus::Pending;
                snapshot.data = None;
                snapshot.markdown = None;
            }
        }
        self.errors.retain(|entry| !reset_set.contains(&entry.step));
        self.status = TaskStatus::Processing;
        self.current_step = Some(start_step);
        self.touch();
        true
    }

    /// Resolve the step to resume a failed task from.
    ///
    /// Resolution order: explicit request → the step of the most recent error
    /// entry → the first failed step in declared order → the current step →
    /// the first step of the plan.
    #[must_use]
    pub fn resume_step(&self, requested: Option<StepName>) -> Option<StepName> {
        if let Some(step) = requested {
            if self.steps.contains_key(&step) {
                return Some(step);
            }
        }
        if let Some(entry) = self
            .errors
            .iter()
            .rev()
            .find(|entry| self.steps.contains_key(&entry.step))
        {
            return Some(entry.step);
        }
        if let Some((name, _)) = self
            .ordered_steps()
            .find(|(_, snap)| snap.status == StepStatus::Failed)
        {
            return Some(name);
        }
        if let Some(step) = self.current_step {
            if self.steps.contains_key(&step) {
                return Some(step);
            }
        }
        self.step_order.first().copied()
    }

    /// Overall completion percentage: completed steps over non-skipped
    /// steps, as an integer 0–100. Zero when the plan is empty.
    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        let total = self
            .steps
            .values()
            .filter(|snap| snap.status != StepStatus::Skipped)
            .count();
        if total == 0 {
            return 0;
        }
        let completed = self
            .steps
            .values()
            .filter(|snap| snap.status == StepStatus::Completed)
            .count();
        let percent = (completed * 100) / total;
        u8::try_from(percent).unwrap_or(100)
    }

    /// Whether every non-skipped step has completed.
    #[must_use]
    pub fn all_steps_completed(&self) -> bool {
        self.steps
            .values()
            .all(|snap| matches!(snap.status, StepStatus::Completed | StepStatus::Skipped))
    }

    fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanOptions;

    fn pdf_state(knobs: TaskKnobs) -> TaskState {
        let plan = StepPlan::for_task(SourceType::Pdf, &knobs, &PlanOptions::default());
        TaskState::new("abc123", SourceType::Pdf, &plan, knobs, Some(Uuid::new_v4()))
    }

    #[test]
    fn new_state_orders_steps_by_plan() {
        let state = pdf_state(TaskKnobs::default());
        let names: Vec<StepName> = state.ordered_steps().map(|(name, _)| name).collect();
        assert_eq!(names.first(), Some(&StepName::SegmentPdfContent));
        assert_eq!(names.last(), Some(&StepName::ComposeVideo));
        assert_eq!(state.current_step, Some(StepName::SegmentPdfContent));
        assert_eq!(state.status, TaskStatus::Uploaded);
    }

    #[test]
    fn progress_counts_only_non_skipped_steps() {
        let knobs = TaskKnobs {
            generate_subtitles: false,
            ..TaskKnobs::default()
        };
        let mut state = pdf_state(knobs);
        assert_eq!(state.progress_percent(), 0);

        let runnable: Vec<StepName> = state
            .ordered_steps()
            .filter(|(_, snap)| snap.status != StepStatus::Skipped)
            .map(|(name, _)| name)
            .collect();
        for name in &runnable {
            state.set_step_status(*name, StepStatus::Completed, None);
        }
        assert_eq!(state.progress_percent(), 100);
        assert!(state.all_steps_completed());
    }

    #[test]
    fn reset_from_preserves_earlier_steps_and_clears_errors() {
        let mut state = pdf_state(TaskKnobs::default());
        state.set_step_status(StepName::SegmentPdfContent, StepStatus::Completed, None);
        state.set_step_status(StepName::RevisePdfTranscripts, StepStatus::Completed, None);
        state.set_step_status(StepName::GeneratePdfAudio, StepStatus::Failed, None);
        state.add_error(StepName::GeneratePdfAudio, "speech synthesis failed");
        state.mark_failed();

        assert!(state.reset_from(StepName::GeneratePdfAudio));
        assert_eq!(
            state.step(StepName::SegmentPdfContent).unwrap().status,
            StepStatus::Completed
        );
        assert_eq!(
            state.step(StepName::GeneratePdfAudio).unwrap().status,
            StepStatus::Pending
        );
        assert_eq!(
            state.step(StepName::ComposeVideo).unwrap().status,
            StepStatus::Pending
        );
        assert!(state.errors.is_empty());
        assert_eq!(state.status, TaskStatus::Processing);
        assert_eq!(state.current_step, Some(StepName::GeneratePdfAudio));
    }

    #[test]
    fn reset_from_keeps_skipped_steps_skipped() {
        let knobs = TaskKnobs {
            generate_subtitles: false,
            ..TaskKnobs::default()
        };
        let mut state = pdf_state(knobs);
        assert_eq!(
            state.step(StepName::GeneratePdfSubtitles).unwrap().status,
            StepStatus::Skipped
        );
        assert!(state.reset_from(StepName::SegmentPdfContent));
        assert_eq!(
            state.step(StepName::GeneratePdfSubtitles).unwrap().status,
            StepStatus::Skipped
        );
    }

    #[test]
    fn cancel_marks_open_steps_cancelled() {
        let mut state = pdf_state(TaskKnobs::default());
        state.set_step_status(StepName::SegmentPdfContent, StepStatus::Completed, None);
        state.set_step_status(StepName::RevisePdfTranscripts, StepStatus::Processing, None);
        state.mark_cancelled(Some(StepName::RevisePdfTranscripts));

        assert_eq!(state.status, TaskStatus::Cancelled);
        assert_eq!(
            state.step(StepName::SegmentPdfContent).unwrap().status,
            StepStatus::Completed
        );
        assert_eq!(
            state.step(StepName::RevisePdfTranscripts).unwrap().status,
            StepStatus::Cancelled
        );
        assert_eq!(
            state.step(StepName::ComposeVideo).unwrap().status,
            StepStatus::Cancelled
        );
        assert!(state.progress_percent() < 100);
    }

    #[test]
    fn resume_step_resolution_chain() {
        let mut state = pdf_state(TaskKnobs::default());

        // Explicit request wins.
        assert_eq!(
            state.resume_step(Some(StepName::GeneratePdfAudio)),
            Some(StepName::GeneratePdfAudio)
        );

        // Most recent error entry next.
        state.add_error(StepName::RevisePdfTranscripts, "first");
        state.add_error(StepName::GeneratePdfChapterImages, "second");
        assert_eq!(
            state.resume_step(None),
            Some(StepName::GeneratePdfChapterImages)
        );

        // Falls back to first failed step in declared order.
        state.errors.clear();
        state.set_step_status(StepName::GeneratePdfAudio, StepStatus::Failed, None);
        assert_eq!(state.resume_step(None), Some(StepName::GeneratePdfAudio));

        // Then current step, then first step.
        state.set_step_status(StepName::GeneratePdfAudio, StepStatus::Pending, None);
        assert_eq!(state.resume_step(None), Some(StepName::GeneratePdfAudio));
    }

    #[test]
    fn state_round_trips_through_serde() {
        let mut state = pdf_state(TaskKnobs::default());
        state.set_step_status(
            StepName::SegmentPdfContent,
            StepStatus::Completed,
            Some(StepData::Chapters {
                chapters: vec![crate::data::Chapter {
                    index: 0,
                    title: "Intro".to_string(),
                    content: "Hello".to_string(),
                }],
            }),
        );
        state.record_artifact(
            ArtifactCategory::Subtitles,
            "en",
            ArtifactRef {
                storage_key: "outputs/t/subtitles/final_en.vtt".to_string(),
                storage_uri: "local://outputs/t/subtitles/final_en.vtt".to_string(),
                local_path: None,
                content_type: Some("text/vtt".to_string()),
            },
        );

        let json = serde_json::to_string(&state).expect("serialize");
        let back: TaskState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, state);

        // Serializing the decoded value again is byte-identical.
        let json_again = serde_json::to_string(&back).expect("serialize again");
        assert_eq!(json, json_again);
    }
}
