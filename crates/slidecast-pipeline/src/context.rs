//! Explicit dependency context threaded through coordinators and steps.
//!
//! There are no module-level singletons: the state store, queue, storage
//! provider, and engines are constructed once at startup and handed to the
//! coordinator as one bundle.

use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use slidecast_core::{
    ArtifactCategory, ArtifactRef, PlanOptions, StepName, TaskState,
};
use slidecast_queue::{PurgeRequest, TaskQueue};
use slidecast_state::{StateRef, StateStore};
use slidecast_storage::paths::{output_object_key, OutputCategory};
use slidecast_storage::StorageProvider;

use crate::engines::{DocumentEngine, LanguageEngine, MediaEngine, SpeechEngine};
use crate::error::{PipelineError, PipelineResult};

/// The external engines a pipeline run calls out to.
#[derive(Clone)]
pub struct Engines {
    /// Document ingestion and rendering.
    pub document: Arc<dyn DocumentEngine>,
    /// Text transformation and vision analysis.
    pub language: Arc<dyn LanguageEngine>,
    /// Speech synthesis.
    pub speech: Arc<dyn SpeechEngine>,
    /// Media composition.
    pub media: Arc<dyn MediaEngine>,
}

/// Process-wide dependencies shared by every pipeline run.
#[derive(Clone)]
pub struct PipelineContext {
    /// Task-state store.
    pub state: StateStore,
    /// Task queue (cancellation probes).
    pub queue: TaskQueue,
    /// Object storage for artifacts.
    pub storage: Arc<dyn StorageProvider>,
    /// External engines.
    pub engines: Engines,
    /// Scratch directory for composed media before upload.
    pub output_dir: PathBuf,
    /// Planning toggles applied when state must be created.
    pub plan_options: PlanOptions,
}

/// Cooperative cancellation probe polled at unit boundaries.
#[derive(Clone)]
pub struct CancelProbe {
    queue: TaskQueue,
    task_id: Option<Uuid>,
}

impl CancelProbe {
    /// Probe for a specific task; tasks without an id cannot be cancelled.
    #[must_use]
    pub fn new(queue: TaskQueue, task_id: Option<Uuid>) -> Self {
        Self { queue, task_id }
    }

    /// Whether cancellation has been requested.
    ///
    /// # Errors
    ///
    /// Returns an error when the queue substrate fails.
    pub async fn is_cancelled(&self) -> PipelineResult<bool> {
        match self.task_id {
            Some(task_id) => Ok(self.queue.is_cancelled(task_id).await?),
            None => Ok(false),
        }
    }

    /// Raise [`PipelineError::Cancelled`] when cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cancelled`] on cancellation, or a queue
    /// error when the probe itself fails.
    pub async fn check(&self) -> PipelineResult<()> {
        if self.is_cancelled().await? {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

/// Per-run view handed to each step.
pub struct StepContext {
    /// Shared dependencies.
    pub deps: Arc<PipelineContext>,
    /// Upload/file identifier.
    pub file_id: String,
    /// Owning task when the run is task-scoped.
    pub task_id: Option<Uuid>,
    /// Cancellation probe for unit boundaries.
    pub probe: CancelProbe,
    /// Purge details for `file_purge` runs.
    pub purge: Option<PurgeRequest>,
}

impl StepContext {
    /// The state-store target for this run (task-scoped when possible).
    #[must_use]
    pub fn target(&self) -> StateRef<'_> {
        match self.task_id {
            Some(task_id) => StateRef::Task(task_id),
            None => StateRef::File(&self.file_id),
        }
    }

    /// Base identifier for output keys: the task id when present, the file
    /// id otherwise.
    #[must_use]
    pub fn base_id(&self) -> String {
        self.task_id
            .map_or_else(|| self.file_id.clone(), |task_id| task_id.to_string())
    }

    /// Load the current task state; absent state is a hard error for steps.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the state is gone.
    pub async fn state(&self) -> PipelineResult<TaskState> {
        self.deps
            .state
            .load(self.target())
            .await?
            .ok_or_else(|| PipelineError::StateMissing {
                file_id: self.file_id.clone(),
            })
    }

    /// Poll the cancellation probe.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cancelled`] on cancellation.
    pub async fn check_cancelled(&self) -> PipelineResult<()> {
        self.probe.check().await
    }

    /// Upload bytes under the canonical outputs layout, returning
    /// `(storage_key, storage_uri)`.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage write fails.
    pub async fn store_output(
        &self,
        category: OutputCategory,
        artifact: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> PipelineResult<(String, String)> {
        let key = output_object_key(&self.base_id(), category, artifact);
        let uri = self
            .deps
            .storage
            .put_bytes(bytes, &key, content_type)
            .await?;
        Ok((key, uri))
    }

    /// Upload a local file under the canonical outputs layout, returning
    /// `(storage_key, storage_uri)`.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage write fails.
    pub async fn store_output_file(
        &self,
        category: OutputCategory,
        artifact: &str,
        path: &std::path::Path,
        content_type: &str,
    ) -> PipelineResult<(String, String)> {
        let key = output_object_key(&self.base_id(), category, artifact);
        let uri = self
            .deps
            .storage
            .put_file(path, &key, content_type)
            .await?;
        Ok((key, uri))
    }

    /// Record a downloadable artifact in the task state.
    ///
    /// # Errors
    ///
    /// Returns an error when the state write fails.
    pub async fn record_artifact(
        &self,
        category: ArtifactCategory,
        label: &str,
        artifact: ArtifactRef,
    ) -> PipelineResult<()> {
        self.deps
            .state
            .with_state(self.target(), |state| {
                state.record_artifact(category, label, artifact);
            })
            .await?;
        Ok(())
    }

    /// Attach rendered markdown to a step.
    ///
    /// # Errors
    ///
    /// Returns an error when the state write fails.
    pub async fn set_markdown(&self, step: StepName, markdown: String) -> PipelineResult<()> {
        self.deps
            .state
            .with_state(self.target(), |state| {
                state.set_step_markdown(step, markdown);
            })
            .await?;
        Ok(())
    }

    /// Scratch directory for this run, created on demand.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created.
    pub async fn workdir(&self) -> PipelineResult<PathBuf> {
        let dir = self.deps.output_dir.join("work").join(self.base_id());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| PipelineError::Io {
                op: "workdir.create",
                source,
            })?;
        Ok(dir)
    }
}
