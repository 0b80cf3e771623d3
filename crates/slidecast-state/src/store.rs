//! Task-state persistence over the `ss:` keyspace.
//!
//! Keyspace:
//!
//! - `ss:state:{file_id}` - legacy file-scoped state (read fallback only);
//! - `ss:state:task:{task_id}` - canonical task-scoped state;
//! - `ss:task2file:{task_id}` / `ss:file2task:{file_id}` - scalar bindings;
//! - `ss:file2tasks:{file_id}` - set of task ids for multi-task uploads.
//!
//! State records carry a sliding 24 h TTL refreshed on every write; bindings
//! use a 30-day TTL. Writers are expected to be single-per-task, so updates
//! are plain read-modify-write.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use slidecast_core::{
    PlanOptions, SourceType, StepData, StepName, StepPlan, StepSnapshot, StepStatus, TaskKnobs,
    TaskState, TaskStatus, TaskType,
};

use crate::error::{StateError, StateResult};
use crate::kv::KeyValue;

/// Sliding TTL applied to state records on every write.
pub const STATE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// TTL applied to task/file bindings.
pub const BINDING_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Identifier a state operation targets: the legacy file scope or the
/// canonical task scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateRef<'a> {
    /// Look up through the file identifier.
    File(&'a str),
    /// Look up through the task identifier (canonical).
    Task(Uuid),
}

/// Parameters for materializing a fresh task state.
#[derive(Debug, Clone)]
pub struct CreateState {
    /// Upload/file identifier.
    pub file_id: String,
    /// Local path of the uploaded document.
    pub file_path: Option<String>,
    /// Upload extension including the dot.
    pub file_ext: String,
    /// Original filename.
    pub filename: Option<String>,
    /// Kind of source document.
    pub source_type: SourceType,
    /// What the task produces; `file_purge` selects the synthetic purge plan.
    pub task_type: TaskType,
    /// User-supplied knobs; determine the step plan.
    pub knobs: TaskKnobs,
    /// Process-wide planning toggles.
    pub plan_options: PlanOptions,
    /// Owning task; when set, the state is task-scoped from birth.
    pub task_id: Option<Uuid>,
    /// Owner of the upload.
    pub user_id: Option<String>,
    /// Whether to bind the task/file mappings (purge tasks skip binding so
    /// they never re-populate a file's task set).
    pub bind_task: bool,
}

/// Outcome of the legacy file-state purge walker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyPurgeReport {
    /// File-scoped state keys inspected.
    pub checked: u32,
    /// Keys removed because a task binding exists.
    pub removed: u32,
}

/// Durable task-state store over a [`KeyValue`] substrate.
#[derive(Clone)]
pub struct StateStore {
    kv: Arc<dyn KeyValue>,
}

fn state_key(file_id: &str) -> String {
    format!("ss:state:{file_id}")
}

fn task_state_key(task_id: Uuid) -> String {
    format!("ss:state:task:{task_id}")
}

fn task2file_key(task_id: Uuid) -> String {
    format!("ss:task2file:{task_id}")
}

fn file2task_key(file_id: &str) -> String {
    format!("ss:file2task:{file_id}")
}

fn file2tasks_key(file_id: &str) -> String {
    format!("ss:file2tasks:{file_id}")
}

impl StateStore {
    /// Create a store over the given substrate.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValue>) -> Self {
        Self { kv }
    }

    /// Access the underlying substrate (shared with the queue).
    #[must_use]
    pub fn substrate(&self) -> Arc<dyn KeyValue> {
        Arc::clone(&self.kv)
    }

    /// Materialize the initial state for a task, bind task/file mappings,
    /// and persist it. Task-scoped creation deletes any stale file-scoped
    /// record so older runs cannot bleed into this one.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn create_state(&self, params: CreateState) -> StateResult<TaskState> {
        let plan = if params.task_type == TaskType::FilePurge {
            StepPlan::for_purge()
        } else {
            StepPlan::for_task(params.source_type, &params.knobs, &params.plan_options)
        };
        let mut state = TaskState::new(
            params.file_id.clone(),
            params.source_type,
            &plan,
            params.knobs,
            params.task_id,
        );
        state.task_type = params.task_type;
        state.file_path = params.file_path;
        state.filename = params.filename;
        state.file_ext = Some(params.file_ext);
        state.user_id = params.user_id;

        if let Some(task_id) = params.task_id {
            if params.bind_task {
                self.bind_task(&params.file_id, task_id).await?;
            }
        }
        self.save_state(&state).await?;
        info!(
            file_id = %state.file_id,
            task_id = ?state.task_id,
            task_type = %state.task_type,
            steps = state.step_order.len(),
            "task state created"
        );
        Ok(state)
    }

    /// Persist a state snapshot, refreshing its TTL.
    ///
    /// Task-scoped snapshots write only the task key and proactively delete
    /// the legacy file-scoped record.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn save_state(&self, state: &TaskState) -> StateResult<()> {
        let payload = serde_json::to_string(state).map_err(|source| StateError::Codec {
            key: state.file_id.clone(),
            source,
        })?;
        if let Some(task_id) = state.task_id {
            self.kv
                .set(&task_state_key(task_id), &payload, Some(STATE_TTL))
                .await?;
            let _ = self.kv.delete(&state_key(&state.file_id)).await?;
        } else {
            self.kv
                .set(&state_key(&state.file_id), &payload, Some(STATE_TTL))
                .await?;
        }
        Ok(())
    }

    /// Load state by file id: the task binding is preferred, the file-scoped
    /// record is a legacy fallback.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or a record is malformed.
    pub async fn get_state(&self, file_id: &str) -> StateResult<Option<TaskState>> {
        if let Some(raw_task) = self.kv.get(&file2task_key(file_id)).await? {
            if let Ok(task_id) = raw_task.parse::<Uuid>() {
                if let Some(state) = self.read_key(&task_state_key(task_id)).await? {
                    return Ok(Some(state));
                }
            }
        }
        self.read_key(&state_key(file_id)).await
    }

    /// Load state by task id, resolving through the task→file binding when
    /// the task-scoped record is absent.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or a record is malformed.
    pub async fn get_state_by_task(&self, task_id: Uuid) -> StateResult<Option<TaskState>> {
        if let Some(state) = self.read_key(&task_state_key(task_id)).await? {
            return Ok(Some(state));
        }
        if let Some(file_id) = self.kv.get(&task2file_key(task_id)).await? {
            return self.get_state(&file_id).await;
        }
        Ok(None)
    }

    /// Load state through either scope.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or a record is malformed.
    pub async fn load(&self, target: StateRef<'_>) -> StateResult<Option<TaskState>> {
        match target {
            StateRef::File(file_id) => self.get_state(file_id).await,
            StateRef::Task(task_id) => self.get_state_by_task(task_id).await,
        }
    }

    /// Apply a mutation to the state behind `target` and persist it.
    /// Returns `false` when no state exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or a record is malformed.
    pub async fn with_state<F>(&self, target: StateRef<'_>, mutate: F) -> StateResult<bool>
    where
        F: FnOnce(&mut TaskState) + Send,
    {
        let Some(mut state) = self.load(target).await? else {
            return Ok(false);
        };
        mutate(&mut state);
        self.save_state(&state).await?;
        Ok(true)
    }

    /// Update one step's status (and optionally payload); sets
    /// `current_step` and refreshes the TTL. Unknown steps are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or a record is malformed.
    pub async fn update_step_status(
        &self,
        target: StateRef<'_>,
        step: StepName,
        status: StepStatus,
        data: Option<StepData>,
    ) -> StateResult<bool> {
        self.with_state(target, |state| {
            state.set_step_status(step, status, data);
        })
        .await
    }

    /// Read one step's snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or a record is malformed.
    pub async fn get_step_status(
        &self,
        target: StateRef<'_>,
        step: StepName,
    ) -> StateResult<Option<StepSnapshot>> {
        Ok(self
            .load(target)
            .await?
            .and_then(|state| state.step(step).cloned()))
    }

    /// Record an error entry for a step.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or a record is malformed.
    pub async fn add_error(
        &self,
        target: StateRef<'_>,
        step: StepName,
        error: &str,
    ) -> StateResult<bool> {
        self.with_state(target, |state| state.add_error(step, error))
            .await
    }

    /// Mark the task completed.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or a record is malformed.
    pub async fn mark_completed(&self, target: StateRef<'_>) -> StateResult<bool> {
        self.with_state(target, TaskState::mark_completed).await
    }

    /// Mark the task failed.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or a record is malformed.
    pub async fn mark_failed(&self, target: StateRef<'_>) -> StateResult<bool> {
        self.with_state(target, TaskState::mark_failed).await
    }

    /// Mark the task cancelled, cancelling any step still pending or
    /// processing.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or a record is malformed.
    pub async fn mark_cancelled(
        &self,
        target: StateRef<'_>,
        cancelled_step: Option<StepName>,
    ) -> StateResult<bool> {
        self.with_state(target, |state| state.mark_cancelled(cancelled_step))
            .await
    }

    /// Set the top-level status without touching steps.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or a record is malformed.
    pub async fn set_status(&self, target: StateRef<'_>, status: TaskStatus) -> StateResult<bool> {
        self.with_state(target, |state| {
            state.status = status;
        })
        .await
    }

    /// Reset `start_step` and all later steps to `pending` so the task can
    /// resume from there. Returns the reset state, or `None` when the task
    /// has no state or the step is not in its plan.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails or a record is malformed.
    pub async fn reset_steps_from_task(
        &self,
        task_id: Uuid,
        start_step: StepName,
    ) -> StateResult<Option<TaskState>> {
        let Some(mut state) = self.get_state_by_task(task_id).await? else {
            return Ok(None);
        };
        if !state.reset_from(start_step) {
            return Ok(None);
        }
        self.save_state(&state).await?;
        debug!(task_id = %task_id, step = %start_step, "task steps reset for retry");
        Ok(Some(state))
    }

    /// Bind a task to its file: scalar mappings both ways, membership in the
    /// multi-task set, and removal of the legacy file-scoped state record.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn bind_task(&self, file_id: &str, task_id: Uuid) -> StateResult<()> {
        let task = task_id.to_string();
        self.kv
            .set(&task2file_key(task_id), file_id, Some(BINDING_TTL))
            .await?;
        self.kv
            .set(&file2task_key(file_id), &task, Some(BINDING_TTL))
            .await?;
        let _ = self.kv.set_add(&file2tasks_key(file_id), &task).await?;
        let _ = self.kv.expire(&file2tasks_key(file_id), BINDING_TTL).await?;
        let _ = self.kv.delete(&state_key(file_id)).await?;
        Ok(())
    }

    /// Remove a task from its file's multi-task set and drop the task-side
    /// binding. Returns the number of tasks still bound to the file, which
    /// drives last-writer purge decisions.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn unbind_task(&self, file_id: &str, task_id: Uuid) -> StateResult<u64> {
        let task = task_id.to_string();
        let _ = self.kv.set_remove(&file2tasks_key(file_id), &task).await?;
        let _ = self.kv.delete(&task2file_key(task_id)).await?;
        if self
            .kv
            .get(&file2task_key(file_id))
            .await?
            .is_some_and(|bound| bound == task)
        {
            let _ = self.kv.delete(&file2task_key(file_id)).await?;
        }
        Ok(self.kv.set_len(&file2tasks_key(file_id)).await?)
    }

    /// Resolve the file bound to a task.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn get_file_id_by_task(&self, task_id: Uuid) -> StateResult<Option<String>> {
        Ok(self.kv.get(&task2file_key(task_id)).await?)
    }

    /// Every task currently bound to a file.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn task_ids_for_file(&self, file_id: &str) -> StateResult<Vec<Uuid>> {
        let members = self.kv.set_members(&file2tasks_key(file_id)).await?;
        Ok(members
            .iter()
            .filter_map(|member| member.parse().ok())
            .collect())
    }

    /// Delete a task's state record and its task-side binding.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn delete_task_state(&self, task_id: Uuid) -> StateResult<()> {
        let _ = self.kv.delete(&task_state_key(task_id)).await?;
        let _ = self.kv.delete(&task2file_key(task_id)).await?;
        Ok(())
    }

    /// Remove legacy file-scoped state records that have a task binding.
    /// Used by `ss-admin purge-legacy-file-states`.
    ///
    /// # Errors
    ///
    /// Returns an error when the substrate fails.
    pub async fn purge_legacy_file_states(&self) -> StateResult<LegacyPurgeReport> {
        let mut report = LegacyPurgeReport::default();
        for key in self.kv.scan_prefix("ss:state:").await? {
            if key.starts_with("ss:state:task:") {
                continue;
            }
            let file_id = key.trim_start_matches("ss:state:").to_string();
            report.checked += 1;
            let has_scalar = self.kv.get(&file2task_key(&file_id)).await?.is_some();
            let has_set = self.kv.exists(&file2tasks_key(&file_id)).await?;
            if has_scalar || has_set {
                let _ = self.kv.delete(&key).await?;
                report.removed += 1;
            }
        }
        Ok(report)
    }

    async fn read_key(&self, key: &str) -> StateResult<Option<TaskState>> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(None);
        };
        let state = serde_json::from_str(&raw).map_err(|source| StateError::Codec {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKv;

    fn store() -> StateStore {
        StateStore::new(Arc::new(MemoryKv::new()))
    }

    fn create_params(task_id: Option<Uuid>) -> CreateState {
        CreateState {
            file_id: "abcd1234abcd1234".to_string(),
            file_path: Some("/tmp/paper.pdf".to_string()),
            file_ext: ".pdf".to_string(),
            filename: Some("paper.pdf".to_string()),
            source_type: SourceType::Pdf,
            task_type: TaskType::Video,
            knobs: TaskKnobs::default(),
            plan_options: PlanOptions::default(),
            task_id,
            user_id: Some("user-1".to_string()),
            bind_task: true,
        }
    }

    #[tokio::test]
    async fn task_scoped_state_is_canonical() {
        let store = store();
        let task_id = Uuid::new_v4();
        let state = store
            .create_state(create_params(Some(task_id)))
            .await
            .expect("create");
        assert_eq!(state.task_id, Some(task_id));

        // Readable through both scopes.
        let by_task = store
            .get_state_by_task(task_id)
            .await
            .expect("read")
            .expect("state");
        assert_eq!(by_task.file_id, "abcd1234abcd1234");
        let by_file = store
            .get_state("abcd1234abcd1234")
            .await
            .expect("read")
            .expect("state");
        assert_eq!(by_file.task_id, Some(task_id));

        // No file-scoped record exists.
        let raw = store
            .substrate()
            .get("ss:state:abcd1234abcd1234")
            .await
            .expect("kv");
        assert!(raw.is_none());
    }

    #[tokio::test]
    async fn update_step_status_is_idempotent() {
        let store = store();
        let task_id = Uuid::new_v4();
        store
            .create_state(create_params(Some(task_id)))
            .await
            .expect("create");

        let target = StateRef::Task(task_id);
        assert!(store
            .update_step_status(target, StepName::SegmentPdfContent, StepStatus::Processing, None)
            .await
            .expect("update"));
        assert!(store
            .update_step_status(target, StepName::SegmentPdfContent, StepStatus::Processing, None)
            .await
            .expect("update again"));

        let state = store.load(target).await.expect("load").expect("state");
        assert_eq!(
            state.step(StepName::SegmentPdfContent).unwrap().status,
            StepStatus::Processing
        );
        assert_eq!(state.current_step, Some(StepName::SegmentPdfContent));
    }

    #[tokio::test]
    async fn reset_clears_later_steps_and_errors() {
        let store = store();
        let task_id = Uuid::new_v4();
        store
            .create_state(create_params(Some(task_id)))
            .await
            .expect("create");
        let target = StateRef::Task(task_id);

        for step in [
            StepName::SegmentPdfContent,
            StepName::RevisePdfTranscripts,
            StepName::GeneratePdfChapterImages,
        ] {
            store
                .update_step_status(target, step, StepStatus::Completed, None)
                .await
                .expect("complete");
        }
        store
            .update_step_status(target, StepName::GeneratePdfAudio, StepStatus::Failed, None)
            .await
            .expect("fail");
        store
            .add_error(target, StepName::GeneratePdfAudio, "tts exploded")
            .await
            .expect("error");
        store.mark_failed(target).await.expect("mark failed");

        let reset = store
            .reset_steps_from_task(task_id, StepName::GeneratePdfAudio)
            .await
            .expect("reset")
            .expect("state");
        assert_eq!(reset.status, TaskStatus::Processing);
        assert_eq!(
            reset.step(StepName::GeneratePdfChapterImages).unwrap().status,
            StepStatus::Completed
        );
        assert_eq!(
            reset.step(StepName::GeneratePdfAudio).unwrap().status,
            StepStatus::Pending
        );
        assert!(reset.errors.is_empty());
    }

    #[tokio::test]
    async fn unbind_returns_remaining_count() {
        let store = store();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        store.bind_task("file-1", first).await.expect("bind");
        store.bind_task("file-1", second).await.expect("bind");

        assert_eq!(
            store.task_ids_for_file("file-1").await.expect("tasks").len(),
            2
        );
        let remaining = store.unbind_task("file-1", first).await.expect("unbind");
        assert_eq!(remaining, 1);
        let remaining = store.unbind_task("file-1", second).await.expect("unbind");
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn legacy_purge_removes_only_bound_file_states() {
        let store = store();
        let kv = store.substrate();

        // A legacy file-scoped record without a binding stays.
        kv.set("ss:state:orphan", "{}", None).await.expect("seed");
        // One with a binding is removed.
        kv.set("ss:state:bound", "{}", None).await.expect("seed");
        let task_id = Uuid::new_v4();
        kv.set("ss:file2task:bound", &task_id.to_string(), None)
            .await
            .expect("seed binding");

        let report = store.purge_legacy_file_states().await.expect("purge");
        assert_eq!(report.checked, 2);
        assert_eq!(report.removed, 1);
        assert!(kv.exists("ss:state:orphan").await.expect("kv"));
        assert!(!kv.exists("ss:state:bound").await.expect("kv"));
    }

    #[tokio::test]
    async fn file_scoped_state_survives_without_task() {
        let store = store();
        let state = store
            .create_state(create_params(None))
            .await
            .expect("create");
        assert!(state.task_id.is_none());
        let loaded = store
            .get_state("abcd1234abcd1234")
            .await
            .expect("read")
            .expect("state");
        assert_eq!(loaded.status, TaskStatus::Uploaded);
    }
}
