//! The pipeline coordinator: one generic step driver over the persisted
//! step plan.
//!
//! Every variant (PDF video, slide video, podcast, both, file purge) runs
//! through the same loop. The enabled step set was fixed when the task state
//! was created, so the coordinator simply walks `step_order`: completed
//! steps short-circuit (re-entry after crash or retry is idempotent),
//! skipped steps are passed over, and a failure or cancellation halts the
//! walk with the appropriate terminal state.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use slidecast_core::{
    SourceType, StepData, StepName, StepStatus, TaskKnobs, TaskState, TaskStatus, TaskType,
};
use slidecast_queue::{PurgeRequest, TaskPayload, TaskRecord};
use slidecast_state::CreateState;

use crate::context::{CancelProbe, PipelineContext, StepContext};
use crate::error::{chain_message, PipelineError, PipelineResult};
use crate::runner::{StepOutput, StepRegistry};

/// Work order handed to the coordinator by the worker runtime.
#[derive(Debug, Clone)]
pub struct AcceptTask {
    /// Upload/file identifier.
    pub file_id: String,
    /// Local path of the uploaded document.
    pub file_path: Option<String>,
    /// Upload extension including the dot.
    pub file_ext: Option<String>,
    /// Original filename.
    pub filename: Option<String>,
    /// Kind of source document.
    pub source_type: SourceType,
    /// What the task produces.
    pub task_type: TaskType,
    /// User-supplied knobs.
    pub knobs: TaskKnobs,
    /// Owning task.
    pub task_id: Option<Uuid>,
    /// Owner of the upload.
    pub user_id: Option<String>,
    /// Purge details for `file_purge` tasks.
    pub purge: Option<PurgeRequest>,
}

impl AcceptTask {
    /// Build a work order from a popped queue record.
    #[must_use]
    pub fn from_record(record: &TaskRecord) -> Self {
        let TaskPayload {
            file_id,
            file_path,
            file_ext,
            filename,
            source_type,
            knobs,
            purge,
        } = record.kwargs.clone();
        let source_type = source_type.unwrap_or_else(|| {
            file_ext
                .as_deref()
                .map_or(SourceType::Pdf, SourceType::from_extension)
        });
        Self {
            file_id,
            file_path,
            file_ext,
            filename,
            source_type,
            task_type: record.task_type,
            knobs,
            task_id: Some(record.task_id),
            user_id: record.user_id.clone(),
            purge,
        }
    }
}

/// How a step left the pipeline loop.
enum StepFlow {
    /// The step completed (or was already complete); continue the walk.
    Continue,
    /// Cancellation was observed; the task is marked cancelled.
    Cancelled,
    /// The task was already failed before the step began.
    AlreadyFailed,
}

/// Drives ordered step execution for every pipeline variant.
#[derive(Clone)]
pub struct Coordinator {
    ctx: Arc<PipelineContext>,
    registry: Arc<StepRegistry>,
}

impl Coordinator {
    /// Coordinator with the standard step registry.
    #[must_use]
    pub fn new(ctx: PipelineContext) -> Self {
        Self::with_registry(ctx, StepRegistry::standard())
    }

    /// Coordinator with a custom registry (used by tests to inject failing
    /// or counting steps).
    #[must_use]
    pub fn with_registry(ctx: PipelineContext, registry: StepRegistry) -> Self {
        Self {
            ctx: Arc::new(ctx),
            registry: Arc::new(registry),
        }
    }

    /// Shared dependency context.
    #[must_use]
    pub fn context(&self) -> Arc<PipelineContext> {
        Arc::clone(&self.ctx)
    }

    /// Run a task to completion: materialize state if needed, walk the
    /// persisted step order, and record the terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cancelled`] when the task was cancelled, or
    /// the failing step's error after failure bookkeeping is done.
    pub async fn accept_task(&self, request: AcceptTask) -> PipelineResult<()> {
        let step_ctx = StepContext {
            deps: Arc::clone(&self.ctx),
            file_id: request.file_id.clone(),
            task_id: request.task_id,
            probe: CancelProbe::new(self.ctx.queue.clone(), request.task_id),
            purge: request.purge.clone(),
        };

        if step_ctx.probe.is_cancelled().await? {
            info!(task_id = ?request.task_id, "task cancelled before processing started");
            let _ = self.ctx.state.mark_cancelled(step_ctx.target(), None).await?;
            return Err(PipelineError::Cancelled);
        }

        let state = self.ensure_state(&request).await?;
        // Terminal statuses never transition back; a completed task re-run
        // walks the loop as a pure no-op.
        if !state.status.is_terminal() {
            let _ = self
                .ctx
                .state
                .set_status(step_ctx.target(), TaskStatus::Processing)
                .await?;
        }

        for (name, snapshot) in state.ordered_steps() {
            if snapshot.status == StepStatus::Skipped {
                continue;
            }
            match self.execute_step(&step_ctx, name).await? {
                StepFlow::Continue => {}
                StepFlow::Cancelled => return Err(PipelineError::Cancelled),
                StepFlow::AlreadyFailed => {
                    return Err(PipelineError::StepFailed {
                        step: name,
                        message: "task already failed before this step".to_string(),
                    })
                }
            }
        }

        let _ = self.ctx.state.mark_completed(step_ctx.target()).await?;
        info!(task_id = ?request.task_id, file_id = %request.file_id, "pipeline completed");
        Ok(())
    }

    /// Load existing state or materialize it; re-entry updates knobs and the
    /// task binding but never re-derives the step plan.
    async fn ensure_state(&self, request: &AcceptTask) -> PipelineResult<TaskState> {
        let target = request.task_id.map_or(
            slidecast_state::StateRef::File(&request.file_id),
            slidecast_state::StateRef::Task,
        );
        if let Some(mut state) = self.ctx.state.load(target).await? {
            let mut dirty = false;
            if state.knobs != request.knobs {
                state.knobs = request.knobs.clone();
                dirty = true;
            }
            if state.task_id.is_none() {
                if let Some(task_id) = request.task_id {
                    state.task_id = Some(task_id);
                    self.ctx.state.bind_task(&request.file_id, task_id).await?;
                    dirty = true;
                }
            }
            if dirty {
                self.ctx.state.save_state(&state).await?;
            }
            return Ok(state);
        }

        let state = self
            .ctx
            .state
            .create_state(CreateState {
                file_id: request.file_id.clone(),
                file_path: request.file_path.clone(),
                file_ext: request.file_ext.clone().unwrap_or_default(),
                filename: request.filename.clone(),
                source_type: request.source_type,
                task_type: request.task_type,
                knobs: request.knobs.clone(),
                plan_options: self.ctx.plan_options,
                task_id: request.task_id,
                user_id: request.user_id.clone(),
                bind_task: request.task_type != TaskType::FilePurge,
            })
            .await?;
        Ok(state)
    }

    /// Execute one step with full status bookkeeping.
    async fn execute_step(&self, ctx: &StepContext, name: StepName) -> PipelineResult<StepFlow> {
        // Cancellation and failure are re-checked at every step boundary.
        if ctx.probe.is_cancelled().await? {
            let _ = self.ctx.state.mark_cancelled(ctx.target(), Some(name)).await?;
            info!(step = %name, "cancellation observed at step boundary");
            return Ok(StepFlow::Cancelled);
        }
        let state = ctx.state().await?;
        match state.status {
            TaskStatus::Failed => {
                error!(step = %name, "pipeline already failed; refusing to run step");
                let _ = self
                    .ctx
                    .state
                    .update_step_status(ctx.target(), name, StepStatus::Failed, None)
                    .await?;
                return Ok(StepFlow::AlreadyFailed);
            }
            TaskStatus::Cancelled => {
                let _ = self.ctx.state.mark_cancelled(ctx.target(), Some(name)).await?;
                return Ok(StepFlow::Cancelled);
            }
            _ => {}
        }

        let Some(snapshot) = state.step(name) else {
            warn!(step = %name, "step missing from plan; skipping");
            return Ok(StepFlow::Continue);
        };
        match snapshot.status {
            StepStatus::Completed => {
                info!(step = %name, "step already completed; skipping");
                return Ok(StepFlow::Continue);
            }
            StepStatus::Skipped => return Ok(StepFlow::Continue),
            _ => {}
        }

        let Some(implementation) = self.registry.get(name) else {
            let message = "no implementation registered for step".to_string();
            self.record_failure(ctx, name, &message).await?;
            return Err(PipelineError::StepFailed {
                step: name,
                message,
            });
        };

        let _ = self
            .ctx
            .state
            .update_step_status(ctx.target(), name, StepStatus::Processing, None)
            .await?;
        info!(task_id = ?ctx.task_id, step = %name, label = name.display_label(), "executing step");

        match implementation.run(ctx).await {
            Ok(output) => {
                self.finalize_step(ctx, name, output).await?;
                Ok(StepFlow::Continue)
            }
            Err(PipelineError::Cancelled) => {
                info!(step = %name, "step cancelled mid-flight");
                let _ = self.ctx.state.mark_cancelled(ctx.target(), Some(name)).await?;
                Ok(StepFlow::Cancelled)
            }
            Err(error) => {
                let message = chain_message(&error);
                error!(step = %name, error = %message, "step failed");
                self.record_failure(ctx, name, &message).await?;
                Err(error)
            }
        }
    }

    /// Enforce the step's post-conditions after its body returns.
    ///
    /// A step that finished without recording a terminal status is marked
    /// completed with its returned payload; a step that flagged itself
    /// failed or cancelled during execution wins over the returned payload.
    async fn finalize_step(
        &self,
        ctx: &StepContext,
        name: StepName,
        output: StepOutput,
    ) -> PipelineResult<()> {
        let state = ctx.state().await?;
        match state.step(name).map(|snapshot| snapshot.status) {
            Some(StepStatus::Failed) => {
                let message = state
                    .step(name)
                    .and_then(|snapshot| snapshot.data.as_ref())
                    .and_then(|data| match data {
                        StepData::Failure { message } => Some(message.clone()),
                        _ => None,
                    })
                    .unwrap_or_else(|| "step finalized with failed status".to_string());
                self.record_failure(ctx, name, &message).await?;
                Err(PipelineError::StepFailed {
                    step: name,
                    message,
                })
            }
            Some(StepStatus::Cancelled) => Err(PipelineError::Cancelled),
            Some(StepStatus::Completed) => Ok(()),
            _ => {
                let _ = self
                    .ctx
                    .state
                    .update_step_status(
                        ctx.target(),
                        name,
                        StepStatus::Completed,
                        Some(output.data),
                    )
                    .await?;
                if let Some(markdown) = output.markdown {
                    ctx.set_markdown(name, markdown).await?;
                }
                Ok(())
            }
        }
    }

    async fn record_failure(
        &self,
        ctx: &StepContext,
        name: StepName,
        message: &str,
    ) -> PipelineResult<()> {
        let _ = self
            .ctx
            .state
            .update_step_status(
                ctx.target(),
                name,
                StepStatus::Failed,
                Some(StepData::Failure {
                    message: message.to_string(),
                }),
            )
            .await?;
        let _ = self.ctx.state.add_error(ctx.target(), name, message).await?;
        let _ = self.ctx.state.mark_failed(ctx.target()).await?;
        Ok(())
    }
}
