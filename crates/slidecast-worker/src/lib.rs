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

//! Worker runtime for Slidecast.
//!
//! Each worker is one loop: pop a task id, re-check cancellation, flip the
//! record to `processing`, dispatch the coordinator, and record the terminal
//! status. Delivery is at-least-once; the coordinator's idempotent step
//! skipping makes duplicate delivery harmless. Multiple workers may run
//! concurrently - the queue's atomic pop hands each task to exactly one.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use slidecast_core::TaskStatus;
use slidecast_data::TaskRepository;
use slidecast_pipeline::error::chain_message;
use slidecast_pipeline::{AcceptTask, Coordinator, PipelineError};
use slidecast_queue::{QueueError, TaskQueue};

/// How long one pop waits before the loop re-checks shutdown.
const POP_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors raised by the worker loop itself.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The queue substrate failed.
    #[error("worker queue operation failed")]
    Queue(#[from] QueueError),
}

/// Convenience alias for worker results.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// One worker loop over the shared queue and coordinator.
#[derive(Clone)]
pub struct Worker {
    queue: TaskQueue,
    coordinator: Coordinator,
    repo: Option<TaskRepository>,
}

impl Worker {
    /// Create a worker over the shared queue and coordinator.
    #[must_use]
    pub fn new(queue: TaskQueue, coordinator: Coordinator) -> Self {
        Self {
            queue,
            coordinator,
            repo: None,
        }
    }

    /// Attach the task repository so terminal statuses reach the database.
    #[must_use]
    pub fn with_repository(mut self, repo: TaskRepository) -> Self {
        self.repo = Some(repo);
        self
    }

    /// Run until the shutdown signal flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the queue substrate fails hard; individual
    /// task failures are recorded on the task and do not stop the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerResult<()> {
        info!("worker started");
        loop {
            if *shutdown.borrow() {
                info!("worker stopping");
                return Ok(());
            }
            let popped = tokio::select! {
                popped = self.queue.pop(POP_TIMEOUT) => popped?,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("shutdown channel closed; worker stopping");
                        return Ok(());
                    }
                    continue;
                }
            };
            let Some(task_id) = popped else {
                continue;
            };
            self.process(task_id).await?;
        }
    }

    /// Pop and process at most one task; returns the processed task id.
    ///
    /// # Errors
    ///
    /// Returns an error when the queue substrate fails hard.
    pub async fn run_once(&self) -> WorkerResult<Option<Uuid>> {
        let Some(task_id) = self.queue.pop(POP_TIMEOUT).await? else {
            return Ok(None);
        };
        self.process(task_id).await?;
        Ok(Some(task_id))
    }

    async fn process(&self, task_id: Uuid) -> WorkerResult<()> {
        let Some(record) = self.queue.get_task(task_id).await? else {
            warn!(task_id = %task_id, "popped task has no record; dropping");
            return Ok(());
        };

        if self.queue.is_cancelled(task_id).await? {
            info!(task_id = %task_id, "task cancelled while queued");
            self.finish(task_id, TaskStatus::Cancelled, None).await?;
            return Ok(());
        }

        let _ = self
            .queue
            .update_status(task_id, TaskStatus::Processing, None)
            .await?;
        self.sync_row(task_id, TaskStatus::Processing, None).await;
        info!(task_id = %task_id, task_type = %record.task_type, "task claimed");

        let request = AcceptTask::from_record(&record);
        match self.coordinator.accept_task(request).await {
            Ok(()) => {
                self.finish(task_id, TaskStatus::Completed, None).await?;
            }
            Err(PipelineError::Cancelled) => {
                self.finish(task_id, TaskStatus::Cancelled, None).await?;
            }
            Err(failure) => {
                let message = chain_message(&failure);
                error!(task_id = %task_id, error = %message, "task failed");
                self.finish(task_id, TaskStatus::Failed, Some(message))
                    .await?;
            }
        }
        Ok(())
    }

    async fn finish(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        error_message: Option<String>,
    ) -> WorkerResult<()> {
        let _ = self
            .queue
            .update_status(task_id, status, error_message.as_deref())
            .await?;
        self.sync_row(task_id, status, error_message.as_deref()).await;
        info!(task_id = %task_id, status = status.as_str(), "task finished");
        Ok(())
    }

    /// Database updates are best effort: the queue record is authoritative
    /// for the worker, and listing consistency recovers on the next write.
    async fn sync_row(&self, task_id: Uuid, status: TaskStatus, error_message: Option<&str>) {
        let Some(repo) = self.repo.as_ref() else {
            return;
        };
        if let Err(error) = repo.update_task(task_id, status, error_message).await {
            warn!(task_id = %task_id, error = %error, "task row update failed; continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use slidecast_core::{
        PlanOptions, SourceType, StepName, TaskKnobs, TaskType,
    };
    use slidecast_pipeline::{
        stub_engines, PipelineContext, PipelineStep, StepContext, StepOutput, StepRegistry,
    };
    use slidecast_queue::TaskPayload;
    use slidecast_state::{MemoryKv, StateStore};
    use slidecast_storage::LocalStorage;

    struct Fixture {
        queue: TaskQueue,
        state: StateStore,
        worker: Worker,
        _dir: tempfile::TempDir,
        source_path: std::path::PathBuf,
    }

    async fn fixture_with_registry(registry: Option<StepRegistry>) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let kv = Arc::new(MemoryKv::new());
        let state = StateStore::new(kv.clone());
        let queue = TaskQueue::new(kv);
        let storage = Arc::new(LocalStorage::new(dir.path().join("storage")));
        let source_path = dir.path().join("paper.pdf");
        tokio::fs::write(&source_path, b"%PDF-1.4 worker test document")
            .await
            .expect("write source");
        let ctx = PipelineContext {
            state: state.clone(),
            queue: queue.clone(),
            storage,
            engines: stub_engines(),
            output_dir: dir.path().join("storage"),
            plan_options: PlanOptions::default(),
        };
        let coordinator = match registry {
            Some(registry) => Coordinator::with_registry(ctx, registry),
            None => Coordinator::new(ctx),
        };
        let worker = Worker::new(queue.clone(), coordinator);
        Fixture {
            queue,
            state,
            worker,
            source_path,
            _dir: dir,
        }
    }

    fn payload(fixture: &Fixture) -> TaskPayload {
        TaskPayload {
            file_id: "abcd1234abcd1234".to_string(),
            file_path: Some(fixture.source_path.display().to_string()),
            file_ext: Some(".pdf".to_string()),
            filename: Some("paper.pdf".to_string()),
            source_type: Some(SourceType::Pdf),
            knobs: TaskKnobs::default(),
            purge: None,
        }
    }

    #[tokio::test]
    async fn worker_completes_a_video_task() {
        let fixture = fixture_with_registry(None).await;
        let task_id = fixture
            .queue
            .submit(TaskType::Video, payload(&fixture), Some("user-1".to_string()))
            .await
            .expect("submit");

        let processed = fixture.worker.run_once().await.expect("run once");
        assert_eq!(processed, Some(task_id));

        let record = fixture
            .queue
            .get_task(task_id)
            .await
            .expect("get")
            .expect("record");
        assert_eq!(record.status, TaskStatus::Completed);

        let state = fixture
            .state
            .get_state_by_task(task_id)
            .await
            .expect("load")
            .expect("state");
        assert_eq!(state.status, TaskStatus::Completed);
        assert_eq!(state.progress_percent(), 100);
    }

    #[tokio::test]
    async fn cancelled_while_queued_is_never_dispatched() {
        struct PanickingStep;

        #[async_trait]
        impl PipelineStep for PanickingStep {
            fn name(&self) -> StepName {
                StepName::SegmentPdfContent
            }

            async fn run(&self, _ctx: &StepContext) -> Result<StepOutput, PipelineError> {
                panic!("dispatched a cancelled task");
            }
        }

        let mut registry = StepRegistry::standard();
        registry.register(Arc::new(PanickingStep));
        let fixture = fixture_with_registry(Some(registry)).await;

        let task_id = fixture
            .queue
            .submit(TaskType::Video, payload(&fixture), None)
            .await
            .expect("submit");
        assert!(fixture.queue.cancel(task_id).await.expect("cancel"));

        let processed = fixture.worker.run_once().await.expect("run once");
        assert_eq!(processed, Some(task_id));
        let record = fixture
            .queue
            .get_task(task_id)
            .await
            .expect("get")
            .expect("record");
        assert_eq!(record.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn failing_step_marks_the_record_failed_with_message() {
        struct FailingStep {
            seen: Arc<Mutex<HashMap<StepName, u32>>>,
        }

        #[async_trait]
        impl PipelineStep for FailingStep {
            fn name(&self) -> StepName {
                StepName::RevisePdfTranscripts
            }

            async fn run(&self, _ctx: &StepContext) -> Result<StepOutput, PipelineError> {
                let mut seen = self.seen.lock().expect("lock");
                *seen.entry(StepName::RevisePdfTranscripts).or_insert(0) += 1;
                Err(PipelineError::Engine(
                    slidecast_pipeline::engines::EngineError::Fatal {
                        op: "revise",
                        detail: "provider unavailable".to_string(),
                    },
                ))
            }
        }

        let seen = Arc::new(Mutex::new(HashMap::new()));
        let mut registry = StepRegistry::standard();
        registry.register(Arc::new(FailingStep { seen: seen.clone() }));
        let fixture = fixture_with_registry(Some(registry)).await;

        let task_id = fixture
            .queue
            .submit(TaskType::Video, payload(&fixture), None)
            .await
            .expect("submit");
        fixture.worker.run_once().await.expect("run once");

        let record = fixture
            .queue
            .get_task(task_id)
            .await
            .expect("get")
            .expect("record");
        assert_eq!(record.status, TaskStatus::Failed);
        let message = record.error.expect("error message");
        assert!(message.contains("provider unavailable"), "{message}");
        assert_eq!(
            *seen
                .lock()
                .expect("lock")
                .get(&StepName::RevisePdfTranscripts)
                .unwrap_or(&0),
            1
        );
    }

    #[tokio::test]
    async fn empty_queue_returns_none() {
        let fixture = fixture_with_registry(None).await;
        assert_eq!(fixture.worker.run_once().await.expect("run once"), None);
    }
}
