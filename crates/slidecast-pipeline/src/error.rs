//! Error types for pipeline execution.

use thiserror::Error;

use slidecast_core::StepName;
use slidecast_queue::QueueError;
use slidecast_state::StateError;
use slidecast_storage::StorageError;

use crate::engines::EngineError;

/// Primary error type for coordinator and step execution.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The task was cancelled cooperatively; never treated as a failure.
    #[error("task was cancelled")]
    Cancelled,
    /// A step signalled failure, either by error or by finalizing as failed.
    #[error("step {step} failed: {message}")]
    StepFailed {
        /// The failing step.
        step: StepName,
        /// Human-readable failure detail.
        message: String,
    },
    /// A step's required input from an earlier step is absent or empty.
    #[error("step {step} is missing prerequisite data: {detail}")]
    MissingPrerequisite {
        /// The step that could not run.
        step: StepName,
        /// What was missing.
        detail: String,
    },
    /// The task has no state record to operate on.
    #[error("no task state exists for file {file_id}")]
    StateMissing {
        /// The file identifier that resolved to nothing.
        file_id: String,
    },
    /// An external engine call failed after retries were exhausted.
    #[error("engine call failed")]
    Engine(#[from] EngineError),
    /// The state store failed.
    #[error("state store operation failed")]
    State(#[from] StateError),
    /// The task queue failed.
    #[error("task queue operation failed")]
    Queue(#[from] QueueError),
    /// A storage operation failed.
    #[error("storage operation failed")]
    Storage(#[from] StorageError),
    /// A local filesystem operation failed.
    #[error("pipeline io operation failed")]
    Io {
        /// Operation identifier.
        op: &'static str,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Whether this error represents user-initiated cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Convenience alias for pipeline results.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Flatten an error and its source chain into one message for error
/// entries and task records.
#[must_use]
pub fn chain_message(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
