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

//! Shared domain model for the Slidecast processing platform.
//!
//! This crate defines the task-state machine that every other component
//! operates on: canonical task and step statuses (with alias-tolerant
//! normalization), the closed set of pipeline step names and their declared
//! ordering, the typed per-step payloads, and the [`TaskState`] snapshot that
//! is persisted between steps. It also materializes step plans from task
//! knobs so the enabled step set is fixed at task creation and never
//! re-derived mid-run.

pub mod data;
pub mod error;
pub mod plan;
pub mod state;
pub mod status;
pub mod step;
pub mod task;

pub use data::{
    ArtifactRef, AudioSegment, Chapter, DialogueLine, ImageRef, SlideRef, Speaker, StepData,
    SubtitleFormat, SubtitleTrack, TranscriptSegment, VisionNote,
};
pub use error::{CoreError, CoreResult};
pub use plan::{PlanOptions, PlannedStep, StepPlan};
pub use state::{ArtifactCategory, ArtifactMap, StepSnapshot, TaskErrorEntry, TaskState};
pub use status::{StepStatus, TaskStatus};
pub use step::{StepName, ALL_STEPS};
pub use task::{SourceType, TaskKnobs, TaskType};
