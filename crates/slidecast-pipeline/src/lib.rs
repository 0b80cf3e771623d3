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

//! Pipeline coordinators and step implementations for Slidecast.
//!
//! The coordinator walks the step plan persisted in task state, driving each
//! step through one generic runner: prerequisite checks, idempotent skip of
//! completed steps, execution, finalization, and failure recording. Steps
//! dispatch through a registry rather than name matching, poll a cooperative
//! cancellation probe at unit boundaries, and delegate the actual
//! transformations to black-box engines behind traits (with deterministic
//! stubs for tests and standalone deployments).

pub mod artifacts;
pub mod context;
pub mod coordinator;
pub mod engines;
pub mod error;
pub mod markdown;
pub mod retry;
pub mod runner;
pub mod steps;
pub mod stub;
pub mod subtitles;

pub use artifacts::{collect_purge_targets, downloads_for_state, DownloadEntry, PurgeTargets};
pub use context::{CancelProbe, Engines, PipelineContext, StepContext};
pub use coordinator::{AcceptTask, Coordinator};
pub use engines::{
    ComposedMedia, DocumentEngine, EngineError, EngineResult, LanguageEngine, MediaEngine,
    SpeechEngine, SynthesizedAudio,
};
pub use error::{PipelineError, PipelineResult};
pub use runner::{PipelineStep, StepOutput, StepRegistry};
pub use steps::locale_code;
pub use stub::stub_engines;
