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

//! HTTP surface for Slidecast.
//!
//! Routes under `/api` require an authenticated session; every task-scoped
//! request resolves the caller from the session record and matches it
//! against the task's owner, returning 404 on mismatch so resource
//! existence is never leaked. The API is a thin translation layer: progress
//! views come from task state, downloads from the artifact registry, and
//! all mutations go through the queue, state store, and repository.

pub mod auth;
pub mod dto;
pub mod error;
pub mod media;
pub mod router;
pub mod routes;
pub mod service;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use router::build_router;
pub use state::ApiState;
