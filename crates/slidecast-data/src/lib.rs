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

//! Persistent task and upload rows for Slidecast.
//!
//! Postgres is the source of truth for listing, statistics, and ownership
//! checks; the runtime state store holds the mutable per-step view. Reads go
//! through an optional short-TTL cache on the key/value substrate; every
//! mutation invalidates the cache prefix.

pub mod error;
pub mod models;
pub mod repository;

pub use error::{DataError, DataResult};
pub use models::{TaskListFilter, TaskRow, TaskStatistics, UploadRow};
pub use repository::TaskRepository;
