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

//! Durable per-task runtime state for Slidecast.
//!
//! State lives in a low-latency key/value substrate behind the [`KeyValue`]
//! trait: Redis in production, an in-memory backend for tests and standalone
//! deployments. On top of it, [`StateStore`] implements the `ss:` keyspace
//! (task-scoped state records, task/file bindings, and HTTP session records)
//! with sliding TTLs. Task-scoped keys are canonical; file-scoped records
//! exist only as a legacy read fallback.

pub mod error;
pub mod kv;
pub mod memory;
pub mod redis_kv;
pub mod session;
pub mod store;

pub use error::{StateError, StateResult};
pub use kv::{KeyValue, KvError, KvResult};
pub use memory::MemoryKv;
pub use redis_kv::RedisKv;
pub use session::{SessionRecord, SessionStore};
pub use store::{CreateState, LegacyPurgeReport, StateRef, StateStore};
