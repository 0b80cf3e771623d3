//! Shared handler state.

use std::path::PathBuf;
use std::sync::Arc;

use slidecast_core::PlanOptions;
use slidecast_data::TaskRepository;
use slidecast_queue::TaskQueue;
use slidecast_state::{SessionStore, StateStore};
use slidecast_storage::StorageProvider;

/// Dependencies shared by every handler.
#[derive(Clone)]
pub struct ApiState {
    /// Task/upload rows; absent in standalone mode, where the queue records
    /// stand in for listings and ownership.
    pub repo: Option<TaskRepository>,
    /// Runtime task state.
    pub state: StateStore,
    /// HTTP session records.
    pub sessions: SessionStore,
    /// Task queue.
    pub queue: TaskQueue,
    /// Artifact storage.
    pub storage: Arc<dyn StorageProvider>,
    /// Directory where uploaded sources are written.
    pub uploads_dir: PathBuf,
    /// Directory for generated artifacts and local storage.
    pub output_dir: PathBuf,
    /// Proxy cloud media through the API instead of redirecting to
    /// presigned URLs.
    pub proxy_cloud_media: bool,
    /// Planning toggles applied at task creation.
    pub plan_options: PlanOptions,
}
