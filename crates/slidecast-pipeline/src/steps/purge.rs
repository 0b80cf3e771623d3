//! Best-effort artifact purge for deleted tasks and files.

use async_trait::async_trait;
use tracing::{debug, info};

use slidecast_core::{StepData, StepName};

use crate::artifacts::collect_purge_targets;
use crate::context::StepContext;
use crate::error::PipelineResult;
use crate::runner::{PipelineStep, StepOutput};

/// Enumerate and delete every artifact belonging to a task/file.
///
/// Purge is best-effort idempotent: missing objects are tolerated, and
/// individual delete failures are logged without failing the task.
pub struct PurgeTaskFilesStep;

#[async_trait]
impl PipelineStep for PurgeTaskFilesStep {
    fn name(&self) -> StepName {
        StepName::PurgeTaskFiles
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let request = ctx.purge.clone().unwrap_or_default();
        let targets = collect_purge_targets(
            &ctx.deps.state,
            None,
            &ctx.deps.output_dir,
            &ctx.file_id,
            request.target_task_id,
            None,
            &request.storage_keys,
            &request.local_paths,
        )
        .await?;

        let mut deleted_keys = Vec::new();
        let mut missing = 0_u32;
        for key in &targets.storage_keys {
            match ctx.deps.storage.exists(key).await {
                Ok(true) => match ctx.deps.storage.delete(key).await {
                    Ok(()) => deleted_keys.push(key.clone()),
                    Err(error) => {
                        debug!(key = %key, error = %error, "storage delete failed; continuing purge");
                    }
                },
                Ok(false) => missing += 1,
                Err(error) => {
                    debug!(key = %key, error = %error, "storage probe failed; continuing purge");
                }
            }
        }

        let mut deleted_paths = Vec::new();
        for path in &targets.local_paths {
            let removed = if path.is_dir() {
                tokio::fs::remove_dir_all(path).await.is_ok()
            } else if path.is_file() {
                tokio::fs::remove_file(path).await.is_ok()
            } else {
                false
            };
            if removed {
                deleted_paths.push(path.display().to_string());
            }
        }

        info!(
            file_id = %ctx.file_id,
            deleted_keys = deleted_keys.len(),
            deleted_paths = deleted_paths.len(),
            missing,
            "file purge finished"
        );
        Ok(StepOutput::data(StepData::Purge {
            deleted_keys,
            deleted_paths,
            missing,
        }))
    }
}
