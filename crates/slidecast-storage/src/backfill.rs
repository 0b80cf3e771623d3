//! One-shot migration of legacy flat objects to the canonical key layout.
//!
//! Earlier deployments wrote artifacts under flat keys (`{id}.mp4`,
//! `{id}_podcast.mp3`, `{id}_{locale}.srt`). This walker probes those keys
//! for a given set of task/file identifiers, copies anything found to the
//! canonical `outputs/...` location, and optionally deletes the legacy
//! object. Re-running is harmless: already-migrated keys are skipped.

use tracing::{info, warn};

use crate::error::StorageResult;
use crate::paths::{
    audio_key_candidates, podcast_key_candidates, subtitle_key_candidates,
    transcript_key_candidates, video_key_candidates,
};
use crate::StorageProvider;

/// One identifier whose legacy artifacts should be migrated.
#[derive(Debug, Clone)]
pub struct BackfillTarget {
    /// Task or upload identifier the artifacts were stored under.
    pub base_id: String,
    /// Subtitle locales to probe for this identifier.
    pub locales: Vec<String>,
}

/// Outcome of a backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Legacy keys copied to their canonical location.
    pub migrated: Vec<String>,
    /// Canonical keys that already existed.
    pub skipped: u32,
    /// Legacy keys removed after migration.
    pub deleted: u32,
}

/// Content types matched to the legacy artifact kinds probed below.
const CANDIDATE_SETS: &[(fn(&str) -> Vec<String>, &str)] = &[
    (video_key_candidates, "video/mp4"),
    (audio_key_candidates, "audio/mpeg"),
    (podcast_key_candidates, "audio/mpeg"),
    (transcript_key_candidates, "text/markdown"),
];

/// Copy legacy flat objects for each target onto the canonical layout.
///
/// # Errors
///
/// Returns an error when a storage probe or write fails hard; absent legacy
/// objects are expected and skipped silently.
pub async fn backfill_legacy_objects(
    storage: &dyn StorageProvider,
    targets: &[BackfillTarget],
    delete_legacy: bool,
) -> StorageResult<BackfillReport> {
    let mut report = BackfillReport::default();

    for target in targets {
        for (candidates_for, content_type) in CANDIDATE_SETS {
            let candidates = candidates_for(&target.base_id);
            migrate_pair(storage, &candidates, content_type, delete_legacy, &mut report).await?;
        }
        for locale in &target.locales {
            for extension in ["srt", "vtt"] {
                let candidates = subtitle_key_candidates(&target.base_id, locale, extension);
                let content_type = if extension == "vtt" {
                    "text/vtt"
                } else {
                    "text/plain"
                };
                migrate_pair(storage, &candidates, content_type, delete_legacy, &mut report)
                    .await?;
            }
        }
    }

    info!(
        migrated = report.migrated.len(),
        skipped = report.skipped,
        deleted = report.deleted,
        "storage backfill finished"
    );
    Ok(report)
}

async fn migrate_pair(
    storage: &dyn StorageProvider,
    candidates: &[String],
    content_type: &str,
    delete_legacy: bool,
    report: &mut BackfillReport,
) -> StorageResult<()> {
    let [canonical, legacy] = candidates else {
        return Ok(());
    };
    if storage.exists(canonical).await? {
        report.skipped += 1;
        return Ok(());
    }
    if !storage.exists(legacy).await? {
        return Ok(());
    }

    let bytes = storage.get_bytes(legacy).await?;
    storage.put_bytes(&bytes, canonical, content_type).await?;
    report.migrated.push(legacy.clone());

    if delete_legacy {
        if let Err(error) = storage.delete(legacy).await {
            warn!(key = %legacy, error = %error, "failed to delete legacy object after migration");
        } else {
            report.deleted += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalStorage;

    #[tokio::test]
    async fn legacy_objects_move_to_canonical_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new(dir.path().to_path_buf());

        storage
            .put_bytes(b"old-video", "file42.mp4", "video/mp4")
            .await
            .expect("seed legacy video");
        storage
            .put_bytes(b"old-subs", "file42_en.srt", "text/plain")
            .await
            .expect("seed legacy subtitles");

        let targets = vec![BackfillTarget {
            base_id: "file42".to_string(),
            locales: vec!["en".to_string()],
        }];
        let report = backfill_legacy_objects(&storage, &targets, true)
            .await
            .expect("backfill");

        assert_eq!(report.migrated.len(), 2);
        assert_eq!(report.deleted, 2);
        assert_eq!(
            storage
                .get_bytes("outputs/file42/video/final.mp4")
                .await
                .expect("canonical video"),
            b"old-video".to_vec()
        );
        assert!(!storage.exists("file42.mp4").await.expect("legacy gone"));

        // Second run finds canonical keys and does nothing.
        let second = backfill_legacy_objects(&storage, &targets, true)
            .await
            .expect("backfill again");
        assert!(second.migrated.is_empty());
        assert!(second.skipped >= 2);
    }
}
