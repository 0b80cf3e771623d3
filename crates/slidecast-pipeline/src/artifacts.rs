//! Artifact registry: the task → storage-object mapping.
//!
//! Derived entirely from task state and task rows, never stored separately.
//! Two views exist: the typed download listing served by the API, and the
//! purge target set (storage keys + local paths) consumed by the
//! `file_purge` pipeline. Purge collection also probes the legacy flat key
//! layout so pre-migration artifacts are cleaned up too.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use slidecast_core::{StepData, TaskState};
use slidecast_data::TaskRepository;
use slidecast_state::StateStore;
use slidecast_storage::paths::{
    audio_key_candidates, normalize_extension, object_key_from_uri, podcast_key_candidates,
    subtitle_key_candidates, transcript_key_candidates, upload_object_key, video_key_candidates,
    OUTPUTS_PREFIX, UPLOADS_PREFIX,
};

use crate::error::PipelineResult;

/// Common subtitle locales probed for legacy flat keys during purge.
const LEGACY_SUBTITLE_LOCALES: &[&str] = &["en", "zh", "ja", "ko", "es", "fr", "de"];

/// One downloadable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadEntry {
    /// Artifact category (`video`, `audio`, `podcast`, `subtitles`,
    /// `transcripts`, `images`).
    pub kind: String,
    /// Category-specific label (locale for subtitles, `final` for composed
    /// outputs).
    pub label: String,
    /// Canonical storage object key.
    pub storage_key: String,
    /// Provider-qualified URI.
    pub storage_uri: String,
    /// Content type served for the download.
    pub content_type: Option<String>,
}

/// Typed download listing for a task.
#[must_use]
pub fn downloads_for_state(state: &TaskState) -> Vec<DownloadEntry> {
    let mut entries = Vec::new();
    let categories: [(&str, &std::collections::BTreeMap<String, slidecast_core::ArtifactRef>); 6] = [
        ("video", &state.artifacts.video),
        ("audio", &state.artifacts.audio),
        ("podcast", &state.artifacts.podcast),
        ("subtitles", &state.artifacts.subtitles),
        ("transcripts", &state.artifacts.transcripts),
        ("images", &state.artifacts.images),
    ];
    for (kind, bucket) in categories {
        for (label, artifact) in bucket {
            entries.push(DownloadEntry {
                kind: kind.to_string(),
                label: label.clone(),
                storage_key: artifact.storage_key.clone(),
                storage_uri: artifact.storage_uri.clone(),
                content_type: artifact.content_type.clone(),
            });
        }
    }
    entries
}

/// De-duplicated purge target set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeTargets {
    /// Storage object keys to delete.
    pub storage_keys: BTreeSet<String>,
    /// Local filesystem paths to delete (files or directories).
    pub local_paths: BTreeSet<PathBuf>,
}

impl PurgeTargets {
    fn add_key(&mut self, key: &str) {
        let trimmed = key.trim();
        if !trimmed.is_empty() {
            self.storage_keys.insert(trimmed.to_string());
        }
    }

    fn add_uri(&mut self, uri: &str) {
        if let Some(key) = object_key_from_uri(uri) {
            self.add_key(&key);
        }
    }

    fn add_path(&mut self, path: impl Into<PathBuf>) {
        self.local_paths.insert(path.into());
    }
}

/// Collect every storage key and local path associated with a file/task,
/// including sibling tasks over the same upload and legacy flat keys.
///
/// # Errors
///
/// Returns an error when the state store fails hard; repository lookups are
/// best-effort and merely logged.
#[allow(clippy::too_many_arguments)]
pub async fn collect_purge_targets(
    state_store: &StateStore,
    repo: Option<&TaskRepository>,
    output_dir: &Path,
    file_id: &str,
    target_task_id: Option<Uuid>,
    file_ext: Option<&str>,
    extra_keys: &[String],
    extra_paths: &[String],
) -> PipelineResult<PurgeTargets> {
    let mut targets = PurgeTargets::default();

    for key in extra_keys {
        targets.add_key(key);
    }
    for path in extra_paths {
        targets.add_path(path);
    }

    // Identifiers whose outputs must be swept: the upload itself, the
    // targeted task, and every sibling task bound to the upload.
    let mut base_ids: BTreeSet<String> = BTreeSet::new();
    base_ids.insert(file_id.to_string());
    if let Some(task_id) = target_task_id {
        base_ids.insert(task_id.to_string());
    }
    for task_id in state_store.task_ids_for_file(file_id).await? {
        base_ids.insert(task_id.to_string());
    }
    if let Some(repo) = repo {
        match repo.get_tasks_by_upload_id(file_id).await {
            Ok(rows) => {
                for row in rows {
                    base_ids.insert(row.id.to_string());
                }
            }
            Err(error) => {
                debug!(file_id, error = %error, "sibling task lookup failed; continuing purge");
            }
        }
    }

    // Walk live state for recorded artifacts and step outputs.
    let mut resolved_ext = file_ext.map(normalize_extension);
    let mut states = Vec::new();
    if let Some(state) = state_store.get_state(file_id).await? {
        states.push(state);
    }
    for base in &base_ids {
        if let Ok(task_id) = base.parse::<Uuid>() {
            if let Some(state) = state_store.get_state_by_task(task_id).await? {
                states.push(state);
            }
        }
    }
    for state in &states {
        if resolved_ext.is_none() {
            resolved_ext = state.file_ext.as_deref().map(normalize_extension);
        }
        collect_from_state(state, &mut targets);
    }

    // Canonical and legacy key candidates per identifier.
    for base in &base_ids {
        for key in video_key_candidates(base) {
            targets.add_key(&key);
        }
        for key in audio_key_candidates(base) {
            targets.add_key(&key);
        }
        for key in podcast_key_candidates(base) {
            targets.add_key(&key);
        }
        for key in transcript_key_candidates(base) {
            targets.add_key(&key);
        }
        for locale in LEGACY_SUBTITLE_LOCALES {
            for extension in ["srt", "vtt"] {
                for key in subtitle_key_candidates(base, locale, extension) {
                    targets.add_key(&key);
                }
            }
        }
        targets.add_path(output_dir.join(OUTPUTS_PREFIX).join(base));
        targets.add_path(output_dir.join("work").join(base));
    }

    // The uploaded source object and its local copy.
    if let Some(ext) = resolved_ext {
        let upload_key = upload_object_key(file_id, &ext);
        targets.add_path(output_dir.join(&upload_key));
        targets.add_key(&upload_key);
    } else {
        targets.add_path(output_dir.join(UPLOADS_PREFIX).join(file_id));
    }

    Ok(targets)
}

fn collect_from_state(state: &TaskState, targets: &mut PurgeTargets) {
    for artifact in state.artifacts.iter_all() {
        targets.add_key(&artifact.storage_key);
        targets.add_uri(&artifact.storage_uri);
        if let Some(path) = &artifact.local_path {
            targets.add_path(path);
        }
    }
    for (_, snapshot) in state.ordered_steps() {
        let Some(data) = &snapshot.data else {
            continue;
        };
        match data {
            StepData::Images { images } => {
                for image in images {
                    targets.add_key(&image.storage_key);
                    if let Some(path) = &image.local_path {
                        targets.add_path(path);
                    }
                }
            }
            StepData::Clips { clips } => {
                for clip in clips {
                    targets.add_key(&clip.storage_key);
                    if let Some(path) = &clip.local_path {
                        targets.add_path(path);
                    }
                }
            }
            StepData::Audio { segments } => {
                for segment in segments {
                    targets.add_key(&segment.storage_key);
                    if let Some(path) = &segment.local_path {
                        targets.add_path(path);
                    }
                }
            }
            StepData::Subtitles { tracks } => {
                for track in tracks {
                    targets.add_key(&track.storage_key);
                    if let Some(path) = &track.local_path {
                        targets.add_path(path);
                    }
                }
            }
            StepData::Compose {
                storage_key,
                local_path,
                ..
            } => {
                targets.add_key(storage_key);
                if let Some(path) = local_path {
                    targets.add_path(path);
                }
            }
            StepData::Chapters { .. }
            | StepData::Slides { .. }
            | StepData::Transcripts { .. }
            | StepData::VisionNotes { .. }
            | StepData::PodcastScript { .. }
            | StepData::Purge { .. }
            | StepData::Failure { .. } => {}
        }
    }
}
