//! Canonical object-key layout and URI round-tripping.
//!
//! Writes always target the canonical layout:
//!
//! - `uploads/{upload_id}{ext}`
//! - `outputs/{base_id}/{category}/{artifact}`
//!
//! where `base_id` is the task id when one exists and the upload id
//! otherwise. Reads additionally probe a fixed list of legacy flat keys that
//! predate the layout.

use slidecast_config::StorageProviderKind;

/// Prefix for uploaded source documents.
pub const UPLOADS_PREFIX: &str = "uploads";
/// Prefix for generated artifacts.
pub const OUTPUTS_PREFIX: &str = "outputs";

/// Artifact category segment within the outputs layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCategory {
    /// Narration and chapter audio.
    Audio,
    /// Composed videos.
    Video,
    /// Subtitle tracks.
    Subtitles,
    /// Podcast outputs.
    Podcast,
    /// Transcript documents.
    Transcripts,
    /// Chapter/slide images.
    Images,
}

impl OutputCategory {
    /// Path segment for the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Subtitles => "subtitles",
            Self::Podcast => "podcast",
            Self::Transcripts => "transcripts",
            Self::Images => "images",
        }
    }
}

/// Normalize a file extension to lowercase with a leading dot.
#[must_use]
pub fn normalize_extension(file_ext: &str) -> String {
    let trimmed = file_ext.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

/// Canonical key for an uploaded source document.
#[must_use]
pub fn upload_object_key(upload_id: &str, file_ext: &str) -> String {
    format!(
        "{UPLOADS_PREFIX}/{upload_id}{}",
        normalize_extension(file_ext)
    )
}

/// Canonical key for a generated artifact.
#[must_use]
pub fn output_object_key(base_id: &str, category: OutputCategory, artifact: &str) -> String {
    format!(
        "{OUTPUTS_PREFIX}/{base_id}/{}/{}",
        category.as_str(),
        artifact.trim_matches('/')
    )
}

/// Provider-qualified URI for an object key.
#[must_use]
pub fn build_storage_uri(kind: StorageProviderKind, bucket: &str, key: &str) -> String {
    match kind {
        StorageProviderKind::Local => format!("local://{key}"),
        StorageProviderKind::S3 | StorageProviderKind::Oss => {
            let scheme = kind.scheme();
            if bucket.is_empty() {
                format!("{scheme}://{key}")
            } else {
                format!("{scheme}://{bucket}/{key}")
            }
        }
    }
}

/// Extract the object key from a provider-qualified URI.
///
/// Bucket-qualified URIs (`s3://bucket/key`, `oss://bucket/key`) drop the
/// bucket segment; `local://key` URIs return the key directly; bare strings
/// are treated as keys already.
#[must_use]
pub fn object_key_from_uri(uri: &str) -> Option<String> {
    let trimmed = uri.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Some((scheme, remainder)) = trimmed.split_once("://") else {
        return Some(trimmed.trim_start_matches('/').to_string());
    };
    match scheme {
        "local" => Some(remainder.trim_start_matches('/').to_string()),
        _ => remainder
            .split_once('/')
            .map(|(_bucket, key)| key.to_string()),
    }
}

/// Ordered read candidates for the composed video of a task/file.
#[must_use]
pub fn video_key_candidates(base_id: &str) -> Vec<String> {
    vec![
        output_object_key(base_id, OutputCategory::Video, "final.mp4"),
        format!("{base_id}.mp4"),
    ]
}

/// Ordered read candidates for the narration audio of a task/file.
#[must_use]
pub fn audio_key_candidates(base_id: &str) -> Vec<String> {
    vec![
        output_object_key(base_id, OutputCategory::Audio, "final.mp3"),
        format!("{base_id}.mp3"),
    ]
}

/// Ordered read candidates for the podcast of a task/file.
#[must_use]
pub fn podcast_key_candidates(base_id: &str) -> Vec<String> {
    vec![
        output_object_key(base_id, OutputCategory::Podcast, "final.mp3"),
        format!("{base_id}_podcast.mp3"),
    ]
}

/// Ordered read candidates for one subtitle track of a task/file.
#[must_use]
pub fn subtitle_key_candidates(base_id: &str, locale: &str, extension: &str) -> Vec<String> {
    vec![
        output_object_key(
            base_id,
            OutputCategory::Subtitles,
            &format!("final_{locale}.{extension}"),
        ),
        format!("{base_id}_{locale}.{extension}"),
    ]
}

/// Ordered read candidates for the transcript markdown of a task/file.
#[must_use]
pub fn transcript_key_candidates(base_id: &str) -> Vec<String> {
    vec![
        output_object_key(base_id, OutputCategory::Transcripts, "transcript.md"),
        format!("{base_id}.md"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_keys_normalize_extensions() {
        assert_eq!(
            upload_object_key("abcd1234abcd1234", "PDF"),
            "uploads/abcd1234abcd1234.pdf"
        );
        assert_eq!(
            upload_object_key("abcd1234abcd1234", ".pptx"),
            "uploads/abcd1234abcd1234.pptx"
        );
        assert_eq!(upload_object_key("abcd1234abcd1234", ""), "uploads/abcd1234abcd1234");
    }

    #[test]
    fn output_keys_follow_canonical_layout() {
        assert_eq!(
            output_object_key("task-1", OutputCategory::Subtitles, "final_en.vtt"),
            "outputs/task-1/subtitles/final_en.vtt"
        );
    }

    #[test]
    fn uri_round_trips_for_all_providers() {
        let key = "outputs/task-1/video/final.mp4";
        for (kind, bucket) in [
            (StorageProviderKind::Local, ""),
            (StorageProviderKind::S3, "media"),
            (StorageProviderKind::Oss, "media"),
        ] {
            let uri = build_storage_uri(kind, bucket, key);
            assert_eq!(object_key_from_uri(&uri).as_deref(), Some(key), "{uri}");
        }
    }

    #[test]
    fn bare_strings_are_treated_as_keys() {
        assert_eq!(
            object_key_from_uri("/outputs/x/audio/final.mp3").as_deref(),
            Some("outputs/x/audio/final.mp3")
        );
        assert_eq!(object_key_from_uri(""), None);
    }

    #[test]
    fn legacy_candidates_follow_canonical_first() {
        let candidates = subtitle_key_candidates("file99", "en", "srt");
        assert_eq!(
            candidates,
            vec![
                "outputs/file99/subtitles/final_en.srt".to_string(),
                "file99_en.srt".to_string(),
            ]
        );
        assert_eq!(
            podcast_key_candidates("file99")[1],
            "file99_podcast.mp3".to_string()
        );
    }
}
