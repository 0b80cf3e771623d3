//! Task-level classifications and user-supplied knobs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Language value treated as the no-op target for translation steps.
pub const DEFAULT_LANGUAGE: &str = "english";

/// What a task produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Narrated video.
    Video,
    /// Two-speaker podcast.
    Podcast,
    /// Video and podcast from the same upload.
    Both,
    /// Best-effort artifact cleanup for a deleted task/file.
    FilePurge,
}

impl TaskType {
    /// Stable snake_case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Podcast => "podcast",
            Self::Both => "both",
            Self::FilePurge => "file_purge",
        }
    }

    /// Whether this task type runs the video step set.
    #[must_use]
    pub const fn wants_video(self) -> bool {
        matches!(self, Self::Video | Self::Both)
    }

    /// Whether this task type runs the podcast step set.
    #[must_use]
    pub const fn wants_podcast(self) -> bool {
        matches!(self, Self::Podcast | Self::Both)
    }

    /// Derive the task type from output flags.
    #[must_use]
    pub const fn from_flags(generate_video: bool, generate_podcast: bool) -> Self {
        match (generate_video, generate_podcast) {
            (true, true) => Self::Both,
            (false, true) => Self::Podcast,
            _ => Self::Video,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "video" => Ok(Self::Video),
            "podcast" => Ok(Self::Podcast),
            "both" => Ok(Self::Both),
            "file_purge" => Ok(Self::FilePurge),
            other => Err(CoreError::UnknownTaskType {
                value: other.to_string(),
            }),
        }
    }
}

/// Kind of source document behind an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// A PDF document processed chapter-by-chapter.
    Pdf,
    /// A slide deck processed slide-by-slide.
    Slides,
    /// A pre-recorded audio source.
    Audio,
}

impl SourceType {
    /// Stable snake_case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Slides => "slides",
            Self::Audio => "audio",
        }
    }

    /// Infer the source type from an upload's file extension.
    #[must_use]
    pub fn from_extension(file_ext: &str) -> Self {
        let ext = file_ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Self::Pdf,
            "mp3" | "wav" | "m4a" => Self::Audio,
            _ => Self::Slides,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pdf" => Ok(Self::Pdf),
            "slides" => Ok(Self::Slides),
            "audio" => Ok(Self::Audio),
            other => Err(CoreError::UnknownSourceType {
                value: other.to_string(),
            }),
        }
    }
}

/// User-supplied options that shape a task's step plan and outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskKnobs {
    /// Narration language.
    #[serde(default = "default_language")]
    pub voice_language: String,
    /// Subtitle language; `None` leaves subtitles in the narration language.
    #[serde(default)]
    pub subtitle_language: Option<String>,
    /// Podcast transcript language; `None` falls back to the voice language.
    #[serde(default)]
    pub transcript_language: Option<String>,
    /// Target video resolution label (`hd`, `fhd`, ...).
    #[serde(default = "default_resolution")]
    pub video_resolution: String,
    /// Whether to render presenter avatar clips (slide decks only).
    #[serde(default)]
    pub generate_avatar: bool,
    /// Whether to produce subtitle tracks.
    #[serde(default = "default_true")]
    pub generate_subtitles: bool,
    /// Whether to produce the video output.
    #[serde(default = "default_true")]
    pub generate_video: bool,
    /// Whether to produce the podcast output.
    #[serde(default)]
    pub generate_podcast: bool,
    /// Narration voice override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    /// Podcast host voice override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub podcast_host_voice: Option<String>,
    /// Podcast guest voice override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub podcast_guest_voice: Option<String>,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_resolution() -> String {
    "hd".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for TaskKnobs {
    fn default() -> Self {
        Self {
            voice_language: default_language(),
            subtitle_language: None,
            transcript_language: None,
            video_resolution: default_resolution(),
            generate_avatar: false,
            generate_subtitles: true,
            generate_video: true,
            generate_podcast: false,
            voice_id: None,
            podcast_host_voice: None,
            podcast_guest_voice: None,
        }
    }
}

impl TaskKnobs {
    /// Task type implied by the output flags.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        TaskType::from_flags(self.generate_video, self.generate_podcast)
    }

    /// Whether narration must be translated out of English.
    #[must_use]
    pub fn needs_voice_translation(&self) -> bool {
        !self.voice_language.eq_ignore_ascii_case(DEFAULT_LANGUAGE)
    }

    /// Whether subtitles must be translated out of English.
    #[must_use]
    pub fn needs_subtitle_translation(&self) -> bool {
        self.subtitle_language
            .as_deref()
            .is_some_and(|lang| !lang.eq_ignore_ascii_case(DEFAULT_LANGUAGE))
    }

    /// Effective language for the podcast transcript.
    ///
    /// Derived once from `transcript_language`, falling back to the voice
    /// language, then English; never re-derived mid-task.
    #[must_use]
    pub fn podcast_transcript_language(&self) -> String {
        self.transcript_language
            .as_deref()
            .filter(|lang| !lang.trim().is_empty())
            .unwrap_or(&self.voice_language)
            .to_ascii_lowercase()
    }

    /// Whether the podcast script must be translated out of English.
    #[must_use]
    pub fn needs_podcast_translation(&self) -> bool {
        self.podcast_transcript_language() != DEFAULT_LANGUAGE
    }

    /// Effective subtitle locale resolution chain:
    /// subtitle language → podcast transcript language → voice language.
    #[must_use]
    pub fn effective_subtitle_language(&self) -> String {
        for candidate in [
            self.subtitle_language.as_deref(),
            self.transcript_language.as_deref(),
            Some(self.voice_language.as_str()),
        ]
        .into_iter()
        .flatten()
        {
            let trimmed = candidate.trim();
            if !trimmed.is_empty() {
                return trimmed.to_ascii_lowercase();
            }
        }
        DEFAULT_LANGUAGE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_type_from_flags() {
        assert_eq!(TaskType::from_flags(true, false), TaskType::Video);
        assert_eq!(TaskType::from_flags(false, true), TaskType::Podcast);
        assert_eq!(TaskType::from_flags(true, true), TaskType::Both);
        // A task that produces nothing is treated as video; the plan will
        // still refuse to run without outputs.
        assert_eq!(TaskType::from_flags(false, false), TaskType::Video);
    }

    #[test]
    fn source_type_from_extension() {
        assert_eq!(SourceType::from_extension(".pdf"), SourceType::Pdf);
        assert_eq!(SourceType::from_extension("PDF"), SourceType::Pdf);
        assert_eq!(SourceType::from_extension(".pptx"), SourceType::Slides);
        assert_eq!(SourceType::from_extension(".mp3"), SourceType::Audio);
    }

    #[test]
    fn podcast_language_falls_back_to_voice() {
        let mut knobs = TaskKnobs {
            voice_language: "spanish".to_string(),
            ..TaskKnobs::default()
        };
        assert_eq!(knobs.podcast_transcript_language(), "spanish");
        assert!(knobs.needs_podcast_translation());

        knobs.transcript_language = Some("japanese".to_string());
        assert_eq!(knobs.podcast_transcript_language(), "japanese");

        knobs.transcript_language = Some("english".to_string());
        assert!(!knobs.needs_podcast_translation());
    }

    #[test]
    fn subtitle_language_resolution_chain() {
        let knobs = TaskKnobs::default();
        assert_eq!(knobs.effective_subtitle_language(), "english");

        let knobs = TaskKnobs {
            subtitle_language: Some("zh".to_string()),
            ..TaskKnobs::default()
        };
        assert_eq!(knobs.effective_subtitle_language(), "zh");

        let knobs = TaskKnobs {
            transcript_language: Some("spanish".to_string()),
            ..TaskKnobs::default()
        };
        assert_eq!(knobs.effective_subtitle_language(), "spanish");
    }
}
