//! Typed per-step payloads.
//!
//! Each pipeline step records what it produced as a closed, tagged variant
//! rather than free-form JSON, so downstream steps and the download surface
//! can rely on the shape. The `kind` tag keeps persisted payloads
//! self-describing across releases.

use serde::{Deserialize, Serialize};

/// One narrated chapter extracted from a PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Zero-based position within the document.
    pub index: u32,
    /// Chapter title.
    pub title: String,
    /// Source text the narration is derived from.
    pub content: String,
}

/// One slide extracted from a deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideRef {
    /// Zero-based position within the deck.
    pub index: u32,
    /// Slide title when the deck provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Extracted slide text.
    pub text: String,
}

/// One unit of narration transcript (per chapter or per slide).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Zero-based unit position; downstream steps index by it.
    pub index: u32,
    /// Unit title when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Narration text.
    pub text: String,
}

/// Vision-engine description of one slide image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisionNote {
    /// Zero-based slide position.
    pub index: u32,
    /// Visual description merged into transcript generation.
    pub description: String,
}

/// Reference to one stored image artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Zero-based unit position.
    pub index: u32,
    /// Canonical storage object key.
    pub storage_key: String,
    /// Provider-qualified URI for the object.
    pub storage_uri: String,
    /// Local scratch path when the file is still on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

/// Reference to one stored audio artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSegment {
    /// Zero-based unit position.
    pub index: u32,
    /// Canonical storage object key.
    pub storage_key: String,
    /// Provider-qualified URI for the object.
    pub storage_uri: String,
    /// Local scratch path when the file is still on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    /// Playback duration in seconds, used for subtitle timing.
    pub duration_secs: f64,
}

/// Subtitle file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    /// `SubRip` text format.
    Srt,
    /// `WebVTT` format.
    Vtt,
}

impl SubtitleFormat {
    /// File extension without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Srt => "srt",
            Self::Vtt => "vtt",
        }
    }

    /// Content type served for downloads.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Srt => "text/plain",
            Self::Vtt => "text/vtt",
        }
    }
}

/// Reference to one stored subtitle track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    /// Short locale code (`en`, `zh`, `ja`, ...).
    pub locale: String,
    /// Track format.
    pub format: SubtitleFormat,
    /// Canonical storage object key.
    pub storage_key: String,
    /// Provider-qualified URI for the object.
    pub storage_uri: String,
    /// Local scratch path when the file is still on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
}

/// Speaker role within the podcast dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The host voice.
    Host,
    /// The guest voice.
    Guest,
}

/// One line of the two-speaker podcast dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    /// Who speaks the line.
    pub speaker: Speaker,
    /// Spoken text.
    pub text: String,
}

/// Reference to a downloadable artifact recorded in the task's artifact map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Canonical storage object key.
    pub storage_key: String,
    /// Provider-qualified URI for the object.
    pub storage_uri: String,
    /// Local scratch path when the file is still on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    /// Content type served for downloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Closed union of everything a step may record as its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepData {
    /// Chapters produced by PDF segmentation.
    Chapters {
        /// Ordered chapter list.
        chapters: Vec<Chapter>,
    },
    /// Slides produced by deck extraction.
    Slides {
        /// Ordered slide list.
        slides: Vec<SlideRef>,
    },
    /// Transcript set in a single language.
    Transcripts {
        /// Language of every segment.
        language: String,
        /// Ordered transcript segments.
        segments: Vec<TranscriptSegment>,
    },
    /// Vision analysis notes, one per slide.
    VisionNotes {
        /// Ordered notes.
        notes: Vec<VisionNote>,
    },
    /// Stored images, one per unit.
    Images {
        /// Ordered image references.
        images: Vec<ImageRef>,
    },
    /// Stored audio, one per unit.
    Audio {
        /// Ordered audio references.
        segments: Vec<AudioSegment>,
    },
    /// Rendered presenter clips, one per unit.
    Clips {
        /// Ordered clip references.
        clips: Vec<ImageRef>,
    },
    /// Stored subtitle tracks, typically one SRT and one VTT per locale.
    Subtitles {
        /// All generated tracks.
        tracks: Vec<SubtitleTrack>,
    },
    /// Two-speaker podcast dialogue.
    PodcastScript {
        /// Language of the dialogue text.
        language: String,
        /// Ordered dialogue lines.
        dialogue: Vec<DialogueLine>,
        /// Host voice identifier used (or planned) for synthesis.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host_voice: Option<String>,
        /// Guest voice identifier used (or planned) for synthesis.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guest_voice: Option<String>,
    },
    /// Final composed artifact (video or podcast).
    Compose {
        /// Canonical storage object key.
        storage_key: String,
        /// Provider-qualified URI for the object.
        storage_uri: String,
        /// Local scratch path when the file is still on disk.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_path: Option<String>,
        /// Playback duration in seconds when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_secs: Option<f64>,
    },
    /// Outcome of a best-effort purge.
    Purge {
        /// Storage keys that were deleted.
        deleted_keys: Vec<String>,
        /// Local paths that were deleted.
        deleted_paths: Vec<String>,
        /// Objects that were already gone.
        missing: u32,
    },
    /// Failure detail recorded when a step errors.
    Failure {
        /// Human-readable failure message.
        message: String,
    },
}

impl StepData {
    /// Transcript segments when this payload carries them.
    #[must_use]
    pub fn transcript_segments(&self) -> Option<&[TranscriptSegment]> {
        match self {
            Self::Transcripts { segments, .. } => Some(segments),
            _ => None,
        }
    }

    /// Chapters when this payload carries them.
    #[must_use]
    pub fn chapters(&self) -> Option<&[Chapter]> {
        match self {
            Self::Chapters { chapters } => Some(chapters),
            _ => None,
        }
    }

    /// Audio segments when this payload carries them.
    #[must_use]
    pub fn audio_segments(&self) -> Option<&[AudioSegment]> {
        match self {
            Self::Audio { segments } => Some(segments),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_data_round_trips_with_kind_tag() {
        let payload = StepData::Transcripts {
            language: "english".to_string(),
            segments: vec![TranscriptSegment {
                index: 0,
                title: Some("Intro".to_string()),
                text: "Welcome.".to_string(),
            }],
        };
        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["kind"], "transcripts");
        let back: StepData = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, payload);
    }

    #[test]
    fn compose_payload_omits_absent_fields() {
        let payload = StepData::Compose {
            storage_key: "outputs/t/video/final.mp4".to_string(),
            storage_uri: "local://outputs/t/video/final.mp4".to_string(),
            local_path: None,
            duration_secs: None,
        };
        let json = serde_json::to_string(&payload).expect("serialize");
        assert!(!json.contains("local_path"));
        assert!(!json.contains("duration_secs"));
    }
}
