//! The closed set of pipeline step names and their declared ordering.
//!
//! Variant order below is the global declared order: retry resets, progress
//! views, and step listings all sort by it. Per-task execution order is a
//! subset of this sequence chosen by the step plan.

use std::fmt;
use std::str::FromStr;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Stable identifier for one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepName {
    /// Split a slide deck into per-slide content.
    ExtractSlides,
    /// Render each slide to an image.
    ConvertSlidesToImages,
    /// Describe slide images with the vision engine.
    AnalyzeSlideImages,
    /// Split a PDF into narrated chapters.
    SegmentPdfContent,
    /// Draft per-slide transcripts.
    GenerateTranscripts,
    /// Revise slide transcripts for voice delivery.
    ReviseTranscripts,
    /// Revise PDF chapter transcripts for voice delivery.
    RevisePdfTranscripts,
    /// Draft the two-speaker podcast dialogue (always English first).
    GeneratePodcastScript,
    /// Translate voice transcripts into the voice language.
    TranslateVoiceTranscripts,
    /// Translate subtitle transcripts into the subtitle language.
    TranslateSubtitleTranscripts,
    /// Translate the podcast dialogue into the transcript language.
    TranslatePodcastScript,
    /// Generate chapter illustration images for PDF videos.
    GeneratePdfChapterImages,
    /// Synthesize narration audio for slides.
    GenerateAudio,
    /// Synthesize narration audio for PDF chapters.
    GeneratePdfAudio,
    /// Synthesize multi-voice podcast audio.
    GeneratePodcastAudio,
    /// Render presenter avatar clips.
    GenerateAvatarVideos,
    /// Produce subtitle tracks for slide videos.
    GenerateSubtitles,
    /// Produce subtitle tracks for PDF videos.
    GeneratePdfSubtitles,
    /// Produce subtitle tracks for the podcast.
    GeneratePodcastSubtitles,
    /// Assemble the final video.
    ComposeVideo,
    /// Assemble the final podcast MP3.
    ComposePodcast,
    /// Remove every artifact belonging to a task/file.
    PurgeTaskFiles,
}

/// Every step in declared order.
pub const ALL_STEPS: &[StepName] = &[
    StepName::ExtractSlides,
    StepName::ConvertSlidesToImages,
    StepName::AnalyzeSlideImages,
    StepName::SegmentPdfContent,
    StepName::GenerateTranscripts,
    StepName::ReviseTranscripts,
    StepName::RevisePdfTranscripts,
    StepName::GeneratePodcastScript,
    StepName::TranslateVoiceTranscripts,
    StepName::TranslateSubtitleTranscripts,
    StepName::TranslatePodcastScript,
    StepName::GeneratePdfChapterImages,
    StepName::GenerateAudio,
    StepName::GeneratePdfAudio,
    StepName::GeneratePodcastAudio,
    StepName::GenerateAvatarVideos,
    StepName::GenerateSubtitles,
    StepName::GeneratePdfSubtitles,
    StepName::GeneratePodcastSubtitles,
    StepName::ComposeVideo,
    StepName::ComposePodcast,
    StepName::PurgeTaskFiles,
];

impl StepName {
    /// Stable snake_case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExtractSlides => "extract_slides",
            Self::ConvertSlidesToImages => "convert_slides_to_images",
            Self::AnalyzeSlideImages => "analyze_slide_images",
            Self::SegmentPdfContent => "segment_pdf_content",
            Self::GenerateTranscripts => "generate_transcripts",
            Self::ReviseTranscripts => "revise_transcripts",
            Self::RevisePdfTranscripts => "revise_pdf_transcripts",
            Self::GeneratePodcastScript => "generate_podcast_script",
            Self::TranslateVoiceTranscripts => "translate_voice_transcripts",
            Self::TranslateSubtitleTranscripts => "translate_subtitle_transcripts",
            Self::TranslatePodcastScript => "translate_podcast_script",
            Self::GeneratePdfChapterImages => "generate_pdf_chapter_images",
            Self::GenerateAudio => "generate_audio",
            Self::GeneratePdfAudio => "generate_pdf_audio",
            Self::GeneratePodcastAudio => "generate_podcast_audio",
            Self::GenerateAvatarVideos => "generate_avatar_videos",
            Self::GenerateSubtitles => "generate_subtitles",
            Self::GeneratePdfSubtitles => "generate_pdf_subtitles",
            Self::GeneratePodcastSubtitles => "generate_podcast_subtitles",
            Self::ComposeVideo => "compose_video",
            Self::ComposePodcast => "compose_podcast",
            Self::PurgeTaskFiles => "purge_task_files",
        }
    }

    /// Human-readable label shown in progress views.
    #[must_use]
    pub const fn display_label(self) -> &'static str {
        match self {
            Self::ExtractSlides => "Extracting slides",
            Self::ConvertSlidesToImages => "Converting slides to images",
            Self::AnalyzeSlideImages => "Analyzing slide visuals",
            Self::SegmentPdfContent => "Segmenting PDF content into chapters",
            Self::GenerateTranscripts => "Generating slide transcripts",
            Self::ReviseTranscripts => "Revising and refining transcripts",
            Self::RevisePdfTranscripts => "Revising and refining chapter transcripts",
            Self::GeneratePodcastScript => "Generating 2-person podcast script",
            Self::TranslateVoiceTranscripts => "Translating voice transcripts",
            Self::TranslateSubtitleTranscripts => "Translating subtitle transcripts",
            Self::TranslatePodcastScript => "Translating podcast script",
            Self::GeneratePdfChapterImages => "Generating chapter images",
            Self::GenerateAudio => "Generating narration audio",
            Self::GeneratePdfAudio => "Generating chapter audio",
            Self::GeneratePodcastAudio => "Generating podcast audio (multi-voice)",
            Self::GenerateAvatarVideos => "Rendering avatar clips",
            Self::GenerateSubtitles => "Generating subtitles",
            Self::GeneratePdfSubtitles => "Generating subtitles",
            Self::GeneratePodcastSubtitles => "Generating podcast subtitles",
            Self::ComposeVideo => "Composing final video",
            Self::ComposePodcast => "Composing final podcast (MP3)",
            Self::PurgeTaskFiles => "Purging task artifacts",
        }
    }

    /// Position in the declared global order.
    #[must_use]
    pub fn declared_index(self) -> usize {
        ALL_STEPS
            .iter()
            .position(|step| *step == self)
            .unwrap_or(ALL_STEPS.len())
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ALL_STEPS
            .iter()
            .copied()
            .find(|step| step.as_str() == value)
            .ok_or_else(|| CoreError::UnknownStep {
                value: value.to_string(),
            })
    }
}

impl Serialize for StepName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StepName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for step in ALL_STEPS.iter().copied() {
            let parsed: StepName = step.as_str().parse().expect("parse wire name");
            assert_eq!(parsed, step);
        }
        assert!("definitely_not_a_step".parse::<StepName>().is_err());
    }

    #[test]
    fn declared_order_matches_enum_order() {
        for window in ALL_STEPS.windows(2) {
            assert!(window[0] < window[1], "{} !< {}", window[0], window[1]);
        }
        assert_eq!(StepName::ExtractSlides.declared_index(), 0);
        assert_eq!(
            StepName::PurgeTaskFiles.declared_index(),
            ALL_STEPS.len() - 1
        );
    }

    #[test]
    fn serde_uses_wire_names_as_map_keys() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(StepName::ComposeVideo, 1_u8);
        let json = serde_json::to_string(&map).expect("serialize");
        assert_eq!(json, "{\"compose_video\":1}");
    }
}
