//! Black-box engine seams the pipeline steps call out to.
//!
//! The transformations themselves (LLM revision and translation, speech
//! synthesis, image generation, vision analysis, media composition) are
//! external providers. The pipeline only depends on these traits; real
//! clients and the deterministic stubs in [`crate::stub`] both implement
//! them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use slidecast_core::{
    AudioSegment, Chapter, DialogueLine, ImageRef, SlideRef, SubtitleTrack, TranscriptSegment,
    VisionNote,
};

/// Errors raised by engine calls.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Timeout, rate limit, or other retryable provider condition.
    #[error("transient engine failure in {op}: {detail}")]
    Transient {
        /// Operation identifier.
        op: &'static str,
        /// Provider-reported detail.
        detail: String,
    },
    /// Non-retryable provider failure.
    #[error("engine failure in {op}: {detail}")]
    Fatal {
        /// Operation identifier.
        op: &'static str,
        /// Provider-reported detail.
        detail: String,
    },
}

impl EngineError {
    /// Whether a bounded retry may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Convenience alias for engine results.
pub type EngineResult<T> = Result<T, EngineError>;

/// Synthesized speech for one unit of text.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    /// Encoded audio bytes (MP3).
    pub bytes: Vec<u8>,
    /// Playback duration in seconds.
    pub duration_secs: f64,
}

/// A composed media file produced in a scratch directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedMedia {
    /// Path of the produced file.
    pub local_path: PathBuf,
    /// Playback duration in seconds when the composer reports one.
    pub duration_secs: Option<f64>,
}

/// Document ingestion: segmentation, slide extraction, and rendering.
#[async_trait]
pub trait DocumentEngine: Send + Sync {
    /// Split a PDF into narrated chapters.
    async fn segment_pdf(&self, path: &Path) -> EngineResult<Vec<Chapter>>;

    /// Extract per-slide content from a deck.
    async fn extract_slides(&self, path: &Path) -> EngineResult<Vec<SlideRef>>;

    /// Render one slide to PNG bytes.
    async fn render_slide_image(&self, path: &Path, index: u32) -> EngineResult<Vec<u8>>;

    /// Render an illustration image for one chapter.
    async fn render_chapter_image(&self, chapter: &Chapter) -> EngineResult<Vec<u8>>;
}

/// Text transformations: drafting, revision, translation, vision analysis.
#[async_trait]
pub trait LanguageEngine: Send + Sync {
    /// Draft per-slide transcripts from extracted content and optional
    /// vision notes.
    async fn draft_transcripts(
        &self,
        slides: &[SlideRef],
        notes: Option<&[VisionNote]>,
    ) -> EngineResult<Vec<TranscriptSegment>>;

    /// Revise transcripts for spoken delivery, keeping the language.
    async fn revise(
        &self,
        segments: &[TranscriptSegment],
        language: &str,
    ) -> EngineResult<Vec<TranscriptSegment>>;

    /// Translate transcripts into a target language.
    async fn translate(
        &self,
        segments: &[TranscriptSegment],
        target_language: &str,
    ) -> EngineResult<Vec<TranscriptSegment>>;

    /// Draft a two-speaker podcast dialogue from chapters (English).
    async fn podcast_dialogue(&self, chapters: &[Chapter]) -> EngineResult<Vec<DialogueLine>>;

    /// Translate a dialogue into a target language, preserving speakers.
    async fn translate_dialogue(
        &self,
        dialogue: &[DialogueLine],
        target_language: &str,
    ) -> EngineResult<Vec<DialogueLine>>;

    /// Describe a slide image for transcript enrichment.
    async fn describe_image(&self, png: &[u8]) -> EngineResult<String>;
}

/// Speech synthesis.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Synthesize one unit of narration.
    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        voice: Option<&str>,
    ) -> EngineResult<SynthesizedAudio>;
}

/// Media composition (encoder-backed in production).
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Compose the final video from per-unit images and audio.
    async fn compose_video(
        &self,
        images: &[ImageRef],
        audio: &[AudioSegment],
        subtitles: Option<&SubtitleTrack>,
        workdir: &Path,
    ) -> EngineResult<ComposedMedia>;

    /// Concatenate per-unit audio into one track.
    async fn concat_audio(
        &self,
        segments: &[AudioSegment],
        workdir: &Path,
    ) -> EngineResult<ComposedMedia>;

    /// Render a presenter avatar clip for one narration unit.
    async fn render_avatar_clip(
        &self,
        audio: &AudioSegment,
        workdir: &Path,
    ) -> EngineResult<ComposedMedia>;
}
