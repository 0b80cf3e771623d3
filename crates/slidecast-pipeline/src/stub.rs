//! Deterministic stand-in engines.
//!
//! Used by tests and by standalone deployments where no external providers
//! are configured. Outputs are derived only from the inputs, so re-running a
//! step is byte-stable; media payloads are placeholder bytes, not valid
//! encodings.

use std::path::Path;

use async_trait::async_trait;

use slidecast_core::{
    AudioSegment, Chapter, DialogueLine, ImageRef, SlideRef, Speaker, SubtitleTrack,
    TranscriptSegment, VisionNote,
};

use crate::context::Engines;
use crate::engines::{
    ComposedMedia, DocumentEngine, EngineError, EngineResult, LanguageEngine, MediaEngine,
    SpeechEngine, SynthesizedAudio,
};

/// Seconds of synthetic audio per character of input text.
const SECONDS_PER_CHAR: f64 = 0.05;

async fn read_source(path: &Path, op: &'static str) -> EngineResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|error| EngineError::Fatal {
        op,
        detail: format!("cannot read source document: {error}"),
    })
}

/// Deterministic document engine: fixed-shape chapters and slides derived
/// from the source bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubDocumentEngine;

#[async_trait]
impl DocumentEngine for StubDocumentEngine {
    async fn segment_pdf(&self, path: &Path) -> EngineResult<Vec<Chapter>> {
        let bytes = read_source(path, "segment_pdf").await?;
        let count = (bytes.len() % 3) + 2;
        Ok((0..count)
            .map(|index| Chapter {
                index: index as u32,
                title: format!("Chapter {}", index + 1),
                content: format!(
                    "Chapter {} distilled from {} source bytes.",
                    index + 1,
                    bytes.len()
                ),
            })
            .collect())
    }

    async fn extract_slides(&self, path: &Path) -> EngineResult<Vec<SlideRef>> {
        let bytes = read_source(path, "extract_slides").await?;
        let count = (bytes.len() % 4) + 3;
        Ok((0..count)
            .map(|index| SlideRef {
                index: index as u32,
                title: Some(format!("Slide {}", index + 1)),
                text: format!("Slide {} content.", index + 1),
            })
            .collect())
    }

    async fn render_slide_image(&self, _path: &Path, index: u32) -> EngineResult<Vec<u8>> {
        Ok(placeholder_png(index))
    }

    async fn render_chapter_image(&self, chapter: &Chapter) -> EngineResult<Vec<u8>> {
        Ok(placeholder_png(chapter.index))
    }
}

fn placeholder_png(index: u32) -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&index.to_be_bytes());
    bytes
}

/// Deterministic language engine: text transformations are simple, visible
/// rewrites so tests can assert on them.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubLanguageEngine;

#[async_trait]
impl LanguageEngine for StubLanguageEngine {
    async fn draft_transcripts(
        &self,
        slides: &[SlideRef],
        notes: Option<&[VisionNote]>,
    ) -> EngineResult<Vec<TranscriptSegment>> {
        Ok(slides
            .iter()
            .map(|slide| {
                let visual = notes
                    .and_then(|notes| notes.iter().find(|note| note.index == slide.index))
                    .map(|note| format!(" {}", note.description))
                    .unwrap_or_default();
                TranscriptSegment {
                    index: slide.index,
                    title: slide.title.clone(),
                    text: format!("{}{visual}", slide.text),
                }
            })
            .collect())
    }

    async fn revise(
        &self,
        segments: &[TranscriptSegment],
        _language: &str,
    ) -> EngineResult<Vec<TranscriptSegment>> {
        Ok(segments
            .iter()
            .map(|segment| TranscriptSegment {
                index: segment.index,
                title: segment.title.clone(),
                text: format!("{} (revised)", segment.text.trim()),
            })
            .collect())
    }

    async fn translate(
        &self,
        segments: &[TranscriptSegment],
        target_language: &str,
    ) -> EngineResult<Vec<TranscriptSegment>> {
        Ok(segments
            .iter()
            .map(|segment| TranscriptSegment {
                index: segment.index,
                title: segment.title.clone(),
                text: format!("[{target_language}] {}", segment.text),
            })
            .collect())
    }

    async fn podcast_dialogue(&self, chapters: &[Chapter]) -> EngineResult<Vec<DialogueLine>> {
        let mut dialogue = Vec::with_capacity(chapters.len() * 2);
        for chapter in chapters {
            dialogue.push(DialogueLine {
                speaker: Speaker::Host,
                text: format!("Let's talk about {}.", chapter.title),
            });
            dialogue.push(DialogueLine {
                speaker: Speaker::Guest,
                text: chapter.content.clone(),
            });
        }
        Ok(dialogue)
    }

    async fn translate_dialogue(
        &self,
        dialogue: &[DialogueLine],
        target_language: &str,
    ) -> EngineResult<Vec<DialogueLine>> {
        Ok(dialogue
            .iter()
            .map(|line| DialogueLine {
                speaker: line.speaker,
                text: format!("[{target_language}] {}", line.text),
            })
            .collect())
    }

    async fn describe_image(&self, png: &[u8]) -> EngineResult<String> {
        Ok(format!("Figure with {} bytes of image data.", png.len()))
    }
}

/// Deterministic speech engine: duration scales with text length.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubSpeechEngine;

#[async_trait]
impl SpeechEngine for StubSpeechEngine {
    async fn synthesize(
        &self,
        text: &str,
        _language: &str,
        _voice: Option<&str>,
    ) -> EngineResult<SynthesizedAudio> {
        let mut bytes = b"ID3stub".to_vec();
        bytes.extend_from_slice(text.as_bytes());
        Ok(SynthesizedAudio {
            duration_secs: (text.len() as f64) * SECONDS_PER_CHAR,
            bytes,
        })
    }
}

/// Deterministic media engine: outputs are concatenations of placeholder
/// bytes written into the scratch directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubMediaEngine;

impl StubMediaEngine {
    async fn write(
        workdir: &Path,
        name: &str,
        bytes: &[u8],
        duration_secs: Option<f64>,
    ) -> EngineResult<ComposedMedia> {
        let local_path = workdir.join(name);
        tokio::fs::write(&local_path, bytes)
            .await
            .map_err(|error| EngineError::Fatal {
                op: "compose.write",
                detail: error.to_string(),
            })?;
        Ok(ComposedMedia {
            local_path,
            duration_secs,
        })
    }
}

#[async_trait]
impl MediaEngine for StubMediaEngine {
    async fn compose_video(
        &self,
        images: &[ImageRef],
        audio: &[AudioSegment],
        subtitles: Option<&SubtitleTrack>,
        workdir: &Path,
    ) -> EngineResult<ComposedMedia> {
        let duration: f64 = audio.iter().map(|segment| segment.duration_secs).sum();
        let payload = format!(
            "video:{} images,{} audio segments,subtitles={}",
            images.len(),
            audio.len(),
            subtitles.map_or("none", |track| track.locale.as_str())
        );
        Self::write(workdir, "final.mp4", payload.as_bytes(), Some(duration)).await
    }

    async fn concat_audio(
        &self,
        segments: &[AudioSegment],
        workdir: &Path,
    ) -> EngineResult<ComposedMedia> {
        let duration: f64 = segments.iter().map(|segment| segment.duration_secs).sum();
        let payload = format!("audio:{} segments", segments.len());
        Self::write(workdir, "final.mp3", payload.as_bytes(), Some(duration)).await
    }

    async fn render_avatar_clip(
        &self,
        audio: &AudioSegment,
        workdir: &Path,
    ) -> EngineResult<ComposedMedia> {
        let payload = format!("avatar:{}", audio.index);
        Self::write(
            workdir,
            &format!("avatar_{}.mp4", audio.index),
            payload.as_bytes(),
            Some(audio.duration_secs),
        )
        .await
    }
}

/// Bundle of all stub engines.
#[must_use]
pub fn stub_engines() -> Engines {
    Engines {
        document: std::sync::Arc::new(StubDocumentEngine),
        language: std::sync::Arc::new(StubLanguageEngine),
        speech: std::sync::Arc::new(StubSpeechEngine),
        media: std::sync::Arc::new(StubMediaEngine),
    }
}
