//! Transcript markdown rendering for the download surface.

use slidecast_core::{DialogueLine, Speaker, TranscriptSegment};

/// Render a narration transcript as markdown, one section per unit.
#[must_use]
pub fn render_transcript(title: &str, segments: &[TranscriptSegment]) -> String {
    let mut output = format!("# {title}\n");
    for segment in segments {
        match &segment.title {
            Some(heading) => output.push_str(&format!("\n## {heading}\n\n")),
            None => output.push_str(&format!("\n## Part {}\n\n", segment.index + 1)),
        }
        output.push_str(segment.text.trim());
        output.push('\n');
    }
    output
}

/// Render a podcast dialogue as markdown with speaker labels.
#[must_use]
pub fn render_dialogue(title: &str, dialogue: &[DialogueLine]) -> String {
    let mut output = format!("# {title}\n\n");
    for line in dialogue {
        let speaker = match line.speaker {
            Speaker::Host => "Host",
            Speaker::Guest => "Guest",
        };
        output.push_str(&format!("**{speaker}:** {}\n\n", line.text.trim()));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_sections_use_titles_when_present() {
        let segments = vec![
            TranscriptSegment {
                index: 0,
                title: Some("Intro".to_string()),
                text: "Hello.".to_string(),
            },
            TranscriptSegment {
                index: 1,
                title: None,
                text: "More.".to_string(),
            },
        ];
        let markdown = render_transcript("paper.pdf", &segments);
        assert!(markdown.contains("## Intro"));
        assert!(markdown.contains("## Part 2"));
    }

    #[test]
    fn dialogue_labels_speakers() {
        let dialogue = vec![
            DialogueLine {
                speaker: Speaker::Host,
                text: "Welcome!".to_string(),
            },
            DialogueLine {
                speaker: Speaker::Guest,
                text: "Glad to be here.".to_string(),
            },
        ];
        let markdown = render_dialogue("Episode", &dialogue);
        assert!(markdown.contains("**Host:** Welcome!"));
        assert!(markdown.contains("**Guest:** Glad to be here."));
    }
}
