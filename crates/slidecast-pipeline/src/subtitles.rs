//! SRT and VTT rendering from timed transcript units.
//!
//! Cue timing is derived from the per-unit audio durations recorded by the
//! audio steps; each unit becomes one cue. The formats only differ in the
//! header, the timestamp separator, and cue numbering.

use slidecast_core::SubtitleFormat;

/// One timed unit of text.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedUnit {
    /// Cue text.
    pub text: String,
    /// Spoken duration in seconds.
    pub duration_secs: f64,
}

/// Render a subtitle document from timed units.
#[must_use]
pub fn render(units: &[TimedUnit], format: SubtitleFormat) -> String {
    let mut output = String::new();
    if format == SubtitleFormat::Vtt {
        output.push_str("WEBVTT\n\n");
    }

    let mut cursor = 0.0_f64;
    for (position, unit) in units.iter().enumerate() {
        let start = cursor;
        let end = cursor + unit.duration_secs.max(0.0);
        cursor = end;

        match format {
            SubtitleFormat::Srt => {
                output.push_str(&format!(
                    "{}\n{} --> {}\n{}\n\n",
                    position + 1,
                    timestamp(start, ','),
                    timestamp(end, ','),
                    unit.text.trim()
                ));
            }
            SubtitleFormat::Vtt => {
                output.push_str(&format!(
                    "{} --> {}\n{}\n\n",
                    timestamp(start, '.'),
                    timestamp(end, '.'),
                    unit.text.trim()
                ));
            }
        }
    }
    output
}

fn timestamp(seconds: f64, millis_separator: char) -> String {
    let total_millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let millis = total_millis % 1000;
    let total_secs = total_millis / 1000;
    let secs = total_secs % 60;
    let minutes = (total_secs / 60) % 60;
    let hours = total_secs / 3600;
    format!("{hours:02}:{minutes:02}:{secs:02}{millis_separator}{millis:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units() -> Vec<TimedUnit> {
        vec![
            TimedUnit {
                text: "Welcome to the talk.".to_string(),
                duration_secs: 2.5,
            },
            TimedUnit {
                text: "Here is the first chapter.".to_string(),
                duration_secs: 61.25,
            },
        ]
    }

    #[test]
    fn srt_uses_comma_separator_and_cue_numbers() {
        let srt = render(&units(), SubtitleFormat::Srt);
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:02,500\n"));
        assert!(srt.contains("2\n00:00:02,500 --> 00:01:03,750\n"));
        assert!(!srt.contains("WEBVTT"));
    }

    #[test]
    fn vtt_has_header_and_dot_separator() {
        let vtt = render(&units(), SubtitleFormat::Vtt);
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:00.000 --> 00:00:02.500\n"));
        assert!(vtt.contains("00:00:02.500 --> 00:01:03.750\n"));
    }

    #[test]
    fn empty_input_renders_empty_documents() {
        assert_eq!(render(&[], SubtitleFormat::Srt), "");
        assert_eq!(render(&[], SubtitleFormat::Vtt), "WEBVTT\n\n");
    }

    #[test]
    fn cue_times_accumulate_in_order() {
        let many: Vec<TimedUnit> = (0..4)
            .map(|i| TimedUnit {
                text: format!("Unit {i}"),
                duration_secs: 1.0,
            })
            .collect();
        let srt = render(&many, SubtitleFormat::Srt);
        assert!(srt.contains("00:00:03,000 --> 00:00:04,000\nUnit 3"));
    }
}
