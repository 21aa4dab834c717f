//! Plain-text transcript rendering.
//!
//! Consecutive segments by the same speaker are grouped under a single
//! `SPEAKER <label>` header; groups are separated by one blank line.

use super::TranscriptionResult;
use std::fmt::Write as FmtWrite;
use std::io;
use std::path::Path;

/// Rendering switches for one transcript.
///
/// `speakers` is only set when diarization actually produced a timeline;
/// a degraded job renders exactly like a job that never requested speakers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Prefix each line with `[<start>s - <end>s] `
    pub timestamps: bool,
    /// Emit `SPEAKER <label>` headers on speaker changes
    pub speakers: bool,
}

/// Render segments to the persisted text format.
pub fn render_transcript(result: &TranscriptionResult, options: RenderOptions) -> String {
    let mut out = String::new();
    let mut current_speaker: Option<&str> = None;

    for segment in &result.segments {
        if options.speakers {
            let speaker = segment.speaker.as_deref().unwrap_or(crate::diarize::UNKNOWN_SPEAKER);
            if current_speaker != Some(speaker) {
                // Blank line between speaker groups, never before the first
                if current_speaker.is_some() {
                    out.push('\n');
                }
                let _ = writeln!(out, "SPEAKER {}", speaker);
                current_speaker = Some(speaker);
            }
        }

        let text = segment.text.trim();
        if options.timestamps {
            let _ = writeln!(out, "[{:.2}s - {:.2}s] {}", segment.start, segment.end, text);
        } else {
            let _ = writeln!(out, "{}", text);
        }
    }

    out
}

/// Render and write the transcript to `path` as UTF-8.
pub fn write_transcript(
    result: &TranscriptionResult,
    path: &Path,
    options: RenderOptions,
) -> io::Result<()> {
    std::fs::write(path, render_transcript(result, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Segment;

    fn segment(start: f64, end: f64, text: &str, speaker: Option<&str>) -> Segment {
        Segment {
            start,
            end,
            text: text.to_string(),
            speaker: speaker.map(str::to_string),
        }
    }

    #[test]
    fn plain_output_without_options() {
        let result = TranscriptionResult::from_segments(vec![
            segment(0.0, 1.0, "hi", None),
            segment(1.0, 2.0, "there", None),
        ]);

        let text = render_transcript(&result, RenderOptions::default());
        assert_eq!(text, "hi\nthere\n");
    }

    #[test]
    fn no_timestamps_means_no_timestamp_substrings() {
        let result = TranscriptionResult::from_segments(vec![
            segment(12.34, 56.78, "hello world", Some("1")),
        ]);

        let text = render_transcript(
            &result,
            RenderOptions { timestamps: false, speakers: true },
        );
        assert!(!text.contains('['));
        assert!(!text.contains("12.34"));
    }

    #[test]
    fn timestamps_use_two_decimal_seconds() {
        let result = TranscriptionResult::from_segments(vec![segment(0.0, 1.5, "hi", None)]);

        let text = render_transcript(
            &result,
            RenderOptions { timestamps: true, speakers: false },
        );
        assert_eq!(text, "[0.00s - 1.50s] hi\n");
    }

    #[test]
    fn speaker_headers_group_consecutive_runs() {
        // Speakers A, A, B, A -> three groups
        let result = TranscriptionResult::from_segments(vec![
            segment(0.0, 1.0, "one", Some("A")),
            segment(1.0, 2.0, "two", Some("A")),
            segment(2.0, 3.0, "three", Some("B")),
            segment(3.0, 4.0, "four", Some("A")),
        ]);

        let text = render_transcript(
            &result,
            RenderOptions { timestamps: false, speakers: true },
        );

        assert_eq!(text.matches("SPEAKER ").count(), 3);
        assert_eq!(
            text,
            "SPEAKER A\none\ntwo\n\nSPEAKER B\nthree\n\nSPEAKER A\nfour\n"
        );
    }

    #[test]
    fn missing_speaker_renders_as_unknown_when_grouping() {
        let result = TranscriptionResult::from_segments(vec![segment(0.0, 1.0, "hi", None)]);

        let text = render_transcript(
            &result,
            RenderOptions { timestamps: false, speakers: true },
        );
        assert_eq!(text, "SPEAKER UNKNOWN\nhi\n");
    }

    #[test]
    fn write_transcript_persists_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let result = TranscriptionResult::from_segments(vec![
            segment(0.0, 1.0, "héllo", None),
        ]);
        write_transcript(&result, &path, RenderOptions::default()).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "héllo\n");
    }
}
