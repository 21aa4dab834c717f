//! Transcript data model and plain-text rendering.

mod writer;

pub use writer::{RenderOptions, render_transcript, write_transcript};

use serde::{Deserialize, Serialize};

/// A time-bounded unit of transcribed speech
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Transcribed text
    pub text: String,
    /// Speaker label, populated once diarization has been attempted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            speaker: None,
        }
    }
}

/// Output of one speech-to-text model call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// Full transcript text (all segments joined)
    pub full_text: String,
    /// Time-ordered segments
    pub segments: Vec<Segment>,
}

impl TranscriptionResult {
    /// Build a result from segments, deriving the joined full text
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        let full_text = segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Self { full_text, segments }
    }
}
