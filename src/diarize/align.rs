//! Merging a speaker timeline into transcription segments.

use super::model::DiarizationTurn;
use crate::transcript::Segment;
use std::collections::HashMap;

/// Sentinel for segments no turn fully contains.
pub const UNKNOWN_SPEAKER: &str = "UNKNOWN";

/// Maps raw diarization speaker ids to 1-based sequential display labels,
/// in order of first appearance. Lives for exactly one job.
pub struct SpeakerLabeler {
    map: HashMap<String, String>,
}

impl SpeakerLabeler {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    /// Display label for a raw speaker id. `UNKNOWN` passes through and is
    /// never entered into the mapping.
    pub fn label_for(&mut self, raw: &str) -> String {
        if raw == UNKNOWN_SPEAKER {
            return UNKNOWN_SPEAKER.to_string();
        }

        if let Some(label) = self.map.get(raw) {
            return label.clone();
        }

        let label = (self.map.len() + 1).to_string();
        self.map.insert(raw.to_string(), label.clone());
        label
    }
}

impl Default for SpeakerLabeler {
    fn default() -> Self {
        Self::new()
    }
}

/// Assign a display label to every segment from the turn timeline.
///
/// A fresh labeler is built per call so labels never bleed between jobs.
pub fn assign_speakers(segments: &mut [Segment], turns: &[DiarizationTurn]) {
    let mut labeler = SpeakerLabeler::new();

    for segment in segments.iter_mut() {
        let label = match dominant_speaker(segment, turns) {
            Some(raw) => labeler.label_for(raw),
            None => UNKNOWN_SPEAKER.to_string(),
        };
        segment.speaker = Some(label);
    }
}

/// Pick the raw speaker for one segment.
///
/// A turn qualifies only when it fully contains the segment's span. Among
/// qualifying turns the most frequent speaker wins; ties go to the speaker
/// seen first in the timeline.
fn dominant_speaker<'a>(segment: &Segment, turns: &'a [DiarizationTurn]) -> Option<&'a str> {
    let mut first_seen: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for turn in turns {
        if segment.start >= turn.start && segment.end <= turn.end {
            let count = counts.entry(turn.speaker.as_str()).or_insert(0);
            if *count == 0 {
                first_seen.push(turn.speaker.as_str());
            }
            *count += 1;
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for speaker in first_seen {
        let count = counts[speaker];
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((speaker, count));
        }
    }
    best.map(|(speaker, _)| speaker)
}
