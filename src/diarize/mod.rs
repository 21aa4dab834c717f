//! Optional speaker-diarization stage with fallback handling.
//!
//! One attempt chain per job: a primary run on format-normalized audio,
//! then (if the caller asks for it) an alternative run directly on the
//! source audio. Terminal states are success, a degraded no-speakers
//! outcome, or cancellation of the whole job.

mod align;
mod model;
mod pyannote;

pub use align::{SpeakerLabeler, UNKNOWN_SPEAKER, assign_speakers};
pub use model::{DiarizationError, DiarizationModel, DiarizationTurn};
pub use pyannote::PyannoteRunner;

use crate::audio;
use crate::transcript::TranscriptionResult;
use crate::worker::JobError;
use crate::worker::events::EventSink;
use crate::worker::scratch::JobScratch;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Choice offered after the primary attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryChoice {
    ContinueWithout,
    TryAlternative,
    CancelJob,
}

/// Choice offered after the alternative attempt also fails. No further
/// attempts exist beyond this point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalChoice {
    ContinueWithout,
    CancelJob,
}

/// Answers failure prompts on behalf of the caller.
///
/// Called off the async runtime; implementations may block (a UI dialog, a
/// terminal prompt) and only suspend the job they belong to.
pub trait DecisionHandler: Send + Sync {
    fn on_primary_failure(&self, error: &DiarizationError) -> PrimaryChoice;
    fn on_alternative_failure(&self, error: &DiarizationError) -> FinalChoice;
}

/// How the diarization stage ended for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiarizationOutcome {
    /// Not requested by the job
    Disabled,
    /// Speaker labels merged into every segment
    Succeeded,
    /// Caller chose to continue without speaker labels
    Degraded,
}

pub struct DiarizationPipeline {
    model: Arc<dyn DiarizationModel>,
    decisions: Arc<dyn DecisionHandler>,
    events: Arc<dyn EventSink>,
}

impl DiarizationPipeline {
    pub fn new(
        model: Arc<dyn DiarizationModel>,
        decisions: Arc<dyn DecisionHandler>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self { model, decisions, events }
    }

    /// Run the attempt chain, merging speakers into `result` on success.
    ///
    /// A missing credential is terminal: the job aborts without any
    /// fallback choices. Cancellation surfaces as [`JobError::Cancelled`].
    pub async fn run(
        &self,
        result: &mut TranscriptionResult,
        audio_path: &Path,
        token: Option<&str>,
        scratch: &mut JobScratch,
    ) -> Result<DiarizationOutcome, JobError> {
        let Some(token) = token else {
            return Err(JobError::Diarization(DiarizationError::Auth(
                "no HuggingFace token configured; set hf_token in settings or the \
                 HF_TOKEN environment variable"
                    .into(),
            )));
        };

        let primary_err = match self.primary_attempt(result, audio_path, token, scratch).await {
            Ok(()) => return Ok(DiarizationOutcome::Succeeded),
            Err(e) => e,
        };

        warn!("Diarization failed: {}", primary_err);
        self.events.on_status(&format!("Diarization failed: {}", primary_err));

        match self.decide_primary(primary_err).await {
            PrimaryChoice::ContinueWithout => {
                info!("Continuing without speaker diarization");
                Ok(DiarizationOutcome::Degraded)
            }
            PrimaryChoice::TryAlternative => self.alternative_attempt(result, audio_path, token).await,
            PrimaryChoice::CancelJob => Err(JobError::Cancelled),
        }
    }

    async fn primary_attempt(
        &self,
        result: &mut TranscriptionResult,
        audio_path: &Path,
        token: &str,
        scratch: &mut JobScratch,
    ) -> Result<(), DiarizationError> {
        // The model wants 16 kHz mono WAV; transcode unless the source
        // already matches.
        let input: PathBuf = if audio::is_wav_16k_mono(audio_path) {
            audio_path.to_path_buf()
        } else {
            self.events.on_status("Converting audio format...");
            let wav = scratch.mint("scriven_diar", "wav");
            audio::convert_to_wav_16k(audio_path, &wav)
                .await
                .map_err(|e| DiarizationError::Format(e.to_string()))?;
            wav
        };

        self.events.on_status("Performing speaker diarization...");
        let turns = self.model.run(&input, token).await?;
        info!("Diarization produced {} turns", turns.len());
        assign_speakers(&mut result.segments, &turns);
        Ok(())
    }

    /// Same model, invoked directly on the unconverted source audio.
    async fn alternative_attempt(
        &self,
        result: &mut TranscriptionResult,
        audio_path: &Path,
        token: &str,
    ) -> Result<DiarizationOutcome, JobError> {
        self.events.on_status("Attempting alternative diarization method...");

        match self.model.run(audio_path, token).await {
            Ok(turns) => {
                info!("Alternative diarization produced {} turns", turns.len());
                assign_speakers(&mut result.segments, &turns);
                Ok(DiarizationOutcome::Succeeded)
            }
            Err(e) => {
                warn!("Alternative diarization failed: {}", e);
                self.events
                    .on_status(&format!("Alternative diarization failed: {}", e));

                match self.decide_final(e).await {
                    FinalChoice::ContinueWithout => Ok(DiarizationOutcome::Degraded),
                    FinalChoice::CancelJob => Err(JobError::Cancelled),
                }
            }
        }
    }

    async fn decide_primary(&self, error: DiarizationError) -> PrimaryChoice {
        let decisions = self.decisions.clone();
        tokio::task::spawn_blocking(move || decisions.on_primary_failure(&error))
            .await
            .unwrap_or(PrimaryChoice::CancelJob)
    }

    async fn decide_final(&self, error: DiarizationError) -> FinalChoice {
        let decisions = self.decisions.clone();
        tokio::task::spawn_blocking(move || decisions.on_alternative_failure(&error))
            .await
            .unwrap_or(FinalChoice::CancelJob)
    }
}
