//! Diarization model trait and typed failure kinds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// A time span attributed to one speaker by the diarization model.
///
/// Speaker ids are pipeline-assigned and not stable across runs; they are
/// only meaningful within the job that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiarizationTurn {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

/// Structured failure kinds, used to drive the fallback decision instead of
/// matching on message text.
#[derive(Error, Debug, Clone)]
pub enum DiarizationError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("model access is gated: {0}")]
    GatedModel(String),
    #[error("audio format not supported: {0}")]
    Format(String),
    #[error("connection failed: {0}")]
    Connectivity(String),
    #[error("diarization failed: {0}")]
    Other(String),
}

/// Produces a speaker timeline for a local audio file.
#[async_trait]
pub trait DiarizationModel: Send + Sync {
    async fn run(
        &self,
        audio_path: &Path,
        token: &str,
    ) -> Result<Vec<DiarizationTurn>, DiarizationError>;
}
