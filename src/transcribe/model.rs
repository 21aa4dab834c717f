//! Transcription model trait and errors.

use crate::audio::AudioError;
use crate::transcript::TranscriptionResult;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("audio decode failed: {0}")]
    Audio(#[from] AudioError),
    #[error("failed to download model: {0}")]
    Download(String),
    #[error("failed to initialize model: {0}")]
    Init(String),
    #[error("transcription failed: {0}")]
    Inference(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a local audio file into a time-stamped transcript.
#[async_trait]
pub trait TranscriptionModel: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResult, ModelError>;
}
