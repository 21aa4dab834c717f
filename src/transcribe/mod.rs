//! Speech-to-text collaborator seam and the whisper.cpp implementation.

mod model;
mod whisper;

pub use model::{ModelError, TranscriptionModel};
pub use whisper::{
    WhisperSize, WhisperTranscriber, download_model, is_model_downloaded, model_path,
};
