//! Audio normalization shared by the model collaborators.
//!
//! Both whisper.cpp and the diarization runner want 16 kHz mono PCM; ffmpeg
//! does the transcoding and `hound` does the decoding.

use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tracing::debug;

/// Sample rate required by the speech models
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("audio conversion failed: {0}")]
    Convert(String),
    #[error("WAV decode failed: {0}")]
    Decode(String),
}

/// Transcode any input ffmpeg understands into 16 kHz mono 16-bit WAV.
pub async fn convert_to_wav_16k(input: &Path, output: &Path) -> Result<(), AudioError> {
    debug!("Converting {} -> {}", input.display(), output.display());

    let result = tokio::process::Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(input)
        .args(["-ar", "16000", "-ac", "1", "-sample_fmt", "s16", "-vn"])
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| AudioError::Convert(format!("failed to launch ffmpeg: {}", e)))?;

    if !result.status.success() {
        return Err(AudioError::Convert(stderr_tail(&result.stderr)));
    }

    Ok(())
}

/// True when the file is already a 16 kHz mono WAV, i.e. needs no
/// transcoding before a model call.
pub fn is_wav_16k_mono(path: &Path) -> bool {
    hound::WavReader::open(path)
        .map(|r| {
            let spec = r.spec();
            spec.sample_rate == TARGET_SAMPLE_RATE && spec.channels == 1
        })
        .unwrap_or(false)
}

/// Decode a 16 kHz mono WAV file into normalized f32 samples.
///
/// Rejects any other layout so callers know to transcode first.
pub fn read_wav_samples(path: &Path) -> Result<Vec<f32>, AudioError> {
    let mut reader = hound::WavReader::open(path).map_err(|e| AudioError::Decode(e.to_string()))?;
    let spec = reader.spec();

    if spec.sample_rate != TARGET_SAMPLE_RATE || spec.channels != 1 {
        return Err(AudioError::Decode(format!(
            "expected {}Hz mono, got {}Hz {}ch",
            TARGET_SAMPLE_RATE, spec.sample_rate, spec.channels
        )));
    }

    match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AudioError::Decode(e.to_string()))
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AudioError::Decode(e.to_string())),
    }
}

/// Last few lines of a subprocess stderr, for error messages.
pub fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail = if lines.len() > 4 { &lines[lines.len() - 4..] } else { &lines[..] };
    tail.join("; ")
}
