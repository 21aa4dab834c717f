use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::model::{ModelError, TranscriptionModel};
use crate::audio;
use crate::transcript::{Segment, TranscriptionResult};
use crate::worker::scratch::remove_quietly;
use async_trait::async_trait;

/// Available Whisper model sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhisperSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl WhisperSize {
    /// Get the Hugging Face URL for this model
    pub fn hf_url(&self) -> &'static str {
        match self {
            WhisperSize::Tiny => "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny.bin",
            WhisperSize::Base => "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.bin",
            WhisperSize::Small => "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-small.bin",
            WhisperSize::Medium => "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-medium.bin",
            WhisperSize::Large => "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-large-v3.bin",
        }
    }

    /// Get the filename for this model
    pub fn filename(&self) -> &'static str {
        match self {
            WhisperSize::Tiny => "ggml-tiny.bin",
            WhisperSize::Base => "ggml-base.bin",
            WhisperSize::Small => "ggml-small.bin",
            WhisperSize::Medium => "ggml-medium.bin",
            WhisperSize::Large => "ggml-large-v3.bin",
        }
    }

    /// Get approximate model size in MB
    pub fn size_mb(&self) -> u64 {
        match self {
            WhisperSize::Tiny => 75,
            WhisperSize::Base => 142,
            WhisperSize::Small => 466,
            WhisperSize::Medium => 1500,
            WhisperSize::Large => 3100,
        }
    }
}

impl std::fmt::Display for WhisperSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WhisperSize::Tiny => write!(f, "tiny"),
            WhisperSize::Base => write!(f, "base"),
            WhisperSize::Small => write!(f, "small"),
            WhisperSize::Medium => write!(f, "medium"),
            WhisperSize::Large => write!(f, "large"),
        }
    }
}

impl std::str::FromStr for WhisperSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(WhisperSize::Tiny),
            "base" => Ok(WhisperSize::Base),
            "small" => Ok(WhisperSize::Small),
            "medium" => Ok(WhisperSize::Medium),
            "large" => Ok(WhisperSize::Large),
            _ => Err(format!("Unknown model: {}. Use tiny, base, small, medium, or large", s)),
        }
    }
}

/// Get the models directory path
pub fn models_dir() -> PathBuf {
    PathBuf::from("models").join("whisper")
}

/// Get the path to a specific model file
pub fn model_path(size: WhisperSize) -> PathBuf {
    models_dir().join(size.filename())
}

/// Check if a model is already downloaded
pub fn is_model_downloaded(size: WhisperSize) -> bool {
    let path = model_path(size);
    if !path.exists() {
        return false;
    }

    // Check if file size is reasonable (at least 50% of expected)
    if let Ok(metadata) = fs::metadata(&path) {
        let expected_bytes = size.size_mb() * 1024 * 1024;
        return metadata.len() >= expected_bytes / 2;
    }

    false
}

/// Download a Whisper model from Hugging Face
pub fn download_model(size: WhisperSize) -> Result<PathBuf, ModelError> {
    let path = model_path(size);

    if is_model_downloaded(size) {
        info!("Model {} already downloaded at {:?}", size, path);
        return Ok(path);
    }

    fs::create_dir_all(models_dir())?;

    info!("Downloading Whisper {} model (~{}MB)...", size, size.size_mb());

    let url = size.hf_url();

    let response = reqwest::blocking::Client::new()
        .get(url)
        .send()
        .map_err(|e| ModelError::Download(format!("HTTP request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(ModelError::Download(format!(
            "HTTP {} from {}",
            response.status(),
            url
        )));
    }

    let total_size = response.content_length().unwrap_or(0);

    let pb = indicatif::ProgressBar::new(total_size);
    pb.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let temp_path = path.with_extension("bin.tmp");
    let mut file = File::create(&temp_path)?;

    let bytes = response
        .bytes()
        .map_err(|e| ModelError::Download(format!("Failed to read response: {}", e)))?;

    file.write_all(&bytes)?;
    pb.set_position(bytes.len() as u64);
    pb.finish_with_message("Download complete");

    fs::rename(&temp_path, &path)?;

    info!("Model downloaded to {:?}", path);

    Ok(path)
}

/// whisper.cpp transcriber.
///
/// The model file is fetched and loaded lazily on first use so queue
/// construction stays cheap; the loaded context is shared across jobs.
pub struct WhisperTranscriber {
    inner: Arc<Inner>,
}

struct Inner {
    size: WhisperSize,
    ctx: OnceLock<Arc<WhisperContext>>,
    /// Number of threads to use for inference
    n_threads: i32,
}

impl WhisperTranscriber {
    pub fn new(size: WhisperSize) -> Self {
        // Use available CPU threads (leave headroom for the system)
        let n_threads = std::thread::available_parallelism()
            .map(|p| (p.get() as i32).max(1))
            .unwrap_or(4);

        Self {
            inner: Arc::new(Inner {
                size,
                ctx: OnceLock::new(),
                n_threads,
            }),
        }
    }

    /// Normalize the input into 16 kHz mono f32 samples.
    ///
    /// Files already in whisper's layout decode directly; anything else is
    /// transcoded through ffmpeg into a short-lived scratch file.
    async fn load_samples(&self, path: &Path) -> Result<Vec<f32>, ModelError> {
        if let Ok(samples) = audio::read_wav_samples(path) {
            return Ok(samples);
        }

        let wav = std::env::temp_dir().join(format!(
            "scriven_stt_{}_{}.wav",
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        ));

        let converted = audio::convert_to_wav_16k(path, &wav).await;
        let samples = match converted {
            Ok(()) => audio::read_wav_samples(&wav).map_err(ModelError::from),
            Err(e) => Err(ModelError::from(e)),
        };
        if wav.exists() {
            remove_quietly(&wav);
        }
        samples
    }
}

impl Inner {
    fn context(&self) -> Result<Arc<WhisperContext>, ModelError> {
        if let Some(ctx) = self.ctx.get() {
            return Ok(ctx.clone());
        }

        let path = download_model(self.size)?;
        info!("Loading Whisper {} model...", self.size);

        let path_str = path
            .to_str()
            .ok_or_else(|| ModelError::Init(format!("non-UTF8 model path: {:?}", path)))?;
        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| ModelError::Init(format!("Failed to load model: {}", e)))?;

        info!("Whisper model loaded successfully (using {} threads)", self.n_threads);

        let ctx = Arc::new(ctx);
        let _ = self.ctx.set(ctx.clone());
        Ok(ctx)
    }

    fn run_inference(&self, samples: &[f32]) -> Result<TranscriptionResult, ModelError> {
        let ctx = self.context()?;
        let start_time = std::time::Instant::now();

        // Greedy sampling: beam search is 2-3x slower for little gain here
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(self.n_threads);
        params.set_token_timestamps(false);

        // Hallucination guards
        params.set_no_speech_thold(0.6);
        params.set_entropy_thold(2.4);
        params.set_logprob_thold(-1.0);
        params.set_temperature(0.0);
        params.set_temperature_inc(0.2);
        params.set_no_context(true);
        params.set_suppress_non_speech_tokens(true);

        params.set_language(Some("auto"));
        params.set_translate(false);

        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_print_special(false);

        let mut state = ctx
            .create_state()
            .map_err(|e| ModelError::Inference(format!("Failed to create state: {}", e)))?;

        state
            .full(params, samples)
            .map_err(|e| ModelError::Inference(format!("Inference failed: {}", e)))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| ModelError::Inference(format!("Failed to get segments: {}", e)))?;

        let mut segments = Vec::new();

        for i in 0..num_segments {
            let start_ts = state
                .full_get_segment_t0(i)
                .map_err(|e| ModelError::Inference(format!("Failed to get start time: {}", e)))?;
            let end_ts = state
                .full_get_segment_t1(i)
                .map_err(|e| ModelError::Inference(format!("Failed to get end time: {}", e)))?;
            let text = state
                .full_get_segment_text(i)
                .map_err(|e| ModelError::Inference(format!("Failed to get text: {}", e)))?;

            let text = text.trim().to_string();
            if text.is_empty() {
                continue;
            }

            // Timestamps are in centiseconds (1/100 second)
            segments.push(Segment::new(
                start_ts as f64 / 100.0,
                end_ts as f64 / 100.0,
                text,
            ));
        }

        let elapsed = start_time.elapsed();
        let audio_secs = samples.len() as f32 / audio::TARGET_SAMPLE_RATE as f32;
        info!(
            "Transcribed {:.1}s of audio in {:.1}s ({:.1}x realtime): {} segments",
            audio_secs,
            elapsed.as_secs_f32(),
            audio_secs / elapsed.as_secs_f32().max(0.001),
            segments.len()
        );

        Ok(TranscriptionResult::from_segments(segments))
    }
}

#[async_trait]
impl TranscriptionModel for WhisperTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResult, ModelError> {
        let samples = self.load_samples(audio_path).await?;
        if samples.is_empty() {
            warn!("No audio samples decoded from {}", audio_path.display());
        }

        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.run_inference(&samples))
            .await
            .map_err(|e| ModelError::Inference(format!("inference task failed: {}", e)))?
    }
}
