//! Python diarization runner subprocess.
//!
//! The runner script (`scripts/diarize.py`) emits one JSON record per line:
//! `turn` records for the timeline, a terminal `done`, or a terminal `error`
//! carrying a structured `kind` the Rust side maps onto
//! [`DiarizationError`] variants.

use super::model::{DiarizationError, DiarizationModel, DiarizationTurn};
use crate::audio::stderr_tail;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info};

const DEFAULT_PYTHON_BIN: &str = "python3";
const DEFAULT_SCRIPT: &str = "scripts/diarize.py";

pub struct PyannoteRunner {
    python: String,
    script: PathBuf,
}

impl PyannoteRunner {
    pub fn new(script: PathBuf) -> Self {
        let python = std::env::var("SCRIVEN_PYTHON").unwrap_or_else(|_| DEFAULT_PYTHON_BIN.into());
        Self { python, script }
    }

    /// Runner with the script at its conventional repo-relative location.
    pub fn from_env() -> Self {
        let script = std::env::var("SCRIVEN_DIARIZE_SCRIPT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SCRIPT));
        Self::new(script)
    }

    pub fn is_available(&self) -> bool {
        self.script.exists() && crate::preflight::command_exists(&self.python, "--version")
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RunnerEvent {
    Turn { start: f64, end: f64, speaker: String },
    Error { kind: String, message: String },
    Done,
}

fn error_from_kind(kind: &str, message: String) -> DiarizationError {
    match kind {
        "auth" => DiarizationError::Auth(message),
        "gated_model" => DiarizationError::GatedModel(message),
        "format" => DiarizationError::Format(message),
        "connectivity" => DiarizationError::Connectivity(message),
        _ => DiarizationError::Other(message),
    }
}

/// Interpret the runner's output.
///
/// An explicit `error` record wins over exit status; stray non-JSON lines
/// (library warnings and the like) are skipped.
fn parse_runner_output(
    stdout: &[u8],
    stderr: &[u8],
    success: bool,
) -> Result<Vec<DiarizationTurn>, DiarizationError> {
    let text = String::from_utf8_lossy(stdout);
    let mut turns = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RunnerEvent>(line) {
            Ok(RunnerEvent::Turn { start, end, speaker }) => {
                turns.push(DiarizationTurn { start, end, speaker });
            }
            Ok(RunnerEvent::Error { kind, message }) => {
                return Err(error_from_kind(&kind, message));
            }
            Ok(RunnerEvent::Done) => return Ok(turns),
            Err(_) => debug!("Skipping non-protocol runner line: {}", line),
        }
    }

    if success {
        Ok(turns)
    } else {
        Err(DiarizationError::Other(format!(
            "diarization runner exited abnormally: {}",
            stderr_tail(stderr)
        )))
    }
}

#[async_trait]
impl DiarizationModel for PyannoteRunner {
    async fn run(
        &self,
        audio_path: &Path,
        token: &str,
    ) -> Result<Vec<DiarizationTurn>, DiarizationError> {
        if !self.script.exists() {
            return Err(DiarizationError::Other(format!(
                "diarization runner missing at {}",
                self.script.display()
            )));
        }

        info!("Running diarization on {}", audio_path.display());

        let output = tokio::process::Command::new(&self.python)
            .arg(&self.script)
            .arg("--audio")
            .arg(audio_path)
            // Token travels via the environment, keeping it out of argv
            .env("HF_TOKEN", token)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                DiarizationError::Other(format!("failed to launch {}: {}", self.python, e))
            })?;

        parse_runner_output(&output.stdout, &output.stderr, output.status.success())
    }
}
