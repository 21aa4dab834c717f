//! yt-dlp subprocess downloader.

use super::{Downloader, SourceError};
use crate::audio::stderr_tail;
use crate::worker::events::EventSink;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

/// Downloads best-available audio via the `yt-dlp` binary, transcoded to
/// mp3 through its ffmpeg postprocessor.
pub struct YtDlpDownloader {
    binary: String,
}

impl YtDlpDownloader {
    pub fn new() -> Self {
        Self { binary: "yt-dlp".to_string() }
    }
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn fetch(
        &self,
        url: &str,
        output_stem: &Path,
        events: &dyn EventSink,
    ) -> Result<(), SourceError> {
        info!("Starting download: {}", url);

        let mut child = tokio::process::Command::new(&self.binary)
            .arg(url)
            .args([
                "--format",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "192K",
                "--no-playlist",
                "--no-warnings",
                "--newline",
            ])
            .arg("--output")
            .arg(output_stem)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                SourceError::Download(format!("failed to launch {}: {}", self.binary, e))
            })?;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("yt-dlp: {}", line);
                if let Some(progress) = parse_progress_line(&line) {
                    events.on_status(&progress);
                }
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SourceError::Download(e.to_string()))?;

        if !output.status.success() {
            return Err(SourceError::Download(format!(
                "{} failed: {}",
                self.binary,
                stderr_tail(&output.stderr)
            )));
        }

        events.on_status("Download finished, processing audio...");
        Ok(())
    }
}

/// Extract a percentage (and speed, when present) from a yt-dlp progress
/// line. Non-progress lines return None.
fn parse_progress_line(line: &str) -> Option<String> {
    let line = line.trim();
    if !line.starts_with("[download]") {
        return None;
    }

    let percent = line.split_whitespace().find(|t| t.ends_with('%'))?;
    match line.split_whitespace().find(|t| t.ends_with("/s")) {
        Some(speed) => Some(format!("Downloading: {} at {}", percent, speed)),
        None => Some(format!("Downloading: {}", percent)),
    }
}
