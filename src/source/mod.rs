//! Input classification and resolution.
//!
//! An input reference is either a known video-hosting URL (downloaded to a
//! temp artifact) or a local media file (validated and passed through).

mod youtube;

pub use youtube::YtDlpDownloader;

use crate::worker::events::EventSink;
use crate::worker::scratch::JobScratch;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Hosts treated as remote media references
const VIDEO_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("input file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("download failed: {0}")]
    Download(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fetches remote audio to a local path.
///
/// Implementations write under `output_stem` (no extension; the tool picks
/// one) and surface progress through the event sink.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        output_stem: &Path,
        events: &dyn EventSink,
    ) -> Result<(), SourceError>;
}

/// A usable local audio path for one job.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub path: PathBuf,
    /// True when the path is a temp artifact owed cleanup by the job
    pub is_temp: bool,
}

/// True when the input parses as a URL on a known video host.
pub fn is_remote_reference(input: &str) -> bool {
    let Ok(url) = reqwest::Url::parse(input) else {
        return false;
    };
    match url.host_str() {
        Some(host) => VIDEO_HOSTS.contains(&host) || host.ends_with(".youtube.com"),
        None => false,
    }
}

pub struct SourceResolver {
    downloader: Arc<dyn Downloader>,
}

impl SourceResolver {
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self { downloader }
    }

    /// Turn an input reference into a local audio path.
    ///
    /// Remote references are downloaded under a minted temp stem; the final
    /// file is looked up afterwards because download tools append their own
    /// extension (and occasionally an infix) to the requested output.
    pub async fn resolve(
        &self,
        input: &str,
        scratch: &mut JobScratch,
        events: &dyn EventSink,
    ) -> Result<ResolvedSource, SourceError> {
        if is_remote_reference(input) {
            events.on_status("Downloading audio...");
            let stem = scratch.mint_stem("scriven_yt");
            events.log(&format!("Downloading to: {}", stem.display()));

            self.downloader.fetch(input, &stem, events).await?;

            let path = find_downloaded_file(&stem)?;
            info!("Download completed: {}", path.display());
            events.log(&format!("Download completed: {}", path.display()));
            scratch.register(path.clone());

            return Ok(ResolvedSource { path, is_temp: true });
        }

        let path = PathBuf::from(input);
        if !path.exists() {
            return Err(SourceError::NotFound(path));
        }
        Ok(ResolvedSource { path, is_temp: false })
    }
}

/// Locate the file a download actually produced for `stem`.
///
/// Tries the expected `.mp3` name first, then any file in the stem's
/// directory whose name starts with the stem.
fn find_downloaded_file(stem: &Path) -> Result<PathBuf, SourceError> {
    let expected = stem.with_extension("mp3");
    if expected.is_file() {
        return Ok(expected);
    }

    let dir = stem.parent().unwrap_or_else(|| Path::new("."));
    let Some(stem_name) = stem.file_name().and_then(|n| n.to_str()) else {
        return Err(SourceError::Download(format!(
            "invalid download stem {}",
            stem.display()
        )));
    };

    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(stem_name));
        if matches && path.is_file() {
            return Ok(path);
        }
    }

    Err(SourceError::Download(format!(
        "downloaded file not found under {}",
        stem.display()
    )))
}
