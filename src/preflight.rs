//! Host tool availability probes.
//!
//! The pipeline shells out to ffmpeg and yt-dlp; these checks let the
//! front-end warn before a job fails mid-queue.

use std::process::{Command, Stdio};

/// True when `binary` runs and exits cleanly with the given version flag.
pub fn command_exists(binary: &str, version_arg: &str) -> bool {
    Command::new(binary)
        .arg(version_arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn ffmpeg_available() -> bool {
    command_exists("ffmpeg", "-version")
}

pub fn ytdlp_available() -> bool {
    command_exists("yt-dlp", "--version")
}
