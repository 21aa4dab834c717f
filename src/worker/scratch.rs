//! Per-job ownership of intermediate audio files.

use crate::worker::events::EventSink;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Temp artifacts created while processing one job.
///
/// Every registered path is deleted when the job closes, on success and
/// failure alike. Deletion failures are logged, never escalated.
pub struct JobScratch {
    paths: Vec<PathBuf>,
}

impl JobScratch {
    pub fn new() -> Self {
        Self { paths: Vec::new() }
    }

    /// Take ownership of an existing path.
    pub fn register(&mut self, path: PathBuf) {
        debug!("Registered temp artifact: {}", path.display());
        self.paths.push(path);
    }

    /// Mint a unique, extensionless path in the system temp directory and
    /// register it. Download tools append their own extension to this stem.
    pub fn mint_stem(&mut self, prefix: &str) -> PathBuf {
        let path = std::env::temp_dir().join(unique_name(prefix));
        self.register(path.clone());
        path
    }

    /// Mint a unique path with the given extension and register it.
    pub fn mint(&mut self, prefix: &str, extension: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}.{}", unique_name(prefix), extension));
        self.register(path.clone());
        path
    }

    /// Delete every registered artifact. Idempotent.
    pub fn cleanup(&mut self, events: &dyn EventSink) {
        for path in self.paths.drain(..) {
            if !path.exists() {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => events.log(&format!("Cleaned up temp file: {}", path.display())),
                Err(e) => {
                    warn!("Failed to clean up {}: {}", path.display(), e);
                    events.log(&format!("Failed to clean up {}: {}", path.display(), e));
                }
            }
        }
    }

    #[cfg(test)]
    pub fn registered(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// Timestamp plus a short random suffix, enough to avoid collisions between
/// jobs started within the same second.
fn unique_name(prefix: &str) -> String {
    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", prefix, stamp, &suffix[..8])
}

/// Remove a path the caller no longer needs, logging on failure.
pub fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::events::NullSink;

    #[test]
    fn minted_paths_are_unique() {
        let mut scratch = JobScratch::new();
        let a = scratch.mint("scriven_test", "wav");
        let b = scratch.mint("scriven_test", "wav");
        assert_ne!(a, b);
        assert_eq!(scratch.registered().len(), 2);
    }

    #[test]
    fn cleanup_removes_existing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.mp3");
        std::fs::write(&path, b"data").unwrap();

        let mut scratch = JobScratch::new();
        scratch.register(path.clone());
        scratch.cleanup(&NullSink);

        assert!(!path.exists());
    }

    #[test]
    fn cleanup_tolerates_missing_files() {
        let mut scratch = JobScratch::new();
        scratch.register(PathBuf::from("/nonexistent/scriven/artifact.mp3"));
        // Must not panic or error
        scratch.cleanup(&NullSink);
    }
}
