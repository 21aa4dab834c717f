//! Caller-facing callback sink.

use std::path::Path;

/// Fire-and-forget progress and result callbacks.
///
/// Implementations must not block the worker meaningfully; the worker calls
/// these inline between pipeline stages.
pub trait EventSink: Send + Sync {
    /// Human-readable progress text ("Transcribing audio...")
    fn on_status(&self, text: &str);
    /// Terminal failure notification for one job
    fn on_error(&self, text: &str);
    /// Terminal success notification for one job
    fn on_complete(&self, output_path: &Path);
    /// Diagnostic detail, not meant for primary UI surfaces
    fn log(&self, text: &str);
}

/// Sink that drops everything. Useful for tests and non-interactive runs.
#[allow(dead_code)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_status(&self, _text: &str) {}
    fn on_error(&self, _text: &str) {}
    fn on_complete(&self, _output_path: &Path) {}
    fn log(&self, _text: &str) {}
}
