//! Persisted user settings.
//!
//! A small JSON document on disk. Unknown keys are ignored and missing keys
//! fall back to defaults, so older settings files keep loading across
//! upgrades.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "scriven_settings.json";
const MAX_RECENT_FILES: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model_size: String,
    pub include_timestamps: bool,
    pub use_diarization: bool,
    pub output_directory: String,
    pub hf_token: String,
    pub recent_files: Vec<String>,
    pub last_used: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_size: "base".to_string(),
            include_timestamps: false,
            use_diarization: false,
            output_directory: String::new(),
            hf_token: String::new(),
            recent_files: Vec::new(),
            last_used: String::new(),
        }
    }
}

impl Settings {
    /// Load from `path`, falling back to defaults when the file is missing
    /// or unreadable.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("Ignoring malformed settings file {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Persist to `path`, stamping `last_used`.
    pub fn save(&mut self, path: &Path) -> io::Result<()> {
        self.last_used = chrono::Utc::now().to_rfc3339();
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
    }

    /// Record a processed input at the front of the recent list.
    pub fn push_recent(&mut self, input: &str) {
        self.recent_files.retain(|f| f != input);
        self.recent_files.insert(0, input.to_string());
        self.recent_files.truncate(MAX_RECENT_FILES);
    }

    /// The diarization credential, if configured. The `HF_TOKEN`
    /// environment variable wins over the settings file.
    pub fn hf_token(&self) -> Option<String> {
        if let Ok(token) = std::env::var("HF_TOKEN") {
            if !token.trim().is_empty() {
                return Some(token);
            }
        }
        if self.hf_token.trim().is_empty() {
            None
        } else {
            Some(self.hf_token.clone())
        }
    }
}

/// Read-only settings view the worker consults at job start.
pub trait SettingsStore: Send + Sync {
    fn hf_token(&self) -> Option<String>;
    fn model_size(&self) -> String;
}

/// Shareable settings handle for the worker and the front-end.
#[derive(Clone)]
pub struct SharedSettings(Arc<RwLock<Settings>>);

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self(Arc::new(RwLock::new(settings)))
    }

    pub fn snapshot(&self) -> Settings {
        self.0.read().expect("settings lock poisoned").clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        let mut guard = self.0.write().expect("settings lock poisoned");
        f(&mut guard);
    }
}

impl SettingsStore for SharedSettings {
    fn hf_token(&self) -> Option<String> {
        self.0.read().expect("settings lock poisoned").hf_token()
    }

    fn model_size(&self) -> String {
        self.0.read().expect("settings lock poisoned").model_size.clone()
    }
}

/// Settings file location, overridable for tests and portable installs.
pub fn settings_path() -> PathBuf {
    std::env::var("SCRIVEN_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_FILE))
}
