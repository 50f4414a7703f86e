//! Persisted application preferences.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use parlance_core::SynthesisOptions;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// User preferences persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppPrefs {
    /// Models directory override; the platform default when unset
    pub models_dir: Option<PathBuf>,
    /// Catalog repository base URL override
    pub catalog_url: Option<String>,
    /// Voice selected when the app last closed
    pub last_voice: Option<String>,
    /// Last volume slider value
    pub volume: f32,
    /// Last speed slider value
    pub speed: f32,
    /// Last noise slider value
    pub noise: f32,
    /// Last noise width slider value
    pub noise_w: f32,
    /// Last normalize checkbox state
    pub normalize: bool,
}

impl Default for AppPrefs {
    fn default() -> Self {
        let options = SynthesisOptions::default();
        Self {
            models_dir: None,
            catalog_url: None,
            last_voice: None,
            volume: options.volume,
            speed: options.speed,
            noise: options.noise,
            noise_w: options.noise_w,
            normalize: options.normalize,
        }
    }
}

impl AppPrefs {
    /// Location of the preferences file for this platform
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "Parlance", "parlance")
            .map(|dirs| dirs.config_dir().join("prefs.toml"))
    }

    /// Load preferences, falling back to defaults on any problem
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load preferences from a specific file
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                warn!("ignoring malformed preferences: {e}");
                Self::default()
            }),
            Err(e) => {
                warn!("cannot read preferences: {e}");
                Self::default()
            }
        }
    }

    /// Save preferences to the platform config directory
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("no platform config directory")?;
        self.save_to(&path)
    }

    /// Save preferences to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("cannot serialize preferences")?;
        std::fs::write(path, content).with_context(|| format!("cannot write {}", path.display()))
    }

    /// The synthesis options the sliders currently describe
    pub fn options(&self) -> SynthesisOptions {
        SynthesisOptions {
            volume: self.volume,
            speed: self.speed,
            noise: self.noise,
            noise_w: self.noise_w,
            normalize: self.normalize,
        }
    }

    /// Record slider values back into the preferences
    pub fn set_options(&mut self, options: &SynthesisOptions) {
        self.volume = options.volume;
        self.speed = options.speed;
        self.noise = options.noise;
        self.noise_w = options.noise_w;
        self.normalize = options.normalize;
    }
}
