//! Types shared across the model store, catalog, and manager.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ParlanceError, ParlanceResult};

/// Download lifecycle state of a voice model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DownloadState {
    /// Known from the catalog but not present locally
    NotDownloaded,
    /// A transfer is in flight
    Downloading,
    /// All required files are present and the config parses
    Ready,
    /// Download failed, or the local files are unusable; retry recovers
    Failed,
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotDownloaded => write!(f, "Not downloaded"),
            Self::Downloading => write!(f, "Downloading"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// One remote file of a voice model as described by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Repository-relative path, e.g. `en/en_US/ryan/medium/en_US-ryan-medium.onnx`
    pub path: String,
    /// Declared file size in bytes, when the catalog provides one
    pub size_bytes: Option<u64>,
    /// Upstream content digest, when the catalog provides one
    pub digest: Option<String>,
}

impl RemoteFile {
    /// The bare file name portion of the repository path
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Local paths of a downloaded voice model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFiles {
    /// Path to the ONNX weights file
    pub onnx: PathBuf,
    /// Path to the voice config (`<name>.onnx.json`)
    pub config: PathBuf,
}

/// In-memory record of a voice model's identity, locations, and state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Unique model name, e.g. `en_US-ryan-medium`
    pub name: String,
    /// Remote files required for a complete download, when known
    pub remote_files: Vec<RemoteFile>,
    /// Local file paths once downloaded
    pub local_files: Option<ModelFiles>,
    /// Current lifecycle state
    pub state: DownloadState,
    /// Why the model is Failed, when it is
    pub error: Option<String>,
    /// Total size in bytes (remote declaration or on-disk measurement)
    pub size_bytes: u64,
    /// Language code from the catalog or voice config
    pub language: Option<String>,
    /// Quality tier from the catalog (`x_low` … `high`)
    pub quality: Option<String>,
    /// Output sample rate declared by the voice config, once known
    pub sample_rate: Option<u32>,
}

impl ModelDescriptor {
    /// A catalog-only descriptor with no local presence yet
    #[must_use]
    pub fn remote(name: String, remote_files: Vec<RemoteFile>) -> Self {
        let size_bytes = remote_files.iter().filter_map(|f| f.size_bytes).sum();
        Self {
            name,
            remote_files,
            local_files: None,
            state: DownloadState::NotDownloaded,
            error: None,
            size_bytes,
            language: None,
            quality: None,
            sample_rate: None,
        }
    }

    /// Whether the model can be loaded for synthesis right now
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == DownloadState::Ready && self.local_files.is_some()
    }
}

/// The subset of a Piper voice config the store needs to recognise a model.
///
/// A `<name>.onnx.json` that fails to deserialize into this shape marks the
/// model unusable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Audio output section
    pub audio: AudioSection,
    /// Espeak phonemization section
    #[serde(default)]
    pub espeak: EspeakSection,
    /// Inference scale defaults baked into the voice
    #[serde(default)]
    pub inference: InferenceSection,
    /// Number of speakers in the voice (1 for single-speaker)
    #[serde(default = "default_num_speakers")]
    pub num_speakers: u32,
}

/// Audio section of a voice config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSection {
    /// Output sample rate in Hz
    pub sample_rate: u32,
}

/// Espeak section of a voice config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EspeakSection {
    /// Espeak voice/language identifier, e.g. `en-us`
    #[serde(default)]
    pub voice: Option<String>,
}

/// Inference scale defaults of a voice config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSection {
    /// Sampling noise scale
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f32,
    /// Phoneme length scale (higher is slower)
    #[serde(default = "default_length_scale")]
    pub length_scale: f32,
    /// Phoneme width noise scale
    #[serde(default = "default_noise_w")]
    pub noise_w: f32,
}

impl Default for InferenceSection {
    fn default() -> Self {
        Self {
            noise_scale: default_noise_scale(),
            length_scale: default_length_scale(),
            noise_w: default_noise_w(),
        }
    }
}

const fn default_num_speakers() -> u32 {
    1
}

const fn default_noise_scale() -> f32 {
    0.667
}

const fn default_length_scale() -> f32 {
    1.0
}

const fn default_noise_w() -> f32 {
    0.8
}

impl VoiceConfig {
    /// Load and parse a voice config file.
    ///
    /// # Errors
    ///
    /// Returns a file error if the file cannot be read or does not have the
    /// structure of a Piper voice config.
    pub fn load(path: &Path) -> ParlanceResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ParlanceError::file(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ParlanceError::file(format!(
                "{} is not a recognised voice config: {e}",
                path.display()
            ))
        })
    }
}
