//! Local voice model store.
//!
//! The store owns the models directory: flat `<voice>.onnx` +
//! `<voice>.onnx.json` pairs plus a `store.json` manifest carrying
//! provenance for downloaded models. The directory is never consulted
//! ambiently; callers go through the index, which is rebuilt by an explicit
//! scan at open time and after every mutation.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ParlanceError, ParlanceResult};
use crate::model::types::{DownloadState, ModelDescriptor, ModelFiles, VoiceConfig};

/// File name of the provenance manifest inside the store directory
pub const MANIFEST_FILE: &str = "store.json";

/// Prefix of staging directories created inside the store during downloads.
/// Leftovers from a crashed process are swept at open time.
pub const STAGING_PREFIX: &str = ".staging-";

const WEIGHTS_SUFFIX: &str = ".onnx";
const CONFIG_SUFFIX: &str = ".onnx.json";

/// Provenance recorded for a downloaded model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Catalog URL the model was downloaded from
    pub source_url: Option<String>,
    /// SHA-256 per local file name, computed while streaming the download
    #[serde(default)]
    pub sha256: BTreeMap<String, String>,
    /// RFC 3339 timestamp of the completed download
    pub downloaded_at: Option<String>,
}

/// Owned handle over the local models directory
#[derive(Debug)]
pub struct ModelStore {
    root: PathBuf,
    manifest_path: PathBuf,
    manifest: HashMap<String, ManifestEntry>,
    index: HashMap<String, ModelDescriptor>,
}

impl ModelStore {
    /// Open (and create if needed) a store at `root`.
    ///
    /// Sweeps stale staging directories, loads the manifest, and performs
    /// the initial scan.
    ///
    /// # Errors
    ///
    /// Returns a file error if the directory cannot be created or read.
    pub fn open<P: Into<PathBuf>>(root: P) -> ParlanceResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            ParlanceError::file(format!("cannot create store at {}: {e}", root.display()))
        })?;

        let manifest_path = root.join(MANIFEST_FILE);
        let mut store = Self {
            root,
            manifest_path,
            manifest: HashMap::new(),
            index: HashMap::new(),
        };

        store.sweep_staging();
        store.load_manifest();
        store.scan()?;
        Ok(store)
    }

    /// The store's root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rebuild the index from the directory contents.
    ///
    /// Every `<name>.onnx` becomes a descriptor: Ready when its config is
    /// present and parses, Failed (with a reason) when the weights are empty,
    /// the config is missing, or the config is unrecognisable.
    ///
    /// # Errors
    ///
    /// Returns a file error if the directory cannot be read.
    pub fn scan(&mut self) -> ParlanceResult<()> {
        let mut index = HashMap::new();

        let entries = std::fs::read_dir(&self.root).map_err(|e| {
            ParlanceError::file(format!("cannot read store at {}: {e}", self.root.display()))
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !file_name.ends_with(WEIGHTS_SUFFIX) || file_name.starts_with('.') {
                continue;
            }

            let name = file_name.trim_end_matches(WEIGHTS_SUFFIX).to_string();
            let descriptor = self.inspect_model(&name, &path);
            index.insert(name, descriptor);
        }

        debug!("store scan found {} model(s)", index.len());
        self.index = index;
        Ok(())
    }

    fn inspect_model(&self, name: &str, onnx: &Path) -> ModelDescriptor {
        let config = self.root.join(format!("{name}{CONFIG_SUFFIX}"));
        let onnx_len = std::fs::metadata(onnx).map(|m| m.len()).unwrap_or(0);
        let config_len = std::fs::metadata(&config).map(|m| m.len()).unwrap_or(0);

        let mut descriptor = ModelDescriptor {
            name: name.to_string(),
            remote_files: Vec::new(),
            local_files: Some(ModelFiles {
                onnx: onnx.to_path_buf(),
                config: config.clone(),
            }),
            state: DownloadState::Ready,
            error: None,
            size_bytes: onnx_len + config_len,
            language: None,
            quality: None,
            sample_rate: None,
        };

        if onnx_len == 0 {
            descriptor.state = DownloadState::Failed;
            descriptor.error = Some("weights file is empty".to_string());
            return descriptor;
        }

        if !config.is_file() {
            descriptor.state = DownloadState::Failed;
            descriptor.error = Some(format!("missing config {name}{CONFIG_SUFFIX}"));
            return descriptor;
        }

        match VoiceConfig::load(&config) {
            Ok(voice_config) => {
                descriptor.sample_rate = Some(voice_config.audio.sample_rate);
                descriptor.language = voice_config.espeak.voice;
            }
            Err(e) => {
                descriptor.state = DownloadState::Failed;
                descriptor.error = Some(e.to_string());
            }
        }

        descriptor
    }

    /// All known descriptors, sorted by name
    #[must_use]
    pub fn descriptors(&self) -> Vec<ModelDescriptor> {
        let mut list: Vec<ModelDescriptor> = self.index.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Look up a descriptor by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ModelDescriptor> {
        self.index.get(name)
    }

    /// Resolve the local file paths of a Ready model.
    ///
    /// # Errors
    ///
    /// Returns `ModelNotFound` for unknown names and `ModelNotReady` when the
    /// model is present but unusable.
    pub fn resolve(&self, name: &str) -> ParlanceResult<ModelFiles> {
        let descriptor = self
            .index
            .get(name)
            .ok_or_else(|| ParlanceError::not_found(name))?;

        if !descriptor.is_ready() {
            let reason = descriptor
                .error
                .clone()
                .unwrap_or_else(|| descriptor.state.to_string());
            return Err(ParlanceError::not_ready(name, reason));
        }

        descriptor
            .local_files
            .clone()
            .ok_or_else(|| ParlanceError::not_ready(name, "no local files"))
    }

    /// Move fully staged files into the store.
    ///
    /// `staged` pairs a source path inside the staging directory with its
    /// final file name. Config files are renamed before weights so a
    /// concurrent scan never sees a weights file without its config; the
    /// model only becomes visible once its `.onnx` lands.
    ///
    /// # Errors
    ///
    /// Returns a file error if any rename fails; already renamed files are
    /// left in place and the following scan reports the actual state.
    pub fn commit_staged(
        &mut self,
        name: &str,
        staged: &[(PathBuf, String)],
        provenance: ManifestEntry,
    ) -> ParlanceResult<()> {
        let mut ordered: Vec<&(PathBuf, String)> = staged.iter().collect();
        ordered.sort_by_key(|(_, file_name)| !file_name.ends_with(CONFIG_SUFFIX));

        for (src, file_name) in ordered {
            let dest = self.root.join(file_name);
            std::fs::rename(src, &dest).map_err(|e| {
                ParlanceError::file(format!("cannot move {file_name} into store: {e}"))
            })?;
        }

        self.manifest.insert(name.to_string(), provenance);
        self.save_manifest();
        self.scan()?;
        info!("model '{name}' committed to store");
        Ok(())
    }

    /// Delete a model's files and manifest entry.
    ///
    /// # Errors
    ///
    /// Returns `ModelNotFound` for unknown names, or a file error if a
    /// deletion fails.
    pub fn remove(&mut self, name: &str) -> ParlanceResult<()> {
        let descriptor = self
            .index
            .get(name)
            .ok_or_else(|| ParlanceError::not_found(name))?;

        if let Some(files) = &descriptor.local_files {
            for path in [&files.onnx, &files.config] {
                if path.exists() {
                    std::fs::remove_file(path).map_err(|e| {
                        ParlanceError::file(format!("cannot delete {}: {e}", path.display()))
                    })?;
                }
            }
        }

        self.manifest.remove(name);
        self.save_manifest();
        self.scan()?;
        info!("model '{name}' removed from store");
        Ok(())
    }

    /// Copy user-supplied model files into the store, returning the number
    /// of files copied. Files that are neither `.onnx` nor `.json`, or that
    /// fail to copy, are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns a file error if the rescan after copying fails.
    pub fn import_files(&mut self, paths: &[PathBuf]) -> ParlanceResult<usize> {
        let mut copied = 0;
        for src in paths {
            let Some(file_name) = src.file_name().and_then(|n| n.to_str()) else {
                warn!("skipping import of {}: no file name", src.display());
                continue;
            };
            if !file_name.ends_with(WEIGHTS_SUFFIX) && !file_name.ends_with(".json") {
                warn!("skipping import of {file_name}: not a model file");
                continue;
            }
            match std::fs::copy(src, self.root.join(file_name)) {
                Ok(_) => copied += 1,
                Err(e) => warn!("failed to import {file_name}: {e}"),
            }
        }

        self.scan()?;
        info!("imported {copied} model file(s)");
        Ok(copied)
    }

    /// Provenance for a model, when recorded
    #[must_use]
    pub fn provenance(&self, name: &str) -> Option<&ManifestEntry> {
        self.manifest.get(name)
    }

    fn load_manifest(&mut self) {
        if self.manifest_path.exists() {
            match std::fs::read_to_string(&self.manifest_path) {
                Ok(content) => {
                    self.manifest = serde_json::from_str(&content).unwrap_or_default();
                }
                Err(e) => warn!("cannot read store manifest: {e}"),
            }
        }
    }

    fn save_manifest(&self) {
        match serde_json::to_string_pretty(&self.manifest) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&self.manifest_path, content) {
                    warn!("cannot write store manifest: {e}");
                }
            }
            Err(e) => warn!("cannot serialize store manifest: {e}"),
        }
    }

    /// Delete staging directories left behind by a crashed process
    fn sweep_staging(&self) {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if path.is_dir() && file_name.starts_with(STAGING_PREFIX) {
                warn!("sweeping stale staging directory {}", path.display());
                let _ = std::fs::remove_dir_all(&path);
            }
        }
    }
}
