//! Voice model manager.
//!
//! The single authority for which models exist locally, which exist
//! remotely, and the transitions between those states. Downloads are
//! staged into a temp directory inside the store and only become visible
//! through an atomic rename once every required file has arrived; per
//! model name at most one transfer is in flight, and a second request
//! coalesces into it. Progress and completion surface as [`ManagerEvent`]
//! values on an unbounded channel rather than callbacks, which keeps
//! cancellation and the at-most-one-in-flight guarantee in one place.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use directories::ProjectDirs;
use parking_lot::Mutex;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ParlanceError, ParlanceResult};
use crate::model::catalog::{CatalogClient, VoiceCatalog};
use crate::model::download::Downloader;
use crate::model::store::{ManifestEntry, ModelStore, STAGING_PREFIX};
use crate::model::types::{DownloadState, ModelDescriptor, ModelFiles, RemoteFile};

/// Environment variable overriding the models directory
pub const MODELS_DIR_ENV: &str = "PARLANCE_MODELS_DIR";

/// State change notifications published by the manager
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    /// A download transfer began
    DownloadStarted {
        /// Model name
        name: String,
    },
    /// Cumulative progress of an in-flight download
    DownloadProgress {
        /// Model name
        name: String,
        /// Bytes received so far across all files of the model
        received: u64,
        /// Total expected bytes, 0 when unknown
        total: u64,
    },
    /// All files arrived and were committed to the store
    DownloadCompleted {
        /// Model name
        name: String,
    },
    /// The transfer failed; staging data was discarded
    DownloadFailed {
        /// Model name
        name: String,
        /// Human-readable failure reason
        error: String,
    },
    /// The transfer was cancelled by the user; staging data was discarded
    DownloadCancelled {
        /// Model name
        name: String,
    },
    /// The store index was rebuilt (after refresh, remove, or import)
    StoreRefreshed,
}

/// RAII lease marking a model as in use by an active synthesis call.
///
/// While any lease for a name is alive, [`ModelManager::remove`] fails
/// with `ModelInUse`.
#[derive(Debug)]
pub struct UseLease {
    name: String,
    leases: Arc<Mutex<HashMap<String, usize>>>,
}

impl Drop for UseLease {
    fn drop(&mut self) {
        let mut leases = self.leases.lock();
        if let Some(count) = leases.get_mut(&self.name) {
            *count -= 1;
            if *count == 0 {
                leases.remove(&self.name);
            }
        }
    }
}

enum TransferOutcome {
    Completed,
    Cancelled,
}

/// Coordinator over the store, the catalog, and in-flight downloads
#[derive(Debug)]
pub struct ModelManager {
    store: RwLock<ModelStore>,
    catalog_client: CatalogClient,
    catalog: RwLock<Option<VoiceCatalog>>,
    downloader: Downloader,
    inflight: Mutex<HashMap<String, CancellationToken>>,
    last_errors: Mutex<HashMap<String, String>>,
    leases: Arc<Mutex<HashMap<String, usize>>>,
    events: mpsc::UnboundedSender<ManagerEvent>,
}

impl ModelManager {
    /// Create a manager over a store at `models_dir`.
    ///
    /// Returns the manager together with the receiving end of its event
    /// channel; the UI consumes events on its own loop.
    ///
    /// # Errors
    ///
    /// Returns a file error if the store directory cannot be opened.
    pub fn new<P: Into<PathBuf>>(
        models_dir: P,
        catalog_client: CatalogClient,
    ) -> ParlanceResult<(Arc<Self>, mpsc::UnboundedReceiver<ManagerEvent>)> {
        let store = ModelStore::open(models_dir)?;
        let downloader = Downloader::new(catalog_client.http_client().clone());
        let (events, receiver) = mpsc::unbounded_channel();

        let manager = Arc::new(Self {
            store: RwLock::new(store),
            catalog_client,
            catalog: RwLock::new(None),
            downloader,
            inflight: Mutex::new(HashMap::new()),
            last_errors: Mutex::new(HashMap::new()),
            leases: Arc::new(Mutex::new(HashMap::new())),
            events,
        });
        Ok((manager, receiver))
    }

    /// Create a manager over the default platform models directory,
    /// honouring the `PARLANCE_MODELS_DIR` override.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no platform directory can be
    /// determined, or a file error if it cannot be created.
    pub fn with_default_store(
        catalog_client: CatalogClient,
    ) -> ParlanceResult<(Arc<Self>, mpsc::UnboundedReceiver<ManagerEvent>)> {
        Self::new(Self::default_models_dir()?, catalog_client)
    }

    /// The default models directory for this platform
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the platform directories cannot be
    /// determined.
    pub fn default_models_dir() -> ParlanceResult<PathBuf> {
        if let Ok(dir) = std::env::var(MODELS_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        let dirs = ProjectDirs::from("org", "Parlance", "parlance").ok_or_else(|| {
            ParlanceError::configuration("cannot determine platform data directory")
        })?;
        Ok(dirs.data_dir().join("models"))
    }

    /// The store's root directory
    pub async fn models_dir(&self) -> PathBuf {
        self.store.read().await.root().to_path_buf()
    }

    /// Explicitly rebuild the store index from disk.
    ///
    /// # Errors
    ///
    /// Returns a file error if the store directory cannot be read.
    pub async fn refresh(&self) -> ParlanceResult<()> {
        self.store.write().await.scan()?;
        self.emit(ManagerEvent::StoreRefreshed);
        Ok(())
    }

    /// Re-fetch the remote catalog, returning the number of listed voices.
    ///
    /// # Errors
    ///
    /// Returns a network error if the catalog cannot be fetched or parsed.
    pub async fn refresh_catalog(&self) -> ParlanceResult<usize> {
        let catalog = self.catalog_client.fetch().await?;
        let count = catalog.len();
        *self.catalog.write().await = Some(catalog);
        Ok(count)
    }

    /// Whether a catalog has been fetched this session
    pub async fn catalog_loaded(&self) -> bool {
        self.catalog.read().await.is_some()
    }

    /// Merge the local scan with the remote catalog into one listing.
    ///
    /// Local state wins for files on disk; catalog metadata (remote files,
    /// quality, language) is attached where known; in-flight transfers show
    /// as Downloading and failed transfers that left nothing behind show as
    /// Failed with their reason.
    pub async fn list_available(&self) -> Vec<ModelDescriptor> {
        let mut merged: BTreeMap<String, ModelDescriptor> = BTreeMap::new();

        if let Some(catalog) = self.catalog.read().await.as_ref() {
            for voice in catalog.voices.values() {
                let mut descriptor =
                    ModelDescriptor::remote(voice.key.clone(), voice.files.clone());
                descriptor.language = voice.language.clone();
                descriptor.quality = voice.quality.clone();
                merged.insert(voice.key.clone(), descriptor);
            }
        }

        for local in self.store.read().await.descriptors() {
            match merged.get_mut(&local.name) {
                Some(existing) => {
                    let remote_files = existing.remote_files.clone();
                    let quality = existing.quality.clone();
                    let language = local.language.clone().or(existing.language.clone());
                    *existing = local;
                    existing.remote_files = remote_files;
                    existing.quality = quality;
                    existing.language = language;
                }
                None => {
                    merged.insert(local.name.clone(), local);
                }
            }
        }

        {
            let last_errors = self.last_errors.lock();
            for (name, error) in last_errors.iter() {
                if let Some(descriptor) = merged.get_mut(name) {
                    if descriptor.local_files.is_none() {
                        descriptor.state = DownloadState::Failed;
                        descriptor.error = Some(error.clone());
                    }
                }
            }
        }

        {
            let inflight = self.inflight.lock();
            for name in inflight.keys() {
                if let Some(descriptor) = merged.get_mut(name) {
                    descriptor.state = DownloadState::Downloading;
                    descriptor.error = None;
                }
            }
        }

        merged.into_values().collect()
    }

    /// Download a model listed in the catalog.
    ///
    /// A second call for a name already Downloading coalesces: it returns
    /// immediately and the single in-flight transfer reports through the
    /// event channel. The transfer itself runs within this future; callers
    /// spawn it on the runtime to keep their own loop responsive.
    ///
    /// # Errors
    ///
    /// Returns `ModelNotFound` for names the catalog does not list, or the
    /// transfer error after staging data has been discarded.
    pub async fn download(&self, name: &str) -> ParlanceResult<()> {
        let files = {
            let catalog = self.catalog.read().await;
            catalog
                .as_ref()
                .and_then(|c| c.get(name))
                .map(|voice| voice.files.clone())
        }
        .ok_or_else(|| ParlanceError::not_found(name))?;

        let token = {
            let mut inflight = self.inflight.lock();
            if inflight.contains_key(name) {
                debug!("download of '{name}' already in flight; coalescing");
                return Ok(());
            }
            let token = CancellationToken::new();
            inflight.insert(name.to_string(), token.clone());
            token
        };

        self.last_errors.lock().remove(name);
        self.emit(ManagerEvent::DownloadStarted {
            name: name.to_string(),
        });
        info!("downloading model '{name}' ({} file(s))", files.len());

        let result = self.run_transfer(name, &files, &token).await;
        self.inflight.lock().remove(name);

        match result {
            Ok(TransferOutcome::Completed) => {
                self.emit(ManagerEvent::DownloadCompleted {
                    name: name.to_string(),
                });
                Ok(())
            }
            Ok(TransferOutcome::Cancelled) => {
                info!("download of '{name}' cancelled");
                self.emit(ManagerEvent::DownloadCancelled {
                    name: name.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                warn!("download of '{name}' failed: {e}");
                self.last_errors
                    .lock()
                    .insert(name.to_string(), e.to_string());
                self.emit(ManagerEvent::DownloadFailed {
                    name: name.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_transfer(
        &self,
        name: &str,
        files: &[RemoteFile],
        token: &CancellationToken,
    ) -> ParlanceResult<TransferOutcome> {
        let root = self.store.read().await.root().to_path_buf();

        // Staged inside the store so the final rename stays on one
        // filesystem; dropping the TempDir discards partial data.
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&root)
            .map_err(|e| ParlanceError::file(format!("cannot create staging dir: {e}")))?;

        let total: u64 = files.iter().filter_map(|f| f.size_bytes).sum();
        let mut completed: u64 = 0;
        let mut staged: Vec<(PathBuf, String)> = Vec::new();
        let mut digests = BTreeMap::new();

        for file in files {
            let file_name = file.file_name().to_string();
            let url = self.catalog_client.file_url(&file.path);
            let dest = staging.path().join(&file_name);

            let events = self.events.clone();
            let event_name = name.to_string();
            let base = completed;
            let fetch = self.downloader.fetch_to(
                &url,
                &dest,
                file.size_bytes,
                move |received| {
                    let _ = events.send(ManagerEvent::DownloadProgress {
                        name: event_name.clone(),
                        received: base + received,
                        total,
                    });
                },
            );

            let digest = tokio::select! {
                () = token.cancelled() => return Ok(TransferOutcome::Cancelled),
                result = fetch => result?,
            };

            completed += file
                .size_bytes
                .unwrap_or_else(|| std::fs::metadata(&dest).map(|m| m.len()).unwrap_or(0));
            digests.insert(file_name.clone(), digest);
            staged.push((dest, file_name));
        }

        let provenance = ManifestEntry {
            source_url: Some(self.catalog_client.base_url().to_string()),
            sha256: digests,
            downloaded_at: Some(chrono::Utc::now().to_rfc3339()),
        };

        self.store
            .write()
            .await
            .commit_staged(name, &staged, provenance)?;
        Ok(TransferOutcome::Completed)
    }

    /// Cancel an in-flight download. Returns whether one was in flight.
    pub fn cancel_download(&self, name: &str) -> bool {
        let inflight = self.inflight.lock();
        match inflight.get(name) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Delete a model's local files.
    ///
    /// # Errors
    ///
    /// Returns `ModelInUse` while the model has an in-flight download or an
    /// active synthesis lease, `ModelNotFound` for unknown names, or a file
    /// error if deletion fails.
    pub async fn remove(&self, name: &str) -> ParlanceResult<()> {
        if self.inflight.lock().contains_key(name) {
            return Err(ParlanceError::in_use(name));
        }
        if self.leases.lock().contains_key(name) {
            return Err(ParlanceError::in_use(name));
        }

        self.store.write().await.remove(name)?;
        self.last_errors.lock().remove(name);
        self.emit(ManagerEvent::StoreRefreshed);
        Ok(())
    }

    /// Local file paths of a Ready model.
    ///
    /// # Errors
    ///
    /// Returns `ModelNotFound` or `ModelNotReady`.
    pub async fn resolve(&self, name: &str) -> ParlanceResult<ModelFiles> {
        self.store.read().await.resolve(name)
    }

    /// Resolve a Ready model and take a usage lease on it for the duration
    /// of a synthesis call.
    ///
    /// # Errors
    ///
    /// Returns `ModelNotFound` or `ModelNotReady`.
    pub async fn checkout(&self, name: &str) -> ParlanceResult<(ModelFiles, UseLease)> {
        let files = self.store.read().await.resolve(name)?;
        let mut leases = self.leases.lock();
        *leases.entry(name.to_string()).or_insert(0) += 1;
        let lease = UseLease {
            name: name.to_string(),
            leases: Arc::clone(&self.leases),
        };
        Ok((files, lease))
    }

    /// Copy user-supplied model files into the store.
    ///
    /// # Errors
    ///
    /// Returns a file error if the store rescan fails.
    pub async fn import_files(&self, paths: &[PathBuf]) -> ParlanceResult<usize> {
        let copied = self.store.write().await.import_files(paths)?;
        self.emit(ManagerEvent::StoreRefreshed);
        Ok(copied)
    }

    fn emit(&self, event: ManagerEvent) {
        // The receiver may already be gone during shutdown.
        let _ = self.events.send(event);
    }
}
