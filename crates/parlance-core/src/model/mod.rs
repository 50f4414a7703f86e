//! Voice model acquisition, caching, and indexing.

pub mod catalog;
pub mod download;
pub mod manager;
pub mod store;
pub mod types;

pub use catalog::{CatalogClient, CatalogVoice, VoiceCatalog, DEFAULT_CATALOG_BASE};
pub use manager::{ManagerEvent, ModelManager, UseLease, MODELS_DIR_ENV};
pub use store::{ManifestEntry, ModelStore};
pub use types::{DownloadState, ModelDescriptor, ModelFiles, RemoteFile, VoiceConfig};
