//! # Parlance Core
//!
//! Voice model management and synthesis plumbing for the Parlance TTS
//! studio: a local model store with atomic downloads from the Piper voice
//! catalog, a thin adapter over the `piper-rs` synthesis library, and WAV
//! export.
//!
//! ## Example
//!
//! ```rust,no_run
//! use parlance_core::{CatalogClient, ModelManager, PiperEngine, SpeechEngine, SynthesisOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (manager, _events) = ModelManager::with_default_store(CatalogClient::new())?;
//!     manager.refresh_catalog().await?;
//!     manager.download("en_US-ryan-medium").await?;
//!
//!     let (files, _lease) = manager.checkout("en_US-ryan-medium").await?;
//!     let engine = PiperEngine::load(files)?;
//!     let clip = engine.synthesize("Hello, world!", &SynthesisOptions::default())?;
//!     parlance_core::export::export_wav("speech.wav", &clip)?;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod export;
pub mod model;
#[cfg(feature = "piper")]
pub mod piper;
pub mod synth;

// Re-export main types for convenience
pub use error::{ParlanceError, ParlanceResult};
pub use model::{
    CatalogClient, DownloadState, ManagerEvent, ModelDescriptor, ModelFiles, ModelManager,
    ModelStore, UseLease, VoiceCatalog, VoiceConfig,
};
#[cfg(feature = "piper")]
pub use piper::PiperEngine;
pub use synth::{AudioClip, SpeechEngine, SynthesisOptions};

/// Version information for the parlance-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of audio channels produced by Piper voices (mono)
pub const DEFAULT_CHANNELS: u16 = 1;

/// Maximum text length for synthesis (to prevent memory issues)
pub const MAX_TEXT_LENGTH: usize = 100_000;
