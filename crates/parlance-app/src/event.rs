//! Events posted back to the UI loop by background tasks.

use std::path::PathBuf;
use std::sync::Arc;

use parlance_core::model::ManagerEvent;
use parlance_core::{AudioClip, ModelDescriptor, PiperEngine};

/// Why a synthesis task was started
#[derive(Debug, Clone)]
pub enum SynthesisPurpose {
    /// Play the result through the audio device
    Play,
}

/// Everything the UI can learn from a background task
pub enum UiEvent {
    /// Forwarded model manager event
    Manager(ManagerEvent),
    /// Catalog fetch finished with a voice count or an error
    CatalogRefreshed(Result<usize, String>),
    /// Fresh merged listing of local and remote voices
    VoicesListed(Vec<ModelDescriptor>),
    /// A voice finished loading (or failed to)
    VoiceLoaded {
        /// Voice name
        name: String,
        /// Loaded engine or error message
        result: Result<Arc<PiperEngine>, String>,
    },
    /// A synthesis task finished
    SynthesisFinished {
        /// What the audio was synthesized for
        purpose: SynthesisPurpose,
        /// Synthesized clip or error message
        result: Result<AudioClip, String>,
    },
    /// Device playback ended
    PlaybackFinished {
        /// Whether the user stopped it (as opposed to running out)
        stopped: bool,
    },
    /// A synthesize-and-export task finished
    ExportFinished {
        /// Destination path
        path: PathBuf,
        /// Error message on failure
        result: Result<(), String>,
    },
    /// A model file import finished
    ImportFinished(Result<usize, String>),
    /// Free-form status line from a background task
    Status(String),
}
