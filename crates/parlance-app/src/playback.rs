//! Audio device playback sink.
//!
//! rodio's `OutputStream` is not `Send`, so each playback runs on its own
//! thread that owns the stream for the clip's lifetime. The `Sink` is
//! shared back so the UI can stop playback; completion is reported through
//! the callback with whether the user stopped it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use parlance_core::AudioClip;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use tracing::{debug, error};

/// Device playback handle with play/stop semantics
#[derive(Clone)]
pub struct Player {
    sink: Arc<Mutex<Option<Arc<Sink>>>>,
    playing: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

impl Player {
    /// Create an idle player
    pub fn new() -> Self {
        Self {
            sink: Arc::new(Mutex::new(None)),
            playing: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a clip is currently playing
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Play a clip on the default output device.
    ///
    /// `on_done` fires when playback ends with `Ok(stopped_by_user)`, or an
    /// error message if the device could not be opened.
    pub fn play<F>(&self, clip: AudioClip, on_done: F)
    where
        F: FnOnce(Result<bool, String>) + Send + 'static,
    {
        let sink_slot = Arc::clone(&self.sink);
        let playing = Arc::clone(&self.playing);
        let stop_requested = Arc::clone(&self.stop_requested);

        playing.store(true, Ordering::SeqCst);
        stop_requested.store(false, Ordering::SeqCst);

        let spawned = std::thread::Builder::new()
            .name("parlance-playback".to_string())
            .spawn(move || {
                debug!(
                    "playing {:.2}s at {} Hz",
                    clip.duration_secs(),
                    clip.sample_rate
                );

                let result = (|| -> Result<bool, String> {
                    let (_stream, handle) =
                        OutputStream::try_default().map_err(|e| e.to_string())?;
                    let sink = Arc::new(Sink::try_new(&handle).map_err(|e| e.to_string())?);
                    *sink_slot.lock() = Some(Arc::clone(&sink));

                    let buffer =
                        SamplesBuffer::new(clip.channels, clip.sample_rate, clip.samples);
                    sink.append(buffer);
                    sink.sleep_until_end();

                    Ok(stop_requested.load(Ordering::SeqCst))
                })();

                *sink_slot.lock() = None;
                playing.store(false, Ordering::SeqCst);
                on_done(result);
            });

        if let Err(e) = spawned {
            error!("cannot spawn playback thread: {e}");
            self.playing.store(false, Ordering::SeqCst);
        }
    }

    /// Stop the current playback, if any
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.stop();
        }
    }
}
