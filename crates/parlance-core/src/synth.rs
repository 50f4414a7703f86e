//! Synthesis options, audio clips, and the engine seam.
//!
//! [`SpeechEngine`] is the explicit boundary in front of the external TTS
//! library: model path plus text plus options in, a sample buffer at the
//! voice's declared rate out. Nothing on this side of the seam runs
//! inference.

use serde::{Deserialize, Serialize};

use crate::error::{ParlanceError, ParlanceResult};

/// Per-request synthesis parameters.
///
/// Ranges match the original control surface; `speed` maps directly onto
/// Piper's length scale (higher is slower).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOptions {
    /// Output gain (0.0 to 1.0)
    pub volume: f32,
    /// Phoneme length scale (0.5 to 2.0, 1.0 = normal)
    pub speed: f32,
    /// Sampling noise scale (0.0 to 1.5)
    pub noise: f32,
    /// Phoneme width noise scale (0.0 to 1.5)
    pub noise_w: f32,
    /// Peak-normalize the output before applying the gain
    pub normalize: bool,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            speed: 1.0,
            noise: 0.667,
            noise_w: 0.8,
            normalize: false,
        }
    }
}

impl SynthesisOptions {
    /// Set the output gain
    ///
    /// # Errors
    ///
    /// Returns an error if volume is not in the valid range (0.0 to 1.0)
    pub fn with_volume(mut self, volume: f32) -> ParlanceResult<Self> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(ParlanceError::invalid_input(format!(
                "Volume must be between 0.0 and 1.0, got {volume}"
            )));
        }
        self.volume = volume;
        Ok(self)
    }

    /// Set the length scale
    ///
    /// # Errors
    ///
    /// Returns an error if speed is not in the valid range (0.5 to 2.0)
    pub fn with_speed(mut self, speed: f32) -> ParlanceResult<Self> {
        if !(0.5..=2.0).contains(&speed) {
            return Err(ParlanceError::invalid_input(format!(
                "Speed must be between 0.5 and 2.0, got {speed}"
            )));
        }
        self.speed = speed;
        Ok(self)
    }

    /// Set the noise scale
    ///
    /// # Errors
    ///
    /// Returns an error if noise is not in the valid range (0.0 to 1.5)
    pub fn with_noise(mut self, noise: f32) -> ParlanceResult<Self> {
        if !(0.0..=1.5).contains(&noise) {
            return Err(ParlanceError::invalid_input(format!(
                "Noise must be between 0.0 and 1.5, got {noise}"
            )));
        }
        self.noise = noise;
        Ok(self)
    }

    /// Set the width noise scale
    ///
    /// # Errors
    ///
    /// Returns an error if noise_w is not in the valid range (0.0 to 1.5)
    pub fn with_noise_w(mut self, noise_w: f32) -> ParlanceResult<Self> {
        if !(0.0..=1.5).contains(&noise_w) {
            return Err(ParlanceError::invalid_input(format!(
                "Noise W must be between 0.0 and 1.5, got {noise_w}"
            )));
        }
        self.noise_w = noise_w;
        Ok(self)
    }

    /// Validate all parameter ranges
    ///
    /// # Errors
    ///
    /// Returns an invalid input error naming the first out-of-range field
    pub fn validate(&self) -> ParlanceResult<()> {
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(ParlanceError::invalid_input(format!(
                "Volume must be between 0.0 and 1.0, got {}",
                self.volume
            )));
        }
        if !(0.5..=2.0).contains(&self.speed) {
            return Err(ParlanceError::invalid_input(format!(
                "Speed must be between 0.5 and 2.0, got {}",
                self.speed
            )));
        }
        if !(0.0..=1.5).contains(&self.noise) {
            return Err(ParlanceError::invalid_input(format!(
                "Noise must be between 0.0 and 1.5, got {}",
                self.noise
            )));
        }
        if !(0.0..=1.5).contains(&self.noise_w) {
            return Err(ParlanceError::invalid_input(format!(
                "Noise W must be between 0.0 and 1.5, got {}",
                self.noise_w
            )));
        }
        Ok(())
    }
}

/// A synthesized buffer of mono audio samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Interleaved samples in the -1.0 to 1.0 range
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count (Piper voices are mono)
    pub channels: u16,
}

impl AudioClip {
    /// Create a mono clip
    #[must_use]
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Whether the clip has no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Clip duration in seconds
    #[must_use]
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / (self.sample_rate as f32 * f32::from(self.channels))
    }

    /// Largest absolute sample value
    #[must_use]
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |max, s| max.max(s.abs()))
    }

    /// Multiply every sample by `gain`
    pub fn apply_gain(&mut self, gain: f32) {
        if (gain - 1.0).abs() < f32::EPSILON {
            return;
        }
        for sample in &mut self.samples {
            *sample *= gain;
        }
    }

    /// Scale the clip so its peak reaches full scale
    pub fn normalize(&mut self) {
        let peak = self.peak();
        if peak > f32::EPSILON {
            self.apply_gain(1.0 / peak);
        }
    }
}

/// The seam in front of the external TTS library
pub trait SpeechEngine: Send + Sync {
    /// Synthesize `text` into a clip at the voice's declared sample rate.
    ///
    /// # Errors
    ///
    /// Returns an invalid input error for empty or oversized text or
    /// out-of-range options, and a synthesis error for failures surfaced by
    /// the library.
    fn synthesize(&self, text: &str, options: &SynthesisOptions) -> ParlanceResult<AudioClip>;

    /// The sample rate the engine's voice produces
    fn sample_rate(&self) -> u32;
}

/// Validate text input before handing it to an engine.
///
/// # Errors
///
/// Returns an invalid input error for empty or oversized text.
pub fn check_text(text: &str) -> ParlanceResult<()> {
    if text.trim().is_empty() {
        return Err(ParlanceError::invalid_input("Text cannot be empty"));
    }
    if text.len() > crate::MAX_TEXT_LENGTH {
        return Err(ParlanceError::invalid_input(format!(
            "Text length {} exceeds maximum of {}",
            text.len(),
            crate::MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}
